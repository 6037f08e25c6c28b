//! trackdb - backup and point-in-time restore for a task-tracking store
//!
//! - [`store`]: the SQLite-backed task store and its managed tables
//! - [`backup`]: full and incremental backups, catalog, verification
//! - [`restore`]: planning and transactional restoration
//! - [`cli`]: the `trackdb` command-line front end

pub mod backup;
pub mod cli;
pub mod restore;
pub mod store;
