//! trackdb CLI entry point
//!
//! Parses arguments and dispatches via `cli::run`, which writes the JSON
//! response. Errors are also printed to stderr and exit non-zero.

use trackdb::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
