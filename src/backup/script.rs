//! Artifact script format
//!
//! A backup artifact is a UTF-8 SQL script:
//!
//! ```text
//! -- trackdb backup
//! -- Kind: incremental
//! -- Created: 2026-10-18T09:30:00.000000Z
//! -- Changes since: 2026-10-18T08:00:00.000000Z
//! -- Warning: table task_tags skipped: no modification timestamps
//! PRAGMA foreign_keys=OFF;
//! BEGIN TRANSACTION;
//! -- Table: boards
//! INSERT OR REPLACE INTO "boards" (...) VALUES (...);
//! COMMIT;
//! PRAGMA foreign_keys=ON;
//! ```
//!
//! The script replays on its own with any SQLite client. The restore executor
//! instead parses it, checks the envelope, and replays only the body inside
//! its own outer transaction.

use super::errors::ScriptError;
use super::record::BackupKind;

/// First line of every artifact
pub const SCRIPT_TITLE: &str = "-- trackdb backup";

const TABLE_MARKER: &str = "-- Table:";
const ENVELOPE_OPEN: &str = "PRAGMA foreign_keys=OFF;\nBEGIN TRANSACTION;\n";
const ENVELOPE_CLOSE: &str = "COMMIT;\nPRAGMA foreign_keys=ON;\n";

/// Metadata carried in the leading comment block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHeader {
    pub kind: BackupKind,
    pub created_at: String,
    pub changes_since: Option<String>,
    pub warnings: Vec<String>,
}

/// Incrementally assembles an artifact script.
#[derive(Debug)]
pub struct ScriptBuilder {
    out: String,
    statements: usize,
}

impl ScriptBuilder {
    /// Writes the header and opens the envelope.
    pub fn new(header: &ScriptHeader) -> Self {
        let mut out = String::with_capacity(4096);
        out.push_str(SCRIPT_TITLE);
        out.push('\n');
        out.push_str(&format!("-- Kind: {}\n", header.kind));
        out.push_str(&format!("-- Created: {}\n", header.created_at));
        if let Some(since) = &header.changes_since {
            out.push_str(&format!("-- Changes since: {}\n", since));
        }
        for warning in &header.warnings {
            out.push_str(&format!("-- Warning: {}\n", warning.replace('\n', " ")));
        }
        out.push_str(ENVELOPE_OPEN);

        Self { out, statements: 0 }
    }

    /// Starts the section for `table`; following statements belong to it.
    pub fn begin_table(&mut self, table: &str) {
        self.out.push_str(&format!("{} {}\n", TABLE_MARKER, table));
    }

    pub fn push_statement(&mut self, sql: &str) {
        self.out.push_str(sql.trim().trim_end_matches(';'));
        self.out.push_str(";\n");
        self.statements += 1;
    }

    pub fn statement_count(&self) -> usize {
        self.statements
    }

    /// Closes the envelope and returns the script text.
    pub fn finish(mut self) -> String {
        self.out.push_str(ENVELOPE_CLOSE);
        self.out
    }
}

/// Body statements attributed to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSection {
    pub table: String,
    pub statements: Vec<String>,
}

/// A parsed artifact with a validated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub header: ScriptHeader,
    pub sections: Vec<ScriptSection>,
}

impl Script {
    /// Parse and structurally validate a script.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let tokens = tokenize(text)?;

        let mut header_lines: Vec<&str> = Vec::new();
        let mut sections: Vec<ScriptSection> = Vec::new();
        let mut phase = Phase::Header;

        for token in tokens {
            match token {
                Token::Comment(line) => match phase {
                    Phase::Header => header_lines.push(line),
                    Phase::Body => {
                        if let Some(table) = line.strip_prefix(TABLE_MARKER) {
                            sections.push(ScriptSection {
                                table: table.trim().to_string(),
                                statements: Vec::new(),
                            });
                        }
                    }
                    _ => {}
                },
                Token::Statement(sql) => {
                    phase = advance(phase, &sql, &mut sections)?;
                }
            }
        }

        match phase {
            Phase::Done => {}
            Phase::Header => {
                return Err(ScriptError::UnbalancedEnvelope(
                    "missing foreign key disable".into(),
                ))
            }
            Phase::Preamble => return Err(ScriptError::UnbalancedEnvelope("missing BEGIN".into())),
            Phase::Body => return Err(ScriptError::UnbalancedEnvelope("missing COMMIT".into())),
            Phase::Trailer => {
                return Err(ScriptError::UnbalancedEnvelope(
                    "missing foreign key re-enable".into(),
                ))
            }
        }

        let header = parse_header(&header_lines)?;
        Ok(Self { header, sections })
    }

    /// Number of body statements.
    pub fn statement_count(&self) -> usize {
        self.sections.iter().map(|s| s.statements.len()).sum()
    }

    /// Whether a section for `table` is present.
    pub fn has_table(&self, table: &str) -> bool {
        self.sections.iter().any(|s| s.table == table)
    }

    /// Body statements in script order as `(table, sql)`.
    pub fn statements(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sections.iter().flat_map(|section| {
            section
                .statements
                .iter()
                .map(move |sql| (section.table.as_str(), sql.as_str()))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Preamble,
    Body,
    Trailer,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    ForeignKeysOff,
    ForeignKeysOn,
    Begin,
    Commit,
    OtherTransactionControl,
    Body,
}

fn advance(phase: Phase, sql: &str, sections: &mut [ScriptSection]) -> Result<Phase, ScriptError> {
    let control = classify(sql);
    match (control, phase) {
        (Control::ForeignKeysOff, Phase::Header) => Ok(Phase::Preamble),
        (Control::Begin, Phase::Preamble) => Ok(Phase::Body),
        (Control::Commit, Phase::Body) => Ok(Phase::Trailer),
        (Control::ForeignKeysOn, Phase::Trailer) => Ok(Phase::Done),
        (Control::Body, Phase::Body) => {
            let section = sections
                .last_mut()
                .ok_or_else(|| ScriptError::StrayStatement(excerpt(sql)))?;
            section.statements.push(sql.to_string());
            Ok(Phase::Body)
        }
        (Control::Body, _) => Err(ScriptError::StrayStatement(excerpt(sql))),
        (_, _) => Err(ScriptError::UnbalancedEnvelope(format!(
            "unexpected `{}`",
            excerpt(sql)
        ))),
    }
}

fn classify(sql: &str) -> Control {
    let normalized = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    let compact = normalized.replace(' ', "");

    match compact.as_str() {
        "PRAGMAFOREIGN_KEYS=OFF" | "PRAGMAFOREIGN_KEYS=0" | "PRAGMAFOREIGN_KEYS=FALSE" => {
            return Control::ForeignKeysOff
        }
        "PRAGMAFOREIGN_KEYS=ON" | "PRAGMAFOREIGN_KEYS=1" | "PRAGMAFOREIGN_KEYS=TRUE" => {
            return Control::ForeignKeysOn
        }
        _ => {}
    }

    match normalized.as_str() {
        "BEGIN" | "BEGIN TRANSACTION" | "BEGIN DEFERRED TRANSACTION"
        | "BEGIN IMMEDIATE TRANSACTION" | "BEGIN EXCLUSIVE TRANSACTION" => Control::Begin,
        "COMMIT" | "COMMIT TRANSACTION" | "END" | "END TRANSACTION" => Control::Commit,
        s if s.starts_with("ROLLBACK")
            || s.starts_with("SAVEPOINT")
            || s.starts_with("RELEASE")
            || s.starts_with("BEGIN ") =>
        {
            Control::OtherTransactionControl
        }
        _ => Control::Body,
    }
}

fn excerpt(sql: &str) -> String {
    let mut out: String = sql.chars().take(60).collect();
    if sql.chars().count() > 60 {
        out.push_str("...");
    }
    out
}

fn parse_header(lines: &[&str]) -> Result<ScriptHeader, ScriptError> {
    let mut iter = lines.iter();
    match iter.next() {
        Some(first) if first.trim() == SCRIPT_TITLE => {}
        _ => return Err(ScriptError::Header("missing title line".into())),
    }

    let mut kind = None;
    let mut created_at = None;
    let mut changes_since = None;
    let mut warnings = Vec::new();

    for line in iter {
        let body = line.trim_start_matches('-').trim();
        if let Some(value) = body.strip_prefix("Kind:") {
            kind = Some(
                BackupKind::parse(value.trim())
                    .ok_or_else(|| ScriptError::Header(format!("unknown kind `{}`", value.trim())))?,
            );
        } else if let Some(value) = body.strip_prefix("Created:") {
            created_at = Some(value.trim().to_string());
        } else if let Some(value) = body.strip_prefix("Changes since:") {
            changes_since = Some(value.trim().to_string());
        } else if let Some(value) = body.strip_prefix("Warning:") {
            warnings.push(value.trim().to_string());
        }
    }

    Ok(ScriptHeader {
        kind: kind.ok_or_else(|| ScriptError::Header("missing kind".into()))?,
        created_at: created_at.ok_or_else(|| ScriptError::Header("missing creation time".into()))?,
        changes_since,
        warnings,
    })
}

enum Token<'a> {
    /// A `--` comment line that starts between statements
    Comment(&'a str),
    Statement(String),
}

/// Split into top-level comments and `;`-terminated statements, honoring
/// single- and double-quoted literals with doubled-quote escapes.
fn tokenize(text: &str) -> Result<Vec<Token<'_>>, ScriptError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                if chars.peek().map(|&(_, next)| next) == Some(q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek().map(|&(_, next)| next) == Some('-') => {
                let end = text[i..].find('\n').map_or(text.len(), |offset| i + offset);
                if current.trim().is_empty() {
                    tokens.push(Token::Comment(text[i..end].trim_end()));
                    current.clear();
                }
                while chars.peek().map_or(false, |&(j, _)| j < end) {
                    chars.next();
                }
            }
            ';' => {
                let statement = current.trim();
                if !statement.is_empty() {
                    tokens.push(Token::Statement(statement.to_string()));
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if quote.is_some() || !current.trim().is_empty() {
        return Err(ScriptError::Unterminated);
    }

    Ok(tokens)
}
