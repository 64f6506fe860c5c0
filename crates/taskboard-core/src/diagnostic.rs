//! Diagnostic line parsing
//!
//! Turns one raw line of build-tool output into a structured, severity-tagged
//! record. Parsing is pure and total: anything that doesn't look like a
//! compiler diagnostic degrades to [`Severity::Prefix`] with the whole line
//! as the message. The original text is always retained for display.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

// ─────────────────────────────────────────────────────────────────────────────
// Regex Patterns
// ─────────────────────────────────────────────────────────────────────────────

/// Matches a leading filename-like token: `src/foo.cc:`
/// Captures: 1=filename
static FILENAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^: ]+):").expect("Invalid FILENAME_REGEX"));

/// Matches a leading decimal location component: `12:`
/// Captures: 1=number
static LOCATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+):").expect("Invalid LOCATION_REGEX"));

/// Matches a severity keyword, optionally preceded by the single space left
/// over from the location prefix: ` error:`
/// Captures: 1=keyword
static SEVERITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ ?(fatal error|error|warning|note):").expect("Invalid SEVERITY_REGEX")
});

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Machine-readable severity of one diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// `error:` or `fatal error:`
    Error,
    Warning,
    /// `note:` — attached context for a previous error or warning
    Note,
    /// No severity keyword found; an informational or continuation line
    Prefix,
}

/// Structured result of parsing one raw log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLine {
    /// The original line, verbatim, for display
    pub full_text: String,

    pub severity: Severity,

    /// Leading filename token, if the line carried one
    pub filename: Option<String>,

    /// Line number within `filename` (1-based)
    pub line: Option<u32>,

    /// Column number (1-based)
    pub column: Option<u32>,

    /// Remaining text after all recognized prefixes, trimmed
    pub message: String,
}

impl DiagnosticLine {
    /// Parse one raw line. Never fails.
    ///
    /// Strict left-to-right prefix stripping, each step optional:
    /// filename, line, column, severity keyword. A line that opens with a
    /// bare severity keyword (`warning: ...`) is recognized before the
    /// filename step so the keyword is not mistaken for a filename.
    pub fn parse(raw: &str) -> Self {
        let full_text = raw.to_string();
        let mut rest = raw;

        let mut filename = None;
        let mut line = None;
        let mut column = None;

        let severity = match strip_severity(&mut rest) {
            Some(severity) => severity,
            None => {
                if let Some(caps) = FILENAME_REGEX.captures(rest) {
                    filename = Some(caps[1].to_string());
                    rest = &rest[caps[0].len()..];
                }
                line = strip_location(&mut rest);
                if line.is_some() {
                    column = strip_location(&mut rest);
                }
                strip_severity(&mut rest).unwrap_or(Severity::Prefix)
            }
        };

        DiagnosticLine {
            full_text,
            severity,
            filename,
            line,
            column,
            message: rest.trim().to_string(),
        }
    }
}

fn strip_location(rest: &mut &str) -> Option<u32> {
    let caps = LOCATION_REGEX.captures(rest)?;
    // A run of digits with a digit-count guard via u32 parse; an absurdly
    // long number is treated as no location at all.
    let number = caps[1].parse::<u32>().ok()?;
    *rest = &rest[caps[0].len()..];
    Some(number)
}

fn strip_severity(rest: &mut &str) -> Option<Severity> {
    let caps = SEVERITY_REGEX.captures(rest)?;
    let severity = match &caps[1] {
        "fatal error" | "error" => Severity::Error,
        "warning" => Severity::Warning,
        "note" => Severity::Note,
        _ => return None,
    };
    *rest = &rest[caps[0].len()..];
    Some(severity)
}
