//! Maps raw compiler logs back onto the lines a user actually wrote.
//!
//! Synthesized programs carry a prologue, sampler declarations and the common
//! fragment ahead of user code, so every line a compiler reports is offset by
//! that injected block. Logs come in a handful of `<marker>:<line>:<message>`
//! shapes (`pass.frag:12: error: ...`, `ERROR: 0:12: ...`); anything else
//! degrades to a single diagnostic on line 1 so errors are never dropped.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler message pinned to a 1-based line of user-authored source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "line {}: {tag}: {}", self.line, self.message)
    }
}

/// Translates `raw_log` into user-facing diagnostics.
///
/// `injected_lines` is the number of synthesized lines preceding the first
/// user line; `user_lines` bounds the remapped result.
pub fn translate(raw_log: &str, injected_lines: usize, user_lines: usize) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for entry in raw_log.lines() {
        let Some((raw_line, message)) = split_entry(entry) else {
            continue;
        };
        let (severity, message) = classify(message);
        let line = raw_line
            .checked_sub(injected_lines)
            .filter(|line| (1..=user_lines.max(1)).contains(line));
        let diagnostic = match line {
            Some(line) => Diagnostic {
                line,
                severity,
                message,
            },
            None => Diagnostic {
                line: 1,
                severity,
                message: entry.trim().to_string(),
            },
        };
        diagnostics.push(diagnostic);
    }

    if diagnostics.is_empty() {
        let raw = raw_log.trim();
        let message = if raw.is_empty() {
            "shader failed to compile without a log".to_string()
        } else {
            raw.to_string()
        };
        diagnostics.push(Diagnostic::error(1, message));
    }

    diagnostics
}

/// Finds the line-number field of a `<marker>:<line>:<message>` entry.
///
/// The marker may itself contain a numeric source-string index
/// (`ERROR: 0:12:`); the line number is the last field of the first run of
/// numeric fields.
fn split_entry(entry: &str) -> Option<(usize, &str)> {
    let fields: Vec<&str> = entry.split(':').collect();
    if fields.len() < 3 {
        return None;
    }
    let first = (1..fields.len() - 1).find(|&index| parse_field(fields[index]).is_some())?;
    let mut last = first;
    while last + 1 < fields.len() - 1 && parse_field(fields[last + 1]).is_some() {
        last += 1;
    }
    let line = parse_field(fields[last])?;

    let offset: usize = fields[..=last].iter().map(|field| field.len() + 1).sum();
    Some((line, entry.get(offset..).unwrap_or("").trim()))
}

fn parse_field(field: &str) -> Option<usize> {
    let trimmed = field.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

fn classify(message: &str) -> (Severity, String) {
    let lowered = message.to_ascii_lowercase();
    if let Some(rest) = lowered.strip_prefix("warning:") {
        let start = message.len() - rest.len();
        return (Severity::Warning, message[start..].trim().to_string());
    }
    if let Some(rest) = lowered.strip_prefix("error:") {
        let start = message.len() - rest.len();
        return (Severity::Error, message[start..].trim().to_string());
    }
    (Severity::Error, message.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaps_glslang_style_line() {
        let log = "pass_image.frag:45: error: 'foo' : undeclared identifier\n";
        let diagnostics = translate(log, 40, 20);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::error(5, "'foo' : undeclared identifier")]
        );
    }

    #[test]
    fn remaps_webgl_style_line_with_source_index() {
        let log = "ERROR: 0:37: 'x' : syntax error";
        let diagnostics = translate(log, 30, 10);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 7);
        assert_eq!(diagnostics[0].message, "'x' : syntax error");
    }

    #[test]
    fn boilerplate_offset_plus_five_maps_to_five() {
        let injected = 63;
        let log = format!("wrapped.frag:{}: error: boom", injected + 5);
        assert_eq!(translate(&log, injected, 12)[0].line, 5);
    }

    #[test]
    fn out_of_bounds_lines_fall_back_to_first_line() {
        let log = "wrapped.frag:3: error: inside prologue\nwrapped.frag:900: error: past the end";
        let diagnostics = translate(log, 10, 5);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|diagnostic| diagnostic.line == 1));
        assert!(diagnostics[0].message.contains("inside prologue"));
        assert!(diagnostics[1].message.contains("wrapped.frag:900"));
    }

    #[test]
    fn unparseable_log_degrades_to_single_diagnostic() {
        let diagnostics = translate("internal compiler failure", 10, 5);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::error(1, "internal compiler failure")]
        );
        assert_eq!(translate("", 10, 5).len(), 1);
    }

    #[test]
    fn warnings_keep_their_severity() {
        let diagnostics = translate("a.frag:12: warning: unused variable", 10, 5);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].line, 2);
        assert_eq!(diagnostics[0].message, "unused variable");
    }

    #[test]
    fn messages_may_contain_colons() {
        let diagnostics = translate("a.frag:11: error: expected ':' here", 10, 5);
        assert_eq!(diagnostics[0].message, "expected ':' here");
    }
}
