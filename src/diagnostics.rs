//! Markdown diagnostics for stderr.

use std::fmt::Write as _;

use crate::error::{Error, ResolutionError};

/// ANSI bold.
const BOLD: &str = "\x1b[1m";
/// ANSI reset.
const RESET: &str = "\x1b[0m";

/// Print markdown to stderr with bold headings.
fn print_markdown(md: &str) {
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_markdown(&render_error(e));
}

/// Print collected resolution errors as one markdown diagnostic.
pub fn print_resolution_errors(heading: &str, errors: &[ResolutionError]) {
    print_markdown(&render_resolution_errors(heading, errors));
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and how to fix it.
/// Designed to be readable by both humans and LLM agents.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigInvalid { path, reason } => format!("\
# Error: Invalid Config

`{}` could not be loaded: {reason}

## Fix

Correct the entry in `{}`. No files were changed.
", path.display(), path.display()),

        Error::ConfigNotFound { path } => format!("\
# Error: Config Not Found

`{}` does not exist.

## Fix

Create one:

    usage-rules init --file AGENTS.md
", path.display()),

        Error::InvalidPattern { pattern, reason } => format!("\
# Error: Invalid Pattern

`/{pattern}/` is not a valid regular expression: {reason}
"),

        Error::Io(err) => format!("\
# Error: I/O

{err}
"),

        Error::ParseFailed { file, reason } => format!("\
# Error: Parse Failed

Could not parse `{}`: {reason}
", file.display()),
    };
}

/// Render resolution errors as a bullet list with a fix hint.
pub fn render_resolution_errors(heading: &str, errors: &[ResolutionError]) -> String {
    let mut out = format!("# Error: {heading}\n\n");
    for error in errors {
        let _ = writeln!(out, "- {error}");
    }
    out.push_str("\
\n## Fix

Add the missing dependencies, or remove the entries from `.usage-rules.toml`.
Run `usage-rules list` to see what each dependency provides.
");
    return out;
}
