//! Package metadata extraction: descriptions and mix task listings.

use regex::Regex;

use crate::types::TaskInfo;

/// Extract a package description. Prefers the Hex metadata file, then falls
/// back to a `description:` entry in `mix.exs`.
pub fn parse_description(hex_metadata: Option<&str>, mix_exs: Option<&str>) -> Option<String> {
    let from_hex = hex_metadata.and_then(description_from_hex_metadata);
    let raw = from_hex.or_else(|| return mix_exs.and_then(description_from_mix_exs))?;
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    return Some(collapsed);
}

/// Parse a mix task module source into its task name and shortdoc.
/// Returns `None` when the file declares no `Mix.Tasks.*` module.
pub fn parse_task(source: &str) -> Option<TaskInfo> {
    let module = Regex::new(r"defmodule\s+Mix\.Tasks\.([A-Za-z0-9_.]+)\s+do").ok()?;
    let shortdoc = Regex::new(r#"@shortdoc\s+"((?:[^"\\]|\\.)*)""#).ok()?;

    let captures = module.captures(source)?;
    let name = captures.get(1)?.as_str().split('.').map(underscore).collect::<Vec<_>>().join(".");
    let summary = shortdoc
        .captures(source)
        .and_then(|c| return c.get(1))
        .map(|m| return unescape(m.as_str()));

    return Some(TaskInfo { name, shortdoc: summary });
}

/// Convert a CamelCase module segment to snake_case (`HTTPClient` → `http_client`).
pub fn underscore(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len().saturating_add(4));
    for (i, ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            let prev = chars.get(i.saturating_sub(1)).copied().unwrap_or('_');
            let next = chars.get(i.saturating_add(1)).copied();
            let starts_word = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next.is_some_and(|n| return n.is_ascii_lowercase()));
            if starts_word && prev != '_' {
                out.push('_');
            }
        }
        out.push(ch.to_ascii_lowercase());
    }
    return out;
}

/// Read the `description` tuple out of a `hex_metadata.config` term file.
fn description_from_hex_metadata(content: &str) -> Option<String> {
    let pattern =
        Regex::new(r#"(?s)\{<<"description">>,\s*<<"((?:[^"\\]|\\.)*)"(?:/utf8)?>>\}"#).ok()?;
    let captured = pattern.captures(content)?.get(1)?;
    return Some(unescape(captured.as_str()));
}

/// Read a `description: "..."` keyword out of a `mix.exs` project definition.
fn description_from_mix_exs(content: &str) -> Option<String> {
    let pattern = Regex::new(r#"(?s)\bdescription:\s*"((?:[^"\\]|\\.)*)""#).ok()?;
    let captured = pattern.captures(content)?.get(1)?;
    return Some(unescape(captured.as_str()));
}

/// Resolve backslash escapes in a quoted string literal.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    return out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_from_hex_metadata_term() {
        let hex = "{<<\"app\">>,<<\"ash\">>}.\n{<<\"description\">>,\n <<\"A declarative, \\\"resource\\\" framework.\">>}.\n";
        assert_eq!(
            parse_description(Some(hex), None).as_deref(),
            Some("A declarative, \"resource\" framework."),
        );
    }

    #[test]
    fn description_falls_back_to_mix_exs() {
        let mix = "def project do\n  [app: :req,\n   description: \"Req is a batteries-included\n   HTTP client\"]\nend\n";
        assert_eq!(
            parse_description(Some("{<<\"app\">>,<<\"req\">>}."), Some(mix)).as_deref(),
            Some("Req is a batteries-included HTTP client"),
        );
    }

    #[test]
    fn missing_description_is_none() {
        assert_eq!(parse_description(None, Some("defmodule Foo do\nend")), None);
    }

    #[test]
    fn task_name_and_shortdoc() {
        let source = "defmodule Mix.Tasks.UsageRules.SearchDocs do\n  @shortdoc \"Searches hexdocs\"\n  use Mix.Task\nend\n";
        let task = parse_task(source).unwrap();
        assert_eq!(task.name, "usage_rules.search_docs");
        assert_eq!(task.shortdoc.as_deref(), Some("Searches hexdocs"));
    }

    #[test]
    fn non_task_module_is_ignored() {
        assert_eq!(parse_task("defmodule Ash.Resource do\nend"), None);
    }

    #[test]
    fn underscore_handles_acronyms() {
        assert_eq!(underscore("HTTPClient"), "http_client");
        assert_eq!(underscore("Codegen"), "codegen");
        assert_eq!(underscore("AshPostgres"), "ash_postgres");
        assert_eq!(underscore("Gen2Html"), "gen2_html");
    }
}
