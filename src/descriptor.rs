//! Skill descriptor (`SKILL.md`) text handling: front-matter rendering,
//! ownership detection, and the custom/managed body split.

use serde::Deserialize;

use crate::markers::{self, RegionMatch, SKILL_END, SKILL_START};

/// Value of the `metadata.managed-by` ownership field.
pub const OWNER: &str = "usage-rules";

/// User-authored text around a descriptor's managed body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CustomContent {
    /// Text after the managed body's end marker, trimmed.
    pub after: String,
    /// Text between the front-matter and the managed body's start marker, trimmed.
    pub before: String,
}

impl CustomContent {
    /// Both regions joined by a blank line, empty parts skipped.
    pub fn combined(&self) -> String {
        return [self.before.as_str(), self.after.as_str()]
            .into_iter()
            .filter(|part| return !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    /// Whether the user added anything at all.
    pub const fn is_empty(&self) -> bool {
        return self.before.is_empty() && self.after.is_empty();
    }
}

/// Front-matter fields consulted for ownership.
#[derive(Deserialize)]
struct Frontmatter {
    /// Free-form metadata map.
    #[serde(default)]
    metadata: Option<FrontmatterMetadata>,
}

/// The `metadata:` map of a descriptor.
#[derive(Deserialize)]
struct FrontmatterMetadata {
    /// Ownership marker.
    #[serde(default, rename = "managed-by")]
    managed_by: Option<String>,
}

/// Assemble a descriptor: front-matter, custom text before, managed body,
/// custom text after.
pub fn compose(frontmatter: &str, custom: &CustomContent, managed_body: &str) -> String {
    let mut out = String::from(frontmatter);
    out.push('\n');
    if !custom.before.is_empty() {
        out.push_str(&custom.before);
        out.push_str("\n\n");
    }
    out.push_str(&markers::wrap(SKILL_START, managed_body, SKILL_END));
    out.push('\n');
    if !custom.after.is_empty() {
        out.push('\n');
        out.push_str(&custom.after);
        out.push('\n');
    }
    return out;
}

/// Custom content of a descriptor that carries the managed-body markers.
/// Returns `None` when the markers are absent.
pub fn extract_custom(content: &str) -> Option<CustomContent> {
    let body = split_frontmatter(content).map_or(content, |(_, body)| return body);
    return match markers::find(body, SKILL_START, SKILL_END) {
        RegionMatch::Absent => None,
        RegionMatch::Complete(region) => Some(CustomContent {
            after: region.after.trim().to_string(),
            before: region.before.trim().to_string(),
        }),
        RegionMatch::Unterminated { before } => {
            Some(CustomContent { after: String::new(), before: before.trim().to_string() })
        },
    };
}

/// Whether the descriptor's front-matter declares `metadata.managed-by: usage-rules`.
/// Unparseable front-matter is treated as unmanaged.
pub fn is_managed(content: &str) -> bool {
    let Some((yaml, _)) = split_frontmatter(content) else {
        return false;
    };
    let Ok(frontmatter) = serde_yaml::from_str::<Frontmatter>(yaml) else {
        return false;
    };
    return frontmatter
        .metadata
        .and_then(|m| return m.managed_by)
        .is_some_and(|owner| return owner == OWNER);
}

/// Add the ownership marker to an imported descriptor, creating front-matter
/// if it has none. Already-managed descriptors are returned unchanged.
pub fn mark_managed(content: &str, name: &str) -> String {
    if is_managed(content) {
        return content.to_string();
    }
    let Some((yaml, body)) = split_frontmatter(content) else {
        return format!("---\nname: {name}\nmetadata:\n  managed-by: {OWNER}\n---\n\n{content}");
    };

    let mut lines: Vec<String> = yaml
        .lines()
        .filter(|line| return !line.trim_start().starts_with("managed-by:"))
        .map(String::from)
        .collect();
    let marker = format!("  managed-by: {OWNER}");
    match lines.iter().position(|line| return line.trim_end() == "metadata:") {
        Some(index) => lines.insert(index.saturating_add(1), marker),
        None => {
            lines.push("metadata:".to_string());
            lines.push(marker);
        },
    }
    return format!("---\n{}\n---\n{body}", lines.join("\n"));
}

/// Render descriptor front-matter including the ownership marker.
pub fn render_frontmatter(name: &str, description: &str) -> String {
    return format!(
        "---\nname: {name}\ndescription: {}\nmetadata:\n  managed-by: {OWNER}\n---\n",
        yaml_description(description)
    );
}

/// Split `---`-fenced front-matter from the body. Returns `(yaml, body)`.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---\n").or_else(|| return content.strip_prefix("---\r\n"))?;
    let (yaml, after) = match rest.strip_prefix("---") {
        Some(after) => ("", after),
        None => rest.split_once("\n---")?,
    };
    let body = after
        .strip_prefix("\r\n")
        .or_else(|| return after.strip_prefix('\n'))
        .unwrap_or(after);
    return Some((yaml, body));
}

/// Description as a YAML value: a literal block for multi-line text,
/// otherwise a double-quoted scalar. The block carries an explicit
/// indentation indicator so a first line that starts with spaces keeps them.
fn yaml_description(description: &str) -> String {
    if description.contains('\n') {
        let mut out = String::from("|2");
        for line in description.lines() {
            out.push('\n');
            if !line.is_empty() {
                out.push_str("  ");
                out.push_str(line);
            }
        }
        return out;
    }
    let escaped = description.replace('\\', "\\\\").replace('"', "\\\"");
    return format!("\"{escaped}\"");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_quotes_and_escapes() {
        let rendered = render_frontmatter("use-ash", "Say \"hi\" to C:\\ash.");
        assert_eq!(
            rendered,
            "---\nname: use-ash\ndescription: \"Say \\\"hi\\\" to C:\\\\ash.\"\nmetadata:\n  managed-by: usage-rules\n---\n",
        );
        assert!(is_managed(&rendered));
    }

    #[test]
    fn frontmatter_uses_block_scalar_for_multiline() {
        let rendered = render_frontmatter("x", "First line.\n\nSecond line.");
        assert!(rendered.contains("description: |2\n  First line.\n\n  Second line.\nmetadata:"), "{rendered}");
        let (yaml, _) = split_frontmatter(&rendered).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(value["description"].as_str(), Some("First line.\n\nSecond line.\n"));
    }

    #[test]
    fn multiline_description_with_indented_first_line_stays_managed() {
        let rendered = render_frontmatter("x", "  indented first\nsecond");
        assert!(is_managed(&rendered), "{rendered}");
        let (yaml, _) = split_frontmatter(&rendered).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(value["description"].as_str(), Some("  indented first\nsecond\n"));
    }

    #[test]
    fn unmanaged_descriptors() {
        assert!(!is_managed("---\nname: mine\n---\nbody"));
        assert!(!is_managed("---\nname: mine\nmetadata:\n  managed-by: someone-else\n---\n"));
        assert!(!is_managed("no front-matter at all"));
        assert!(!is_managed("---\nname: [unclosed\n---\n"));
    }

    #[test]
    fn custom_content_round_trips_through_compose() {
        let custom = CustomContent { after: "Trailing notes.".into(), before: "# My notes".into() };
        let composed = compose(&render_frontmatter("s", "d"), &custom, "managed");
        assert_eq!(extract_custom(&composed), Some(custom.clone()));
        assert_eq!(custom.combined(), "# My notes\n\nTrailing notes.");
    }

    #[test]
    fn compose_without_custom_content() {
        let composed = compose("---\nname: s\n---\n", &CustomContent::default(), "managed");
        assert_eq!(
            composed,
            "---\nname: s\n---\n\n<!-- usage-rules-skill-start -->\nmanaged\n<!-- usage-rules-skill-end -->\n",
        );
        assert_eq!(extract_custom(&composed), Some(CustomContent::default()));
    }

    #[test]
    fn extract_custom_without_markers_is_none() {
        assert_eq!(extract_custom("---\nname: s\n---\nhand written"), None);
    }

    #[test]
    fn mark_managed_inserts_into_existing_metadata() {
        let marked = mark_managed("---\nname: ash-expert\nmetadata:\n  version: 1\n---\nBody\n", "ash-expert");
        assert!(is_managed(&marked), "{marked}");
        assert!(marked.ends_with("---\nBody\n"));
        assert_eq!(mark_managed(&marked, "ash-expert"), marked);
    }

    #[test]
    fn mark_managed_creates_frontmatter() {
        let marked = mark_managed("Just a body\n", "plain");
        assert!(is_managed(&marked));
        assert_eq!(split_frontmatter(&marked).map(|(_, body)| body), Some("\nJust a body\n"));
    }
}
