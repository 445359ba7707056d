//! Section Merge Engine: render resolved records into one managed block and
//! splice it into the aggregate file, leaving everything outside it alone.

use crate::markers::{self, BLOCK_END, BLOCK_START, RegionMatch};
use crate::store::FragmentStore;
use crate::types::{LinkStyle, ResolvedRule, slash_path};

/// Assemble the sub-blocks for `rules`, separated by blank lines.
///
/// Records sharing a section key collapse into one sub-block at the first
/// one's position, rendered from the last one.
pub fn assemble_sections(rules: &[ResolvedRule], store: &dyn FragmentStore) -> String {
    let mut sections: Vec<(String, String)> = Vec::with_capacity(rules.len());
    for rule in rules {
        let key = rule.section_key();
        let rendered = render_section(rule, store);
        match sections.iter_mut().find(|(existing, _)| return *existing == key) {
            Some(slot) => slot.1 = rendered,
            None => sections.push((key, rendered)),
        }
    }
    return sections.into_iter().map(|(_, rendered)| return rendered).collect::<Vec<_>>().join("\n\n");
}

/// Remove the managed block and the blank-line separators around it.
/// Returns `None` when the text has no managed block.
pub fn cleanup(text: &str) -> Option<String> {
    return match markers::find(text, BLOCK_START, BLOCK_END) {
        RegionMatch::Absent => None,
        RegionMatch::Complete(region) => {
            let head = region.before.trim_end();
            let tail = region.after.trim_start();
            if head.is_empty() || tail.is_empty() {
                Some(format!("{head}{tail}"))
            } else {
                Some(format!("{head}\n\n{tail}"))
            }
        },
        RegionMatch::Unterminated { before } => Some(before.trim_end().to_string()),
    };
}

/// One-line reference to a record's fragment in the given link style.
pub fn link_reference(rule: &ResolvedRule, style: LinkStyle) -> String {
    let path = slash_path(&rule.fragment_path());
    return match style {
        LinkStyle::At => format!("@{path}"),
        LinkStyle::Markdown => format!("[{} usage rules]({path})", rule.section_key()),
    };
}

/// Splice already-assembled `sections` into `current`.
///
/// With both markers present only the text between them changes. A start
/// marker without an end marker drops everything from the marker on. With no
/// markers the block is appended after a blank line. `None` means the file
/// does not exist yet.
pub fn merge(current: Option<&str>, sections: &str) -> String {
    let block = markers::wrap(BLOCK_START, sections, BLOCK_END);
    let Some(text) = current else {
        return format!("{block}\n");
    };
    return match markers::find(text, BLOCK_START, BLOCK_END) {
        RegionMatch::Absent => append_block(text, &block),
        RegionMatch::Complete(region) => format!("{}{block}{}", region.before, region.after),
        RegionMatch::Unterminated { before } => {
            tracing::warn!("managed block has no end marker; replacing everything after its start");
            append_block(before, &block)
        },
    };
}

/// Rendered body for one record: inline fragment text or a link reference.
pub fn render_body(rule: &ResolvedRule, store: &dyn FragmentStore) -> String {
    return match rule.options.link {
        None => store.read(&rule.fragment_path()).trim().to_string(),
        Some(style) => link_reference(rule, style),
    };
}

/// Compute the new aggregate file content.
///
/// Returns `None` when nothing should be written: no records and either no
/// file or a file without a managed block.
pub fn render_file(current: Option<&str>, rules: &[ResolvedRule], store: &dyn FragmentStore) -> Option<String> {
    if rules.is_empty() {
        let cleaned = current.and_then(cleanup);
        if cleaned.is_some() {
            tracing::debug!("no usage rules resolved; removing managed block");
        }
        return cleaned;
    }

    if let Some(text) = current
        && let RegionMatch::Complete(region) = markers::find(text, BLOCK_START, BLOCK_END)
    {
        let wanted: Vec<String> = rules.iter().map(ResolvedRule::section_key).collect();
        for stale in markers::section_keys(region.inner).into_iter().filter(|k| return !wanted.contains(k)) {
            tracing::debug!(section = %stale, "dropping section no longer configured");
        }
    }

    return Some(merge(current, &assemble_sections(rules, store)));
}

/// Sub-block for one record, wrapped in its section markers.
pub fn render_section(rule: &ResolvedRule, store: &dyn FragmentStore) -> String {
    let key = rule.section_key();
    let mut content = format!("## {key} usage\n");
    if let Some(description) = store.description(&rule.package) {
        content.push_str(&format!("_{description}_\n"));
    }
    content.push('\n');
    content.push_str(&render_body(rule, store));
    return markers::wrap(&markers::section_start(&key), &content, &markers::section_end(&key));
}

/// Append `block` to `existing` after one blank line, or use it alone.
fn append_block(existing: &str, block: &str) -> String {
    let head = existing.trim_end();
    if head.is_empty() {
        return format!("{block}\n");
    }
    return format!("{head}\n\n{block}\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver;
    use crate::store::MemoryStore;
    use crate::types::{PackageRef, Spec, SpecOptions};

    fn rule(package: &str, sub_rule: Option<&str>) -> ResolvedRule {
        return ResolvedRule {
            options: SpecOptions::default(),
            package: PackageRef::new(package, format!("deps/{package}")),
            sub_rule: sub_rule.map(String::from),
        };
    }

    fn store() -> MemoryStore {
        return MemoryStore::default()
            .with_file("deps/foo/usage-rules.md", "<!-- license -->\nX\n")
            .with_file("deps/foo/usage-rules/bar.md", "Bar rules")
            .with_file("deps/baz/usage-rules.md", "Baz rules")
            .with_file("deps/baz/hex_metadata.config", "{<<\"description\">>,<<\"Baz does things\">>}.");
    }

    #[test]
    fn prelude_and_postlude_are_byte_exact() {
        let current = "# Title\n\n<!-- usage-rules-start -->\nOLD\n<!-- usage-rules-end -->\n\nFooter";
        assert_eq!(
            merge(Some(current), "NEW"),
            "# Title\n\n<!-- usage-rules-start -->\nNEW\n<!-- usage-rules-end -->\n\nFooter",
        );
    }

    #[test]
    fn unterminated_block_is_replaced_to_end_of_file() {
        let current = "# Title\n\n<!-- usage-rules-start -->\nOld stuff\nmore old";
        assert_eq!(
            merge(Some(current), "NEW"),
            "# Title\n\n<!-- usage-rules-start -->\nNEW\n<!-- usage-rules-end -->\n",
        );
    }

    #[test]
    fn bootstrap_appends_after_blank_line() {
        assert_eq!(
            merge(Some("# Project\n"), "NEW"),
            "# Project\n\n<!-- usage-rules-start -->\nNEW\n<!-- usage-rules-end -->\n",
        );
        assert_eq!(merge(None, "NEW"), "<!-- usage-rules-start -->\nNEW\n<!-- usage-rules-end -->\n");
    }

    #[test]
    fn degenerate_cleanup_trims_to_prelude() {
        let current = "# Title\n\n<!-- usage-rules-start -->\nOld stuff\nmore old";
        assert_eq!(cleanup(current).as_deref(), Some("# Title"));
    }

    #[test]
    fn cleanup_collapses_separators_and_is_idempotent() {
        let current = "# Title\n\n<!-- usage-rules-start -->\nOLD\n<!-- usage-rules-end -->\n\nFooter\n";
        let once = cleanup(current).unwrap();
        assert_eq!(once, "# Title\n\nFooter\n");
        assert_eq!(cleanup(&once), None);
        assert_eq!(render_file(Some(&once), &[], &store()), None);
    }

    #[test]
    fn no_rules_and_no_file_writes_nothing() {
        assert_eq!(render_file(None, &[], &store()), None);
    }

    #[test]
    fn markdown_link_replaces_inline_content() {
        let mut spec = Spec::named("foo");
        spec.options.link = Some(LinkStyle::Markdown);
        spec.options.sub_rules = crate::types::SubRuleSelection::Named(Vec::new());
        let packages = vec![PackageRef::new("foo", "deps/foo")];
        let resolution = resolver::resolve(&[spec], &packages, &store());
        assert_eq!(resolution.rules.len(), 1);
        let body = render_body(&resolution.rules[0], &store());
        assert_eq!(body, "[foo usage rules](deps/foo/usage-rules.md)");
        assert_ne!(body, "X");
    }

    #[test]
    fn link_styles_for_sub_fragments() {
        let sub = rule("foo", Some("bar"));
        assert_eq!(link_reference(&sub, LinkStyle::At), "@deps/foo/usage-rules/bar.md");
        assert_eq!(
            link_reference(&sub, LinkStyle::Markdown),
            "[foo:bar usage rules](deps/foo/usage-rules/bar.md)",
        );
    }

    #[test]
    fn inline_body_is_header_stripped() {
        assert_eq!(render_body(&rule("foo", None), &store()), "X");
    }

    #[test]
    fn section_carries_markers_heading_and_description() {
        assert_eq!(
            render_section(&rule("baz", None), &store()),
            "<!-- baz-start -->\n## baz usage\n_Baz does things_\n\nBaz rules\n<!-- baz-end -->",
        );
        assert_eq!(
            render_section(&rule("foo", Some("bar")), &store()),
            "<!-- foo:bar-start -->\n## foo:bar usage\n\nBar rules\n<!-- foo:bar-end -->",
        );
    }

    #[test]
    fn duplicate_keys_keep_first_position_and_last_rendering() {
        let mut linked = rule("foo", None);
        linked.options.link = Some(LinkStyle::At);
        let rules = [rule("foo", None), rule("baz", None), linked];
        let assembled = assemble_sections(&rules, &store());
        assert_eq!(markers::section_keys(&assembled), vec!["foo", "baz"]);
        assert!(assembled.contains("@deps/foo/usage-rules.md"));
        assert!(!assembled.contains("\nX\n"));
    }

    #[test]
    fn removed_section_disappears_and_rest_is_untouched() {
        let previous = render_file(Some("# Intro\n"), &[rule("foo", None), rule("baz", None)], &store()).unwrap();
        let next = render_file(Some(&previous), &[rule("foo", None)], &store()).unwrap();
        assert_eq!(markers::section_keys(&next), vec!["foo"]);
        assert!(next.starts_with("# Intro\n\n<!-- usage-rules-start -->\n<!-- foo-start -->"));
        assert!(!next.contains("baz"));
    }

    #[test]
    fn render_is_idempotent() {
        let rules = [rule("foo", None), rule("foo", Some("bar"))];
        let first = render_file(Some("# Intro\n\nNotes\n"), &rules, &store()).unwrap();
        let second = render_file(Some(&first), &rules, &store()).unwrap();
        assert_eq!(first, second);
    }
}
