//! Marker-delimited text regions. Content between markers is opaque; the only
//! operations are locating literal delimiters, slicing, and reassembling.

use regex::Regex;

/// Opens the managed block of the aggregate file.
pub const BLOCK_START: &str = "<!-- usage-rules-start -->";

/// Closes the managed block of the aggregate file.
pub const BLOCK_END: &str = "<!-- usage-rules-end -->";

/// Opens the managed body of a skill descriptor.
pub const SKILL_START: &str = "<!-- usage-rules-skill-start -->";

/// Closes the managed body of a skill descriptor.
pub const SKILL_END: &str = "<!-- usage-rules-skill-end -->";

/// Where a marker pair sits in a text.
#[derive(Debug, PartialEq, Eq)]
pub enum RegionMatch<'a> {
    /// The start marker does not occur.
    Absent,
    /// Both markers occur, end after start.
    Complete(Region<'a>),
    /// The start marker occurs but no end marker follows it.
    Unterminated {
        /// Everything before the start marker.
        before: &'a str,
    },
}

/// A text split around a complete marker pair.
#[derive(Debug, PartialEq, Eq)]
pub struct Region<'a> {
    /// Everything after the end marker.
    pub after: &'a str,
    /// Everything before the start marker.
    pub before: &'a str,
    /// Everything strictly between the markers.
    pub inner: &'a str,
}

/// Locate the first `start` marker and the first `end` marker after it.
pub fn find<'a>(text: &'a str, start: &str, end: &str) -> RegionMatch<'a> {
    let Some((before, rest)) = text.split_once(start) else {
        return RegionMatch::Absent;
    };
    let Some((inner, after)) = rest.split_once(end) else {
        return RegionMatch::Unterminated { before };
    };
    return RegionMatch::Complete(Region { after, before, inner });
}

/// Section keys of the per-record sub-blocks found in `text`, in order.
pub fn section_keys(text: &str) -> Vec<String> {
    let Ok(pattern) = Regex::new(r"<!-- (\S+)-start -->") else {
        return Vec::new();
    };
    return pattern
        .captures_iter(text)
        .filter_map(|c| return c.get(1))
        .map(|m| return m.as_str().to_string())
        .filter(|key| return key != "usage-rules" && key != "usage-rules-skill")
        .collect();
}

/// Closing marker of a per-record sub-block.
pub fn section_end(key: &str) -> String {
    return format!("<!-- {key}-end -->");
}

/// Opening marker of a per-record sub-block.
pub fn section_start(key: &str) -> String {
    return format!("<!-- {key}-start -->");
}

/// `start`, body, `end` on their own lines.
pub fn wrap(start: &str, body: &str, end: &str) -> String {
    return format!("{start}\n{body}\n{end}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_region_splits_three_ways() {
        let text = "head\n<!-- a-start -->\nbody\n<!-- a-end -->\ntail";
        let RegionMatch::Complete(region) = find(text, "<!-- a-start -->", "<!-- a-end -->") else {
            panic!("expected complete region");
        };
        assert_eq!(region.before, "head\n");
        assert_eq!(region.inner, "\nbody\n");
        assert_eq!(region.after, "\ntail");
    }

    #[test]
    fn end_marker_before_start_is_unterminated() {
        let text = "<!-- a-end -->\nx\n<!-- a-start -->\ny";
        assert_eq!(
            find(text, "<!-- a-start -->", "<!-- a-end -->"),
            RegionMatch::Unterminated { before: "<!-- a-end -->\nx\n" },
        );
    }

    #[test]
    fn absent_start_marker() {
        assert_eq!(find("plain", BLOCK_START, BLOCK_END), RegionMatch::Absent);
    }

    #[test]
    fn section_keys_skip_block_markers() {
        let text = format!(
            "{BLOCK_START}\n{}\nx\n{}\n{}\ny\n{}\n{BLOCK_END}",
            section_start("ash"),
            section_end("ash"),
            section_start("ash:actions"),
            section_end("ash:actions"),
        );
        assert_eq!(section_keys(&text), vec!["ash", "ash:actions"]);
    }
}
