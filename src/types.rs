//! Core domain types for usage-rules: packages, specs, and resolved inclusions.
use std::path::{Component, Path, PathBuf};

use regex::Regex;

/// Main fragment file name at the root of every package.
pub const MAIN_FRAGMENT: &str = "usage-rules.md";

/// Directory under the package root holding named sub-fragments.
pub const SUB_FRAGMENT_DIR: &str = "usage-rules";

/// Directory under `SUB_FRAGMENT_DIR` holding pre-built skill bundles.
pub const PREBUILT_SKILLS_DIR: &str = "skills";

/// Descriptor file name inside every skill bundle.
pub const SKILL_DESCRIPTOR: &str = "SKILL.md";

/// How a resolved fragment is rendered in place of its inline content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStyle {
    /// Single-token reference: `@deps/foo/usage-rules.md`.
    At,
    /// Descriptive link: `[foo usage rules](deps/foo/usage-rules.md)`.
    Markdown,
}

/// Matches package identifiers. Literal names are explicit requests;
/// patterns are filters and never produce errors for absent packages.
#[derive(Debug, Clone)]
pub enum NameMatcher {
    /// Exact package identifier.
    Literal(String),
    /// Compiled regular expression matched against every known identifier.
    Pattern(Regex),
}

impl NameMatcher {
    /// Whether this matcher is a filter rather than an explicit name.
    pub const fn is_pattern(&self) -> bool {
        return matches!(self, Self::Pattern(_));
    }

    /// Test a package identifier against this matcher.
    pub fn matches(&self, identifier: &str) -> bool {
        return match self {
            Self::Literal(name) => name == identifier,
            Self::Pattern(regex) => regex.is_match(identifier),
        };
    }

    /// Human-readable form used in log lines and messages.
    pub fn describe(&self) -> String {
        return match self {
            Self::Literal(name) => name.clone(),
            Self::Pattern(regex) => format!("/{}/", regex.as_str()),
        };
    }
}

/// One dependency: its identifier and project-relative root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    /// Package identifier, e.g. `ash_postgres`.
    pub name: String,
    /// Root directory relative to the project root, e.g. `deps/ash_postgres`.
    pub root: PathBuf,
}

impl PackageRef {
    /// Construct a package reference.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        return Self { name: name.into(), root: root.into() };
    }

    /// Path of the main fragment.
    pub fn main_path(&self) -> PathBuf {
        return self.root.join(MAIN_FRAGMENT);
    }

    /// Directory holding pre-built skill bundles.
    pub fn prebuilt_skills_dir(&self) -> PathBuf {
        return self.sub_fragment_dir().join(PREBUILT_SKILLS_DIR);
    }

    /// Directory holding named sub-fragments.
    pub fn sub_fragment_dir(&self) -> PathBuf {
        return self.root.join(SUB_FRAGMENT_DIR);
    }

    /// Path of a named sub-fragment.
    pub fn sub_fragment_path(&self, sub_rule: &str) -> PathBuf {
        return self.sub_fragment_dir().join(format!("{sub_rule}.md"));
    }
}

/// A fragment selected for rendering, in config order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    /// Rendering options carried over from the originating spec.
    pub options: SpecOptions,
    /// Owning package.
    pub package: PackageRef,
    /// Sub-fragment name, or `None` for the main fragment.
    pub sub_rule: Option<String>,
}

impl ResolvedRule {
    /// Path of the fragment this record points at.
    pub fn fragment_path(&self) -> PathBuf {
        return match &self.sub_rule {
            None => self.package.main_path(),
            Some(sub) => self.package.sub_fragment_path(sub),
        };
    }

    /// Section key: `pkg` or `pkg:subrule`.
    pub fn section_key(&self) -> String {
        return match &self.sub_rule {
            None => self.package.name.clone(),
            Some(sub) => format!("{}:{sub}", self.package.name),
        };
    }
}

/// One declarative inclusion directive, normalized at the config boundary.
#[derive(Debug, Clone)]
pub struct Spec {
    /// Which packages this spec targets.
    pub matcher: NameMatcher,
    /// Inclusion and rendering options.
    pub options: SpecOptions,
}

impl Spec {
    /// Bare-name spec with default options.
    pub fn named(name: impl Into<String>) -> Self {
        return Self { matcher: NameMatcher::Literal(name.into()), options: SpecOptions::default() };
    }
}

/// Options attached to every spec variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOptions {
    /// Link style, or `None` to inline fragment content.
    pub link: Option<LinkStyle>,
    /// Whether to include the package's main fragment.
    pub main: bool,
    /// Which sub-fragments to include.
    pub sub_rules: SubRuleSelection,
}

impl Default for SpecOptions {
    fn default() -> Self {
        return Self { link: None, main: true, sub_rules: SubRuleSelection::All };
    }
}

/// Sub-fragment selection for a spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubRuleSelection {
    /// Every discovered sub-fragment.
    All,
    /// Only the listed sub-fragments, in the listed order.
    Named(Vec<String>),
}

/// A mix task shipped by a package.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TaskInfo {
    /// Task name as typed after `mix`, e.g. `ash.codegen`.
    pub name: String,
    /// One-line summary from `@shortdoc`, when present.
    pub shortdoc: Option<String>,
}

/// Render a relative path with `/` separators regardless of platform.
pub fn slash_path(path: &Path) -> String {
    return path
        .components()
        .filter_map(|c| {
            return match c {
                Component::CurDir => None,
                other => Some(other.as_os_str().to_string_lossy().into_owned()),
            };
        })
        .collect::<Vec<_>>()
        .join("/");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_key_for_main_and_sub() {
        let package = PackageRef::new("ash", "deps/ash");
        let main = ResolvedRule { options: SpecOptions::default(), package: package.clone(), sub_rule: None };
        let sub = ResolvedRule {
            options: SpecOptions::default(),
            package,
            sub_rule: Some("actions".to_string()),
        };
        assert_eq!(main.section_key(), "ash");
        assert_eq!(sub.section_key(), "ash:actions");
        assert_eq!(slash_path(&sub.fragment_path()), "deps/ash/usage-rules/actions.md");
    }

    #[test]
    fn pattern_matcher_is_unanchored_regex() {
        let matcher = NameMatcher::Pattern(Regex::new("^ash").unwrap());
        assert!(matcher.matches("ash_postgres"));
        assert!(!matcher.matches("req"));
        assert_eq!(matcher.describe(), "/^ash/");
    }

    #[test]
    fn slash_path_drops_current_dir() {
        assert_eq!(slash_path(Path::new("./deps/foo/usage-rules.md")), "deps/foo/usage-rules.md");
    }
}
