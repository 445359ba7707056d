//! Fragment Store: read-only access to the rule fragments, pre-built skills,
//! and metadata that each dependency ships.
//!
//! Two backings share one interface: `FsStore` reads the real project tree,
//! `MemoryStore` serves an in-memory file set. The orchestrator picks one at
//! startup; nothing downstream branches on which one it got.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::metadata;
use crate::types::{PackageRef, SKILL_DESCRIPTOR, TaskInfo};

/// Hex package metadata file at a dependency root.
const HEX_METADATA: &str = "hex_metadata.config";

/// Mix project file at a dependency root.
const MIX_EXS: &str = "mix.exs";

/// Directory of mix task modules under a dependency root.
const MIX_TASKS_DIR: &str = "lib/mix/tasks";

/// Read-only view over dependency-owned fragments. Absence is never an
/// error here: missing things come back empty and callers decide.
pub trait FragmentStore {
    /// One-line package description, if the package declares one.
    fn description(&self, package: &PackageRef) -> Option<String>;

    /// Whether the package ships a main fragment.
    fn has_main(&self, package: &PackageRef) -> bool;

    /// Read a fragment with its leading header comment stripped.
    /// Missing or unreadable files read as empty text.
    fn read(&self, path: &Path) -> String;

    /// Every file of a pre-built skill bundle as `(path relative to the bundle, raw bytes)`,
    /// sorted by path. Includes the descriptor. Bundles may carry non-text
    /// assets, so nothing is decoded here.
    fn skill_files(&self, package: &PackageRef, skill: &str) -> Vec<(PathBuf, Vec<u8>)>;

    /// Names of the package's pre-built skill bundles, sorted.
    fn skill_names(&self, package: &PackageRef) -> Vec<String>;

    /// Names of the package's sub-fragments, sorted.
    fn sub_rule_names(&self, package: &PackageRef) -> Vec<String>;

    /// Mix tasks the package defines, sorted by name.
    fn tasks(&self, package: &PackageRef) -> Vec<TaskInfo>;
}

/// Strip a leading `<!-- ... -->` header comment (license banners and the like).
/// Text without one is returned unchanged.
pub fn strip_header_comment(text: &str) -> String {
    let trimmed = text.trim_start();
    let Some(after_open) = trimmed.strip_prefix("<!--") else {
        return text.to_string();
    };
    let Some((_, rest)) = after_open.split_once("-->") else {
        return text.to_string();
    };
    return rest.trim_start().to_string();
}

/// Fragment Store backed by the real filesystem under a project root.
pub struct FsStore {
    /// Project root that package roots are relative to.
    project_root: PathBuf,
}

impl FsStore {
    /// Create a store reading package files under `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        return Self { project_root: project_root.into() };
    }

    /// Read a project-relative file, or `None` if it can't be read.
    fn read_raw(&self, path: &Path) -> Option<String> {
        return std::fs::read_to_string(self.project_root.join(path)).ok();
    }
}

impl FragmentStore for FsStore {
    fn description(&self, package: &PackageRef) -> Option<String> {
        let hex = self.read_raw(&package.root.join(HEX_METADATA));
        let mix = self.read_raw(&package.root.join(MIX_EXS));
        return metadata::parse_description(hex.as_deref(), mix.as_deref());
    }

    fn has_main(&self, package: &PackageRef) -> bool {
        return self.project_root.join(package.main_path()).is_file();
    }

    fn read(&self, path: &Path) -> String {
        return self.read_raw(path).map(|t| return strip_header_comment(&t)).unwrap_or_default();
    }

    fn skill_files(&self, package: &PackageRef, skill: &str) -> Vec<(PathBuf, Vec<u8>)> {
        let bundle = self.project_root.join(package.prebuilt_skills_dir()).join(skill);
        let mut files: Vec<(PathBuf, Vec<u8>)> = WalkDir::new(&bundle)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| return e.file_type().is_file())
            .filter_map(|e| {
                let relative = e.path().strip_prefix(&bundle).ok()?.to_path_buf();
                let content = std::fs::read(e.path())
                    .inspect_err(|err| {
                        tracing::warn!(path = %e.path().display(), error = %err, "skipping unreadable skill file");
                    })
                    .ok()?;
                return Some((relative, content));
            })
            .collect();
        files.sort_by(|a, b| return a.0.cmp(&b.0));
        return files;
    }

    fn skill_names(&self, package: &PackageRef) -> Vec<String> {
        let dir = self.project_root.join(package.prebuilt_skills_dir());
        let mut names: Vec<String> = list_dir(&dir)
            .into_iter()
            .filter(|(path, is_dir)| return *is_dir && path.join(SKILL_DESCRIPTOR).is_file())
            .filter_map(|(path, _)| return file_name(&path))
            .collect();
        names.sort();
        return names;
    }

    fn sub_rule_names(&self, package: &PackageRef) -> Vec<String> {
        let dir = self.project_root.join(package.sub_fragment_dir());
        let mut names: Vec<String> = list_dir(&dir)
            .into_iter()
            .filter(|(_, is_dir)| return !is_dir)
            .filter_map(|(path, _)| return markdown_stem(&path))
            .collect();
        names.sort();
        return names;
    }

    fn tasks(&self, package: &PackageRef) -> Vec<TaskInfo> {
        let dir = self.project_root.join(&package.root).join(MIX_TASKS_DIR);
        let mut tasks: Vec<TaskInfo> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| return e.path().extension().is_some_and(|ext| return ext == "ex"))
            .filter_map(|e| return std::fs::read_to_string(e.path()).ok())
            .filter_map(|source| return metadata::parse_task(&source))
            .collect();
        tasks.sort_by(|a, b| return a.name.cmp(&b.name));
        tasks.dedup_by(|a, b| return a.name == b.name);
        return tasks;
    }
}

/// Fragment Store serving a virtual file set, keyed by project-relative path.
/// Used for tests and for callers that assemble fragments without a disk tree.
#[cfg_attr(not(test), allow(dead_code, reason = "the CLI always reads the real tree"))]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    /// Virtual files, keyed by project-relative path.
    files: BTreeMap<PathBuf, String>,
}

#[cfg_attr(not(test), allow(dead_code, reason = "the CLI always reads the real tree"))]
impl MemoryStore {
    /// Add or replace a virtual file.
    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Builder-style `insert`.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        return self;
    }

    /// Files strictly under `dir`, as (path relative to `dir`, content).
    fn files_under<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a Path, &'a String)> + 'a {
        return self.files.iter().filter_map(move |(path, content)| {
            let relative = path.strip_prefix(dir).ok()?;
            return Some((relative, content));
        });
    }
}

impl FragmentStore for MemoryStore {
    fn description(&self, package: &PackageRef) -> Option<String> {
        let hex = self.files.get(&package.root.join(HEX_METADATA));
        let mix = self.files.get(&package.root.join(MIX_EXS));
        return metadata::parse_description(hex.map(String::as_str), mix.map(String::as_str));
    }

    fn has_main(&self, package: &PackageRef) -> bool {
        return self.files.contains_key(&package.main_path());
    }

    fn read(&self, path: &Path) -> String {
        return self.files.get(path).map(|t| return strip_header_comment(t)).unwrap_or_default();
    }

    fn skill_files(&self, package: &PackageRef, skill: &str) -> Vec<(PathBuf, Vec<u8>)> {
        let bundle = package.prebuilt_skills_dir().join(skill);
        return self
            .files_under(&bundle)
            .map(|(relative, content)| return (relative.to_path_buf(), content.clone().into_bytes()))
            .collect();
    }

    fn skill_names(&self, package: &PackageRef) -> Vec<String> {
        let dir = package.prebuilt_skills_dir();
        let mut names: Vec<String> = self
            .files_under(&dir)
            .filter(|(relative, _)| {
                let mut parts = relative.components();
                return parts.next().is_some()
                    && parts.next().is_some_and(|c| return c.as_os_str() == SKILL_DESCRIPTOR)
                    && parts.next().is_none();
            })
            .filter_map(|(relative, _)| return relative.components().next())
            .map(|c| return c.as_os_str().to_string_lossy().into_owned())
            .collect();
        names.dedup();
        return names;
    }

    fn sub_rule_names(&self, package: &PackageRef) -> Vec<String> {
        let dir = package.sub_fragment_dir();
        return self
            .files_under(&dir)
            .filter(|(relative, _)| return relative.components().count() == 1)
            .filter_map(|(relative, _)| return markdown_stem(relative))
            .collect();
    }

    fn tasks(&self, package: &PackageRef) -> Vec<TaskInfo> {
        let dir = package.root.join(MIX_TASKS_DIR);
        let mut tasks: Vec<TaskInfo> = self
            .files_under(&dir)
            .filter(|(relative, _)| return relative.extension().is_some_and(|ext| return ext == "ex"))
            .filter_map(|(_, source)| return metadata::parse_task(source))
            .collect();
        tasks.sort_by(|a, b| return a.name.cmp(&b.name));
        tasks.dedup_by(|a, b| return a.name == b.name);
        return tasks;
    }
}

/// File name of a path as an owned string.
fn file_name(path: &Path) -> Option<String> {
    return path.file_name().map(|n| return n.to_string_lossy().into_owned());
}

/// Entries of a directory as `(path, is_dir)`. Unreadable directories list as empty.
fn list_dir(dir: &Path) -> Vec<(PathBuf, bool)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    return entries
        .filter_map(Result::ok)
        .map(|e| {
            let is_dir = e.file_type().is_ok_and(|t| return t.is_dir());
            return (e.path(), is_dir);
        })
        .collect();
}

/// Stem of a `.md` file, or `None` for anything else.
fn markdown_stem(path: &Path) -> Option<String> {
    if path.extension().is_none_or(|ext| return ext != "md") {
        return None;
    }
    return path.file_stem().map(|s| return s.to_string_lossy().into_owned());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ash() -> PackageRef {
        return PackageRef::new("ash", "deps/ash");
    }

    #[test]
    fn strips_leading_license_comment() {
        let text = "<!--\nSPDX-FileCopyrightText: 2025 ash contributors\n-->\n\n# Rules\n\nBody\n";
        assert_eq!(strip_header_comment(text), "# Rules\n\nBody\n");
    }

    #[test]
    fn keeps_text_without_header() {
        assert_eq!(strip_header_comment("# Rules\n<!-- inline -->\n"), "# Rules\n<!-- inline -->\n");
    }

    #[test]
    fn unterminated_header_is_left_alone() {
        assert_eq!(strip_header_comment("<!-- never closed\n# Rules"), "<!-- never closed\n# Rules");
    }

    #[test]
    fn memory_store_lists_sub_rules_only_one_level_deep() {
        let store = MemoryStore::default()
            .with_file("deps/ash/usage-rules.md", "main")
            .with_file("deps/ash/usage-rules/resources.md", "r")
            .with_file("deps/ash/usage-rules/actions.md", "a")
            .with_file("deps/ash/usage-rules/notes.txt", "ignored")
            .with_file("deps/ash/usage-rules/skills/ash-expert/SKILL.md", "skill");

        assert!(store.has_main(&ash()));
        assert_eq!(store.sub_rule_names(&ash()), vec!["actions", "resources"]);
        assert_eq!(store.skill_names(&ash()), vec!["ash-expert"]);
    }

    #[test]
    fn memory_store_read_missing_is_empty() {
        let store = MemoryStore::default();
        assert_eq!(store.read(Path::new("deps/ash/usage-rules.md")), "");
        assert!(!store.has_main(&ash()));
        assert!(store.sub_rule_names(&ash()).is_empty());
    }

    #[test]
    fn memory_store_skill_files_are_raw_and_relative() {
        let store = MemoryStore::default()
            .with_file("deps/ash/usage-rules/skills/ash-expert/SKILL.md", "<!-- c -->\nskill")
            .with_file("deps/ash/usage-rules/skills/ash-expert/references/dsl.md", "dsl");
        let files = store.skill_files(&ash(), "ash-expert");
        assert_eq!(
            files,
            vec![
                (PathBuf::from("SKILL.md"), b"<!-- c -->\nskill".to_vec()),
                (PathBuf::from("references/dsl.md"), b"dsl".to_vec()),
            ],
        );
    }

    #[test]
    fn fs_store_reads_real_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("deps/ash/usage-rules/skills/ash-expert")).unwrap();
        std::fs::create_dir_all(root.join("deps/ash/lib/mix/tasks")).unwrap();
        std::fs::write(root.join("deps/ash/usage-rules.md"), "<!-- x -->\nMain").unwrap();
        std::fs::write(root.join("deps/ash/usage-rules/actions.md"), "Actions").unwrap();
        std::fs::write(root.join("deps/ash/usage-rules/skills/ash-expert/SKILL.md"), "s").unwrap();
        std::fs::write(
            root.join("deps/ash/lib/mix/tasks/ash.codegen.ex"),
            "defmodule Mix.Tasks.Ash.Codegen do\n  @shortdoc \"Generates code\"\nend\n",
        )
        .unwrap();
        std::fs::write(
            root.join("deps/ash/hex_metadata.config"),
            "{<<\"description\">>,<<\"Resource framework\">>}.\n",
        )
        .unwrap();

        let store = FsStore::new(root);
        assert!(store.has_main(&ash()));
        assert_eq!(store.read(&ash().main_path()), "Main");
        assert_eq!(store.sub_rule_names(&ash()), vec!["actions"]);
        assert_eq!(store.skill_names(&ash()), vec!["ash-expert"]);
        assert_eq!(store.description(&ash()).as_deref(), Some("Resource framework"));
        let tasks = store.tasks(&ash());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "ash.codegen");
    }

    #[test]
    fn fs_store_skill_files_keep_binary_assets() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("deps/ash/usage-rules/skills/ash-expert");
        std::fs::create_dir_all(bundle.join("assets")).unwrap();
        std::fs::write(bundle.join("SKILL.md"), "skill").unwrap();
        std::fs::write(bundle.join("assets/logo.png"), [0x89, b'P', b'N', b'G', 0xff, 0xfe]).unwrap();

        let files = FsStore::new(dir.path()).skill_files(&ash(), "ash-expert");
        assert_eq!(
            files,
            vec![
                (PathBuf::from("SKILL.md"), b"skill".to_vec()),
                (PathBuf::from("assets/logo.png"), vec![0x89, b'P', b'N', b'G', 0xff, 0xfe]),
            ],
        );
    }
}
