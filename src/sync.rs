//! One sync cycle: configuration in, file mutations out.
//!
//! Every cycle recomputes the desired state from scratch and diffs it against
//! the tree; nothing is carried between runs.

use std::path::{Path, PathBuf};

use crate::changes::{FileChange, Outcome};
use crate::config::Config;
use crate::deps;
use crate::error::{Error, ResolutionError};
use crate::merge;
use crate::resolver;
use crate::skills::{self, ExistingBundles};
use crate::store::FragmentStore;

/// Everything one cycle wants to change, and what went wrong along the way.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Mutations in application order: aggregate file first, then skills.
    pub changes: Vec<FileChange>,
    /// Resolution errors from `usage_rules`. Any of these skips the aggregate file.
    pub file_errors: Vec<ResolutionError>,
    /// Deprecation notices raised while loading the config.
    pub notices: Vec<String>,
    /// Resolution errors from skill specs.
    pub skill_errors: Vec<ResolutionError>,
}

impl SyncPlan {
    /// Apply every change under `root`, returning the ones that had an effect.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` on the first change that can't be applied.
    pub fn apply(&self, root: &Path) -> Result<Vec<(PathBuf, Outcome)>, Error> {
        let mut applied = Vec::new();
        for change in &self.changes {
            let outcome = change.apply(root)?;
            if outcome != Outcome::Unchanged {
                applied.push((change.path().to_path_buf(), outcome));
            }
        }
        return Ok(applied);
    }

    /// Whether any resolution error was collected.
    pub const fn has_errors(&self) -> bool {
        return !self.file_errors.is_empty() || !self.skill_errors.is_empty();
    }

    /// The changes that would have an effect under `root`, without applying them.
    pub fn preview(&self, root: &Path) -> Vec<(PathBuf, Outcome)> {
        return self
            .changes
            .iter()
            .map(|c| return (c.path().to_path_buf(), c.preview(root)))
            .filter(|(_, outcome)| return *outcome != Outcome::Unchanged)
            .collect();
    }
}

/// Plan one sync cycle for the project at `root`.
///
/// # Errors
///
/// Returns `Error::Io` if the deps directory exists but can't be listed.
pub fn plan(root: &Path, config: &Config, store: &dyn FragmentStore) -> Result<SyncPlan, Error> {
    let packages = deps::discover(root, &config.deps_path)?;
    tracing::debug!(count = packages.len(), "discovered dependencies");

    let mut plan = SyncPlan { notices: config.notices.clone(), ..SyncPlan::default() };

    let resolution = resolver::resolve(&config.usage_rules, &packages, store);
    match &config.file {
        None if !config.usage_rules.is_empty() => {
            tracing::warn!("usage_rules is configured but no `file` is set; skipping the aggregate file");
        },
        None => {},
        Some(_) if !resolution.errors.is_empty() => {
            tracing::warn!(errors = resolution.errors.len(), "resolution failed; aggregate file left untouched");
        },
        Some(file) => {
            let current = read_existing(&root.join(file));
            if let Some(content) = merge::render_file(current.as_deref(), &resolution.rules, store) {
                plan.changes.push(FileChange::Write { content, path: file.clone() });
            }
        },
    }
    plan.file_errors = resolution.errors;

    let existing = ExistingBundles::load(root, &config.skills.location);
    let skill_plan = skills::plan(&config.skills, &packages, store, &existing);
    plan.changes.extend(skill_plan.changes);
    plan.skill_errors = skill_plan.errors;

    return Ok(plan);
}

/// Current content of the aggregate file. An existing file that can't be
/// read counts as empty.
fn read_existing(path: &Path) -> Option<String> {
    return match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(_) if path.exists() => {
            tracing::warn!(path = %path.display(), "aggregate file unreadable; treating as empty");
            Some(String::new())
        },
        Err(_) => None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;

    fn project(config: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (path, content) in [
            ("deps/ash/usage-rules.md", "Ash rules"),
            ("deps/ash/usage-rules/actions.md", "Action rules"),
            ("deps/req/usage-rules.md", "Req rules"),
            ("deps/jason/mix.exs", "defmodule Jason.MixProject do\nend\n"),
        ] {
            std::fs::create_dir_all(root.join(path).parent().unwrap()).unwrap();
            std::fs::write(root.join(path), content).unwrap();
        }
        let config = Config::parse(config, Path::new(".usage-rules.toml")).unwrap();
        return (dir, config);
    }

    #[test]
    fn second_cycle_is_a_no_op() {
        let (dir, config) = project(
            "file = \"AGENTS.md\"\nusage_rules = [\"ash\", \"/^re/\"]\n\n[skills]\ndeps = [\"ash\"]\n",
        );
        let store = FsStore::new(dir.path());
        let first = plan(dir.path(), &config, &store).unwrap();
        assert!(!first.has_errors());
        let applied = first.apply(dir.path()).unwrap();
        assert!(applied.iter().any(|(p, o)| return p == Path::new("AGENTS.md") && *o == Outcome::Created));
        assert!(dir.path().join(".claude/skills/use-ash/SKILL.md").is_file());

        let second = plan(dir.path(), &config, &store).unwrap();
        assert!(second.preview(dir.path()).is_empty());
        assert!(second.apply(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn resolution_error_skips_aggregate_file_but_builds_skills() {
        let (dir, config) = project(
            "file = \"AGENTS.md\"\nusage_rules = [\"nonexistent\"]\n\n[skills.build.req-skill]\nusage_rules = [\"req\"]\n",
        );
        let store = FsStore::new(dir.path());
        let plan = plan(dir.path(), &config, &store).unwrap();
        assert_eq!(plan.file_errors, vec![ResolutionError::UnknownDependency { package: "nonexistent".into() }]);
        assert!(plan.changes.iter().all(|c| return c.path() != Path::new("AGENTS.md")));
        assert!(plan.changes.iter().any(|c| return c.path().starts_with(".claude/skills/req-skill")));
    }

    #[test]
    fn emptied_config_cleans_up_the_managed_block() {
        let (dir, config) = project("file = \"AGENTS.md\"\nusage_rules = [\"req\"]\n");
        std::fs::write(dir.path().join("AGENTS.md"), "# Agents\n").unwrap();
        let store = FsStore::new(dir.path());
        plan(dir.path(), &config, &store).unwrap().apply(dir.path()).unwrap();

        let emptied = Config::parse("file = \"AGENTS.md\"\n", Path::new(".usage-rules.toml")).unwrap();
        plan(dir.path(), &emptied, &store).unwrap().apply(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("AGENTS.md")).unwrap(), "# Agents");
    }
}
