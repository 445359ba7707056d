//! CLI commands for usage-rules: sync, list, init.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use crate::changes::Outcome;
use crate::config::Config;
use crate::deps;
use crate::diagnostics;
use crate::error;
use crate::store::{FragmentStore, FsStore};
use crate::sync;
use crate::types::{PackageRef, TaskInfo};

/// What one dependency provides, as shown by `list`.
#[derive(Serialize)]
struct PackageSummary {
    /// Package description from its metadata.
    description: Option<String>,
    /// Whether it ships a main fragment.
    main: bool,
    /// Package identifier.
    name: String,
    /// Pre-built skill bundles.
    skills: Vec<String>,
    /// Sub-fragment names.
    sub_rules: Vec<String>,
    /// Mix tasks it defines.
    tasks: Vec<TaskInfo>,
}

impl PackageSummary {
    /// Gather the summary for one package.
    fn gather(package: &PackageRef, store: &dyn FragmentStore) -> Self {
        return Self {
            description: store.description(package),
            main: store.has_main(package),
            name: package.name.clone(),
            skills: store.skill_names(package),
            sub_rules: store.sub_rule_names(package),
            tasks: store.tasks(package),
        };
    }

    /// Whether the package contributes anything usage-rules can use.
    fn is_empty(&self) -> bool {
        return !self.main && self.sub_rules.is_empty() && self.skills.is_empty();
    }
}

/// Create or update the config file, preserving existing formatting.
///
/// Sets `file` when one is given and seeds `usage_rules = "all"` when the
/// key is absent.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the existing config isn't valid TOML, or
/// `Error::Io` if it can't be read or written.
pub fn init(config_path: &Path, file: Option<&str>) -> Result<(), error::Error> {
    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(error::Error::Io(e)),
    };

    let mut doc: toml_edit::DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
        return error::Error::ParseFailed { file: config_path.to_path_buf(), reason: e.to_string() };
    })?;

    if let Some(file) = file {
        doc["file"] = toml_edit::value(file);
    }
    if !doc.contains_key("usage_rules") {
        doc["usage_rules"] = toml_edit::value("all");
    }

    std::fs::write(config_path, doc.to_string())?;
    eprintln!("Wrote {}", config_path.display());
    return Ok(());
}

/// List every discovered dependency with what it provides.
///
/// A missing config file is fine here; the default deps directory is used.
///
/// # Errors
///
/// Returns config errors other than a missing file, or `Error::Io` if the
/// deps directory can't be listed.
pub fn list(config_path: &Path, json: bool) -> Result<(), error::Error> {
    let root = project_root(config_path);
    let deps_path = match Config::load(config_path) {
        Ok(config) => config.deps_path,
        Err(error::Error::ConfigNotFound { .. }) => PathBuf::from("deps"),
        Err(e) => return Err(e),
    };

    let store = FsStore::new(&root);
    let summaries: Vec<PackageSummary> = deps::discover(&root, &deps_path)?
        .iter()
        .map(|p| return PackageSummary::gather(p, &store))
        .filter(|s| return !s.is_empty())
        .collect();

    if json {
        // serde_json::to_string_pretty won't fail on this structure.
        let out = serde_json::to_string_pretty(&summaries).unwrap_or_default();
        println!("{out}");
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No dependencies with usage rules found in {}", deps_path.display());
        return Ok(());
    }
    for summary in &summaries {
        print_summary(summary);
    }
    return Ok(());
}

/// Print one line per changed path.
fn print_report(changed: &[(PathBuf, Outcome)], check: bool) {
    if changed.is_empty() {
        println!("Everything up to date");
        return;
    }
    for (path, outcome) in changed {
        let Some(label) = outcome.label() else {
            continue;
        };
        if check {
            println!("would be {label:<8} {}", path.display());
        } else {
            println!("{label:<8} {}", path.display());
        }
    }
}

/// Print a markdown summary of one dependency.
fn print_summary(summary: &PackageSummary) {
    println!("## {}", summary.name);
    if let Some(description) = &summary.description {
        println!("_{description}_");
    }
    if summary.main {
        println!("- main: usage-rules.md");
    }
    if !summary.sub_rules.is_empty() {
        println!("- sub-rules: {}", summary.sub_rules.join(", "));
    }
    if !summary.skills.is_empty() {
        println!("- skills: {}", summary.skills.join(", "));
    }
    println!();
}

/// Project root for a config path: its directory, or `.` for a bare file name.
fn project_root(config_path: &Path) -> PathBuf {
    return match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
}

/// Run one sync cycle, or with `check` report what it would change.
///
/// # Errors
///
/// Returns config errors, or `Error::Io` if the tree can't be read or written.
pub fn sync(config_path: &Path, check: bool) -> Result<ExitCode, error::Error> {
    let root = project_root(config_path);
    let config = Config::load(config_path)?;
    let store = FsStore::new(&root);
    let plan = sync::plan(&root, &config, &store)?;

    for notice in &plan.notices {
        println!("deprecated  {notice}");
    }

    let changed = if check { plan.preview(&root) } else { plan.apply(&root)? };
    print_report(&changed, check);

    if !plan.file_errors.is_empty() {
        diagnostics::print_resolution_errors("Unresolved Usage Rules", &plan.file_errors);
    }
    if !plan.skill_errors.is_empty() {
        diagnostics::print_resolution_errors("Unresolved Skill Packages", &plan.skill_errors);
    }

    if plan.has_errors() || (check && !changed.is_empty()) {
        return Ok(ExitCode::FAILURE);
    }
    return Ok(ExitCode::SUCCESS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;

    #[test]
    fn project_root_of_bare_file_is_cwd() {
        assert_eq!(project_root(Path::new(".usage-rules.toml")), PathBuf::from("."));
        assert_eq!(project_root(Path::new("app/.usage-rules.toml")), PathBuf::from("app"));
    }

    #[test]
    fn init_preserves_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "# project rules\nusage_rules = [\"ash\"] # keep\n").unwrap();

        init(&path, Some("AGENTS.md")).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("# project rules\n"));
        assert!(written.contains("usage_rules = [\"ash\"] # keep"));
        assert!(written.contains("file = \"AGENTS.md\""));

        let config = Config::load(&path).unwrap();
        assert_eq!(config.file, Some(PathBuf::from("AGENTS.md")));
        assert_eq!(config.usage_rules.len(), 1);
    }

    #[test]
    fn init_seeds_all_for_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        init(&path, None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "usage_rules = \"all\"\n");
    }
}
