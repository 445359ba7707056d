//! Skill Bundle Builder: compose skill bundles from dependency fragments,
//! import pre-built bundles, and clean up bundles that are no longer declared.
//!
//! Planning is pure over the Fragment Store and a snapshot of the bundle
//! root; the result is a list of `FileChange`s for the orchestrator.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::changes::FileChange;
use crate::config::{SkillBuild, SkillsConfig};
use crate::descriptor::{self, CustomContent};
use crate::error::ResolutionError;
use crate::resolver;
use crate::store::FragmentStore;
use crate::types::{NameMatcher, PackageRef, SKILL_DESCRIPTOR, Spec, slash_path};

/// Directory inside a bundle that holds per-fragment reference files.
const REFERENCES_DIR: &str = "references";

/// Prefix of the shorthand skills generated from `skills.deps`.
const SHORTHAND_PREFIX: &str = "use-";

/// One bundle directory as found on disk.
#[derive(Debug, Default, Clone)]
pub struct ExistingBundle {
    /// Descriptor text, if the bundle has a readable one.
    pub descriptor: Option<String>,
    /// Every file in the bundle, relative to the bundle directory, sorted.
    pub files: Vec<PathBuf>,
}

impl ExistingBundle {
    /// Whether the descriptor carries the ownership marker.
    fn is_managed(&self) -> bool {
        return self.descriptor.as_deref().is_some_and(descriptor::is_managed);
    }
}

/// Snapshot of the bundle root, keyed by bundle name.
#[derive(Debug, Default, Clone)]
pub struct ExistingBundles {
    /// Bundles by directory name.
    bundles: BTreeMap<String, ExistingBundle>,
}

impl ExistingBundles {
    /// Look up a bundle by name.
    pub fn get(&self, name: &str) -> Option<&ExistingBundle> {
        return self.bundles.get(name);
    }

    /// Add or replace a bundle.
    pub fn insert(&mut self, name: impl Into<String>, bundle: ExistingBundle) {
        self.bundles.insert(name.into(), bundle);
    }

    /// Read every bundle directory under `root/location`. A missing root or
    /// unreadable entries read as absent.
    pub fn load(root: &Path, location: &Path) -> Self {
        let mut snapshot = Self::default();
        let Ok(entries) = std::fs::read_dir(root.join(location)) else {
            return snapshot;
        };
        for entry in entries.filter_map(Result::ok) {
            if !entry.file_type().is_ok_and(|t| return t.is_dir()) {
                continue;
            }
            let dir = entry.path();
            let mut files: Vec<PathBuf> = WalkDir::new(&dir)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| return e.file_type().is_file())
                .filter_map(|e| return e.path().strip_prefix(&dir).ok().map(Path::to_path_buf))
                .collect();
            files.sort();
            let descriptor = std::fs::read_to_string(dir.join(SKILL_DESCRIPTOR)).ok();
            snapshot.insert(entry.file_name().to_string_lossy(), ExistingBundle { descriptor, files });
        }
        return snapshot;
    }
}

/// Everything the builder wants done, plus what it couldn't resolve.
#[derive(Debug, Default)]
pub struct SkillPlan {
    /// Mutations in order: stale cleanup first, then builds, then imports.
    pub changes: Vec<FileChange>,
    /// Resolution errors from skill specs. These never block other skills.
    pub errors: Vec<ResolutionError>,
}

/// A reference file a composed skill ships.
struct Reference {
    /// Normalized fragment content.
    content: String,
    /// Entry text in the references list.
    label: String,
    /// `/`-separated path under `references/`.
    path: String,
}

/// Compute the description for a composed skill.
///
/// An explicit override wins. Otherwise package descriptions are joined with
/// `". "` and closed with a period, or a generic sentence is synthesized when
/// no package has one.
pub fn describe(
    skill: &str,
    packages: &[PackageRef],
    store: &dyn FragmentStore,
    explicit: Option<&str>,
) -> String {
    if let Some(description) = explicit {
        return description.to_string();
    }
    let descriptions: Vec<String> = packages
        .iter()
        .filter_map(|p| return store.description(p))
        .map(|d| return d.trim().trim_end_matches('.').to_string())
        .filter(|d| return !d.is_empty())
        .collect();
    if descriptions.is_empty() {
        let names: Vec<&str> = packages.iter().map(|p| return p.name.as_str()).collect();
        return format!("Usage rules, mix tasks, and documentation for {skill} ({}).", names.join(", "));
    }
    return format!("{}.", descriptions.join(". "));
}

/// Plan every skill mutation for one sync cycle.
pub fn plan(
    config: &SkillsConfig,
    packages: &[PackageRef],
    store: &dyn FragmentStore,
    existing: &ExistingBundles,
) -> SkillPlan {
    let mut plan = SkillPlan::default();
    let builds = declared_builds(config, packages, store);
    let imports = declared_imports(config, packages, store, &builds, existing, &mut plan.errors);

    let mut declared: HashSet<&str> = builds.iter().map(|b| return b.name.as_str()).collect();
    declared.extend(imports.iter().map(|(_, skill)| return skill.as_str()));

    for (name, bundle) in &existing.bundles {
        if bundle.is_managed() && !declared.contains(name.as_str()) {
            tracing::info!(skill = %name, "removing stale skill bundle");
            plan.changes.extend(stale_changes(&config.location.join(name), bundle));
        }
    }

    for build in &builds {
        let resolution = resolver::resolve_packages(&build.usage_rules, packages, store);
        plan.errors.extend(resolution.errors);
        if resolution.packages.is_empty() {
            tracing::debug!(skill = %build.name, "no packages resolved; skipping skill");
            continue;
        }
        let bundle = existing.get(&build.name);
        if bundle.is_some_and(|b| return b.descriptor.is_some() && !b.is_managed()) {
            tracing::warn!(skill = %build.name, "not building over an unmanaged skill bundle");
            continue;
        }
        plan.changes.extend(build_changes(config, build, &resolution.packages, store, bundle));
    }

    for (package, skill) in &imports {
        let bundle = existing.get(skill);
        plan.changes.extend(import_changes(&config.location.join(skill), package, skill, store, bundle));
    }

    return plan;
}

/// Managed body of a composed skill's descriptor.
fn render_managed_body(references: &[Reference], packages: &[PackageRef], store: &dyn FragmentStore) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !references.is_empty() {
        let mut list = String::from("## Additional References\n");
        for reference in references {
            let _ = write!(list, "\n- [{}]({REFERENCES_DIR}/{})", reference.label, reference.path);
        }
        sections.push(list);
    }

    let flags: Vec<String> = packages.iter().map(|p| return format!("-p {}", p.name)).collect();
    sections.push(format!(
        "## Searching Documentation\n\n```sh\nmix usage_rules.search_docs \"search term\" {}\n```",
        flags.join(" ")
    ));

    let tasks: Vec<String> = packages
        .iter()
        .flat_map(|p| return store.tasks(p))
        .map(|task| {
            return match task.shortdoc {
                Some(doc) => format!("- `mix {}` - {doc}", task.name),
                None => format!("- `mix {}`", task.name),
            };
        })
        .collect();
    if !tasks.is_empty() {
        sections.push(format!("## Available Mix Tasks\n\n{}", tasks.join("\n")));
    }

    return sections.join("\n\n");
}

/// Descriptor and reference files for one composed skill.
fn build_changes(
    config: &SkillsConfig,
    build: &SkillBuild,
    packages: &[PackageRef],
    store: &dyn FragmentStore,
    existing: Option<&ExistingBundle>,
) -> Vec<FileChange> {
    let dir = config.location.join(&build.name);
    let references = collect_references(packages, store);
    let description = describe(&build.name, packages, store, build.description.as_deref());
    let custom = existing_custom(existing);

    let mut changes = vec![FileChange::Write {
        content: descriptor::compose(
            &descriptor::render_frontmatter(&build.name, &description),
            &custom,
            &render_managed_body(&references, packages, store),
        ),
        path: dir.join(SKILL_DESCRIPTOR),
    }];

    let wanted: HashSet<&str> = references.iter().map(|r| return r.path.as_str()).collect();
    if let Some(bundle) = existing.filter(|b| return b.is_managed()) {
        for file in &bundle.files {
            let Ok(relative) = file.strip_prefix(REFERENCES_DIR) else {
                continue;
            };
            if !wanted.contains(slash_path(relative).as_str()) {
                changes.push(FileChange::RemoveFile { path: dir.join(file) });
            }
        }
    }

    for reference in references {
        changes.push(FileChange::Write {
            content: format!("{}\n", reference.content),
            path: dir.join(REFERENCES_DIR).join(&reference.path),
        });
    }

    return changes;
}

/// Reference files for the resolved packages: each main fragment as
/// `<pkg>.md`, each sub-fragment as `<pkg>/<sub>.md`. Packages are unique,
/// so every (package, fragment) pair gets its own file. Fragments with no
/// content are skipped.
fn collect_references(packages: &[PackageRef], store: &dyn FragmentStore) -> Vec<Reference> {
    let mut references: Vec<Reference> = Vec::new();

    for package in packages {
        let mut candidates: Vec<(String, String, PathBuf)> = Vec::new();
        if store.has_main(package) {
            candidates.push((package.name.clone(), format!("{}.md", package.name), package.main_path()));
        }
        for sub in store.sub_rule_names(package) {
            let fragment = package.sub_fragment_path(&sub);
            candidates.push((format!("{}:{sub}", package.name), format!("{}/{sub}.md", package.name), fragment));
        }

        for (label, path, fragment) in candidates {
            let content = store.read(&fragment).trim().to_string();
            if content.is_empty() {
                continue;
            }
            references.push(Reference { content, label, path });
        }
    }

    return references;
}

/// Composed skills in effect: explicit builds plus one `use-<pkg>` shorthand
/// per `skills.deps` match. Explicit builds win name collisions.
fn declared_builds(config: &SkillsConfig, packages: &[PackageRef], store: &dyn FragmentStore) -> Vec<SkillBuild> {
    let mut builds: Vec<SkillBuild> = config.build.clone();
    let mut names: HashSet<String> = builds.iter().map(|b| return b.name.clone()).collect();

    for matcher in &config.deps {
        let targets: Vec<String> = match matcher {
            NameMatcher::Literal(name) => vec![name.clone()],
            NameMatcher::Pattern(_) => packages
                .iter()
                .filter(|p| return matcher.matches(&p.name) && resolver::has_any_rules(p, store))
                .map(|p| return p.name.clone())
                .collect(),
        };
        for target in targets {
            let name = format!("{SHORTHAND_PREFIX}{target}");
            if !names.insert(name.clone()) {
                tracing::debug!(skill = %name, "shorthand skill already declared");
                continue;
            }
            builds.push(SkillBuild { description: None, name, usage_rules: vec![Spec::named(target)] });
        }
    }

    return builds;
}

/// Pre-built bundles to import, as `(package, skill)` pairs. A skill whose
/// name is already a composed build, or already imported from another
/// package, is skipped. So is one that would overwrite an unmanaged bundle.
fn declared_imports(
    config: &SkillsConfig,
    packages: &[PackageRef],
    store: &dyn FragmentStore,
    builds: &[SkillBuild],
    existing: &ExistingBundles,
    errors: &mut Vec<ResolutionError>,
) -> Vec<(PackageRef, String)> {
    let mut imports: Vec<(PackageRef, String)> = Vec::new();
    let mut taken: HashSet<String> = builds.iter().map(|b| return b.name.clone()).collect();

    for matcher in &config.package_skills {
        if let NameMatcher::Literal(name) = matcher
            && !packages.iter().any(|p| return p.name == *name)
        {
            errors.push(ResolutionError::UnknownDependency { package: name.clone() });
            continue;
        }
        for package in packages.iter().filter(|p| return matcher.matches(&p.name)) {
            for skill in store.skill_names(package) {
                if existing.get(&skill).is_some_and(|b| return b.descriptor.is_some() && !b.is_managed()) {
                    tracing::warn!(skill = %skill, package = %package.name, "not importing over an unmanaged skill bundle");
                    continue;
                }
                if !taken.insert(skill.clone()) {
                    tracing::debug!(skill = %skill, package = %package.name, "skill name already declared");
                    continue;
                }
                imports.push((package.clone(), skill));
            }
        }
    }

    return imports;
}

/// Custom content to carry into a regenerated descriptor.
fn existing_custom(existing: Option<&ExistingBundle>) -> CustomContent {
    return existing
        .and_then(|b| return b.descriptor.as_deref())
        .and_then(descriptor::extract_custom)
        .unwrap_or_default();
}

/// Copy a pre-built bundle verbatim, marking its descriptor as managed and
/// dropping files the package no longer ships.
fn import_changes(
    dir: &Path,
    package: &PackageRef,
    skill: &str,
    store: &dyn FragmentStore,
    existing: Option<&ExistingBundle>,
) -> Vec<FileChange> {
    let files = store.skill_files(package, skill);
    let mut changes: Vec<FileChange> = Vec::new();

    if let Some(bundle) = existing.filter(|b| return b.is_managed()) {
        let shipped: HashSet<&Path> = files.iter().map(|(path, _)| return path.as_path()).collect();
        for file in bundle.files.iter().filter(|f| return !shipped.contains(f.as_path())) {
            changes.push(FileChange::RemoveFile { path: dir.join(file) });
        }
    }

    for (relative, content) in files {
        let path = dir.join(&relative);
        if relative != Path::new(SKILL_DESCRIPTOR) {
            changes.push(FileChange::Copy { content, path });
            continue;
        }
        match String::from_utf8(content) {
            Ok(text) => changes.push(FileChange::Write { content: descriptor::mark_managed(&text, skill), path }),
            Err(err) => {
                tracing::warn!(skill = %skill, package = %package.name, "descriptor is not UTF-8; copying as is");
                changes.push(FileChange::Copy { content: err.into_bytes(), path });
            },
        }
    }

    return changes;
}

/// Changes that retire a stale bundle: keep only its custom text, or remove
/// the directory when there is none.
fn stale_changes(dir: &Path, bundle: &ExistingBundle) -> Vec<FileChange> {
    let custom = bundle.descriptor.as_deref().and_then(descriptor::extract_custom).unwrap_or_default();
    if custom.is_empty() {
        return vec![FileChange::RemoveDir { path: dir.to_path_buf() }];
    }

    let mut changes = vec![FileChange::Write {
        content: format!("{}\n", custom.combined()),
        path: dir.join(SKILL_DESCRIPTOR),
    }];
    let mut subdirs: BTreeSet<PathBuf> = BTreeSet::new();
    for file in &bundle.files {
        let mut parts = file.components();
        let (Some(first), rest) = (parts.next(), parts.next()) else {
            continue;
        };
        if rest.is_some() {
            subdirs.insert(PathBuf::from(first.as_os_str()));
        } else if first.as_os_str() != SKILL_DESCRIPTOR {
            changes.push(FileChange::RemoveFile { path: dir.join(file) });
        }
    }
    changes.extend(subdirs.into_iter().map(|sub| return FileChange::RemoveDir { path: dir.join(sub) }));
    return changes;
}
