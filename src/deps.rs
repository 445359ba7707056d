//! Dependency discovery: every directory under the deps path is a package.

use std::path::Path;

use crate::types::PackageRef;

/// List the project's dependencies, sorted by name.
///
/// Each immediate, non-hidden subdirectory of `project_root/deps_path` is one
/// package whose root is the project-relative `deps_path/<name>`. A missing
/// deps directory means no dependencies.
///
/// # Errors
///
/// Returns `Error::Io` if the deps directory exists but cannot be listed.
pub fn discover(project_root: &Path, deps_path: &Path) -> Result<Vec<PackageRef>, crate::error::Error> {
    let dir = project_root.join(deps_path);
    let entries = match std::fs::read_dir(&dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %dir.display(), "no deps directory");
            return Ok(Vec::new());
        },
        Err(e) => return Err(e.into()),
        Ok(entries) => entries,
    };

    let mut packages = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        packages.push(PackageRef::new(name.clone(), deps_path.join(&name)));
    }

    packages.sort_by(|a, b| return a.name.cmp(&b.name));
    tracing::debug!(count = packages.len(), "discovered dependencies");
    return Ok(packages);
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn lists_sorted_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["req", "ash_postgres", "ash", ".hidden"] {
            std::fs::create_dir_all(dir.path().join("deps").join(name)).unwrap();
        }
        std::fs::write(dir.path().join("deps/README"), "not a package").unwrap();

        let packages = discover(dir.path(), Path::new("deps")).unwrap();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ash", "ash_postgres", "req"]);
        assert_eq!(packages[0].root, PathBuf::from("deps/ash"));
    }

    #[test]
    fn missing_deps_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(dir.path(), Path::new("deps")).unwrap().is_empty());
    }
}
