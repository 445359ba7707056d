//! Spec resolution: expand declarative specs against the known dependencies
//! and the fragments they ship.
//!
//! Pure with respect to I/O beyond the `FragmentStore` queries. Errors are
//! collected, never thrown, so one bad spec doesn't hide the rest.

use std::collections::HashSet;

use crate::error::ResolutionError;
use crate::store::FragmentStore;
use crate::types::{NameMatcher, PackageRef, ResolvedRule, Spec, SubRuleSelection};

/// Output of resolving a spec list: inclusion records in render order plus
/// every resolution error encountered.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Errors in config order.
    pub errors: Vec<ResolutionError>,
    /// Records in config order; main precedes sub-fragments within a spec.
    pub rules: Vec<ResolvedRule>,
}

/// Whole-package resolution used for skill bundles: unique packages in
/// first-seen order plus errors for explicit names that didn't resolve.
#[derive(Debug, Default)]
pub struct PackageResolution {
    /// Errors in config order.
    pub errors: Vec<ResolutionError>,
    /// Unique packages in first-seen order.
    pub packages: Vec<PackageRef>,
}

/// Resolve specs into inclusion records for the aggregate file.
///
/// Duplicates are kept: two specs naming the same fragment produce two
/// records, and the merge engine keys sections so the later one wins.
pub fn resolve(specs: &[Spec], packages: &[PackageRef], store: &dyn FragmentStore) -> Resolution {
    let mut resolution = Resolution::default();
    for spec in specs {
        for target in targets(&spec.matcher, packages) {
            resolve_target(spec, target, packages, store, &mut resolution);
        }
    }
    tracing::debug!(
        rules = resolution.rules.len(),
        errors = resolution.errors.len(),
        "resolved usage rules"
    );
    return resolution;
}

/// Resolve specs to whole packages, ignoring sub-rule and main selection.
/// A package qualifies when it has a main fragment or any sub-fragment.
pub fn resolve_packages(
    specs: &[Spec],
    packages: &[PackageRef],
    store: &dyn FragmentStore,
) -> PackageResolution {
    let mut resolution = PackageResolution::default();
    let mut seen: HashSet<String> = HashSet::new();

    for spec in specs {
        let explicit = !spec.matcher.is_pattern();
        for target in targets(&spec.matcher, packages) {
            let Some(package) = packages.iter().find(|p| return p.name == target) else {
                resolution.errors.push(ResolutionError::UnknownDependency { package: target });
                continue;
            };

            if !has_any_rules(package, store) {
                if explicit {
                    resolution.errors.push(ResolutionError::EmptyPackage { package: target });
                }
                continue;
            }

            if seen.insert(package.name.clone()) {
                resolution.packages.push(package.clone());
            }
        }
    }

    return resolution;
}

/// Whether a package ships a main fragment or at least one sub-fragment.
pub fn has_any_rules(package: &PackageRef, store: &dyn FragmentStore) -> bool {
    return store.has_main(package) || !store.sub_rule_names(package).is_empty();
}

/// Resolve one spec against one target identifier, appending records and errors.
fn resolve_target(
    spec: &Spec,
    target: String,
    packages: &[PackageRef],
    store: &dyn FragmentStore,
    resolution: &mut Resolution,
) {
    let explicit = !spec.matcher.is_pattern();
    let Some(package) = packages.iter().find(|p| return p.name == target) else {
        if explicit {
            resolution.errors.push(ResolutionError::UnknownDependency { package: target });
        }
        return;
    };

    let before = resolution.rules.len();
    let mut errored = false;

    if spec.options.main && store.has_main(package) {
        resolution.rules.push(ResolvedRule {
            options: spec.options.clone(),
            package: package.clone(),
            sub_rule: None,
        });
    }

    let available = store.sub_rule_names(package);
    let selected: Vec<String> = match &spec.options.sub_rules {
        SubRuleSelection::All => available,
        SubRuleSelection::Named(names) => {
            let mut found = Vec::with_capacity(names.len());
            for name in names {
                if available.contains(name) {
                    found.push(name.clone());
                } else if explicit {
                    errored = true;
                    resolution.errors.push(ResolutionError::MissingSubRule {
                        package: package.name.clone(),
                        sub_rule: name.clone(),
                    });
                } else {
                    tracing::debug!(package = %package.name, sub_rule = %name, "pattern sub-rule absent, skipped");
                }
            }
            found
        },
    };

    for sub_rule in selected {
        resolution.rules.push(ResolvedRule {
            options: spec.options.clone(),
            package: package.clone(),
            sub_rule: Some(sub_rule),
        });
    }

    if resolution.rules.len() == before && explicit && !errored {
        resolution.errors.push(ResolutionError::EmptyPackage { package: package.name.clone() });
    }
}

/// Identifiers a matcher targets: the literal name itself, or every known
/// identifier matching the pattern in name-sorted order.
fn targets(matcher: &NameMatcher, packages: &[PackageRef]) -> Vec<String> {
    return match matcher {
        NameMatcher::Literal(name) => vec![name.clone()],
        NameMatcher::Pattern(_) => {
            let mut names: Vec<String> = packages
                .iter()
                .filter(|p| return matcher.matches(&p.name))
                .map(|p| return p.name.clone())
                .collect();
            names.sort();
            names
        },
    };
}
