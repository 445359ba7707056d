//! Project configuration loaded from `.usage-rules.toml`.
//!
//! Every accepted shape is normalized here into `Spec`/`NameMatcher` values so
//! the resolver never sees strings, keywords, or deprecated forms.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::error::Error;
use crate::types::{LinkStyle, NameMatcher, Spec, SpecOptions, SubRuleSelection};

/// Default configuration file name at the project root.
pub const CONFIG_FILE: &str = ".usage-rules.toml";

/// Default dependency directory.
const DEFAULT_DEPS_PATH: &str = "deps";

/// Default skill bundle location.
const DEFAULT_SKILLS_LOCATION: &str = ".claude/skills";

/// Package that owns the built-in alias fragments.
const ALIAS_PACKAGE: &str = "usage_rules";

/// Built-in names that map to a sub-fragment of `ALIAS_PACKAGE`.
const ALIASES: &[&str] = &["elixir", "otp"];

/// Fully normalized project configuration.
#[derive(Debug)]
pub struct Config {
    /// Directory holding dependencies, relative to the project root.
    pub deps_path: PathBuf,
    /// Target aggregate file, relative to the project root.
    pub file: Option<PathBuf>,
    /// Deprecation notices raised while normalizing.
    pub notices: Vec<String>,
    /// Skill bundle settings.
    pub skills: SkillsConfig,
    /// Desired inclusions for the aggregate file, in config order.
    pub usage_rules: Vec<Spec>,
}

/// Skill bundle settings from the `[skills]` table.
#[derive(Debug)]
pub struct SkillsConfig {
    /// Explicitly composed skills, sorted by name.
    pub build: Vec<SkillBuild>,
    /// Shorthand: one `use-<pkg>` skill per matching dependency.
    pub deps: Vec<NameMatcher>,
    /// Bundle root directory, relative to the project root.
    pub location: PathBuf,
    /// Dependencies whose pre-built bundles are imported verbatim.
    pub package_skills: Vec<NameMatcher>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        return Self {
            build: Vec::new(),
            deps: Vec::new(),
            location: PathBuf::from(DEFAULT_SKILLS_LOCATION),
            package_skills: Vec::new(),
        };
    }
}

/// One declared, composed skill.
#[derive(Debug, Clone)]
pub struct SkillBuild {
    /// Description override for the descriptor front-matter.
    pub description: Option<String>,
    /// Skill (and bundle directory) name.
    pub name: String,
    /// Package specs the skill covers. Only whole packages are used.
    pub usage_rules: Vec<Spec>,
}

/// Raw TOML structure for `.usage-rules.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    /// `deps_path` key.
    #[serde(default)]
    deps_path: Option<String>,
    /// `file` key.
    #[serde(default)]
    file: Option<String>,
    /// `skills` key.
    #[serde(default)]
    skills: Option<RawSkills>,
    /// `usage_rules` key.
    #[serde(default)]
    usage_rules: Option<RawRuleList>,
}

/// `deps = [...]` / `package_skills = [...]` entries.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawDepEntry {
    /// `"ash"` or `"/^ash/"`.
    Name(String),
    /// Deprecated `["ash", "reference"]`. Tried before `Table`, which would
    /// otherwise accept a sequence positionally.
    Tuple(Vec<String>),
    /// `{ name = ..., reference = true }` or `{ pattern = ... }`.
    Table(RawSpecTable),
}

/// `usage_rules = "all"` or a list of specs.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawRuleList {
    /// Keyword form; only `"all"` is accepted.
    Keyword(String),
    /// Explicit list of specs.
    List(Vec<RawSpec>),
}

/// `[skills.build.<name>]` table.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSkillBuild {
    /// `description` key.
    #[serde(default)]
    description: Option<String>,
    /// `usage_rules` key.
    #[serde(default)]
    usage_rules: Vec<RawSpec>,
}

/// `[skills]` table.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSkills {
    /// `build` key.
    #[serde(default)]
    build: BTreeMap<String, RawSkillBuild>,
    /// `deps` key.
    #[serde(default)]
    deps: Vec<RawDepEntry>,
    /// `location` key.
    #[serde(default)]
    location: Option<String>,
    /// `package_skills` key.
    #[serde(default)]
    package_skills: Vec<RawDepEntry>,
}

/// One entry of a `usage_rules` list.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawSpec {
    /// String form: name, `pkg:sub`, `pkg:all`, alias, or `/regex/`.
    Name(String),
    /// Table form with options.
    Table(RawSpecTable),
}

/// Table form of a spec.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpecTable {
    /// `link` key.
    #[serde(default)]
    link: Option<String>,
    /// `main` key.
    #[serde(default)]
    main: Option<bool>,
    /// `name` key.
    #[serde(default)]
    name: Option<String>,
    /// `pattern` key.
    #[serde(default)]
    pattern: Option<String>,
    /// `reference` key.
    #[serde(default)]
    reference: Option<bool>,
    /// `sub_rules` key.
    #[serde(default)]
    sub_rules: Option<RawSubRules>,
}

/// `sub_rules = "all"` or a list of names.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawSubRules {
    /// Keyword form; only `"all"` is accepted.
    Keyword(String),
    /// Explicit names.
    List(Vec<String>),
}

/// Carries the config path through normalization for error messages.
struct Normalizer<'a> {
    /// Deprecation notices collected so far.
    notices: Vec<String>,
    /// Config file being normalized.
    path: &'a Path,
}

impl Config {
    /// Load and normalize the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if the file doesn't exist, `Error::Io`
    /// if it can't be read, or `Error::ConfigInvalid` / `Error::InvalidPattern`
    /// if its shape is wrong.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&content, path);
    }

    /// Parse and normalize config text. `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` for malformed TOML or unsupported values,
    /// or `Error::InvalidPattern` for a pattern that doesn't compile.
    pub fn parse(content: &str, path: &Path) -> Result<Self, Error> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| {
            return Error::ConfigInvalid { path: path.to_path_buf(), reason: e.to_string().trim().to_string() };
        })?;

        let mut normalizer = Normalizer { notices: Vec::new(), path };

        let usage_rules = match raw.usage_rules {
            None => Vec::new(),
            Some(RawRuleList::Keyword(word)) if word == "all" => vec![Spec {
                matcher: NameMatcher::Pattern(compile_pattern(".*")?),
                options: SpecOptions::default(),
            }],
            Some(RawRuleList::Keyword(word)) => {
                return Err(normalizer.invalid(format!("usage_rules must be \"all\" or a list, got \"{word}\"")));
            },
            Some(RawRuleList::List(specs)) => normalizer.specs(specs)?,
        };

        let skills = match raw.skills {
            None => SkillsConfig::default(),
            Some(skills) => normalizer.skills(skills)?,
        };

        return Ok(Self {
            deps_path: PathBuf::from(raw.deps_path.unwrap_or_else(|| return DEFAULT_DEPS_PATH.to_string())),
            file: raw.file.map(PathBuf::from),
            notices: normalizer.notices,
            skills,
            usage_rules,
        });
    }
}

impl Normalizer<'_> {
    /// Normalize one `deps` / `package_skills` entry to a matcher.
    fn dep_entry(&mut self, entry: RawDepEntry) -> Result<NameMatcher, Error> {
        return match entry {
            RawDepEntry::Name(name) => self.matcher(&name),
            RawDepEntry::Table(table) => {
                if table.reference.is_some() {
                    let shown = table.name.clone().or_else(|| return table.pattern.clone()).unwrap_or_default();
                    self.deprecated(&shown);
                }
                if table.link.is_some() || table.main.is_some() || table.sub_rules.is_some() {
                    return Err(self.invalid("skill dependency entries accept only `name`, `pattern`, or `reference`"));
                }
                match (table.name, table.pattern) {
                    (Some(name), None) => self.matcher(&name),
                    (None, Some(pattern)) => Ok(NameMatcher::Pattern(compile_pattern(&pattern)?)),
                    _ => Err(self.invalid("skill dependency entries need exactly one of `name` or `pattern`")),
                }
            },
            RawDepEntry::Tuple(parts) => match parts.as_slice() {
                [name, mode] if mode == "reference" => {
                    self.deprecated(name);
                    self.matcher(name)
                },
                _ => Err(self.invalid(format!("unsupported skill dependency entry {parts:?}"))),
            },
        };
    }

    /// Record a deprecation notice for the legacy reference shape.
    fn deprecated(&mut self, name: &str) {
        let notice = format!(
            "`{name}` uses the deprecated reference form in skills.deps; list it as \"{name}\" instead"
        );
        tracing::warn!("{notice}");
        self.notices.push(notice);
    }

    /// Build a configuration error for this file.
    fn invalid(&self, reason: impl Into<String>) -> Error {
        return Error::ConfigInvalid { path: self.path.to_path_buf(), reason: reason.into() };
    }

    /// Parse a `link` value.
    fn link(&self, value: &str) -> Result<LinkStyle, Error> {
        return match value {
            "at" => Ok(LinkStyle::At),
            "markdown" => Ok(LinkStyle::Markdown),
            other => Err(self.invalid(format!("link must be \"at\" or \"markdown\", got \"{other}\""))),
        };
    }

    /// A name or `/regex/` string as a package matcher, qualifiers dropped.
    fn matcher(&self, text: &str) -> Result<NameMatcher, Error> {
        let spec = self.spec_from_string(text)?;
        return Ok(spec.matcher);
    }

    /// Normalize the `[skills]` table.
    fn skills(&mut self, raw: RawSkills) -> Result<SkillsConfig, Error> {
        let mut build = Vec::with_capacity(raw.build.len());
        for (name, skill) in raw.build {
            if !is_bundle_name(&name) {
                return Err(self.invalid(format!("invalid skill name \"{name}\"")));
            }
            build.push(SkillBuild {
                description: skill.description.filter(|d| return !d.trim().is_empty()),
                name,
                usage_rules: self.specs(skill.usage_rules)?,
            });
        }

        let deps = raw.deps.into_iter().map(|e| return self.dep_entry(e)).collect::<Result<Vec<_>, _>>()?;
        let package_skills =
            raw.package_skills.into_iter().map(|e| return self.dep_entry(e)).collect::<Result<Vec<_>, _>>()?;

        return Ok(SkillsConfig {
            build,
            deps,
            location: raw.location.map_or_else(|| return PathBuf::from(DEFAULT_SKILLS_LOCATION), PathBuf::from),
            package_skills,
        });
    }

    /// Normalize one spec entry.
    fn spec(&mut self, raw: RawSpec) -> Result<Spec, Error> {
        let table = match raw {
            RawSpec::Name(text) => return self.spec_from_string(&text),
            RawSpec::Table(table) => table,
        };

        let mut spec = match (&table.name, &table.pattern) {
            (Some(name), None) => self.spec_from_string(name)?,
            (None, Some(pattern)) => Spec {
                matcher: NameMatcher::Pattern(compile_pattern(pattern)?),
                options: SpecOptions::default(),
            },
            _ => return Err(self.invalid("spec tables need exactly one of `name` or `pattern`")),
        };

        if let Some(link) = &table.link {
            spec.options.link = Some(self.link(link)?);
        }
        if table.reference == Some(true) {
            let notice = format!(
                "`{}` uses the deprecated `reference = true`; use `link = \"markdown\"` instead",
                spec.matcher.describe()
            );
            tracing::warn!("{notice}");
            self.notices.push(notice);
            spec.options.link = spec.options.link.or(Some(LinkStyle::Markdown));
        }
        if let Some(main) = table.main {
            spec.options.main = main;
        }
        if let Some(sub_rules) = table.sub_rules {
            spec.options.sub_rules = match sub_rules {
                RawSubRules::Keyword(word) if word == "all" => SubRuleSelection::All,
                RawSubRules::Keyword(word) => {
                    return Err(self.invalid(format!("sub_rules must be \"all\" or a list, got \"{word}\"")));
                },
                RawSubRules::List(names) => SubRuleSelection::Named(names),
            };
        }

        return Ok(spec);
    }

    /// Parse the string form of a spec.
    fn spec_from_string(&self, text: &str) -> Result<Spec, Error> {
        if let Some(pattern) = text.strip_prefix('/').and_then(|t| return t.strip_suffix('/')) {
            return Ok(Spec {
                matcher: NameMatcher::Pattern(compile_pattern(pattern)?),
                options: SpecOptions::default(),
            });
        }

        if ALIASES.contains(&text) {
            return Ok(Spec {
                matcher: NameMatcher::Literal(ALIAS_PACKAGE.to_string()),
                options: SpecOptions {
                    link: None,
                    main: false,
                    sub_rules: SubRuleSelection::Named(vec![text.to_string()]),
                },
            });
        }

        let Some((package, sub)) = text.split_once(':') else {
            if text.trim().is_empty() {
                return Err(self.invalid("empty package name in usage_rules"));
            }
            return Ok(Spec::named(text));
        };

        if package.is_empty() || sub.is_empty() {
            return Err(self.invalid(format!("\"{text}\" must look like \"package:sub_rule\"")));
        }

        let sub_rules = if sub == "all" {
            SubRuleSelection::All
        } else {
            SubRuleSelection::Named(vec![sub.to_string()])
        };
        return Ok(Spec {
            matcher: NameMatcher::Literal(package.to_string()),
            options: SpecOptions { link: None, main: false, sub_rules },
        });
    }

    /// Normalize a list of specs, preserving order.
    fn specs(&mut self, raw: Vec<RawSpec>) -> Result<Vec<Spec>, Error> {
        return raw.into_iter().map(|s| return self.spec(s)).collect();
    }
}

/// Compile a pattern spec.
///
/// # Errors
///
/// Returns `Error::InvalidPattern` if the regex does not compile.
fn compile_pattern(pattern: &str) -> Result<Regex, Error> {
    return Regex::new(pattern).map_err(|e| {
        return Error::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() };
    });
}

/// Whether a skill name is a single plain directory name under the bundle root.
fn is_bundle_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    return matches!((components.next(), components.next()), (Some(Component::Normal(_)), None));
}
