//! Project language and framework detection from manifest files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

/// What the project root says about its language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageInfo {
    pub language: String,
    /// Build framework implied by the manifest (`maven`, `dotnet`).
    pub framework: Option<String>,
    pub package_manager: Option<String>,
    /// File that decided the language; `None` for the extension count.
    pub manifest_file: Option<String>,
}

impl LanguageInfo {
    fn unknown() -> Self {
        Self {
            language: "unknown".to_string(),
            framework: None,
            package_manager: None,
            manifest_file: None,
        }
    }
}

struct Rule {
    manifest: &'static str,
    language: &'static str,
    framework: Option<&'static str>,
    package_manager: &'static str,
}

const fn rule(
    manifest: &'static str,
    language: &'static str,
    framework: Option<&'static str>,
    package_manager: &'static str,
) -> Rule {
    Rule {
        manifest,
        language,
        framework,
        package_manager,
    }
}

/// First match wins. A leading `*` matches by file suffix.
const RULES: &[Rule] = &[
    rule("pyproject.toml", "python", None, "pip/poetry"),
    rule("setup.py", "python", None, "pip"),
    rule("requirements.txt", "python", None, "pip"),
    rule("Pipfile", "python", None, "pipenv"),
    rule("package.json", "javascript", None, "npm"),
    rule("tsconfig.json", "typescript", None, "npm"),
    rule("pnpm-lock.yaml", "javascript", None, "pnpm"),
    rule("yarn.lock", "javascript", None, "yarn"),
    rule("Cargo.toml", "rust", None, "cargo"),
    rule("go.mod", "go", None, "go"),
    rule("pom.xml", "java", Some("maven"), "maven"),
    rule("build.gradle", "java", Some("gradle"), "gradle"),
    rule("build.gradle.kts", "kotlin", Some("gradle"), "gradle"),
    rule("Gemfile", "ruby", None, "bundler"),
    rule("composer.json", "php", None, "composer"),
    rule("*.csproj", "csharp", Some("dotnet"), "nuget"),
    rule("*.fsproj", "fsharp", Some("dotnet"), "nuget"),
    rule("mix.exs", "elixir", None, "mix"),
    rule("build.sbt", "scala", Some("sbt"), "sbt"),
    rule("Package.swift", "swift", None, "spm"),
];

/// Extension fallback; earlier entries win ties.
const EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("jsx", "javascript"),
    ("rs", "rust"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("rb", "ruby"),
    ("php", "php"),
    ("cs", "csharp"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("scala", "scala"),
    ("swift", "swift"),
    ("c", "c"),
    ("cpp", "cpp"),
    ("h", "c"),
    ("hpp", "cpp"),
];

/// Language of the project at `root`.
///
/// Manifest files decide first; `package.json` next to a `tsconfig.json` is
/// TypeScript. Without a manifest the most common source extension wins.
pub fn detect_language(root: &Path) -> Result<LanguageInfo> {
    if !root.is_dir() {
        return Ok(LanguageInfo::unknown());
    }
    let has_tsconfig = root.join("tsconfig.json").is_file();
    for rule in RULES {
        let Some(manifest) = find_manifest(root, rule.manifest)? else {
            continue;
        };
        let language = if rule.manifest == "package.json" && has_tsconfig {
            "typescript"
        } else {
            rule.language
        };
        debug!(manifest = %manifest, language, "detected language from manifest");
        return Ok(LanguageInfo {
            language: language.to_string(),
            framework: rule.framework.map(str::to_string),
            package_manager: Some(rule.package_manager.to_string()),
            manifest_file: Some(manifest),
        });
    }
    detect_from_extensions(root)
}

fn find_manifest(root: &Path, pattern: &str) -> Result<Option<String>> {
    let Some(suffix) = pattern.strip_prefix('*') else {
        return Ok(root.join(pattern).exists().then(|| pattern.to_string()));
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read directory {}", root.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", root.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(suffix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names.into_iter().next())
}

fn detect_from_extensions(root: &Path) -> Result<LanguageInfo> {
    let mut counts = BTreeMap::new();
    count_extensions(root, &mut counts)?;
    let mut best: Option<(&str, usize)> = None;
    for &(_, language) in EXTENSIONS {
        let count = counts.get(language).copied().unwrap_or(0);
        if count > best.map_or(0, |(_, n)| n) {
            best = Some((language, count));
        }
    }
    Ok(match best {
        Some((language, count)) => {
            debug!(language, files = count, "detected language from file extensions");
            LanguageInfo {
                language: language.to_string(),
                ..LanguageInfo::unknown()
            }
        }
        None => LanguageInfo::unknown(),
    })
}

/// Source files per language under `dir`, skipping hidden directories.
fn count_extensions(dir: &Path, counts: &mut BTreeMap<&'static str, usize>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            if !entry.file_name().to_string_lossy().starts_with('.') {
                count_extensions(&path, counts)?;
            }
            continue;
        }
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if let Some((_, language)) = EXTENSIONS.iter().find(|(ext, _)| *ext == extension) {
            *counts.entry(*language).or_default() += 1;
        }
    }
    Ok(())
}

const PYTHON_FRAMEWORKS: &[&str] = &["django", "flask", "fastapi", "pytest", "click"];

/// `(framework, package)` pairs looked up in `package.json`.
const JS_FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "react"),
    ("vue", "vue"),
    ("angular", "@angular/core"),
    ("next", "next"),
    ("express", "express"),
    ("nestjs", "@nestjs/core"),
];

/// Frameworks named in the project's dependency files, deduplicated.
///
/// Python dependency files are searched as text. An unparsable
/// `package.json` yields no frameworks.
pub fn detect_frameworks(root: &Path, language: &str) -> Result<Vec<String>> {
    let mut found = Vec::new();
    match language {
        "python" => {
            for file in ["requirements.txt", "pyproject.toml", "setup.py"] {
                let path = root.join(file);
                if !path.is_file() {
                    continue;
                }
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?
                    .to_lowercase();
                for framework in PYTHON_FRAMEWORKS {
                    if contents.contains(framework) && !found.iter().any(|f| f == framework) {
                        found.push((*framework).to_string());
                    }
                }
            }
        }
        "javascript" | "typescript" => {
            let path = root.join("package.json");
            if path.is_file() {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                match serde_json::from_str::<Value>(&raw) {
                    Ok(package) => {
                        let declared = |name: &str| {
                            ["dependencies", "devDependencies"]
                                .iter()
                                .any(|table| package.get(table).and_then(|t| t.get(name)).is_some())
                        };
                        found.extend(
                            JS_FRAMEWORKS
                                .iter()
                                .filter(|(_, dep)| declared(dep))
                                .map(|(framework, _)| (*framework).to_string()),
                        );
                    }
                    Err(err) => debug!(path = %path.display(), error = %err, "package.json is not valid JSON"),
                }
            }
        }
        _ => {}
    }
    Ok(found)
}
