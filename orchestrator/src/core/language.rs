//! Per-language project defaults used when scaffolding documentation.

/// Conventional commands and layout for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDefaults {
    pub language: &'static str,
    pub test_command: &'static str,
    pub format_command: Option<&'static str>,
    pub lint_command: Option<&'static str>,
    pub build_command: Option<&'static str>,
    pub run_command: Option<&'static str>,
    /// Empty when tests live next to the code.
    pub test_directory: &'static str,
    pub entry_point: &'static str,
    pub constraints: &'static [&'static str],
    /// `(what, convention)` pairs, e.g. `("Types", "PascalCase")`.
    pub naming_conventions: &'static [(&'static str, &'static str)],
}

pub static UNKNOWN: LanguageDefaults = LanguageDefaults {
    language: "unknown",
    test_command: "make test",
    format_command: None,
    lint_command: None,
    build_command: None,
    run_command: None,
    test_directory: "tests/",
    entry_point: "main",
    constraints: &["Document build and run commands"],
    naming_conventions: &[],
};

const DEFAULTS: &[LanguageDefaults] = &[
    LanguageDefaults {
        language: "python",
        test_command: "pytest",
        format_command: Some("black ."),
        lint_command: Some("pylint"),
        build_command: Some("pip install -e ."),
        run_command: Some("python main.py"),
        test_directory: "tests/",
        entry_point: "main.py",
        constraints: &[
            "Use absolute imports only (never relative)",
            "Type hints required on all functions",
            "Follow PEP 8 style guidelines",
        ],
        naming_conventions: &[
            ("Modules", "snake_case.py"),
            ("Classes", "PascalCase"),
            ("Functions", "snake_case"),
            ("Constants", "UPPER_SNAKE_CASE"),
        ],
    },
    LanguageDefaults {
        language: "typescript",
        test_command: "npm test",
        format_command: Some("npm run format"),
        lint_command: Some("npm run lint"),
        build_command: Some("npm run build"),
        run_command: Some("npm start"),
        test_directory: "tests/",
        entry_point: "src/index.ts",
        constraints: &[
            "Use strict TypeScript configuration",
            "Prefer named exports over default exports",
            "Use explicit type annotations",
        ],
        naming_conventions: &[
            ("Files", "kebab-case.ts"),
            ("Components", "PascalCase.tsx"),
            ("Utilities", "camelCase.ts"),
            ("Types", "PascalCase"),
        ],
    },
    LanguageDefaults {
        language: "javascript",
        test_command: "npm test",
        format_command: Some("npm run format"),
        lint_command: Some("npm run lint"),
        build_command: Some("npm run build"),
        run_command: Some("npm start"),
        test_directory: "tests/",
        entry_point: "src/index.js",
        constraints: &["Use ESM imports/exports", "Use JSDoc for documentation"],
        naming_conventions: &[
            ("Files", "kebab-case.js"),
            ("Functions", "camelCase"),
            ("Constants", "UPPER_SNAKE_CASE"),
        ],
    },
    LanguageDefaults {
        language: "rust",
        test_command: "cargo test",
        format_command: Some("cargo fmt"),
        lint_command: Some("cargo clippy"),
        build_command: Some("cargo build"),
        run_command: Some("cargo run"),
        test_directory: "tests/",
        entry_point: "src/main.rs",
        constraints: &[
            "Run clippy before committing",
            "Use derive macros where appropriate",
            "Document public APIs",
        ],
        naming_conventions: &[
            ("Modules", "snake_case.rs"),
            ("Types", "PascalCase"),
            ("Functions", "snake_case"),
            ("Constants", "UPPER_SNAKE_CASE"),
        ],
    },
    LanguageDefaults {
        language: "go",
        test_command: "go test ./...",
        format_command: Some("go fmt ./..."),
        lint_command: Some("golangci-lint run"),
        build_command: Some("go build"),
        run_command: Some("go run ."),
        test_directory: "",
        entry_point: "main.go",
        constraints: &[
            "Run go fmt before committing",
            "Use gofmt/goimports",
            "Handle errors explicitly",
        ],
        naming_conventions: &[
            ("Files", "snake_case.go"),
            ("Packages", "lowercase"),
            ("Exported", "PascalCase"),
            ("Unexported", "camelCase"),
        ],
    },
    LanguageDefaults {
        language: "java",
        test_command: "mvn test",
        format_command: Some("mvn spotless:apply"),
        lint_command: Some("mvn checkstyle:check"),
        build_command: Some("mvn package"),
        run_command: Some("mvn exec:java"),
        test_directory: "src/test/java/",
        entry_point: "src/main/java/Main.java",
        constraints: &["Follow Java naming conventions", "Use Maven/Gradle build system"],
        naming_conventions: &[
            ("Classes", "PascalCase.java"),
            ("Packages", "lowercase"),
            ("Methods", "camelCase"),
            ("Constants", "UPPER_SNAKE_CASE"),
        ],
    },
];

/// Defaults for `language`, falling back to [`UNKNOWN`].
pub fn language_defaults(language: &str) -> &'static LanguageDefaults {
    let wanted = language.trim().to_lowercase();
    DEFAULTS
        .iter()
        .find(|defaults| defaults.language == wanted)
        .unwrap_or(&UNKNOWN)
}

/// Languages with their own defaults.
pub fn supported_languages() -> Vec<&'static str> {
    DEFAULTS.iter().map(|defaults| defaults.language).collect()
}

impl LanguageDefaults {
    /// Markdown block for directives.
    pub fn render(&self) -> String {
        let mut out = format!("### Language Defaults ({})\n\n", self.language);
        out.push_str(&format!("- **Test:** `{}`\n", self.test_command));
        for (label, command) in [
            ("Format", self.format_command),
            ("Lint", self.lint_command),
            ("Build", self.build_command),
            ("Run", self.run_command),
        ] {
            if let Some(command) = command {
                out.push_str(&format!("- **{label}:** `{command}`\n"));
            }
        }
        let tests = if self.test_directory.is_empty() {
            "alongside the code"
        } else {
            self.test_directory
        };
        out.push_str(&format!("- **Tests:** {tests}\n"));
        out.push_str(&format!("- **Entry point:** `{}`\n", self.entry_point));
        if !self.constraints.is_empty() {
            out.push_str("\n**Constraints:**\n");
            for constraint in self.constraints {
                out.push_str(&format!("- {constraint}\n"));
            }
        }
        if !self.naming_conventions.is_empty() {
            out.push_str("\n**Naming:**\n");
            for (what, convention) in self.naming_conventions {
                out.push_str(&format!("- {what}: {convention}\n"));
            }
        }
        out.trim_end().to_string()
    }
}
