//! Source language table and file classification.
//!
//! Files are matched by suffix against a fixed table first. Extension-less
//! files fall back to shebang sniffing when shell support is enabled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Supported source languages.
///
/// Variant order matches the lexicographic order of the ids, so the derived
/// `Ord` is the dispatch order used by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Python,
    Rust,
    Shell,
    TypeScript,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Go,
        Language::Python,
        Language::Rust,
        Language::Shell,
        Language::TypeScript,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Shell => "shell",
            Language::TypeScript => "typescript",
        }
    }

    /// Resolve a language id or one of its aliases.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "go" => Some(Language::Go),
            "python" | "py" | "python3" => Some(Language::Python),
            "rust" => Some(Language::Rust),
            "shell" | "bash" | "sh" => Some(Language::Shell),
            "typescript" | "ts" => Some(Language::TypeScript),
            _ => None,
        }
    }

    fn spec(self) -> &'static LanguageSpec {
        match self {
            Language::Go => &GO_SPEC,
            Language::Python => &PYTHON_SPEC,
            Language::Rust => &RUST_SPEC,
            Language::Shell => &SHELL_SPEC,
            Language::TypeScript => &TYPESCRIPT_SPEC,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_id(s).ok_or_else(|| format!("unsupported language: {}", s))
    }
}

/// Suffix rules for one language. All suffixes are lowercase.
struct LanguageSpec {
    suffixes: &'static [&'static str],
    test_suffixes: &'static [&'static str],
    test_prefixes: &'static [&'static str],
}

static GO_SPEC: LanguageSpec = LanguageSpec {
    suffixes: &[".go"],
    test_suffixes: &["_test.go"],
    test_prefixes: &[],
};

static PYTHON_SPEC: LanguageSpec = LanguageSpec {
    suffixes: &[".py"],
    test_suffixes: &["_test.py", ".test.py", ".spec.py"],
    test_prefixes: &["test_"],
};

static RUST_SPEC: LanguageSpec = LanguageSpec {
    suffixes: &[".rs"],
    test_suffixes: &["_test.rs"],
    test_prefixes: &[],
};

static SHELL_SPEC: LanguageSpec = LanguageSpec {
    suffixes: &[".sh", ".bash", ".bats"],
    test_suffixes: &[
        ".bats",
        "_test.sh",
        ".test.sh",
        ".spec.sh",
        "_test.bash",
        ".test.bash",
        ".spec.bash",
    ],
    test_prefixes: &["test_"],
};

static TYPESCRIPT_SPEC: LanguageSpec = LanguageSpec {
    suffixes: &[".ts", ".tsx", ".mts", ".cts"],
    test_suffixes: &[
        ".test.ts",
        ".test.tsx",
        ".test.mts",
        ".test.cts",
        ".spec.ts",
        ".spec.tsx",
        ".spec.mts",
        ".spec.cts",
    ],
    test_prefixes: &[],
};

impl LanguageSpec {
    fn is_test_name(&self, lower_name: &str) -> bool {
        self.test_suffixes.iter().any(|s| lower_name.ends_with(s))
            || self.test_prefixes.iter().any(|p| lower_name.starts_with(p))
    }
}

/// Result of classifying a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageMatch {
    pub language: Language,
    pub is_test: bool,
}

/// The set of languages enabled for one invocation, kept sorted and unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSet {
    enabled: Vec<Language>,
}

impl Default for LanguageSet {
    fn default() -> Self {
        Self::all()
    }
}

impl LanguageSet {
    pub fn all() -> Self {
        Self {
            enabled: Language::ALL.to_vec(),
        }
    }

    /// Build a set from a list. An empty list enables every language.
    pub fn new(languages: impl IntoIterator<Item = Language>) -> Self {
        let mut enabled: Vec<Language> = languages.into_iter().collect();
        if enabled.is_empty() {
            return Self::all();
        }
        enabled.sort();
        enabled.dedup();
        Self { enabled }
    }

    pub fn languages(&self) -> &[Language] {
        &self.enabled
    }

    pub fn contains(&self, language: Language) -> bool {
        self.enabled.contains(&language)
    }

    /// Classify a path by its basename suffix.
    pub fn match_path(&self, path: &str) -> Option<LanguageMatch> {
        let name = basename(path).to_ascii_lowercase();
        self.enabled.iter().find_map(|&language| {
            let spec = language.spec();
            spec.suffixes
                .iter()
                .any(|suffix| name.ends_with(suffix))
                .then(|| LanguageMatch {
                    language,
                    is_test: spec.is_test_name(&name),
                })
        })
    }

    /// Whether classifying this path depends on its first line: no suffix
    /// matches, the name has no extension and shell is enabled.
    pub fn sniffs(&self, rel_path: &str) -> bool {
        self.contains(Language::Shell)
            && !basename(rel_path).contains('.')
            && self.match_path(rel_path).is_none()
    }

    /// Classify a file on disk: suffix rules first, then shebang sniffing for
    /// extension-less files.
    pub fn detect(&self, abs_path: &Path, rel_path: &str) -> std::io::Result<Option<LanguageMatch>> {
        if let Some(found) = self.match_path(rel_path) {
            return Ok(Some(found));
        }
        if !self.sniffs(rel_path) {
            return Ok(None);
        }

        let name = basename(rel_path).to_ascii_lowercase();
        match read_shebang_program(abs_path)?.as_deref() {
            Some("sh") | Some("bash") => Ok(Some(LanguageMatch {
                language: Language::Shell,
                is_test: SHELL_SPEC.is_test_name(&name),
            })),
            _ => Ok(None),
        }
    }
}

/// Interpreter named on a `#!` line, following `env` indirection.
pub fn parse_shebang(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("#!")?;
    let mut fields = rest.split_whitespace();
    let mut program = basename(fields.next()?);
    if program == "env" {
        program = fields.find(|f| !f.starts_with('-')).map(basename)?;
    }
    let program = program.trim().to_ascii_lowercase();
    (!program.is_empty()).then_some(program)
}

fn read_shebang_program(path: &Path) -> std::io::Result<Option<String>> {
    let mut buf = [0u8; 256];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let head = &buf[..filled];
    let line_end = head.iter().position(|&b| b == b'\n').unwrap_or(head.len());
    let line = String::from_utf8_lossy(&head[..line_end]);
    Ok(parse_shebang(&line))
}

/// Most frequent language among the given tags; ties go to the smallest id.
pub fn dominant_language(languages: impl IntoIterator<Item = Language>) -> Option<Language> {
    let mut counts = [0usize; Language::ALL.len()];
    for language in languages {
        counts[language as usize] += 1;
    }
    Language::ALL
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .fold(None, |best: Option<(Language, usize)>, (&language, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((language, count)),
        })
        .map(|(language, _)| language)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
