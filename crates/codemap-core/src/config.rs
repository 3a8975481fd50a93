use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{CodemapError, Result};
use crate::language::{Language, LanguageSet};

/// Default config file looked up in the project root
pub const CONFIG_FILE_NAME: &str = "codemap.yaml";

/// A named cross-cutting file grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcernDef {
    pub name: String,

    #[serde(default)]
    pub patterns: Vec<String>,
}

impl ConcernDef {
    pub fn new(name: &str, patterns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

pub fn default_concerns() -> Vec<ConcernDef> {
    vec![
        ConcernDef::new("Error Handling", &["**/error*.go", "**/recovery*.go"]),
        ConcernDef::new("Testing", &["**/*_test.go"]),
        ConcernDef::new("CLI", &["cmd/**/*.go", "**/cli_*.go"]),
        ConcernDef::new("Configuration", &["**/config*.go", "**/options*.go"]),
    ]
}

/// Options that control indexing, analysis and output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Root of the tree to index (default: current directory)
    pub project_root: PathBuf,

    /// Markdown output, relative to the root (default: CODEMAP.md)
    pub output_path: String,

    /// Tab-separated paths output, relative to the root (default: CODEMAP.paths)
    pub paths_output_path: String,

    /// Hot-path cache file (default: .codemap.state.bin)
    pub state_path: String,

    /// Units with at least this many files get per-file detail (default: 10)
    pub large_package_files: usize,

    /// Analyze test files too (default: false)
    pub include_tests: bool,

    /// Skip the paths output (default: false)
    pub disable_paths: bool,

    pub concerns: Vec<ConcernDef>,

    /// Number of example files kept per concern (default: 0)
    pub concern_example_limit: usize,

    /// Language ids or aliases to index; empty means all
    pub languages: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            output_path: "CODEMAP.md".to_string(),
            paths_output_path: "CODEMAP.paths".to_string(),
            state_path: ".codemap.state.bin".to_string(),
            large_package_files: 10,
            include_tests: false,
            disable_paths: false,
            concerns: default_concerns(),
            concern_example_limit: 0,
            languages: Vec::new(),
        }
    }
}

/// Values supplied on the command line, layered over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub project_root: Option<PathBuf>,
    pub output_path: Option<String>,
    pub paths_output_path: Option<String>,
    pub state_path: Option<String>,
    pub large_package_files: Option<usize>,
    pub include_tests: Option<bool>,
    pub disable_paths: Option<bool>,
    pub languages: Option<Vec<String>>,
}

impl Options {
    /// Load options from a YAML (or JSON) file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| CodemapError::io(path, e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| CodemapError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the default options to a file
    pub fn init_file(path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(&Options::default())
            .map_err(|e| CodemapError::Config(e.to_string()))?;
        std::fs::write(path, yaml).map_err(|e| CodemapError::io(path, e))
    }

    pub fn merge(&mut self, overrides: &CliOverrides) {
        if let Some(root) = &overrides.project_root {
            self.project_root = root.clone();
        }
        if let Some(path) = &overrides.output_path {
            self.output_path = path.clone();
        }
        if let Some(path) = &overrides.paths_output_path {
            self.paths_output_path = path.clone();
        }
        if let Some(path) = &overrides.state_path {
            self.state_path = path.clone();
        }
        if let Some(large) = overrides.large_package_files {
            self.large_package_files = large;
        }
        if let Some(include) = overrides.include_tests {
            self.include_tests = include;
        }
        if let Some(disable) = overrides.disable_paths {
            self.disable_paths = disable;
        }
        if let Some(languages) = &overrides.languages {
            self.languages = languages.clone();
        }
    }

    pub fn language_set(&self) -> Result<LanguageSet> {
        let languages = self
            .languages
            .iter()
            .map(|id| {
                Language::from_id(id)
                    .ok_or_else(|| CodemapError::Config(format!("unsupported language: {}", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LanguageSet::new(languages))
    }

    /// Analysis cache path derived from the state path:
    /// `.codemap.state.bin` becomes `.codemap.state.analysis.bin`.
    pub fn analysis_state_path(&self) -> String {
        analysis_path_for(&self.state_path)
    }

    /// Root-level names the tool itself writes; excluded from root entry comparison.
    pub fn ignored_root_entries(&self) -> Vec<String> {
        let mut paths = vec![self.output_path.clone()];
        if !self.disable_paths {
            paths.push(self.paths_output_path.clone());
        }
        paths.push(self.state_path.clone());
        paths.push(self.analysis_state_path());

        let mut names: Vec<String> = paths
            .iter()
            .filter_map(|p| {
                let p = p.trim_start_matches("./");
                (!p.is_empty() && !p.contains('/')).then(|| p.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn analysis_path_for(state_path: &str) -> String {
    let (dir, name) = match state_path.rfind('/') {
        Some(idx) => state_path.split_at(idx + 1),
        None => ("", state_path),
    };
    // A leading dot marks a hidden file, not an extension.
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}{}.analysis{}", dir, &name[..idx], &name[idx..]),
        _ => format!("{}.analysis", state_path),
    }
}

/// Join a configured path onto the root unless it is already absolute.
pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}
