use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{CacheError, Result, ANALYSIS_CACHE_VERSION};
use crate::language::Language;
use crate::model::Package;

/// Analysis result of one unit, valid while its fingerprint is unchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPackage {
    pub relative_path: String,
    pub fingerprint: String,
    pub file_rel_paths: Vec<String>,
    pub package: Package,
}

/// Cached units of one language, keyed by that language's namespace
/// (Go module path, or the language id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub language: Language,
    pub module_path: String,
    pub packages: Vec<CachedPackage>,
}

/// Options that change analysis output. Cached units are reused only when
/// every field matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisScope {
    pub include_tests: bool,
    pub large_package_files: usize,
}

/// Colder cache of per-unit analysis results, persisted apart from the
/// hot-path state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCache {
    pub version: u32,
    pub include_tests: bool,
    pub large_package_files: usize,
    pub sections: Vec<AnalysisSection>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self {
            version: ANALYSIS_CACHE_VERSION,
            include_tests: false,
            large_package_files: 0,
            sections: Vec::new(),
        }
    }
}

impl AnalysisCache {
    pub fn new(scope: AnalysisScope) -> Self {
        Self {
            version: ANALYSIS_CACHE_VERSION,
            include_tests: scope.include_tests,
            large_package_files: scope.large_package_files,
            sections: Vec::new(),
        }
    }

    pub fn is_version_compatible(&self) -> bool {
        self.version == ANALYSIS_CACHE_VERSION
    }

    pub fn matches_scope(&self, scope: AnalysisScope) -> bool {
        self.is_version_compatible()
            && self.include_tests == scope.include_tests
            && self.large_package_files == scope.large_package_files
    }

    /// Cached units for `language`, empty unless the scope and namespace
    /// both match exactly
    pub fn packages_for(
        &self,
        scope: AnalysisScope,
        language: Language,
        module_path: &str,
    ) -> FxHashMap<&str, &CachedPackage> {
        if !self.matches_scope(scope) {
            return FxHashMap::default();
        }
        self.sections
            .iter()
            .filter(|s| s.language == language && s.module_path == module_path)
            .flat_map(|s| s.packages.iter())
            .map(|p| (p.relative_path.as_str(), p))
            .collect()
    }

    /// Replace the section for `language`
    pub fn set_section(&mut self, language: Language, module_path: String, packages: Vec<CachedPackage>) {
        self.sections.retain(|s| s.language != language);
        self.sections.push(AnalysisSection {
            language,
            module_path,
            packages,
        });
        self.sections.sort_by_key(|s| s.language);
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.packages.is_empty())
    }

    pub fn package_count(&self) -> usize {
        self.sections.iter().map(|s| s.packages.len()).sum()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(CacheError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cache: AnalysisCache = bincode::deserialize(bytes)?;
        if !cache.is_version_compatible() {
            return Err(CacheError::VersionMismatch {
                expected: ANALYSIS_CACHE_VERSION,
                found: cache.version,
            });
        }
        for section in &mut cache.sections {
            section
                .packages
                .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        }
        Ok(cache)
    }
}
