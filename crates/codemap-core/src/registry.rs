//! Dispatch of planned units to per-language extractors.
//!
//! Each present language is planned, checked against the analysis cache by
//! fingerprint, and only the changed units are analyzed on the worker pool.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::cache::{AnalysisCache, AnalysisScope, CacheState, CachedPackage};
use crate::concerns::build_concerns;
use crate::config::Options;
use crate::errors::{CodemapError, Result};
use crate::extract::{Extractor, LanguageExtractor, UnitContext};
use crate::language::{Language, LanguageSet};
use crate::model::{sort_packages, Concern, Package};
use crate::parallel::{CancellationToken, WorkerPool};
use crate::planner::{build_plans, PackagePlan};
use crate::snapshot::Snapshot;

/// Language used when the tree holds no supported source at all
pub const FALLBACK_LANGUAGE: Language = Language::Go;

/// Extractors keyed by language, iterated in id order
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<Language, Extractor>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::for_languages(&LanguageSet::all())
    }
}

/// Per-run unit counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    /// Units served from the analysis cache
    pub reused: usize,
    /// Units handed to an extractor
    pub analyzed: usize,
    /// Units whose analysis failed and were left out
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub packages: Vec<Package>,
    pub concerns: Vec<Concern>,
    /// Cache to persist for the next run
    pub analysis: AnalysisCache,
    pub stats: AnalysisStats,
}

enum UnitOutcome {
    Analyzed(Package),
    Empty,
    Failed,
}

impl ExtractorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            extractors: BTreeMap::new(),
        }
    }

    pub fn for_languages(languages: &LanguageSet) -> Self {
        let mut registry = Self::new();
        for &language in languages.languages() {
            registry.register(Extractor::for_language(language));
        }
        registry
    }

    /// Register an extractor, replacing any previous one for its language
    pub fn register(&mut self, extractor: Extractor) {
        self.extractors.insert(extractor.language(), extractor);
    }

    pub fn extractor_for(&self, language: Language) -> Option<&Extractor> {
        self.extractors.get(&language)
    }

    pub fn language_ids(&self) -> Vec<&'static str> {
        self.extractors.keys().map(|l| l.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Registered languages present in the snapshot, or the fallback
    fn languages_to_run(&self, snapshot: &Snapshot) -> Result<Vec<Language>> {
        let Some(&first) = self.extractors.keys().next() else {
            return Err(CodemapError::NoExtractors);
        };
        let present: Vec<Language> = snapshot
            .languages_present()
            .into_iter()
            .filter(|l| self.extractors.contains_key(l))
            .collect();
        if !present.is_empty() {
            return Ok(present);
        }

        let fallback = if self.extractors.contains_key(&FALLBACK_LANGUAGE) {
            FALLBACK_LANGUAGE
        } else {
            first
        };
        debug!("No supported language present, falling back to {}", fallback.id());
        Ok(vec![fallback])
    }

    /// Analyze every unit of every present language.
    ///
    /// Units whose fingerprint matches `prior` are reused without running
    /// their extractor. A failing unit is logged and left out; cancellation
    /// aborts the whole call.
    pub fn analyze(
        &self,
        snapshot: &Snapshot,
        state: &CacheState,
        prior: Option<&AnalysisCache>,
        options: &Options,
        pool: WorkerPool,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome> {
        let languages = self.languages_to_run(snapshot)?;
        let scope = AnalysisScope {
            include_tests: options.include_tests,
            large_package_files: options.large_package_files,
        };
        let entries = state.entries_by_path();

        let mut analysis = AnalysisCache::new(scope);
        let mut stats = AnalysisStats::default();
        let mut packages = Vec::new();
        let mut concerns: Option<Vec<Concern>> = None;

        for language in languages {
            cancel.check()?;
            let Some(extractor) = self.extractors.get(&language) else {
                continue;
            };

            let module_path = extractor.module_path(&snapshot.root);
            let plans = build_plans(snapshot, language, options.include_tests, &entries);
            let cached = prior
                .map(|p| p.packages_for(scope, language, &module_path))
                .unwrap_or_default();

            let mut results: Vec<Option<CachedPackage>> = vec![None; plans.len()];
            let mut jobs: Vec<(usize, PackagePlan)> = Vec::new();
            for (index, plan) in plans.into_iter().enumerate() {
                match cached.get(plan.rel_path.as_str()) {
                    Some(hit) if !plan.fingerprint.is_empty() && hit.fingerprint == plan.fingerprint => {
                        stats.reused += 1;
                        results[index] = Some((*hit).clone());
                    }
                    _ => jobs.push((index, plan)),
                }
            }
            stats.analyzed += jobs.len();

            let ctx = UnitContext {
                root: &snapshot.root,
                module_path: &module_path,
                large_package_files: options.large_package_files,
            };
            let analyzed = pool.run(jobs, cancel, |(index, plan)| {
                let outcome = match extractor.analyze(&ctx, &plan) {
                    Ok(Some(package)) => UnitOutcome::Analyzed(package),
                    Ok(None) => UnitOutcome::Empty,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!("Skipping {} unit {}: {}", language.id(), plan.rel_path, e);
                        UnitOutcome::Failed
                    }
                };
                Ok((index, plan, outcome))
            })?;

            for (index, plan, outcome) in analyzed {
                match outcome {
                    UnitOutcome::Analyzed(package) => {
                        results[index] = Some(CachedPackage {
                            relative_path: plan.rel_path,
                            fingerprint: plan.fingerprint,
                            file_rel_paths: plan.files,
                            package,
                        });
                    }
                    UnitOutcome::Empty => {}
                    UnitOutcome::Failed => stats.skipped += 1,
                }
            }

            let results: Vec<CachedPackage> = results.into_iter().flatten().collect();
            packages.extend(results.iter().map(|r| r.package.clone()));
            let section: Vec<CachedPackage> = results
                .into_iter()
                .filter(|r| !r.fingerprint.is_empty())
                .collect();
            analysis.set_section(language, module_path, section);

            if concerns.is_none() {
                concerns = Some(build_concerns(
                    snapshot,
                    &options.concerns,
                    options.concern_example_limit,
                ));
            }
        }

        info!(
            "Analyzed {} units ({} reused, {} skipped)",
            stats.analyzed, stats.reused, stats.skipped
        );
        sort_packages(&mut packages);
        Ok(AnalysisOutcome {
            packages,
            concerns: concerns.unwrap_or_default(),
            analysis,
            stats,
        })
    }
}
