//! Cross-cutting file groupings matched by glob patterns.

use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::ConcernDef;
use crate::model::Concern;
use crate::snapshot::Snapshot;

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled concern pattern
#[derive(Debug, Clone)]
pub enum ConcernMatcher {
    /// `prefix/**/suffix`: anything under `prefix` whose file name matches `suffix`
    Recursive {
        prefix: String,
        suffix: Option<Pattern>,
    },
    /// A plain glob over the whole relative path; `*` stops at `/`
    Path(Pattern),
}

impl ConcernMatcher {
    /// `None` for malformed globs and patterns with more than one `**`
    pub fn compile(pattern: &str) -> Option<Self> {
        let normalized = pattern.replace('\\', "/");
        let parts: Vec<&str> = normalized.split("**").collect();
        match parts.as_slice() {
            [whole] => Pattern::new(whole).ok().map(ConcernMatcher::Path),
            [prefix, suffix] => {
                let suffix = suffix.trim_start_matches('/');
                let suffix = if suffix.is_empty() {
                    None
                } else {
                    Some(Pattern::new(suffix).ok()?)
                };
                Some(ConcernMatcher::Recursive {
                    prefix: prefix.trim_end_matches('/').to_string(),
                    suffix,
                })
            }
            _ => None,
        }
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        match self {
            ConcernMatcher::Recursive { prefix, suffix } => {
                if !prefix.is_empty()
                    && rel_path != prefix
                    && !rel_path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
                {
                    return false;
                }
                match suffix {
                    None => true,
                    Some(pattern) => {
                        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
                        pattern.matches_with(name, PATH_MATCH)
                    }
                }
            }
            ConcernMatcher::Path(pattern) => pattern.matches_with(rel_path, PATH_MATCH),
        }
    }
}

/// Evaluate every concern over the whole snapshot.
///
/// Concerns without matching files are dropped. At most `example_limit`
/// sorted example paths are kept per concern.
pub fn build_concerns(snapshot: &Snapshot, defs: &[ConcernDef], example_limit: usize) -> Vec<Concern> {
    let mut concerns = Vec::new();

    for def in defs {
        let matchers: Vec<ConcernMatcher> = def
            .patterns
            .iter()
            .filter_map(|p| {
                let matcher = ConcernMatcher::compile(p);
                if matcher.is_none() {
                    debug!("Skipping unsupported concern pattern {:?}", p);
                }
                matcher
            })
            .collect();
        if matchers.is_empty() {
            continue;
        }

        let matched: BTreeSet<&str> = snapshot
            .files
            .iter()
            .map(|f| f.rel_path.as_str())
            .filter(|rel| matchers.iter().any(|m| m.matches(rel)))
            .collect();
        if matched.is_empty() {
            continue;
        }

        concerns.push(Concern {
            name: def.name.clone(),
            patterns: def.patterns.clone(),
            files: matched
                .iter()
                .take(example_limit)
                .map(|s| s.to_string())
                .collect(),
            total_files: matched.len(),
        });
    }

    concerns
}
