//! Compiles filter strings into literal or regex predicates.
//!
//! Regex predicates run on the `regex` crate's linear-time engine, and the
//! compiled program size is capped, so a hostile pattern can neither blow up
//! compilation nor backtrack catastrophically. Compiled predicates are cached
//! per `(mode, pattern)`; failures are never cached.

use crate::metrics_defs::{
    PREDICATE_CACHE_HIT, PREDICATE_CACHE_MISS, PREDICATE_COMPILE_ERRORS, PREDICATE_SLOW_MATCHES,
};
use moka::sync::Cache;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use shared::counter;
use std::time::{Duration, Instant};

/// Nominal time budget of a single match. Overruns are counted, not aborted.
pub const MATCH_BUDGET: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Case-insensitive substring containment.
    Literal,
    Regex,
}

impl MatchMode {
    pub fn from_regex_flag(is_regex: bool) -> Self {
        if is_regex {
            MatchMode::Regex
        } else {
            MatchMode::Literal
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("could not compile filter `{pattern}`: {source}")]
pub struct PredicateError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Clone, Debug)]
pub enum Predicate {
    Literal(String),
    Regex(Regex),
}

impl Predicate {
    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            Predicate::Literal(needle) => candidate.to_lowercase().contains(needle.as_str()),
            Predicate::Regex(regex) => {
                let started = Instant::now();
                let matched = regex.is_match(candidate);
                let elapsed = started.elapsed();
                if elapsed > MATCH_BUDGET {
                    counter!(PREDICATE_SLOW_MATCHES).increment(1);
                    tracing::warn!(
                        pattern = regex.as_str(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Regex match exceeded its time budget"
                    );
                }
                matched
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredicateConfig {
    /// Number of compiled predicates kept around.
    pub cache_capacity: u64,
    /// Upper bound, in bytes, of a compiled regex and of its lazy DFA cache.
    pub size_limit: usize,
}

impl Default for PredicateConfig {
    fn default() -> Self {
        PredicateConfig {
            cache_capacity: 1024,
            size_limit: 1 << 20,
        }
    }
}

pub struct PredicateCompiler {
    cache: Cache<(MatchMode, String), Predicate>,
    size_limit: usize,
}

impl PredicateCompiler {
    pub fn new(config: &PredicateConfig) -> Self {
        PredicateCompiler {
            cache: Cache::builder().max_capacity(config.cache_capacity).build(),
            size_limit: config.size_limit,
        }
    }

    pub fn compile(&self, pattern: &str, mode: MatchMode) -> Result<Predicate, PredicateError> {
        let key = (mode, pattern.to_string());
        if let Some(predicate) = self.cache.get(&key) {
            counter!(PREDICATE_CACHE_HIT).increment(1);
            return Ok(predicate);
        }
        counter!(PREDICATE_CACHE_MISS).increment(1);

        let predicate = match mode {
            MatchMode::Literal => Predicate::Literal(pattern.to_lowercase()),
            MatchMode::Regex => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .size_limit(self.size_limit)
                .dfa_size_limit(self.size_limit)
                .build()
                .map(Predicate::Regex)
                .map_err(|source| {
                    counter!(PREDICATE_COMPILE_ERRORS).increment(1);
                    PredicateError {
                        pattern: pattern.to_string(),
                        source,
                    }
                })?,
        };

        self.cache.insert(key, predicate.clone());
        Ok(predicate)
    }

    #[cfg(test)]
    fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for PredicateCompiler {
    fn default() -> Self {
        PredicateCompiler::new(&PredicateConfig::default())
    }
}
