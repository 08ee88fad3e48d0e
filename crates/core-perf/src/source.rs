//! Curve providers and the per-pass curve cache

use crate::curve::{LumiCurve, PerformanceCurve};
use crate::error::{PerfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Environment variable consulted when no token is configured
pub const AUTH_TOKEN_ENV: &str = "LUMISPLIT_AUTH_TOKEN";

/// Endpoints and credentials for the curve services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveServiceConfig {
    /// Base URL of the luminosity service; the run number is appended as a path segment
    #[serde(default)]
    pub lumi_url: Option<String>,

    /// URL of the performance service; `version` and `dataset` are sent as query parameters
    #[serde(default)]
    pub perf_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bearer token. Falls back to `LUMISPLIT_AUTH_TOKEN`.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CurveServiceConfig {
    fn default() -> Self {
        Self {
            lumi_url: None,
            perf_url: None,
            timeout_secs: default_timeout_secs(),
            auth_token: None,
        }
    }
}

impl CurveServiceConfig {
    /// Whether any curve endpoint is configured
    pub fn is_enabled(&self) -> bool {
        self.lumi_url.is_some() || self.perf_url.is_some()
    }
}

/// Supplies per-lumi integrated luminosity for a run
pub trait LumiCurveSource {
    fn lumi_curve(&self, run: u32) -> Result<LumiCurve>;
}

/// Supplies luminosity-vs-time-per-event curves per application version and dataset
pub trait PerformanceCurveSource {
    fn performance_curve(&self, version: &str, dataset: &str) -> Result<PerformanceCurve>;
}

/// Curves held in memory, for offline use and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryCurves {
    lumi: HashMap<u32, LumiCurve>,
    performance: HashMap<(String, String), PerformanceCurve>,
}

impl InMemoryCurves {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lumi_curve(mut self, curve: LumiCurve) -> Self {
        self.lumi.insert(curve.run, curve);
        self
    }

    pub fn with_performance_curve(
        mut self,
        version: impl Into<String>,
        dataset: impl Into<String>,
        curve: PerformanceCurve,
    ) -> Self {
        self.performance
            .insert((version.into(), dataset.into()), curve);
        self
    }
}

impl LumiCurveSource for InMemoryCurves {
    fn lumi_curve(&self, run: u32) -> Result<LumiCurve> {
        self.lumi
            .get(&run)
            .cloned()
            .ok_or_else(|| PerfError::Service(format!("no luminosity data for run {}", run)))
    }
}

impl PerformanceCurveSource for InMemoryCurves {
    fn performance_curve(&self, version: &str, dataset: &str) -> Result<PerformanceCurve> {
        self.performance
            .get(&(version.to_string(), dataset.to_string()))
            .cloned()
            .ok_or_else(|| {
                PerfError::Service(format!(
                    "no performance data for {} / {}",
                    version, dataset
                ))
            })
    }
}

/// Counters kept by a [`CurveCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub fetches: u64,
    pub hits: u64,
    pub failures: u64,
}

/// Memoizes curve lookups for the lifetime of one splitting pass.
///
/// Failures are cached as misses too, so a broken service is asked at most
/// once per key per pass.
pub struct CurveCache<'a> {
    lumi_source: Option<&'a dyn LumiCurveSource>,
    perf_source: Option<&'a dyn PerformanceCurveSource>,
    lumi: HashMap<u32, Option<Rc<LumiCurve>>>,
    performance: HashMap<(String, String), Option<Rc<PerformanceCurve>>>,
    stats: CacheStats,
}

impl<'a> CurveCache<'a> {
    pub fn new(
        lumi_source: Option<&'a dyn LumiCurveSource>,
        perf_source: Option<&'a dyn PerformanceCurveSource>,
    ) -> Self {
        Self {
            lumi_source,
            perf_source,
            lumi: HashMap::new(),
            performance: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Cache with no sources; every lookup misses
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn lumi_curve(&mut self, run: u32) -> Option<Rc<LumiCurve>> {
        if self.lumi.contains_key(&run) {
            self.stats.hits += 1;
        } else {
            let fetched = match self.lumi_source {
                Some(source) => {
                    self.stats.fetches += 1;
                    match source.lumi_curve(run) {
                        Ok(curve) if !curve.is_empty() => {
                            debug!(
                                "Fetched luminosity curve for run {} ({} lumis)",
                                run,
                                curve.len()
                            );
                            Some(Rc::new(curve))
                        }
                        Ok(_) => {
                            self.stats.failures += 1;
                            warn!("Empty luminosity curve for run {}", run);
                            None
                        }
                        Err(e) => {
                            self.stats.failures += 1;
                            warn!("Luminosity curve fetch failed for run {}: {}", run, e);
                            None
                        }
                    }
                }
                None => None,
            };
            self.lumi.insert(run, fetched);
        }
        self.lumi.get(&run).cloned().flatten()
    }

    pub fn performance_curve(
        &mut self,
        version: &str,
        dataset: &str,
    ) -> Option<Rc<PerformanceCurve>> {
        let key = (version.to_string(), dataset.to_string());
        if self.performance.contains_key(&key) {
            self.stats.hits += 1;
        } else {
            let fetched = match self.perf_source {
                Some(source) => {
                    self.stats.fetches += 1;
                    match source.performance_curve(version, dataset) {
                        Ok(curve) if !curve.is_empty() => Some(Rc::new(curve)),
                        Ok(_) => {
                            self.stats.failures += 1;
                            warn!("Empty performance curve for {} / {}", version, dataset);
                            None
                        }
                        Err(e) => {
                            self.stats.failures += 1;
                            warn!(
                                "Performance curve fetch failed for {} / {}: {}",
                                version, dataset, e
                            );
                            None
                        }
                    }
                }
                None => None,
            };
            self.performance.insert(key.clone(), fetched);
        }
        self.performance.get(&key).cloned().flatten()
    }
}
