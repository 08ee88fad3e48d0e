/*!
 * Job splitting strategies and the splitter façade.
 *
 * A strategy turns one subscription snapshot into job groups. The set of
 * strategies is closed and selected by configuration through
 * [`SplitAlgorithm`]; every call to [`JobSplitter::split`] runs in a fresh
 * [`SplitSession`] so no state leaks between passes.
 */

pub mod accumulator;
pub mod event_aware;
pub mod lumi_adaptive;

pub use accumulator::{EmitReason, JobAccumulator, PileupTracker};
pub use event_aware::EventAwareLumiConfig;
pub use lumi_adaptive::LumiAdaptiveConfig;

use crate::config::SplitterConfig;
use crate::error::{Result, SplitError};
use crate::job::JobGroup;
use crate::mask::{JsonMaskSource, RecoveryMaskSource};
use crate::model::Subscription;
use lumisplit_core_perf::{CurveCache, LumiCurveSource, PerformanceCurveSource};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{error, info, warn};

/// Collaborators and caches available to a strategy during one pass
pub struct SplitSession<'a> {
    /// Read-only input snapshot
    pub subscription: &'a Subscription,

    /// Provider of recovery masks, if any
    pub recovery: Option<&'a dyn RecoveryMaskSource>,

    /// Curve lookups memoized for this pass
    pub curves: CurveCache<'a>,
}

/// Common interface of every splitting strategy
pub trait SplittingStrategy {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Reject bad configuration before any job exists
    fn validate(&self) -> Result<()>;

    /// Produce job groups for the session's subscription
    fn split(&self, session: &mut SplitSession<'_>) -> Result<Vec<JobGroup>>;
}

/// Splitting strategy selected by configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum SplitAlgorithm {
    /// Lumi-based packing towards an events-per-job target
    EventAwareLumiBased(EventAwareLumiConfig),
    /// Per-file event ranges sized from luminosity-dependent performance
    LumiAdaptive(LumiAdaptiveConfig),
}

impl Default for SplitAlgorithm {
    fn default() -> Self {
        SplitAlgorithm::EventAwareLumiBased(EventAwareLumiConfig::default())
    }
}

impl SplitAlgorithm {
    fn strategy(&self) -> &dyn SplittingStrategy {
        match self {
            SplitAlgorithm::EventAwareLumiBased(config) => config,
            SplitAlgorithm::LumiAdaptive(config) => config,
        }
    }
}

impl SplitAlgorithm {
    /// Whether passes fetch their lumi mask from a recovery source
    pub fn needs_recovery_source(&self) -> Result<bool> {
        match self {
            SplitAlgorithm::EventAwareLumiBased(config) => {
                Ok(config.mask_spec()?.needs_recovery_source())
            }
            SplitAlgorithm::LumiAdaptive(_) => Ok(false),
        }
    }
}

impl SplittingStrategy for SplitAlgorithm {
    fn name(&self) -> &'static str {
        self.strategy().name()
    }

    fn validate(&self) -> Result<()> {
        self.strategy().validate()
    }

    fn split(&self, session: &mut SplitSession<'_>) -> Result<Vec<JobGroup>> {
        self.strategy().split(session)
    }
}

/// Runs splitting passes for one configured algorithm
pub struct JobSplitter {
    algorithm: SplitAlgorithm,
    recovery: Option<Box<dyn RecoveryMaskSource>>,
    lumi_curves: Option<Rc<dyn LumiCurveSource>>,
    perf_curves: Option<Rc<dyn PerformanceCurveSource>>,
}

impl JobSplitter {
    pub fn new(algorithm: SplitAlgorithm) -> Self {
        Self {
            algorithm,
            recovery: None,
            lumi_curves: None,
            perf_curves: None,
        }
    }

    /// Build a splitter with the collaborators named in `config`
    pub fn from_config(config: &SplitterConfig) -> Result<Self> {
        config.algorithm.validate()?;
        let mut splitter = Self::new(config.algorithm.clone());

        match &config.recovery_dir {
            Some(dir) => splitter = splitter.with_recovery_source(JsonMaskSource::new(dir)),
            None if config.algorithm.needs_recovery_source()? => {
                return Err(SplitError::config(
                    "recovery collection configured but recovery_dir is not set",
                ));
            }
            None => {}
        }

        if config.curves.is_enabled() {
            #[cfg(feature = "http")]
            {
                match lumisplit_core_perf::HttpCurveSource::new(&config.curves) {
                    Ok(source) => splitter = splitter.with_curve_sources(source),
                    Err(e) => warn!("Curve service unavailable, using static estimates: {}", e),
                }
            }
            #[cfg(not(feature = "http"))]
            {
                warn!("Curve service configured but the http feature is disabled");
            }
        }

        Ok(splitter)
    }

    pub fn with_recovery_source<S: RecoveryMaskSource + 'static>(mut self, source: S) -> Self {
        self.recovery = Some(Box::new(source));
        self
    }

    /// Use one provider for both the luminosity and the performance curves
    pub fn with_curve_sources<S>(mut self, source: S) -> Self
    where
        S: LumiCurveSource + PerformanceCurveSource + 'static,
    {
        let source = Rc::new(source);
        let lumi: Rc<dyn LumiCurveSource> = source.clone();
        let perf: Rc<dyn PerformanceCurveSource> = source;
        self.lumi_curves = Some(lumi);
        self.perf_curves = Some(perf);
        self
    }

    pub fn algorithm(&self) -> &SplitAlgorithm {
        &self.algorithm
    }

    /// Run one pass over `subscription`.
    ///
    /// Configuration errors fail the call before any job exists. When the
    /// recovery mask cannot be obtained the pass is abandoned for this
    /// fileset and no jobs are returned.
    pub fn split(&self, subscription: &Subscription) -> Result<Vec<JobGroup>> {
        self.algorithm.validate()?;

        let mut session = SplitSession {
            subscription,
            recovery: self.recovery.as_deref(),
            curves: CurveCache::new(self.lumi_curves.as_deref(), self.perf_curves.as_deref()),
        };

        info!(
            "Splitting {} ({} files, {} events) with {}",
            subscription.fileset,
            subscription.files.len(),
            subscription.total_events(),
            self.algorithm.name()
        );

        match self.algorithm.split(&mut session) {
            Ok(groups) => {
                let jobs: usize = groups.iter().map(|g| g.jobs.len()).sum();
                let failed: usize = groups
                    .iter()
                    .flat_map(|g| g.jobs.iter())
                    .filter(|j| j.failed)
                    .count();
                info!(
                    "Created {} jobs ({} failed) in {} groups for {}",
                    jobs,
                    failed,
                    groups.len(),
                    subscription.fileset
                );
                Ok(groups)
            }
            Err(e) if e.aborts_fileset() => {
                error!(
                    "Abandoning pass for {} [{}]: {}",
                    subscription.fileset,
                    e.category(),
                    e
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InputFile, Run};
    use lumisplit_core_lumi::LumiList;

    struct FailingMasks;

    impl RecoveryMaskSource for FailingMasks {
        fn recovery_mask(&self, _collection: &str, _fileset: &str) -> Result<LumiList> {
            Err(SplitError::Io(std::io::Error::other("service down")))
        }
    }

    fn subscription() -> Subscription {
        Subscription::new("fs").with_file(
            InputFile::new("/store/a.root", 100)
                .with_location("T1")
                .with_run(Run::new(1, vec![1, 2])),
        )
    }

    #[test]
    fn test_algorithm_tagged_toml() {
        let algo: SplitAlgorithm = toml::from_str(
            r#"
            algorithm = "LumiAdaptive"
            target_job_length = 3600.0
            "#,
        )
        .unwrap();
        let SplitAlgorithm::LumiAdaptive(config) = &algo else {
            panic!("expected LumiAdaptive");
        };
        assert_eq!(config.target_job_length, 3600.0);
        assert_eq!(algo.name(), "LumiAdaptive");
    }

    #[test]
    fn test_default_algorithm() {
        assert_eq!(SplitAlgorithm::default().name(), "EventAwareLumiBased");
    }

    #[test]
    fn test_invalid_config_fails_before_jobs() {
        let splitter = JobSplitter::new(SplitAlgorithm::EventAwareLumiBased(
            EventAwareLumiConfig::with_events_per_job(0),
        ));
        assert!(matches!(
            splitter.split(&subscription()),
            Err(SplitError::Config(_))
        ));
    }

    #[test]
    fn test_recovery_failure_yields_no_jobs() {
        let config = EventAwareLumiConfig {
            collection_name: Some("ACDC_1".to_string()),
            ..Default::default()
        };
        let splitter = JobSplitter::new(SplitAlgorithm::EventAwareLumiBased(config))
            .with_recovery_source(FailingMasks);
        assert!(splitter.split(&subscription()).unwrap().is_empty());
    }

    #[test]
    fn test_recovery_without_source_is_fatal() {
        let config = EventAwareLumiConfig {
            collection_name: Some("ACDC_1".to_string()),
            ..Default::default()
        };
        let splitter = JobSplitter::new(SplitAlgorithm::EventAwareLumiBased(config));
        assert!(splitter.split(&subscription()).is_err());
    }

    #[test]
    fn test_from_config_requires_recovery_dir() {
        let algorithm = SplitAlgorithm::EventAwareLumiBased(EventAwareLumiConfig {
            collection_name: Some("ACDC_1".to_string()),
            ..Default::default()
        });
        let mut config = SplitterConfig {
            algorithm,
            ..Default::default()
        };
        assert!(matches!(
            JobSplitter::from_config(&config),
            Err(SplitError::Config(_))
        ));

        config.recovery_dir = Some("/data/acdc".into());
        assert!(JobSplitter::from_config(&config).is_ok());
        assert!(!SplitAlgorithm::default().needs_recovery_source().unwrap());
    }

    #[test]
    fn test_sessions_do_not_share_state() {
        let splitter = JobSplitter::new(SplitAlgorithm::default());
        let first = splitter.split(&subscription()).unwrap();
        let second = splitter.split(&subscription()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second[0].jobs[0].name, "fs-1");
    }
}
