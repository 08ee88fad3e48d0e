/*!
 * Luminosity-adaptive file splitting.
 *
 * Each file is cut into event ranges sized so that a job runs for about
 * `target_job_length` seconds. The time per event comes from the file's
 * average instantaneous luminosity looked up on the performance curve, or
 * from the static figures when no curve is available.
 */

use super::accumulator::{EmitReason, JobAccumulator};
use super::{SplitSession, SplittingStrategy};
use crate::error::{Result, SplitError};
use crate::job::JobGroup;
use crate::model::InputFile;
use lumisplit_core_perf::{EstimateSource, PerformanceEstimator, PerformanceParams};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Configuration of luminosity-adaptive file splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LumiAdaptiveConfig {
    /// Desired job wall time, in seconds
    #[serde(default = "default_target_job_length", alias = "targetJobLength")]
    pub target_job_length: f64,

    /// Static per-event figures, used when no curve matches
    #[serde(default)]
    pub performance: PerformanceParams,

    /// Dataset keying the performance curve
    #[serde(default)]
    pub dataset: Option<String>,

    /// Application version keying the performance curve
    #[serde(default, alias = "cmsswVersion")]
    pub cmssw_version: Option<String>,
}

impl Default for LumiAdaptiveConfig {
    fn default() -> Self {
        Self {
            target_job_length: default_target_job_length(),
            performance: PerformanceParams::default(),
            dataset: None,
            cmssw_version: None,
        }
    }
}

fn default_target_job_length() -> f64 {
    8.0 * 3600.0
}

impl LumiAdaptiveConfig {
    /// Performance curve key, when both halves are configured
    fn curve_key(&self) -> Option<(&str, &str)> {
        match (self.cmssw_version.as_deref(), self.dataset.as_deref()) {
            (Some(version), Some(dataset)) if !version.is_empty() && !dataset.is_empty() => {
                Some((version, dataset))
            }
            _ => None,
        }
    }

    /// One job per recorded attempt, replaying its exact range
    fn replay_attempts(&self, acc: &mut JobAccumulator, file: &InputFile) {
        for attempt in &file.failed_attempts {
            let Some(events) = attempt.events() else {
                warn!(
                    "Skipping attempt of {} with inverted event range {}..{}",
                    file.lfn, attempt.first_event, attempt.last_event
                );
                continue;
            };
            acc.add_file(file);
            acc.set_mask(attempt.lumis.clone(), events);
            acc.set_event_range(attempt.first_event, attempt.last_event);
            acc.set_input_override();
            acc.emit(EmitReason::Recovery);
        }
    }

    /// Slice a regular file into consecutive event ranges
    fn slice_file(
        &self,
        acc: &mut JobAccumulator,
        session: &mut SplitSession<'_>,
        estimator: &PerformanceEstimator,
        file: &InputFile,
    ) {
        let lumis = match file.lumi_list() {
            Ok(lumis) => lumis,
            Err(e) => {
                warn!("Skipping {}: {}", file.lfn, e);
                return;
            }
        };

        let lumi_curve = file
            .first_run()
            .and_then(|run| session.curves.lumi_curve(run.run));
        let perf_curve = self
            .curve_key()
            .and_then(|(version, dataset)| session.curves.performance_curve(version, dataset));

        let run_lumis = file
            .first_run()
            .map(|run| run.lumis.clone())
            .unwrap_or_default();
        let tpe = estimator.time_per_event(run_lumis, lumi_curve.as_deref(), perf_curve.as_deref());
        let params = estimator.params().with_time_per_event(tpe.seconds);
        let events_per_job = PerformanceEstimator::events_per_job(self.target_job_length, tpe.seconds);

        if tpe.source == EstimateSource::Static {
            debug!("{}: static time per event {:.3}s", file.lfn, tpe.seconds);
        }

        if file.events == 0 {
            acc.add_file(file);
            acc.set_mask(lumis, 0);
            acc.set_params(params);
            acc.emit(EmitReason::FileSlice);
            return;
        }

        let mut first = 0u64;
        while first < file.events {
            let count = events_per_job.min(file.events - first);
            acc.add_file(file);
            acc.set_mask(lumis.clone(), count);
            acc.set_event_range(first, first + count - 1);
            acc.set_params(params);
            acc.emit(EmitReason::FileSlice);
            first += count;
        }
        debug!(
            "{}: {} events in slices of {} ({:.3}s per event)",
            file.lfn, file.events, events_per_job, tpe.seconds
        );
    }
}

impl SplittingStrategy for LumiAdaptiveConfig {
    fn name(&self) -> &'static str {
        "LumiAdaptive"
    }

    fn validate(&self) -> Result<()> {
        if !(self.target_job_length.is_finite() && self.target_job_length > 0.0) {
            return Err(SplitError::config(format!(
                "target_job_length must be positive, got {}",
                self.target_job_length
            )));
        }
        Ok(())
    }

    fn split(&self, session: &mut SplitSession<'_>) -> Result<Vec<JobGroup>> {
        let subscription = session.subscription;
        let estimator = PerformanceEstimator::new(&self.performance);
        let mut acc = JobAccumulator::new(subscription.fileset.as_str(), estimator.params());

        for (locations, files) in subscription.files_by_location() {
            acc.open_group(locations);
            for file in files {
                if file.is_recovery_placeholder() {
                    self.replay_attempts(&mut acc, file);
                } else {
                    self.slice_file(&mut acc, session, &estimator, file);
                }
            }
            acc.close_group();
        }

        let stats = session.curves.stats();
        info!(
            "Curve lookups for {}: {} fetched, {} cached, {} failed",
            subscription.fileset, stats.fetches, stats.hits, stats.failures
        );
        Ok(acc.finish())
    }
}
