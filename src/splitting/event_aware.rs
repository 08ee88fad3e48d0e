/*!
 * Event-aware lumi-based splitting.
 *
 * Lumis are packed into jobs until the estimated event total is as close as
 * possible to `events_per_job`. Jobs also break on run changes, optionally
 * on file changes, and never carry a lumi that alone would exceed the job
 * time limit; such a lumi becomes its own pre-failed job.
 *
 * Per-lumi events are an estimate: a file's events spread evenly over its
 * lumis unless the file records per-lumi counts.
 */

use super::accumulator::{EmitReason, JobAccumulator};
use super::{SplitSession, SplittingStrategy};
use crate::error::{Result, SplitError};
use crate::job::JobGroup;
use crate::mask::MaskSpec;
use crate::model::InputFile;
use lumisplit_core_lumi::LumiList;
use lumisplit_core_perf::PerformanceParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Configuration of event-aware lumi splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAwareLumiConfig {
    /// Target events per job; must be positive
    #[serde(default = "default_events_per_job")]
    pub events_per_job: i64,

    /// Longest a job may run, in seconds
    #[serde(default = "default_job_time_limit")]
    pub job_time_limit: f64,

    /// Cap on events billed in one pass (0 = unbounded)
    #[serde(default)]
    pub total_events: u64,

    /// Start a new job whenever the input file changes
    #[serde(default)]
    pub halt_job_on_file_boundaries: bool,

    /// Start a new job whenever the run changes
    #[serde(default = "default_true", alias = "splitOnRun")]
    pub split_on_run: bool,

    /// Recovery collection whose mask selects the lumis to redo
    #[serde(default, alias = "collectionName")]
    pub collection_name: Option<String>,

    /// Explicit runs, parallel to `lumis`
    #[serde(default)]
    pub runs: Vec<u32>,

    /// Comma-separated lumi range bounds, one string per entry of `runs`
    #[serde(default)]
    pub lumis: Vec<String>,

    /// Only these runs are eligible
    #[serde(default, alias = "runWhitelist")]
    pub run_whitelist: Vec<u32>,

    /// Attach parent files to job inputs
    #[serde(default)]
    pub include_parents: bool,

    /// Give every job a disjoint pileup skip count
    #[serde(default, alias = "deterministicPileup")]
    pub deterministic_pileup: bool,

    /// Static per-event figures
    #[serde(default)]
    pub performance: PerformanceParams,
}

impl Default for EventAwareLumiConfig {
    fn default() -> Self {
        Self {
            events_per_job: default_events_per_job(),
            job_time_limit: default_job_time_limit(),
            total_events: 0,
            halt_job_on_file_boundaries: false,
            split_on_run: true,
            collection_name: None,
            runs: Vec::new(),
            lumis: Vec::new(),
            run_whitelist: Vec::new(),
            include_parents: false,
            deterministic_pileup: false,
            performance: PerformanceParams::default(),
        }
    }
}

fn default_events_per_job() -> i64 {
    5000
}

fn default_job_time_limit() -> f64 {
    48.0 * 3600.0
}

fn default_true() -> bool {
    true
}

impl EventAwareLumiConfig {
    pub fn with_events_per_job(events_per_job: i64) -> Self {
        Self {
            events_per_job,
            ..Default::default()
        }
    }

    pub fn mask_spec(&self) -> Result<MaskSpec> {
        MaskSpec::from_config(
            self.collection_name.as_deref(),
            &self.runs,
            &self.lumis,
            &self.run_whitelist,
        )
    }

    fn target(&self) -> u64 {
        self.events_per_job.max(1) as u64
    }
}

/// Lumi bookkeeping for one location
struct LocationLumis<'s> {
    /// Eligible files with their masked lumis, sorted by LFN
    files: Vec<(&'s InputFile, LumiList)>,
    /// Estimated events per pair, summed over every file holding it
    events: HashMap<(u32, u32), u64>,
    /// Every file holding a pair
    holders: HashMap<(u32, u32), Vec<&'s InputFile>>,
}

impl<'s> LocationLumis<'s> {
    fn build(files: &[&'s InputFile], mask: Option<&LumiList>) -> Self {
        let mut out = LocationLumis {
            files: Vec::new(),
            events: HashMap::new(),
            holders: HashMap::new(),
        };

        for &file in files {
            let lumis = match file.lumi_list() {
                Ok(lumis) => lumis,
                Err(e) => {
                    warn!("Skipping {}: {}", file.lfn, e);
                    continue;
                }
            };
            let masked = match mask {
                Some(mask) => lumis.intersect(mask),
                None => lumis,
            };
            if masked.is_empty() {
                debug!("Skipping {}: no eligible lumis", file.lfn);
                continue;
            }

            let estimates = file.lumi_event_estimates();
            for pair in masked.pairs() {
                *out.events.entry(pair).or_insert(0) += estimates.get(&pair).copied().unwrap_or(0);
                out.holders.entry(pair).or_default().push(file);
            }
            out.files.push((file, masked));
        }
        out
    }
}

impl SplittingStrategy for EventAwareLumiConfig {
    fn name(&self) -> &'static str {
        "EventAwareLumiBased"
    }

    fn validate(&self) -> Result<()> {
        if self.events_per_job <= 0 {
            return Err(SplitError::config(format!(
                "events_per_job must be positive, got {}",
                self.events_per_job
            )));
        }
        if !(self.job_time_limit.is_finite() && self.job_time_limit > 0.0) {
            return Err(SplitError::config(format!(
                "job_time_limit must be positive, got {}",
                self.job_time_limit
            )));
        }
        self.mask_spec()?;
        Ok(())
    }

    fn split(&self, session: &mut SplitSession<'_>) -> Result<Vec<JobGroup>> {
        let subscription = session.subscription;
        let mask = self
            .mask_spec()?
            .resolve(&subscription.fileset, session.recovery)?;

        let params = self.performance.sanitized();
        let mut acc = JobAccumulator::new(subscription.fileset.as_str(), params)
            .with_parents(self.include_parents);
        if self.deterministic_pileup {
            acc = acc.with_deterministic_pileup(subscription.existing_jobs);
        }

        let target = self.target();
        let mut capped = false;

        for (locations, files) in subscription.files_by_location() {
            if capped {
                break;
            }
            let lumis = LocationLumis::build(&files, mask.as_ref());
            if lumis.files.is_empty() {
                info!("No eligible lumis at {:?}; nothing to split", locations);
                continue;
            }
            acc.open_group(locations);

            let mut last_run: Option<u32> = None;
            let mut last_file: Option<&str> = None;

            'files: for (file, masked) in &lumis.files {
                for (run, lumi) in masked.pairs() {
                    if acc.is_processed(run, lumi) {
                        continue;
                    }
                    if self.total_events > 0 && acc.events_billed() + acc.pending_events() >= self.total_events {
                        capped = true;
                        break 'files;
                    }

                    let events = lumis.events.get(&(run, lumi)).copied().unwrap_or(0);
                    let holders = lumis.holders.get(&(run, lumi)).map(Vec::as_slice).unwrap_or(&[]);
                    let lumi_time = params.wall_time(events);

                    if lumi_time > self.job_time_limit {
                        acc.emit(EmitReason::OversizedLumi);
                        acc.seed_next(run, lumi, events, holders.iter().copied());
                        acc.emit_failed(
                            EmitReason::OversizedLumi,
                            format!(
                                "Estimated runtime {:.0}s for run {} lumi {} ({} events) exceeds job time limit {:.0}s",
                                lumi_time, run, lumi, events, self.job_time_limit
                            ),
                        );
                        warn!(
                            "Run {} lumi {} too long ({:.0}s > {:.0}s); created failed job",
                            run, lumi, lumi_time, self.job_time_limit
                        );
                        continue;
                    }

                    let pending = acc.pending_events();
                    let boundary = if !acc.pending_is_empty()
                        && events > 0
                        && target.abs_diff(pending + events) > target.abs_diff(pending)
                    {
                        Some(EmitReason::EventTarget)
                    } else if self.split_on_run && last_run.is_some_and(|r| r != run) {
                        Some(EmitReason::RunBoundary)
                    } else if self.halt_job_on_file_boundaries
                        && last_file.is_some_and(|lfn| lfn != file.lfn)
                    {
                        Some(EmitReason::FileBoundary)
                    } else {
                        None
                    };

                    match boundary {
                        Some(reason) => {
                            acc.emit(reason);
                            acc.seed_next(run, lumi, events, holders.iter().copied());
                        }
                        None => acc.add_lumi(run, lumi, events, holders.iter().copied()),
                    }
                    last_run = Some(run);
                    last_file = Some(file.lfn.as_str());
                }
            }

            acc.close_group();
        }

        if capped {
            info!(
                "Reached total_events cap of {} for {}",
                self.total_events, subscription.fileset
            );
        }
        Ok(acc.finish())
    }
}
