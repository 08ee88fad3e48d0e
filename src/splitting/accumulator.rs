/*!
 * Job accumulator: the mutable state of one splitting pass.
 *
 * Strategies feed (run, lumi) pairs or file slices into an in-progress job
 * and call [`JobAccumulator::emit`] at every boundary. Emission freezes the
 * in-progress job into an immutable [`Job`] and appends it to the open
 * [`JobGroup`].
 *
 * Location-scoped state (in-progress job, consumed lumis) is reset by
 * [`JobAccumulator::open_group`]. Pass-scoped state (job counter, billed
 * event total, pileup maxima) lives as long as the accumulator.
 */

use crate::job::{Job, JobGroup, JobInputFile, SKIP_PILEUP_EVENTS};
use crate::model::InputFile;
use lumisplit_core_lumi::LumiList;
use lumisplit_core_perf::{PerformanceParams, ResourceEstimate};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, trace, warn};

/// Why the in-progress job was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitReason {
    /// Adding the next lumi would move away from the events-per-job target
    EventTarget,
    /// The next lumi belongs to a different run
    RunBoundary,
    /// The next lumi comes from a different file
    FileBoundary,
    /// Flushed ahead of a lumi too long to run
    OversizedLumi,
    /// No more input at this location
    EndOfLocation,
    /// One slice of a file
    FileSlice,
    /// Replay of a recorded attempt
    Recovery,
}

impl fmt::Display for EmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitReason::EventTarget => write!(f, "event target"),
            EmitReason::RunBoundary => write!(f, "run boundary"),
            EmitReason::FileBoundary => write!(f, "file boundary"),
            EmitReason::OversizedLumi => write!(f, "oversized lumi"),
            EmitReason::EndOfLocation => write!(f, "end of location"),
            EmitReason::FileSlice => write!(f, "file slice"),
            EmitReason::Recovery => write!(f, "recovery"),
        }
    }
}

/// Running maxima for deterministic pileup skipping.
///
/// Each job's skip count uses the maxima observed up to its own emission.
/// Earlier jobs are never revisited when a later job raises a maximum.
/// Pre-failed jobs take a job number but never raise the maxima.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PileupTracker {
    /// Jobs created for the workflow before this pass
    pub existing_jobs: u64,
    /// Largest estimated event count of any runnable lumi so far
    pub max_events_per_lumi: u64,
    /// Largest lumi count of any runnable job so far
    pub max_lumis_per_job: u64,
}

impl PileupTracker {
    pub fn new(existing_jobs: u64) -> Self {
        Self {
            existing_jobs,
            ..Default::default()
        }
    }

    /// Skip count for the `jobs_in_pass`-th job of this pass (1-based)
    fn skip_events(&self, jobs_in_pass: u64) -> u64 {
        let total_jobs = self.existing_jobs + jobs_in_pass;
        total_jobs
            .saturating_sub(1)
            .saturating_mul(self.max_events_per_lumi)
            .saturating_mul(self.max_lumis_per_job)
    }
}

/// Job under construction
#[derive(Debug, Default)]
struct PendingJob {
    files: Vec<JobInputFile>,
    file_names: HashSet<String>,
    lumis: BTreeMap<u32, Vec<u32>>,
    mask: LumiList,
    events: u64,
    max_lumi_events: u64,
    first_event: Option<u64>,
    last_event: Option<u64>,
    params: Option<PerformanceParams>,
    input_override: bool,
}

impl PendingJob {
    fn is_empty(&self) -> bool {
        self.files.is_empty() && self.lumis.is_empty() && self.mask.is_empty()
    }

    fn lumi_count(&self) -> u64 {
        self.lumis.values().map(|l| l.len() as u64).sum::<u64>() + self.mask.len()
    }
}

/// Per-pass job builder shared by all splitting strategies
pub struct JobAccumulator {
    fileset: String,
    params: PerformanceParams,
    include_parents: bool,
    groups: Vec<JobGroup>,
    current_group: Option<JobGroup>,
    current: PendingJob,
    lumis_processed: HashSet<(u32, u32)>,
    jobs_created: u64,
    events_billed: u64,
    pileup: Option<PileupTracker>,
}

impl JobAccumulator {
    pub fn new(fileset: impl Into<String>, params: PerformanceParams) -> Self {
        Self {
            fileset: fileset.into(),
            params: params.sanitized(),
            include_parents: false,
            groups: Vec::new(),
            current_group: None,
            current: PendingJob::default(),
            lumis_processed: HashSet::new(),
            jobs_created: 0,
            events_billed: 0,
            pileup: None,
        }
    }

    /// Attach parent LFNs to every job file
    pub fn with_parents(mut self, include_parents: bool) -> Self {
        self.include_parents = include_parents;
        self
    }

    /// Assign deterministic pileup skip counts to every emitted job
    pub fn with_deterministic_pileup(mut self, existing_jobs: u64) -> Self {
        self.pileup = Some(PileupTracker::new(existing_jobs));
        self
    }

    /// Close any open group and start a new one for `locations`.
    /// Location-scoped bookkeeping is reset.
    pub fn open_group(&mut self, locations: Vec<String>) {
        self.close_group();
        self.current_group = Some(JobGroup::new(locations));
        self.lumis_processed.clear();
    }

    /// Emit any pending job, then flush the open group. Groups without jobs are dropped.
    pub fn close_group(&mut self) {
        self.emit(EmitReason::EndOfLocation);
        if let Some(group) = self.current_group.take() {
            if group.jobs.is_empty() {
                debug!("No jobs for location {:?}", group.locations);
            } else {
                self.groups.push(group);
            }
        }
    }

    /// Whether a pair was already billed at this location
    pub fn is_processed(&self, run: u32, lumi: u32) -> bool {
        self.lumis_processed.contains(&(run, lumi))
    }

    /// Events accumulated in the in-progress job
    pub fn pending_events(&self) -> u64 {
        self.current.events
    }

    pub fn pending_is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Events billed to jobs so far in this pass, failed jobs excluded
    pub fn events_billed(&self) -> u64 {
        self.events_billed
    }

    pub fn jobs_created(&self) -> u64 {
        self.jobs_created
    }

    pub fn pileup(&self) -> Option<PileupTracker> {
        self.pileup
    }

    /// Fold one (run, lumi) pair into the in-progress job, along with every
    /// file that contains it. Lumi 0 is not a valid lumi section and is dropped.
    pub fn add_lumi<'f, I>(&mut self, run: u32, lumi: u32, events: u64, files: I)
    where
        I: IntoIterator<Item = &'f InputFile>,
    {
        if lumi == 0 {
            warn!("Ignoring lumi 0 of run {} in {}", run, self.fileset);
            return;
        }
        for file in files {
            self.add_file(file);
        }
        self.current.lumis.entry(run).or_default().push(lumi);
        self.current.events += events;
        self.current.max_lumi_events = self.current.max_lumi_events.max(events);
        self.lumis_processed.insert((run, lumi));
    }

    /// Start the next in-progress job with one pair. Callers emit the current
    /// job first; anything still pending is flushed here.
    pub fn seed_next<'f, I>(&mut self, run: u32, lumi: u32, events: u64, files: I)
    where
        I: IntoIterator<Item = &'f InputFile>,
    {
        if !self.current.is_empty() {
            self.emit(EmitReason::EventTarget);
        }
        self.add_lumi(run, lumi, events, files);
    }

    /// Add a file to the in-progress job (deduplicated by LFN)
    pub fn add_file(&mut self, file: &InputFile) {
        if self.current.file_names.insert(file.lfn.clone()) {
            self.current
                .files
                .push(JobInputFile::from_file(file, self.include_parents));
        }
    }

    /// Set the in-progress job's mask and event count wholesale (file-based splitting)
    pub fn set_mask(&mut self, mask: LumiList, events: u64) {
        self.current.mask = mask;
        self.current.events = events;
    }

    pub fn set_event_range(&mut self, first_event: u64, last_event: u64) {
        self.current.first_event = Some(first_event);
        self.current.last_event = Some(last_event);
    }

    /// Override the per-event figures used for this job's estimate
    pub fn set_params(&mut self, params: PerformanceParams) {
        self.current.params = Some(params);
    }

    pub fn set_input_override(&mut self) {
        self.current.input_override = true;
    }

    /// Freeze the in-progress job and append it to the open group.
    /// Returns `false` when there was nothing to emit.
    pub fn emit(&mut self, reason: EmitReason) -> bool {
        self.emit_job(reason, None)
    }

    /// Emit the in-progress job pre-marked as failed
    pub fn emit_failed(&mut self, reason: EmitReason, failure: impl Into<String>) -> bool {
        self.emit_job(reason, Some(failure.into()))
    }

    fn emit_job(&mut self, reason: EmitReason, failure: Option<String>) -> bool {
        if self.current.is_empty() {
            return false;
        }
        let pending = std::mem::take(&mut self.current);
        let lumi_count = pending.lumi_count();
        let failed = failure.is_some();

        self.jobs_created += 1;
        let name = format!("{}-{}", self.fileset, self.jobs_created);
        let params = pending.params.unwrap_or(self.params);

        // add_lumi only stores lumis >= 1, so this never fails
        let mut mask = match LumiList::from_run_lumis(pending.lumis) {
            Ok(mask) => mask,
            Err(e) => {
                warn!("Invalid lumis in {}: {}", name, e);
                LumiList::new()
            }
        };
        if !pending.mask.is_empty() {
            mask = mask.union(&pending.mask);
        }

        let mut baggage = BTreeMap::new();
        if let Some(pileup) = self.pileup.as_mut() {
            if !failed {
                pileup.max_events_per_lumi = pileup.max_events_per_lumi.max(pending.max_lumi_events);
                pileup.max_lumis_per_job = pileup.max_lumis_per_job.max(lumi_count);
            }
            let skip = pileup.skip_events(self.jobs_created);
            baggage.insert(SKIP_PILEUP_EVENTS.to_string(), serde_json::Value::from(skip));
        }

        if !failed {
            self.events_billed += pending.events;
        }

        debug!(
            "Emitting {} ({}): {} events, {} lumis, {} files{}",
            name,
            reason,
            pending.events,
            mask.len(),
            pending.files.len(),
            if failed { ", failed" } else { "" }
        );

        let job = Job {
            name,
            files: pending.files,
            mask,
            first_event: pending.first_event,
            last_event: pending.last_event,
            events: pending.events,
            estimate: ResourceEstimate::for_events(&params, pending.events),
            baggage,
            failed,
            failed_reason: failure,
            input_override: pending.input_override,
        };

        match self.current_group.as_mut() {
            Some(group) => group.jobs.push(job),
            None => {
                trace!("Emitting outside a group; opening an unlocated group");
                let mut group = JobGroup::default();
                group.jobs.push(job);
                self.current_group = Some(group);
            }
        }
        true
    }

    /// Close the last group and hand back every group of the pass
    pub fn finish(mut self) -> Vec<JobGroup> {
        self.close_group();
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Run;

    fn file(lfn: &str) -> InputFile {
        InputFile::new(lfn, 100)
            .with_location("T1")
            .with_run(Run::new(1, vec![1, 2]))
            .with_parent("/store/parent.root")
    }

    fn params() -> PerformanceParams {
        PerformanceParams {
            time_per_event: 2.0,
            size_per_event: 1.0,
            memory_per_event: 0.5,
        }
    }

    #[test]
    fn test_emit_builds_compact_mask_and_estimate() {
        let f = file("/store/a.root");
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 1, 30, [&f]);
        acc.add_lumi(1, 2, 20, [&f]);
        assert!(acc.emit(EmitReason::EndOfLocation));

        let groups = acc.finish();
        assert_eq!(groups.len(), 1);
        let job = &groups[0].jobs[0];
        assert_eq!(job.name, "fs-1");
        assert_eq!(job.events, 50);
        assert_eq!(job.mask.compact_list()[&1], vec![[1, 2]]);
        assert_eq!(job.files.len(), 1);
        assert!(job.files[0].parents.is_empty());
        assert_eq!(job.estimate.wall_time_secs, 100.0);
        assert_eq!(job.estimate.memory_mb, 25.0);
        assert!(job.baggage.is_empty());
    }

    #[test]
    fn test_emit_empty_is_noop() {
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        assert!(!acc.emit(EmitReason::EndOfLocation));
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn test_seed_next_flushes_pending() {
        let f = file("/store/a.root");
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 1, 10, [&f]);
        acc.seed_next(1, 2, 10, [&f]);
        assert_eq!(acc.pending_events(), 10);
        acc.emit(EmitReason::EndOfLocation);
        let groups = acc.finish();
        assert_eq!(groups[0].jobs.len(), 2);
        assert!(groups[0].jobs[1].mask.contains(1, 2));
    }

    #[test]
    fn test_processed_lumis_reset_per_group() {
        let f = file("/store/a.root");
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 1, 10, [&f]);
        assert!(acc.is_processed(1, 1));
        acc.open_group(vec!["T2".to_string()]);
        assert!(!acc.is_processed(1, 1));
        let groups = acc.finish();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].locations, vec!["T1".to_string()]);
    }

    #[test]
    fn test_files_deduplicated_with_parents() {
        let a = file("/store/a.root");
        let b = file("/store/b.root");
        let mut acc = JobAccumulator::new("fs", params()).with_parents(true);
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 1, 10, [&a, &b]);
        acc.add_lumi(1, 2, 10, [&b]);
        acc.emit(EmitReason::EndOfLocation);
        let job = &acc.finish()[0].jobs[0];
        let names: Vec<&str> = job.file_names().collect();
        assert_eq!(names, vec!["/store/a.root", "/store/b.root"]);
        assert_eq!(job.files[0].parents, vec!["/store/parent.root".to_string()]);
    }

    #[test]
    fn test_failed_jobs_not_billed() {
        let f = file("/store/a.root");
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 1, 10, [&f]);
        acc.emit(EmitReason::OversizedLumi);
        acc.add_lumi(1, 2, 1000, [&f]);
        acc.emit_failed(EmitReason::OversizedLumi, "too long");
        assert_eq!(acc.events_billed(), 10);
        let jobs = &acc.finish()[0].jobs;
        assert!(!jobs[0].failed);
        assert!(jobs[1].failed);
        assert_eq!(jobs[1].failed_reason.as_deref(), Some("too long"));
    }

    #[test]
    fn test_pileup_uses_running_maxima() {
        let f = file("/store/a.root");
        let mut acc =
            JobAccumulator::new("fs", params()).with_deterministic_pileup(0);
        acc.open_group(vec!["T1".to_string()]);

        acc.add_lumi(1, 1, 10, [&f]);
        acc.emit(EmitReason::EventTarget);
        acc.add_lumi(1, 2, 50, [&f]);
        acc.add_lumi(1, 3, 5, [&f]);
        acc.emit(EmitReason::EventTarget);
        acc.add_lumi(1, 4, 1, [&f]);
        acc.emit(EmitReason::EndOfLocation);

        let jobs = &acc.finish()[0].jobs;
        // (n - 1) * maxEvents * maxLumis at each emission
        assert_eq!(jobs[0].skip_pileup_events(), Some(0));
        assert_eq!(jobs[1].skip_pileup_events(), Some(50 * 2));
        assert_eq!(jobs[2].skip_pileup_events(), Some(2 * 50 * 2));
    }

    #[test]
    fn test_pileup_maxima_ignore_failed_jobs() {
        let f = file("/store/a.root");
        let mut acc =
            JobAccumulator::new("fs", params()).with_deterministic_pileup(0);
        acc.open_group(vec!["T1".to_string()]);

        acc.add_lumi(1, 1, 100, [&f]);
        acc.emit(EmitReason::OversizedLumi);
        acc.add_lumi(1, 2, 100_000, [&f]);
        acc.emit_failed(EmitReason::OversizedLumi, "too long");
        acc.add_lumi(1, 3, 100, [&f]);
        acc.emit(EmitReason::EventTarget);
        acc.add_lumi(1, 4, 100, [&f]);
        acc.emit(EmitReason::EndOfLocation);

        let pileup = acc.pileup().unwrap();
        assert_eq!(pileup.max_events_per_lumi, 100);
        assert_eq!(pileup.max_lumis_per_job, 1);

        // the failed job still takes a job number
        let skips: Vec<_> = acc.finish()[0]
            .jobs
            .iter()
            .map(|j| j.skip_pileup_events())
            .collect();
        assert_eq!(skips, vec![Some(0), Some(100), Some(200), Some(300)]);
    }

    #[test]
    fn test_lumi_zero_dropped() {
        let f = file("/store/a.root");
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 0, 500, [&f]);
        assert!(acc.pending_is_empty());
        acc.add_lumi(1, 1, 10, [&f]);
        acc.emit(EmitReason::EndOfLocation);

        let job = &acc.finish()[0].jobs[0];
        assert_eq!(job.lumi_count(), 1);
        assert!(job.mask.contains(1, 1));
        assert_eq!(job.events, 10);
    }

    #[test]
    fn test_pileup_counts_existing_jobs() {
        let f = file("/store/a.root");
        let mut acc =
            JobAccumulator::new("fs", params()).with_deterministic_pileup(4);
        acc.open_group(vec!["T1".to_string()]);
        acc.add_lumi(1, 1, 10, [&f]);
        acc.emit(EmitReason::EndOfLocation);
        let jobs = &acc.finish()[0].jobs;
        assert_eq!(jobs[0].skip_pileup_events(), Some(4 * 10));
    }

    #[test]
    fn test_file_slice_job() {
        let f = file("/store/a.root");
        let mut acc = JobAccumulator::new("fs", params());
        acc.open_group(vec!["T1".to_string()]);
        acc.add_file(&f);
        acc.set_mask(f.lumi_list().unwrap(), 40);
        acc.set_event_range(0, 39);
        acc.set_params(params().with_time_per_event(1.0));
        acc.set_input_override();
        acc.emit(EmitReason::FileSlice);
        let job = &acc.finish()[0].jobs[0];
        assert_eq!(job.first_event, Some(0));
        assert_eq!(job.last_event, Some(39));
        assert_eq!(job.lumi_count(), 2);
        assert_eq!(job.estimate.wall_time_secs, 40.0);
        assert!(job.input_override);
    }
}
