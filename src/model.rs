/*!
 * Input model: files, runs and the subscription handed to a splitting pass
 */

use lumisplit_core_lumi::{LumiError, LumiList};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One run of a file with the lumi sections it contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run number
    pub run: u32,

    /// Lumi sections of this run present in the file
    pub lumis: Vec<u32>,

    /// Optional per-lumi event counts, parallel to `lumis`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_per_lumi: Option<Vec<u64>>,
}

impl Run {
    pub fn new(run: u32, lumis: Vec<u32>) -> Self {
        Self {
            run,
            lumis,
            events_per_lumi: None,
        }
    }

    /// Attach per-lumi event counts
    pub fn with_events(mut self, events: Vec<u64>) -> Self {
        self.events_per_lumi = Some(events);
        self
    }

    fn has_lumi_events(&self) -> bool {
        self.events_per_lumi
            .as_ref()
            .is_some_and(|events| events.len() == self.lumis.len())
    }
}

/// An earlier attempt recorded by the recovery subsystem, replayed as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    /// First event of the attempt (inclusive)
    pub first_event: u64,

    /// Last event of the attempt (inclusive)
    pub last_event: u64,

    /// Lumis the attempt covered
    #[serde(default)]
    pub lumis: LumiList,
}

impl FailedAttempt {
    /// Number of events covered, or `None` when the range is inverted
    pub fn events(&self) -> Option<u64> {
        self.last_event
            .checked_sub(self.first_event)
            .map(|span| span + 1)
    }
}

/// Input file with its run/lumi/event metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Logical file name
    pub lfn: String,

    /// Size in bytes
    #[serde(default)]
    pub size: u64,

    /// Total event count
    pub events: u64,

    /// Storage locations holding a replica
    #[serde(default)]
    pub locations: BTreeSet<String>,

    /// Runs and lumis, in file order
    #[serde(default)]
    pub runs: Vec<Run>,

    /// Parent file LFNs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,

    /// Non-empty for recovery placeholders standing in for failed attempts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<FailedAttempt>,
}

impl InputFile {
    pub fn new(lfn: impl Into<String>, events: u64) -> Self {
        Self {
            lfn: lfn.into(),
            size: 0,
            events,
            locations: BTreeSet::new(),
            runs: Vec::new(),
            parents: Vec::new(),
            failed_attempts: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.locations.insert(location.into());
        self
    }

    pub fn with_run(mut self, run: Run) -> Self {
        self.runs.push(run);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_parent(mut self, lfn: impl Into<String>) -> Self {
        self.parents.push(lfn.into());
        self
    }

    pub fn with_failed_attempt(mut self, attempt: FailedAttempt) -> Self {
        self.failed_attempts.push(attempt);
        self
    }

    /// Whether this file only stands in for earlier failed attempts
    pub fn is_recovery_placeholder(&self) -> bool {
        !self.failed_attempts.is_empty()
    }

    /// Every (run, lumi) pair in the file
    pub fn lumi_list(&self) -> Result<LumiList, LumiError> {
        LumiList::from_run_lumis(self.runs.iter().map(|r| (r.run, r.lumis.iter().copied())))
    }

    /// Run of the first listed lumi, if any
    pub fn first_run(&self) -> Option<&Run> {
        self.runs.first()
    }

    /// Estimated events for each distinct (run, lumi) pair of the file.
    ///
    /// Uses recorded per-lumi counts when every run carries them. Otherwise
    /// the file's events are spread uniformly; the integer remainder goes to
    /// the lowest pairs so the estimates always sum to `events`.
    pub fn lumi_event_estimates(&self) -> BTreeMap<(u32, u32), u64> {
        let mut estimates = BTreeMap::new();

        if !self.runs.is_empty() && self.runs.iter().all(Run::has_lumi_events) {
            for run in &self.runs {
                let counts = run.events_per_lumi.as_deref().unwrap_or_default();
                for (&lumi, &events) in run.lumis.iter().zip(counts) {
                    *estimates.entry((run.run, lumi)).or_insert(0) += events;
                }
            }
            return estimates;
        }

        for run in &self.runs {
            for &lumi in &run.lumis {
                estimates.insert((run.run, lumi), 0);
            }
        }
        let count = estimates.len() as u64;
        if count == 0 {
            return estimates;
        }
        let base = self.events / count;
        let mut remainder = self.events % count;
        for events in estimates.values_mut() {
            *events = base;
            if remainder > 0 {
                *events += 1;
                remainder -= 1;
            }
        }
        estimates
    }
}

/// Files assigned to one workflow task, as handed over by the fileset provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Workflow name
    #[serde(default)]
    pub workflow: String,

    /// Fileset name; keys recovery masks and prefixes job names
    pub fileset: String,

    /// Input files
    #[serde(default)]
    pub files: Vec<InputFile>,

    /// Jobs already created for this workflow by earlier passes
    #[serde(default)]
    pub existing_jobs: u64,
}

impl Subscription {
    pub fn new(fileset: impl Into<String>) -> Self {
        Self {
            fileset: fileset.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: InputFile) -> Self {
        self.files.push(file);
        self
    }

    /// Files grouped by their exact location set, each group sorted by LFN.
    /// Files without any location are left out.
    pub fn files_by_location(&self) -> BTreeMap<Vec<String>, Vec<&InputFile>> {
        let mut groups: BTreeMap<Vec<String>, Vec<&InputFile>> = BTreeMap::new();
        for file in &self.files {
            if file.locations.is_empty() {
                tracing::warn!("Skipping {}: no storage location", file.lfn);
                continue;
            }
            let key: Vec<String> = file.locations.iter().cloned().collect();
            groups.entry(key).or_default().push(file);
        }
        for files in groups.values_mut() {
            files.sort_by(|a, b| a.lfn.cmp(&b.lfn));
        }
        groups
    }

    /// Union of every file's lumis
    pub fn lumi_list(&self) -> Result<LumiList, LumiError> {
        self.files.iter().try_fold(LumiList::new(), |acc, file| {
            Ok(acc.union(&file.lumi_list()?))
        })
    }

    /// Total events over all files
    pub fn total_events(&self) -> u64 {
        self.files.iter().map(|f| f.events).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_estimate() {
        let file = InputFile::new("/store/a.root", 1000).with_run(Run::new(10, (1..=10).collect()));
        let est = file.lumi_event_estimates();
        assert_eq!(est.len(), 10);
        assert!(est.values().all(|&e| e == 100));
    }

    #[test]
    fn test_uniform_estimate_distributes_remainder() {
        let file = InputFile::new("/store/a.root", 10).with_run(Run::new(1, vec![3, 1, 2]));
        let est = file.lumi_event_estimates();
        assert_eq!(est[&(1, 1)], 4);
        assert_eq!(est[&(1, 2)], 3);
        assert_eq!(est[&(1, 3)], 3);
        assert_eq!(est.values().sum::<u64>(), 10);
    }

    #[test]
    fn test_duplicate_lumis_counted_once() {
        let file = InputFile::new("/store/a.root", 9)
            .with_run(Run::new(1, vec![1, 2]))
            .with_run(Run::new(1, vec![2, 3]));
        let est = file.lumi_event_estimates();
        assert_eq!(est.len(), 3);
        assert_eq!(est.values().sum::<u64>(), 9);
    }

    #[test]
    fn test_recorded_lumi_events_preferred() {
        let file = InputFile::new("/store/a.root", 60)
            .with_run(Run::new(1, vec![1, 2, 3]).with_events(vec![10, 20, 30]));
        let est = file.lumi_event_estimates();
        assert_eq!(est[&(1, 1)], 10);
        assert_eq!(est[&(1, 3)], 30);
    }

    #[test]
    fn test_partial_lumi_events_fall_back_to_uniform() {
        let file = InputFile::new("/store/a.root", 40)
            .with_run(Run::new(1, vec![1, 2]).with_events(vec![5, 35]))
            .with_run(Run::new(2, vec![1, 2]));
        let est = file.lumi_event_estimates();
        assert!(est.values().all(|&e| e == 10));
    }

    #[test]
    fn test_no_lumis() {
        let file = InputFile::new("/store/a.root", 40);
        assert!(file.lumi_event_estimates().is_empty());
    }

    #[test]
    fn test_files_by_location() {
        let sub = Subscription::new("/fs")
            .with_file(InputFile::new("b", 1).with_location("T1"))
            .with_file(InputFile::new("a", 1).with_location("T1"))
            .with_file(InputFile::new("c", 1).with_location("T2").with_location("T1"))
            .with_file(InputFile::new("d", 1));
        let groups = sub.files_by_location();
        assert_eq!(groups.len(), 2);
        let t1: Vec<&str> = groups[&vec!["T1".to_string()]].iter().map(|f| f.lfn.as_str()).collect();
        assert_eq!(t1, vec!["a", "b"]);
        assert!(groups.contains_key(&vec!["T1".to_string(), "T2".to_string()]));
    }

    #[test]
    fn test_failed_attempt_events() {
        let attempt = FailedAttempt {
            first_event: 100,
            last_event: 199,
            lumis: LumiList::new(),
        };
        assert_eq!(attempt.events(), Some(100));
        let inverted = FailedAttempt {
            first_event: 5,
            last_event: 1,
            lumis: LumiList::new(),
        };
        assert_eq!(inverted.events(), None);
    }

    #[test]
    fn test_subscription_deserialize_defaults() {
        let json = r#"{"fileset": "/A/B/RAW", "files": [
            {"lfn": "/store/x.root", "events": 5, "locations": ["T1_US"],
             "runs": [{"run": 1, "lumis": [1, 2]}]}
        ]}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.existing_jobs, 0);
        assert_eq!(sub.files[0].runs[0].lumis, vec![1, 2]);
        assert!(sub.files[0].parents.is_empty());
        assert_eq!(sub.lumi_list().unwrap().len(), 2);
    }
}
