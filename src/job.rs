/*!
 * Output model: jobs and job groups produced by a splitting pass
 */

use crate::model::InputFile;
use lumisplit_core_lumi::LumiList;
use lumisplit_core_perf::ResourceEstimate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Baggage key carrying the pileup events a job must skip
pub const SKIP_PILEUP_EVENTS: &str = "skipPileupEvents";

/// Input file reference held by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInputFile {
    pub lfn: String,
    pub size: u64,
    pub events: u64,

    /// Parent LFNs; only filled when parents were requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl JobInputFile {
    pub fn from_file(file: &InputFile, include_parents: bool) -> Self {
        Self {
            lfn: file.lfn.clone(),
            size: file.size,
            events: file.events,
            parents: if include_parents {
                file.parents.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// One bounded unit of work. Built once by the job accumulator and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job name, unique within the pass
    pub name: String,

    /// Input files in order of first use
    pub files: Vec<JobInputFile>,

    /// Run/lumi mask the job processes
    pub mask: LumiList,

    /// First event (inclusive) for event-range jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_event: Option<u64>,

    /// Last event (inclusive) for event-range jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<u64>,

    /// Estimated events processed
    pub events: u64,

    /// Resource estimate scaled to `events`
    pub estimate: ResourceEstimate,

    /// Opaque key/values passed through to the running job
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub baggage: BTreeMap<String, serde_json::Value>,

    /// Created already failed; never worth running
    #[serde(default)]
    pub failed: bool,

    /// Why the job was created failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,

    /// Replays a recorded attempt's exact input instead of the usual input
    #[serde(default)]
    pub input_override: bool,
}

impl Job {
    /// Number of (run, lumi) pairs in the mask
    pub fn lumi_count(&self) -> u64 {
        self.mask.len()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.lfn.as_str())
    }

    /// Deterministic pileup skip count, if one was assigned
    pub fn skip_pileup_events(&self) -> Option<u64> {
        self.baggage
            .get(SKIP_PILEUP_EVENTS)
            .and_then(serde_json::Value::as_u64)
    }
}

/// Jobs sharing one storage-location requirement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobGroup {
    /// Location set every job of the group requires
    pub locations: Vec<String>,

    pub jobs: Vec<Job>,
}

impl JobGroup {
    pub fn new(locations: Vec<String>) -> Self {
        Self {
            locations,
            jobs: Vec::new(),
        }
    }

    /// Union of the masks of every job that is not pre-failed
    pub fn processed_lumis(&self) -> LumiList {
        self.jobs
            .iter()
            .filter(|job| !job.failed)
            .fold(LumiList::new(), |acc, job| acc.union(&job.mask))
    }

    /// Union of every job mask, failed jobs included
    pub fn billed_lumis(&self) -> LumiList {
        self.jobs
            .iter()
            .fold(LumiList::new(), |acc, job| acc.union(&job.mask))
    }

    pub fn total_events(&self) -> u64 {
        self.jobs.iter().map(|job| job.events).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, mask: LumiList, failed: bool) -> Job {
        Job {
            name: name.to_string(),
            files: Vec::new(),
            mask,
            first_event: None,
            last_event: None,
            events: 10,
            estimate: ResourceEstimate::default(),
            baggage: BTreeMap::new(),
            failed,
            failed_reason: None,
            input_override: false,
        }
    }

    #[test]
    fn test_group_lumi_unions() {
        let mut group = JobGroup::new(vec!["T1".to_string()]);
        group
            .jobs
            .push(job("a", LumiList::from_pairs(&[1, 1], &[1, 2]).unwrap(), false));
        group
            .jobs
            .push(job("b", LumiList::from_pairs(&[1], &[3]).unwrap(), true));

        assert_eq!(group.processed_lumis().len(), 2);
        assert_eq!(group.billed_lumis().len(), 3);
        assert_eq!(group.total_events(), 20);
    }

    #[test]
    fn test_parents_only_when_requested() {
        let file = InputFile::new("/store/child.root", 5).with_parent("/store/parent.root");
        assert!(JobInputFile::from_file(&file, false).parents.is_empty());
        assert_eq!(
            JobInputFile::from_file(&file, true).parents,
            vec!["/store/parent.root".to_string()]
        );
    }

    #[test]
    fn test_skip_pileup_events_lookup() {
        let mut j = job("a", LumiList::new(), false);
        assert_eq!(j.skip_pileup_events(), None);
        j.baggage
            .insert(SKIP_PILEUP_EVENTS.to_string(), serde_json::json!(1200));
        assert_eq!(j.skip_pileup_events(), Some(1200));
    }

    #[test]
    fn test_job_serializes_compact_mask() {
        let j = job("a", LumiList::from_pairs(&[7, 7, 7], &[1, 2, 3]).unwrap(), false);
        let value = serde_json::to_value(&j).unwrap();
        assert_eq!(value["mask"], serde_json::json!({"7": [[1, 3]]}));
        assert!(value.get("first_event").is_none());
    }
}
