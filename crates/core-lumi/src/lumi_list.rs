//! Interval-set representation of (run, lumi) pairs

use crate::error::{LumiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest lumi number used when a whole run is selected
pub const MAX_LUMI: u32 = 0x0FFF_FFFF;

/// Inclusive lumi interval `[start, end]`
pub type LumiRange = (u32, u32);

/// Compact wire form: run → list of `[start, end]` intervals
pub type CompactList = BTreeMap<u32, Vec<[u32; 2]>>;

/// Set of (run, lumi) pairs stored as merged, disjoint intervals per run.
///
/// Every constructor normalizes its input, so two lists holding the same
/// pairs always compare equal. Operations return new lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CompactList", into = "CompactList")]
pub struct LumiList {
    runs: BTreeMap<u32, Vec<LumiRange>>,
}

impl LumiList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an explicit run → lumis map. Lumis need not be sorted or unique.
    pub fn from_run_lumis<I, L>(runs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, L)>,
        L: IntoIterator<Item = u32>,
    {
        let mut map: BTreeMap<u32, Vec<LumiRange>> = BTreeMap::new();
        for (run, lumis) in runs {
            let entry = map.entry(run).or_default();
            for lumi in lumis {
                if lumi == 0 {
                    return Err(LumiError::ZeroLumi { run });
                }
                entry.push((lumi, lumi));
            }
        }
        Ok(Self::normalized(map))
    }

    /// Build from a compact `run → [[start, end], ...]` list
    pub fn from_compact(compact: &CompactList) -> Result<Self> {
        let mut map: BTreeMap<u32, Vec<LumiRange>> = BTreeMap::new();
        for (&run, ranges) in compact {
            let entry = map.entry(run).or_default();
            for &[start, end] in ranges {
                check_range(run, start, end)?;
                entry.push((start, end));
            }
        }
        Ok(Self::normalized(map))
    }

    /// Build from parallel arrays where `runs[i]` and `lumis[i]` form one pair
    pub fn from_pairs(runs: &[u32], lumis: &[u32]) -> Result<Self> {
        if runs.len() != lumis.len() {
            return Err(LumiError::LengthMismatch {
                runs: runs.len(),
                lumis: lumis.len(),
            });
        }
        let mut map: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (&run, &lumi) in runs.iter().zip(lumis) {
            map.entry(run).or_default().push(lumi);
        }
        Self::from_run_lumis(map)
    }

    /// Build from the agent format: `runs[i]` paired with a comma-separated
    /// string of range bounds, e.g. `"1,4,23,45"` for `[1,4]` and `[23,45]`.
    pub fn from_agent_format<S: AsRef<str>>(runs: &[u32], lumis: &[S]) -> Result<Self> {
        if runs.len() != lumis.len() {
            return Err(LumiError::LengthMismatch {
                runs: runs.len(),
                lumis: lumis.len(),
            });
        }
        let mut compact = CompactList::new();
        for (&run, spec) in runs.iter().zip(lumis) {
            let spec = spec.as_ref();
            let bounds = spec
                .split(',')
                .map(|tok| tok.trim())
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    tok.parse::<u32>()
                        .map_err(|_| LumiError::MalformedRange(spec.to_string()))
                })
                .collect::<Result<Vec<u32>>>()?;
            if bounds.len() % 2 != 0 {
                return Err(LumiError::MalformedRange(spec.to_string()));
            }
            let entry = compact.entry(run).or_default();
            for pair in bounds.chunks_exact(2) {
                entry.push([pair[0], pair[1]]);
            }
        }
        Self::from_compact(&compact)
    }

    /// Every lumi of every listed run
    pub fn from_runs<I: IntoIterator<Item = u32>>(runs: I) -> Self {
        let map = runs
            .into_iter()
            .map(|run| (run, vec![(1, MAX_LUMI)]))
            .collect();
        Self::normalized(map)
    }

    /// Parse a JSON mask `{"run": [[start, end], ...]}`
    pub fn from_json(json: &str) -> Result<Self> {
        let compact: CompactList = serde_json::from_str(json)?;
        Self::from_compact(&compact)
    }

    /// Render as a JSON mask
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.compact_list())?)
    }

    /// Pairs present in both lists
    pub fn intersect(&self, other: &LumiList) -> LumiList {
        let mut map = BTreeMap::new();
        for (run, mine) in &self.runs {
            let Some(theirs) = other.runs.get(run) else {
                continue;
            };
            let (mut i, mut j) = (0, 0);
            let mut out = Vec::new();
            while i < mine.len() && j < theirs.len() {
                let start = mine[i].0.max(theirs[j].0);
                let end = mine[i].1.min(theirs[j].1);
                if start <= end {
                    out.push((start, end));
                }
                if mine[i].1 < theirs[j].1 {
                    i += 1;
                } else {
                    j += 1;
                }
            }
            if !out.is_empty() {
                map.insert(*run, out);
            }
        }
        Self::normalized(map)
    }

    /// Pairs present in either list
    pub fn union(&self, other: &LumiList) -> LumiList {
        let mut map = self.runs.clone();
        for (run, ranges) in &other.runs {
            map.entry(*run).or_default().extend(ranges.iter().copied());
        }
        Self::normalized(map)
    }

    /// Pairs of `self` not present in `other`
    pub fn difference(&self, other: &LumiList) -> LumiList {
        let mut map = BTreeMap::new();
        for (run, mine) in &self.runs {
            let Some(theirs) = other.runs.get(run) else {
                map.insert(*run, mine.clone());
                continue;
            };
            let mut out = Vec::new();
            for &(start, end) in mine {
                let mut cursor = start;
                let mut exhausted = false;
                for &(cut_start, cut_end) in theirs {
                    if cut_end < cursor || cut_start > end {
                        continue;
                    }
                    if cut_start > cursor {
                        out.push((cursor, cut_start - 1));
                    }
                    if cut_end >= end {
                        exhausted = true;
                        break;
                    }
                    cursor = cut_end + 1;
                }
                if !exhausted {
                    out.push((cursor, end));
                }
            }
            if !out.is_empty() {
                map.insert(*run, out);
            }
        }
        Self::normalized(map)
    }

    /// Membership test for a single pair
    pub fn contains(&self, run: u32, lumi: u32) -> bool {
        self.runs.get(&run).is_some_and(|ranges| {
            // ranges are sorted and disjoint
            let idx = ranges.partition_point(|&(_, end)| end < lumi);
            ranges.get(idx).is_some_and(|&(start, _)| start <= lumi)
        })
    }

    /// Whether the list holds no pairs
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of (run, lumi) pairs
    pub fn len(&self) -> u64 {
        self.runs
            .values()
            .flatten()
            .map(|&(start, end)| u64::from(end - start) + 1)
            .sum()
    }

    /// Run numbers in ascending order
    pub fn runs(&self) -> impl Iterator<Item = u32> + '_ {
        self.runs.keys().copied()
    }

    /// Merged intervals of one run
    pub fn ranges(&self, run: u32) -> &[LumiRange] {
        self.runs.get(&run).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every pair, ascending by run then lumi
    pub fn pairs(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.runs.iter().flat_map(|(&run, ranges)| {
            ranges
                .iter()
                .flat_map(move |&(start, end)| (start..=end).map(move |lumi| (run, lumi)))
        })
    }

    /// Compact `run → [[start, end], ...]` form with adjacent lumis merged
    pub fn compact_list(&self) -> CompactList {
        self.runs
            .iter()
            .map(|(&run, ranges)| {
                (
                    run,
                    ranges.iter().map(|&(start, end)| [start, end]).collect(),
                )
            })
            .collect()
    }

    fn normalized(map: BTreeMap<u32, Vec<LumiRange>>) -> Self {
        let runs = map
            .into_iter()
            .filter_map(|(run, ranges)| {
                let merged = merge_ranges(ranges);
                (!merged.is_empty()).then_some((run, merged))
            })
            .collect();
        Self { runs }
    }
}

impl TryFrom<CompactList> for LumiList {
    type Error = LumiError;

    fn try_from(compact: CompactList) -> Result<Self> {
        Self::from_compact(&compact)
    }
}

impl From<LumiList> for CompactList {
    fn from(list: LumiList) -> Self {
        list.compact_list()
    }
}

fn check_range(run: u32, start: u32, end: u32) -> Result<()> {
    if start == 0 {
        return Err(LumiError::ZeroLumi { run });
    }
    if start > end {
        return Err(LumiError::InvalidRange { run, start, end });
    }
    Ok(())
}

/// Sort and coalesce overlapping or adjacent intervals
fn merge_ranges(mut ranges: Vec<LumiRange>) -> Vec<LumiRange> {
    ranges.sort_unstable();
    let mut merged: Vec<LumiRange> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}
