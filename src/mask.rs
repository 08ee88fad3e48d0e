/*!
 * Lumi mask construction and recovery mask sources.
 *
 * A pass is masked by at most one of:
 * - a recovery mask fetched for a collection (failure recovery),
 * - explicit runs + lumi ranges, optionally narrowed by a run whitelist,
 * - a bare run whitelist.
 */

use crate::error::{Result, SplitError};
use lumisplit_core_lumi::LumiList;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where a pass's lumi mask comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSpec {
    /// Every lumi is eligible
    Unmasked,
    /// Fetch the mask from the recovery source for this collection
    Recovery { collection: String },
    /// A mask known up front
    Lumis(LumiList),
}

impl MaskSpec {
    /// Pick the mask from the raw configuration fields.
    ///
    /// `runs` and `lumis` are parallel: `lumis[i]` holds comma-separated range
    /// bounds for `runs[i]`.
    pub fn from_config(
        collection: Option<&str>,
        runs: &[u32],
        lumis: &[String],
        run_whitelist: &[u32],
    ) -> Result<Self> {
        let explicit = !runs.is_empty() || !lumis.is_empty();

        if let Some(collection) = collection.filter(|c| !c.is_empty()) {
            if explicit || !run_whitelist.is_empty() {
                return Err(SplitError::config(
                    "a recovery collection cannot be combined with run/lumi lists or a run whitelist",
                ));
            }
            return Ok(MaskSpec::Recovery {
                collection: collection.to_string(),
            });
        }

        if explicit {
            if runs.is_empty() || lumis.is_empty() {
                return Err(SplitError::config(
                    "runs and lumis must be given together",
                ));
            }
            let mut mask = LumiList::from_agent_format(runs, lumis)?;
            if !run_whitelist.is_empty() {
                mask = mask.intersect(&LumiList::from_runs(run_whitelist.iter().copied()));
            }
            return Ok(MaskSpec::Lumis(mask));
        }

        if !run_whitelist.is_empty() {
            return Ok(MaskSpec::Lumis(LumiList::from_runs(
                run_whitelist.iter().copied(),
            )));
        }

        Ok(MaskSpec::Unmasked)
    }

    pub fn needs_recovery_source(&self) -> bool {
        matches!(self, MaskSpec::Recovery { .. })
    }

    /// Resolve into a concrete mask for `fileset`. `Ok(None)` means unmasked.
    pub fn resolve(
        &self,
        fileset: &str,
        source: Option<&dyn RecoveryMaskSource>,
    ) -> Result<Option<LumiList>> {
        match self {
            MaskSpec::Unmasked => Ok(None),
            MaskSpec::Lumis(mask) => Ok(Some(mask.clone())),
            MaskSpec::Recovery { collection } => {
                let source = source.ok_or_else(|| {
                    SplitError::config(format!(
                        "recovery collection '{}' configured without a recovery mask source",
                        collection
                    ))
                })?;
                let mask = source
                    .recovery_mask(collection, fileset)
                    .map_err(|e| SplitError::recovery_mask(collection.as_str(), fileset, e))?;
                info!(
                    "Recovery mask for {} / {}: {} lumis in {} runs",
                    collection,
                    fileset,
                    mask.len(),
                    mask.runs().count()
                );
                Ok(Some(mask))
            }
        }
    }
}

/// Provider of recovery masks, keyed by collection and fileset
pub trait RecoveryMaskSource {
    fn recovery_mask(&self, collection: &str, fileset: &str) -> Result<LumiList>;
}

/// Recovery masks stored as JSON files: `<root>/<collection>/<fileset>.json`.
///
/// Slashes in the fileset name become underscores, and a leading slash is dropped.
#[derive(Debug, Clone)]
pub struct JsonMaskSource {
    root: PathBuf,
}

impl JsonMaskSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the mask file for a collection/fileset pair
    pub fn mask_path(&self, collection: &str, fileset: &str) -> PathBuf {
        let name = fileset.trim_start_matches('/').replace('/', "_");
        self.root.join(collection).join(format!("{}.json", name))
    }
}

impl RecoveryMaskSource for JsonMaskSource {
    fn recovery_mask(&self, collection: &str, fileset: &str) -> Result<LumiList> {
        let path = self.mask_path(collection, fileset);
        debug!("Reading recovery mask {:?}", path);
        let contents = std::fs::read_to_string(&path)?;
        Ok(LumiList::from_json(&contents)?)
    }
}
