/*!
 * lumisplit - job splitting for run/lumi organized datasets
 *
 * Turns a snapshot of input files into jobs that each carry an explicit
 * run/lumi mask and a resource estimate:
 * - event-aware lumi splitting towards an events-per-job target
 * - luminosity-adaptive file splitting driven by performance curves
 * - recovery masks restricting a pass to previously failed lumis
 * - deterministic pileup skip counts
 *
 * ```
 * use lumisplit::{InputFile, JobSplitter, Run, SplitAlgorithm, Subscription};
 * use lumisplit::splitting::EventAwareLumiConfig;
 *
 * let subscription = Subscription::new("/A/B/RAW").with_file(
 *     InputFile::new("/store/a.root", 5000)
 *         .with_location("T1_US_FNAL")
 *         .with_run(Run::new(10, (1..=10).collect())),
 * );
 * let algorithm = SplitAlgorithm::EventAwareLumiBased(EventAwareLumiConfig::with_events_per_job(1000));
 * let groups = JobSplitter::new(algorithm).split(&subscription).unwrap();
 * assert_eq!(groups[0].jobs.len(), 5);
 * ```
 */

pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod mask;
pub mod model;
pub mod splitting;

// Re-export commonly used types
pub use config::{LogLevel, SplitterConfig};
pub use error::{Result, SplitError};
pub use job::{Job, JobGroup, JobInputFile, SKIP_PILEUP_EVENTS};
pub use mask::{JsonMaskSource, MaskSpec, RecoveryMaskSource};
pub use model::{FailedAttempt, InputFile, Run, Subscription};
pub use splitting::{JobSplitter, SplitAlgorithm, SplittingStrategy};

pub use lumisplit_core_lumi::LumiList;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
