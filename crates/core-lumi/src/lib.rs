//! Core-Lumi: run/lumi-section set algebra
//!
//! A [`LumiList`] is the masking primitive for job splitting and the run/lumi
//! descriptor attached to every produced job. It stores, per run, a sorted
//! list of disjoint lumi intervals and supports intersection, union,
//! difference and membership tests.
//!
//! # Example
//!
//! ```
//! use lumisplit_core_lumi::LumiList;
//!
//! let file = LumiList::from_run_lumis([(10, vec![1, 2, 3, 4])]).unwrap();
//! let mask = LumiList::from_agent_format(&[10], &["2,3"]).unwrap();
//!
//! let masked = file.intersect(&mask);
//! assert_eq!(masked.len(), 2);
//! assert!(masked.contains(10, 3));
//! assert!(!masked.contains(10, 4));
//! ```

pub mod error;
pub mod lumi_list;

pub use error::{LumiError, Result};
pub use lumi_list::{CompactList, LumiList, LumiRange, MAX_LUMI};
