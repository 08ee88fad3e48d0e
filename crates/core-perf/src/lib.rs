//! Core-Perf: per-event performance estimation for job sizing
//!
//! Jobs are sized from per-event costs. In static mode those costs come
//! straight from configuration ([`PerformanceParams`]). In dynamic mode a
//! file's average instantaneous luminosity is looked up on a
//! [`PerformanceCurve`] to get a per-file time per event, which in turn
//! gives an adaptive events-per-job target.
//!
//! Curves come from [`LumiCurveSource`] / [`PerformanceCurveSource`]
//! implementations and are memoized per pass in a [`CurveCache`]. Any
//! failure along the way degrades to the static figures.
//!
//! # Example
//!
//! ```
//! use lumisplit_core_perf::{
//!     CurvePoint, LumiCurve, PerformanceCurve, PerformanceEstimator, PerformanceParams,
//!     LUMI_SECTION_SECONDS,
//! };
//!
//! let lumis = LumiCurve::new(1, [(1, 5.0 * LUMI_SECTION_SECONDS)]);
//! let curve = PerformanceCurve::new([
//!     CurvePoint { inst_lumi: 4.8, time_per_event: 1.5 },
//!     CurvePoint { inst_lumi: 5.0, time_per_event: 2.0 },
//!     CurvePoint { inst_lumi: 5.2, time_per_event: 2.5 },
//! ]);
//!
//! let estimator = PerformanceEstimator::new(&PerformanceParams::default());
//! let tpe = estimator.time_per_event([1], Some(&lumis), Some(&curve));
//! assert!((tpe.seconds - 2.0).abs() < 1e-9);
//! assert_eq!(PerformanceEstimator::events_per_job(3600.0, tpe.seconds), 1800);
//! ```

pub mod curve;
pub mod error;
pub mod estimator;
#[cfg(feature = "http")]
pub mod http;
pub mod params;
pub mod source;

pub use curve::{
    CurveMatch, CurvePoint, LumiCurve, PerformanceCurve, INITIAL_PRECISION, LUMI_SECTION_SECONDS,
    PRECISION_FLOOR,
};
pub use error::{PerfError, Result};
pub use estimator::{EstimateSource, PerformanceEstimator, TimePerEvent};
#[cfg(feature = "http")]
pub use http::HttpCurveSource;
pub use params::{PerformanceParams, ResourceEstimate};
pub use source::{
    CacheStats, CurveCache, CurveServiceConfig, InMemoryCurves, LumiCurveSource,
    PerformanceCurveSource, AUTH_TOKEN_ENV,
};
