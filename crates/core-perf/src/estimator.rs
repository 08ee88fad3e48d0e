//! Static and curve-driven per-event cost estimation

use crate::curve::{LumiCurve, PerformanceCurve};
use crate::params::PerformanceParams;
use tracing::debug;

/// Where a time-per-event figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateSource {
    /// Configured (or default) static value
    Static,
    /// Averaged from a performance curve
    Curve,
}

/// Time per event chosen for one file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePerEvent {
    pub seconds: f64,
    pub source: EstimateSource,
    /// Average instantaneous luminosity used for the lookup, if any
    pub inst_lumi: Option<f64>,
}

/// Converts static configuration and optional curves into per-event costs
#[derive(Debug, Clone, Copy)]
pub struct PerformanceEstimator {
    params: PerformanceParams,
}

impl PerformanceEstimator {
    pub fn new(params: &PerformanceParams) -> Self {
        Self {
            params: params.sanitized(),
        }
    }

    /// Static parameters with defaults applied
    pub fn params(&self) -> PerformanceParams {
        self.params
    }

    /// Time per event for a file whose lumis are `lumis` in the run described by
    /// `lumi_curve`. Falls back to the static value when either curve is missing
    /// or the lookup finds nothing.
    pub fn time_per_event<I: IntoIterator<Item = u32>>(
        &self,
        lumis: I,
        lumi_curve: Option<&LumiCurve>,
        perf_curve: Option<&PerformanceCurve>,
    ) -> TimePerEvent {
        let inst_lumi = lumi_curve.and_then(|curve| curve.average_instantaneous(lumis));
        let matched = match (inst_lumi, perf_curve) {
            (Some(inst), Some(curve)) => curve.search(inst),
            _ => None,
        };

        match matched {
            Some(m) => {
                debug!(
                    "Curve match: inst_lumi={:.4} points={} precision={} tpe={:.3}s",
                    inst_lumi.unwrap_or_default(),
                    m.points,
                    m.precision,
                    m.time_per_event
                );
                TimePerEvent {
                    seconds: m.time_per_event,
                    source: EstimateSource::Curve,
                    inst_lumi,
                }
            }
            None => TimePerEvent {
                seconds: self.params.time_per_event,
                source: EstimateSource::Static,
                inst_lumi,
            },
        }
    }

    /// Whole events that fit in `target_seconds`, never less than one
    pub fn events_per_job(target_seconds: f64, time_per_event: f64) -> u64 {
        if !(time_per_event.is_finite() && time_per_event > 0.0) || !target_seconds.is_finite() {
            return 1;
        }
        let events = (target_seconds / time_per_event).floor();
        if events < 1.0 {
            1
        } else {
            events as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{CurvePoint, LUMI_SECTION_SECONDS};

    fn perf_curve() -> PerformanceCurve {
        PerformanceCurve::new([
            CurvePoint {
                inst_lumi: 9.5,
                time_per_event: 3.0,
            },
            CurvePoint {
                inst_lumi: 10.0,
                time_per_event: 4.0,
            },
            CurvePoint {
                inst_lumi: 10.5,
                time_per_event: 5.0,
            },
        ])
    }

    #[test]
    fn test_curve_estimate() {
        let lumi = LumiCurve::new(1, [(1, 10.0 * LUMI_SECTION_SECONDS), (2, 10.0 * LUMI_SECTION_SECONDS)]);
        let est = PerformanceEstimator::new(&PerformanceParams::default());
        let tpe = est.time_per_event([1, 2], Some(&lumi), Some(&perf_curve()));
        assert_eq!(tpe.source, EstimateSource::Curve);
        assert!((tpe.seconds - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_static_fallback_without_curves() {
        let est = PerformanceEstimator::new(&PerformanceParams::default());
        let tpe = est.time_per_event([1], None, Some(&perf_curve()));
        assert_eq!(tpe.source, EstimateSource::Static);
        assert_eq!(tpe.seconds, 12.0);
        assert!(tpe.inst_lumi.is_none());
    }

    #[test]
    fn test_static_fallback_when_lumis_unknown() {
        let lumi = LumiCurve::new(1, [(1, 1.0)]);
        let est = PerformanceEstimator::new(&PerformanceParams::default());
        let tpe = est.time_per_event([50, 51], Some(&lumi), Some(&perf_curve()));
        assert_eq!(tpe.source, EstimateSource::Static);
    }

    #[test]
    fn test_events_per_job() {
        assert_eq!(PerformanceEstimator::events_per_job(100.0, 3.0), 33);
        assert_eq!(PerformanceEstimator::events_per_job(1.0, 3.0), 1);
        assert_eq!(PerformanceEstimator::events_per_job(100.0, 0.0), 1);
    }
}
