//! Luminosity and performance curves
//!
//! A [`LumiCurve`] maps the lumi sections of one run to their integrated
//! luminosity. A [`PerformanceCurve`] relates instantaneous luminosity to
//! the processing time per event. Together they give a per-file time per
//! event: average the file's instantaneous luminosity over its lumis, then
//! look that value up on the performance curve.

use crate::error::{PerfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Duration of one lumi section in seconds
pub const LUMI_SECTION_SECONDS: f64 = 23.31;

/// Relative search window the curve lookup starts with
pub const INITIAL_PRECISION: f64 = 0.1;

/// The window is never narrowed below this relative width
pub const PRECISION_FLOOR: f64 = 0.01;

/// Fewest matched points considered a good fit
pub const MIN_MATCHED_POINTS: usize = 3;

/// Most matched points considered a good fit
pub const MAX_MATCHED_POINTS: usize = 5;

// One widen plus halvings from 0.2 down to the floor
const MAX_SEARCH_STEPS: usize = 8;

/// Integrated luminosity per lumi section for a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LumiCurve {
    pub run: u32,
    integrated: BTreeMap<u32, f64>,
}

impl LumiCurve {
    /// Build from `(lumi, integrated_luminosity)` samples; non-finite values are dropped
    pub fn new<I: IntoIterator<Item = (u32, f64)>>(run: u32, samples: I) -> Self {
        let integrated = samples
            .into_iter()
            .filter(|(_, value)| value.is_finite() && *value >= 0.0)
            .collect();
        Self { run, integrated }
    }

    /// Instantaneous luminosity of one lumi section
    pub fn instantaneous(&self, lumi: u32) -> Option<f64> {
        self.integrated
            .get(&lumi)
            .map(|integrated| integrated / LUMI_SECTION_SECONDS)
    }

    /// Mean instantaneous luminosity over the given lumis that the curve knows
    pub fn average_instantaneous<I: IntoIterator<Item = u32>>(&self, lumis: I) -> Option<f64> {
        let (sum, count) = lumis
            .into_iter()
            .filter_map(|lumi| self.instantaneous(lumi))
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    pub fn len(&self) -> usize {
        self.integrated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrated.is_empty()
    }
}

/// One `(instantaneous luminosity, time per event)` sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub inst_lumi: f64,
    pub time_per_event: f64,
}

/// Result of a curve lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveMatch {
    /// Mean time per event over the matched points
    pub time_per_event: f64,
    /// Number of points averaged
    pub points: usize,
    /// Relative window width that produced the match
    pub precision: f64,
}

/// Time-per-event samples sorted by instantaneous luminosity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCurve {
    points: Vec<CurvePoint>,
}

impl PerformanceCurve {
    /// Build from arbitrary samples. Points with non-finite or non-positive
    /// time per event are discarded.
    pub fn new<I: IntoIterator<Item = CurvePoint>>(points: I) -> Self {
        let mut points: Vec<CurvePoint> = points
            .into_iter()
            .filter(|p| p.inst_lumi.is_finite() && p.time_per_event.is_finite())
            .filter(|p| p.time_per_event > 0.0)
            .collect();
        points.sort_by(|a, b| a.inst_lumi.total_cmp(&b.inst_lumi));
        Self { points }
    }

    /// Build from `[inst_lumi, time_per_event]` pairs as served by the curve service
    pub fn from_pairs(pairs: &[[f64; 2]]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(PerfError::InvalidCurve("no points".to_string()));
        }
        Ok(Self::new(pairs.iter().map(|&[inst_lumi, time_per_event]| {
            CurvePoint {
                inst_lumi,
                time_per_event,
            }
        })))
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Average time per event of the points near `inst_lumi`.
    ///
    /// The window `inst_lumi ± precision * inst_lumi` starts at
    /// [`INITIAL_PRECISION`]. While more than [`MAX_MATCHED_POINTS`] fall
    /// inside it the precision is halved, down to [`PRECISION_FLOOR`]; if a
    /// halving leaves fewer than [`MIN_MATCHED_POINTS`] the previous match set
    /// is kept. With fewer than [`MIN_MATCHED_POINTS`] and no prior narrowing,
    /// the window is doubled once. Returns `None` when nothing matches.
    pub fn search(&self, inst_lumi: f64) -> Option<CurveMatch> {
        if self.points.is_empty() || !inst_lumi.is_finite() || inst_lumi <= 0.0 {
            return None;
        }

        let mut precision = INITIAL_PRECISION;
        let mut widened = false;
        let mut wider: Option<CurveMatch> = None;

        for _ in 0..MAX_SEARCH_STEPS {
            let (lo, hi) = self.window(inst_lumi, precision);
            let count = hi - lo;

            if count > MAX_MATCHED_POINTS {
                let narrower = precision / 2.0;
                if narrower < PRECISION_FLOOR {
                    return Some(self.average(lo, hi, precision));
                }
                wider = Some(self.average(lo, hi, precision));
                precision = narrower;
                continue;
            }

            if count < MIN_MATCHED_POINTS {
                if wider.is_some() {
                    return wider;
                }
                if !widened {
                    widened = true;
                    precision *= 2.0;
                    continue;
                }
                if count == 0 {
                    return None;
                }
            }

            return Some(self.average(lo, hi, precision));
        }

        wider
    }

    /// Index range of points inside `target ± precision * target`
    fn window(&self, target: f64, precision: f64) -> (usize, usize) {
        let half = target * precision;
        let low = target - half;
        let high = target + half;
        let lo = self.points.partition_point(|p| p.inst_lumi < low);
        let hi = self.points.partition_point(|p| p.inst_lumi <= high);
        (lo, hi.max(lo))
    }

    fn average(&self, lo: usize, hi: usize, precision: f64) -> CurveMatch {
        let matched = &self.points[lo..hi];
        let sum: f64 = matched.iter().map(|p| p.time_per_event).sum();
        CurveMatch {
            time_per_event: sum / matched.len() as f64,
            points: matched.len(),
            precision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(points: &[(f64, f64)]) -> PerformanceCurve {
        PerformanceCurve::new(points.iter().map(|&(inst_lumi, time_per_event)| CurvePoint {
            inst_lumi,
            time_per_event,
        }))
    }

    #[test]
    fn test_lumi_curve_instantaneous() {
        let c = LumiCurve::new(1, [(1, LUMI_SECTION_SECONDS * 2.0), (2, LUMI_SECTION_SECONDS * 4.0)]);
        assert!((c.instantaneous(1).unwrap() - 2.0).abs() < 1e-9);
        assert!(c.instantaneous(3).is_none());
        let avg = c.average_instantaneous([1, 2, 3]).unwrap();
        assert!((avg - 3.0).abs() < 1e-9);
        assert!(c.average_instantaneous([7, 8]).is_none());
    }

    #[test]
    fn test_lumi_curve_drops_bad_samples() {
        let c = LumiCurve::new(1, [(1, f64::NAN), (2, -1.0), (3, 5.0)]);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_curve_sorted() {
        let c = curve(&[(3.0, 1.0), (1.0, 1.0), (2.0, 1.0)]);
        let xs: Vec<f64> = c.points().iter().map(|p| p.inst_lumi).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_search_direct_hit() {
        // 3 points within ±10% of 100
        let c = curve(&[(95.0, 10.0), (100.0, 20.0), (105.0, 30.0), (200.0, 99.0)]);
        let m = c.search(100.0).unwrap();
        assert_eq!(m.points, 3);
        assert!((m.time_per_event - 20.0).abs() < 1e-9);
        assert_eq!(m.precision, INITIAL_PRECISION);
    }

    #[test]
    fn test_search_widens_once() {
        // nothing within ±10%, one point within ±20%
        let c = curve(&[(85.0, 7.0), (300.0, 1.0)]);
        let m = c.search(100.0).unwrap();
        assert_eq!(m.points, 1);
        assert_eq!(m.time_per_event, 7.0);
        assert!((m.precision - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_search_no_match_after_widen() {
        let c = curve(&[(10.0, 7.0), (300.0, 1.0)]);
        assert!(c.search(100.0).is_none());
    }

    #[test]
    fn test_search_narrows_when_crowded() {
        let points: Vec<(f64, f64)> = (0..20).map(|i| (91.0 + i as f64, 1.0 + i as f64)).collect();
        let c = curve(&points);
        let m = c.search(100.0).unwrap();
        assert!(m.points <= MAX_MATCHED_POINTS || m.precision < 2.0 * PRECISION_FLOOR);
        assert!(m.precision < INITIAL_PRECISION);
    }

    #[test]
    fn test_search_keeps_wider_set_when_narrowing_overshoots() {
        // 6 points at ±10%, only the center at ±5%
        let c = curve(&[
            (91.0, 1.0),
            (92.0, 1.0),
            (100.0, 4.0),
            (108.0, 1.0),
            (109.0, 1.0),
            (110.0, 1.0),
        ]);
        let m = c.search(100.0).unwrap();
        assert_eq!(m.points, 6);
        assert_eq!(m.precision, INITIAL_PRECISION);
    }

    #[test]
    fn test_search_terminates_on_dense_identical_points() {
        let points: Vec<(f64, f64)> = (0..1000).map(|_| (100.0, 2.0)).collect();
        let c = curve(&points);
        let m = c.search(100.0).unwrap();
        assert_eq!(m.points, 1000);
        assert_eq!(m.time_per_event, 2.0);
        assert!(m.precision >= PRECISION_FLOOR);
    }

    #[test]
    fn test_search_rejects_nonpositive_target() {
        let c = curve(&[(0.0, 1.0)]);
        assert!(c.search(0.0).is_none());
        assert!(c.search(f64::NAN).is_none());
    }

    #[test]
    fn test_from_pairs_rejects_empty() {
        assert!(PerformanceCurve::from_pairs(&[]).is_err());
        let c = PerformanceCurve::from_pairs(&[[1.0, 2.0], [2.0, -1.0]]).unwrap();
        assert_eq!(c.points().len(), 1);
    }
}
