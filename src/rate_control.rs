//! Post-compression rate-distortion optimization (PCRD, Annex J, "optimal
//! truncation"): per-code-block convex hulls of (rate, distortion) points,
//! combined via a global Lagrangian slope binary search so the selected
//! truncation point for every code-block meets a byte-budget target.

use crate::tier1::codeblock::PassRecord;

/// One candidate truncation point surviving the convex-hull reduction:
/// including passes `0..=pass_index` costs `bytes` and leaves `distortion`
/// (lower is better) uncorrected.
#[derive(Debug, Clone, Copy)]
pub struct HullPoint {
  pub pass_index: usize,
  pub bytes: u32,
  pub distortion: f64,
}

/// Reduces a code-block's full pass list to its convex hull in
/// (rate, distortion) space: only points where the slope to the next
/// point is steeper than the slope to the previous survive, since a
/// dominated point is never optimal for any Lagrangian slope.
pub fn convex_hull(passes: &[PassRecord]) -> Vec<HullPoint> {
  let mut points: Vec<HullPoint> =
    passes.iter().enumerate().map(|(i, p)| HullPoint { pass_index: i, bytes: p.cumulative_bytes, distortion: p.distortion }).collect();
  points.sort_by_key(|p| p.bytes);

  let mut hull: Vec<HullPoint> = Vec::new();
  for p in points {
    while hull.len() >= 2 {
      let a = hull[hull.len() - 2];
      let b = hull[hull.len() - 1];
      if slope(a, b) <= slope(b, p) {
        hull.pop();
      } else {
        break;
      }
    }
    hull.push(p);
  }
  hull
}

fn slope(a: HullPoint, b: HullPoint) -> f64 {
  let dbytes = (b.bytes as f64 - a.bytes as f64).max(1e-9);
  (a.distortion - b.distortion) / dbytes
}

/// For a given Lagrangian slope `lambda`, the truncation point each
/// code-block's hull selects is the last hull point whose marginal slope
/// (distortion-drop per byte, relative to the previous hull point) is
/// `>= lambda`.
pub fn select_for_lambda(hull: &[HullPoint], lambda: f64) -> Option<HullPoint> {
  if hull.is_empty() {
    return None;
  }
  let mut chosen = hull[0];
  for w in hull.windows(2) {
    if slope(w[0], w[1]) >= lambda {
      chosen = w[1];
    } else {
      break;
    }
  }
  Some(chosen)
}

/// Binary-searches for the largest `lambda` whose total selected bytes
/// across every code-block's hull does not exceed `target_bytes`, within
/// `iterations` refinement steps.
pub fn find_lambda_for_budget(hulls: &[Vec<HullPoint>], target_bytes: u64, iterations: u32) -> f64 {
  let mut lo = 0.0f64;
  let mut hi = hulls
    .iter()
    .flat_map(|h| h.windows(2).map(|w| slope(w[0], w[1])))
    .fold(0.0f64, f64::max)
    .max(1.0);

  for _ in 0..iterations {
    let mid = (lo + hi) / 2.0;
    let total: u64 = hulls.iter().filter_map(|h| select_for_lambda(h, mid)).map(|p| p.bytes as u64).sum();
    if total > target_bytes {
      lo = mid;
    } else {
      hi = mid;
    }
  }
  hi
}
