//! The code-block: the unit Tier-1 operates on independently (spec's
//! Code-block entity). Dimensions are powers of two in `[4,64]` with area
//! `<= 4096` (Annex B.7).

use crate::geometry::Rect;
use crate::tier1::contexts::Orientation;

/// One bit-plane coding pass's outcome as recorded for the rate allocator:
/// cumulative bytes through this pass and the distortion reduction it
/// contributed (Annex D, §4.5.3 of the rate-control design).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassRecord {
  pub cumulative_bytes: u32,
  pub distortion: f64,
}

/// A single code-block: its canvas rectangle, how many most-significant
/// bit-planes were skipped entirely (all-zero), and the coded data plus
/// per-pass rate/distortion bookkeeping produced by Tier-1 encoding.
#[derive(Debug, Clone)]
pub struct CodeBlock {
  pub rect: Rect,
  pub orientation: Orientation,
  /// Number of magnitude bit-planes with no significant coefficient,
  /// signaled via the code-block's zero-bitplane tag tree.
  pub skipped_msbs: u32,
  /// Concatenated coded bytes across all emitted passes.
  pub coded_data: Vec<u8>,
  /// One entry per coding pass, in pass order.
  pub passes: Vec<PassRecord>,
}

impl CodeBlock {
  pub fn new(rect: Rect, orientation: Orientation) -> Self {
    debug_assert!(rect.area() <= 4096, "code-block area must not exceed 4096 samples");
    Self { rect, orientation, skipped_msbs: 0, coded_data: Vec::new(), passes: Vec::new() }
  }

  pub fn width(&self) -> usize {
    self.rect.width() as usize
  }

  pub fn height(&self) -> usize {
    self.rect.height() as usize
  }

  pub fn num_passes(&self) -> usize {
    self.passes.len()
  }

  /// Bytes needed to include passes `0..=upto` (inclusive), used by PCRD
  /// when truncating to a rate target.
  pub fn bytes_through_pass(&self, upto: usize) -> u32 {
    self.passes.get(upto).map(|p| p.cumulative_bytes).unwrap_or(0)
  }
}
