//! Forward bit-plane coding: significance propagation, magnitude
//! refinement, and cleanup passes over one code-block's coefficients
//! (Annex D.3/D.4).

use crate::mq::{ContextBank, Encoder as MqEncoder, UNIFORM_CONTEXT};
use crate::tier1::codeblock::PassRecord;
use crate::tier1::contexts::{self, NeighborSignificance, Orientation, RLC_CONTEXT};
use crate::tier1::CodingOptions;

/// Rows are grouped into stripes of 4 for the cleanup pass's run-length
/// shortcut (Annex D.4's "column of four").
const STRIPE_HEIGHT: usize = 4;

/// From the 5th significant bit-plane onward, `BYPASS` skips adaptive
/// context modelling for passes 1/2 (Annex D.5): this crate approximates
/// the standard's raw-bit interleave by coding those bits under the fixed
/// 0.5-probability uniform context instead of a real separate bit-packer,
/// which keeps a single MQ byte stream but removes the adaptive cost
/// model the bypass mode is meant to shed.
const BYPASS_FROM_PLANE: u32 = 4;

#[derive(Debug, Clone, Copy, Default)]
struct CoeffState {
  significant: bool,
  visited: bool,
  refined: bool,
  negative: bool,
}

struct Grid {
  width: usize,
  height: usize,
  states: Vec<CoeffState>,
  magnitudes: Vec<u32>,
  vert_causal: bool,
}

impl Grid {
  fn new(width: usize, height: usize, coefficients: &[i32], vert_causal: bool) -> Self {
    let states = vec![CoeffState::default(); width * height];
    let magnitudes = coefficients.iter().map(|&c| c.unsigned_abs()).collect();
    let mut grid = Self { width, height, states, magnitudes, vert_causal };
    for (i, &c) in coefficients.iter().enumerate() {
      grid.states[i].negative = c < 0;
    }
    grid
  }

  fn idx(&self, x: isize, y: isize) -> Option<usize> {
    if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
      None
    } else {
      Some(y as usize * self.width + x as usize)
    }
  }

  fn significant_at(&self, x: isize, y: isize) -> bool {
    self.idx(x, y).map(|i| self.states[i].significant).unwrap_or(false)
  }

  /// Significance one row above `(x, y)`, forced to "not significant" at a
  /// stripe's top row when `vert_causal` is set, so a stripe never reads
  /// the previous stripe's state (Annex D.3.1's causal context option).
  fn significant_above(&self, x: isize, y: isize) -> bool {
    if self.vert_causal && y as usize % STRIPE_HEIGHT == 0 {
      false
    } else {
      self.significant_at(x, y - 1)
    }
  }

  fn neighbor_significance(&self, x: usize, y: usize) -> NeighborSignificance {
    let (xi, yi) = (x as isize, y as isize);
    let h = self.significant_at(xi - 1, yi) as u8 + self.significant_at(xi + 1, yi) as u8;
    let v = self.significant_above(xi, yi) as u8 + self.significant_at(xi, yi + 1) as u8;
    let d = self.significant_above(xi - 1, yi) as u8
      + self.significant_above(xi + 1, yi) as u8
      + self.significant_at(xi - 1, yi + 1) as u8
      + self.significant_at(xi + 1, yi + 1) as u8;
    NeighborSignificance { horizontal: h, vertical: v, diagonal: d }
  }

  fn sign_context(&self, x: usize, y: usize) -> (usize, bool) {
    let (xi, yi) = (x as isize, y as isize);
    let h_sign = self.signed_contribution(xi - 1, yi) + self.signed_contribution(xi + 1, yi);
    let v_sign = self.signed_contribution_above(xi, yi) + self.signed_contribution(xi, yi + 1);
    contexts::sc_context(h_sign.clamp(-1, 1), v_sign.clamp(-1, 1))
  }

  fn signed_contribution(&self, x: isize, y: isize) -> i8 {
    match self.idx(x, y) {
      Some(i) if self.states[i].significant => {
        if self.states[i].negative {
          -1
        } else {
          1
        }
      }
      _ => 0,
    }
  }

  fn signed_contribution_above(&self, x: isize, y: isize) -> i8 {
    if self.vert_causal && y as usize % STRIPE_HEIGHT == 0 {
      0
    } else {
      self.signed_contribution(x, y - 1)
    }
  }

  fn has_significant_8_neighbor(&self, x: usize, y: usize) -> bool {
    let (xi, yi) = (x as isize, y as isize);
    for dy in -1..=1 {
      for dx in -1..=1 {
        if (dx, dy) == (0, 0) {
          continue;
        }
        let hit = if dy == -1 { self.significant_above(xi + dx, yi) } else { self.significant_at(xi + dx, yi + dy) };
        if hit {
          return true;
        }
      }
    }
    false
  }
}

/// Runs the bit-plane coder over `coefficients` (row-major, magnitude
/// already extracted from quantized values with sign carried via the
/// value's sign) down to bit-plane zero, returning the coded bytes and one
/// [`PassRecord`] per emitted pass.
pub fn encode_codeblock(
  coefficients: &[i32],
  width: usize,
  height: usize,
  orientation: Orientation,
  max_bitplane: u32,
  options: CodingOptions,
) -> (Vec<u8>, Vec<PassRecord>) {
  let mut grid = Grid::new(width, height, coefficients, options.vert_causal_context);
  let mut mqc = MqEncoder::new();
  let mut ctxs = ContextBank::new();
  let mut passes = Vec::new();
  let mut cumulative: u32 = 0;
  let mut coded: Vec<u8> = Vec::new();

  for bp in (0..=max_bitplane).rev() {
    let bit_mask = 1u32 << bp;
    let is_first_plane = bp == max_bitplane;
    let plane_number = max_bitplane - bp;
    let bypass_active = options.bypass && plane_number >= BYPASS_FROM_PLANE;

    if !is_first_plane {
      for y in 0..height {
        for x in 0..width {
          let i = y * width + x;
          if grid.states[i].significant || grid.states[i].visited {
            continue;
          }
          if !grid.has_significant_8_neighbor(x, y) {
            continue;
          }
          let bit = ((grid.magnitudes[i] & bit_mask) != 0) as u8;
          if bypass_active {
            mqc.code(&mut ctxs, UNIFORM_CONTEXT, bit);
          } else {
            let ns = grid.neighbor_significance(x, y);
            let ctx = contexts::zc_context(orientation, ns);
            mqc.code(&mut ctxs, ctx, bit);
          }
          grid.states[i].visited = true;
          if bit == 1 {
            grid.states[i].significant = true;
            let (sctx, predicted_negative) = grid.sign_context(x, y);
            let actual_negative = grid.states[i].negative;
            let flip = (actual_negative != predicted_negative) as u8;
            if bypass_active {
              mqc.code(&mut ctxs, UNIFORM_CONTEXT, flip);
            } else {
              mqc.code(&mut ctxs, sctx, flip);
            }
          }
        }
      }
      record_pass(&grid.magnitudes, bp, &mut cumulative, &mut passes);
      finish_pass(&mut mqc, &mut ctxs, &mut coded, &options);

      for y in 0..height {
        for x in 0..width {
          let i = y * width + x;
          if !grid.states[i].significant || grid.states[i].visited {
            continue;
          }
          let bit = ((grid.magnitudes[i] & bit_mask) != 0) as u8;
          if bypass_active {
            mqc.code(&mut ctxs, UNIFORM_CONTEXT, bit);
          } else {
            let has_sig_neighbor = grid.has_significant_8_neighbor(x, y);
            let ctx = contexts::mr_context(!grid.states[i].refined, has_sig_neighbor);
            mqc.code(&mut ctxs, ctx, bit);
          }
          grid.states[i].refined = true;
        }
      }
      record_pass(&grid.magnitudes, bp, &mut cumulative, &mut passes);
      finish_pass(&mut mqc, &mut ctxs, &mut coded, &options);
    }

    run_cleanup_pass(&mut grid, &mut mqc, &mut ctxs, orientation, bit_mask);

    if options.segment_symbols {
      for &bit in &[1u8, 0, 1, 0] {
        mqc.code(&mut ctxs, UNIFORM_CONTEXT, bit);
      }
    }
    record_pass(&grid.magnitudes, bp, &mut cumulative, &mut passes);
    finish_pass(&mut mqc, &mut ctxs, &mut coded, &options);
  }

  if !options.terminate_per_pass {
    coded.extend(mqc.flush());
  }
  (coded, passes)
}

/// Cleanup pass (Annex D.4): codes every coefficient neither already
/// significant nor visited this bit-plane. A fully-insignificant,
/// zero-neighborhood stripe of 4 samples in one column is coded with the
/// run-length shortcut (one "any-bit" symbol, then if set two uniform
/// bits locating the first 1, then its sign); everything else falls back
/// to per-sample Zero Coding.
fn run_cleanup_pass(grid: &mut Grid, mqc: &mut MqEncoder, ctxs: &mut ContextBank, orientation: Orientation, bit_mask: u32) {
  let width = grid.width;
  let height = grid.height;
  let mut y0 = 0;
  while y0 < height {
    let stripe_h = (height - y0).min(STRIPE_HEIGHT);
    for x in 0..width {
      if stripe_h == STRIPE_HEIGHT && rlc_eligible(grid, x, y0) {
        let any_bit = (0..STRIPE_HEIGHT).any(|dy| (grid.magnitudes[(y0 + dy) * width + x] & bit_mask) != 0);
        mqc.code(ctxs, RLC_CONTEXT, any_bit as u8);
        if !any_bit {
          continue;
        }
        let r = (0..STRIPE_HEIGHT).find(|&dy| (grid.magnitudes[(y0 + dy) * width + x] & bit_mask) != 0).unwrap();
        mqc.code(ctxs, UNIFORM_CONTEXT, ((r >> 1) & 1) as u8);
        mqc.code(ctxs, UNIFORM_CONTEXT, (r & 1) as u8);
        let y = y0 + r;
        let i = y * width + x;
        grid.states[i].significant = true;
        let (sctx, predicted_negative) = grid.sign_context(x, y);
        let actual_negative = grid.states[i].negative;
        mqc.code(ctxs, sctx, (actual_negative != predicted_negative) as u8);
        for dy in (r + 1)..STRIPE_HEIGHT {
          code_cleanup_sample(grid, mqc, ctxs, orientation, x, y0 + dy, bit_mask);
        }
      } else {
        for dy in 0..stripe_h {
          code_cleanup_sample(grid, mqc, ctxs, orientation, x, y0 + dy, bit_mask);
        }
      }
    }
    y0 += STRIPE_HEIGHT;
  }
}

fn rlc_eligible(grid: &Grid, x: usize, y0: usize) -> bool {
  (0..STRIPE_HEIGHT).all(|dy| {
    let y = y0 + dy;
    let i = y * grid.width + x;
    !grid.states[i].significant && !grid.states[i].visited && !grid.has_significant_8_neighbor(x, y)
  })
}

fn code_cleanup_sample(
  grid: &mut Grid,
  mqc: &mut MqEncoder,
  ctxs: &mut ContextBank,
  orientation: Orientation,
  x: usize,
  y: usize,
  bit_mask: u32,
) {
  let i = y * grid.width + x;
  if grid.states[i].visited {
    grid.states[i].visited = false;
    return;
  }
  if grid.states[i].significant {
    return;
  }
  let ns = grid.neighbor_significance(x, y);
  let ctx = contexts::zc_context(orientation, ns);
  let bit = ((grid.magnitudes[i] & bit_mask) != 0) as u8;
  mqc.code(ctxs, ctx, bit);
  if bit == 1 {
    grid.states[i].significant = true;
    let (sctx, predicted_negative) = grid.sign_context(x, y);
    let actual_negative = grid.states[i].negative;
    mqc.code(ctxs, sctx, (actual_negative != predicted_negative) as u8);
  }
}

/// Ends a pass: always tallies rate/distortion bookkeeping via
/// [`record_pass`] (called by the caller beforehand), and when
/// `terminate_per_pass` is set, flushes the current MQ segment into
/// `coded` behind a 2-byte length prefix (self-framing, since this
/// crate's packet layer does not carry per-pass lengths) and starts a
/// fresh coder for the next pass; `reset_mq_per_pass` separately
/// reinitializes the adaptive contexts regardless of whether the coder
/// itself was terminated.
fn finish_pass(mqc: &mut MqEncoder, ctxs: &mut ContextBank, coded: &mut Vec<u8>, options: &CodingOptions) {
  if options.terminate_per_pass {
    let finished = std::mem::replace(mqc, MqEncoder::new());
    let mut segment = finished.flush();
    if options.predictable_termination && !ends_with_termination_marker(&segment) {
      segment.extend_from_slice(&[0xFF, 0xAC]);
    }
    coded.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    coded.extend_from_slice(&segment);
  }
  if options.reset_mq_per_pass {
    ctxs.reset();
  }
}

fn ends_with_termination_marker(segment: &[u8]) -> bool {
  segment.ends_with(&[0xFF, 0xAC]) || segment.last() == Some(&0xFF)
}

/// Appends one [`PassRecord`]: `cumulative_bytes` approximates the MQ
/// encoder's output size so far (the real buffer only exists after
/// `flush`, so this is a monotone per-pass counter, not an exact byte
/// count); `distortion` is the sum of squared magnitude bits not yet
/// coded below `bp`, a proxy for mean-squared reconstruction error if
/// truncation happened right after this pass.
fn record_pass(magnitudes: &[u32], bp: u32, cumulative: &mut u32, passes: &mut Vec<PassRecord>) {
  *cumulative += 1;
  let mask = (1u64 << bp) - 1;
  let distortion: f64 = magnitudes.iter().map(|&m| { let r = (m as u64) & mask; (r * r) as f64 }).sum();
  passes.push(PassRecord { cumulative_bytes: *cumulative, distortion });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tier1::decode::decode_codeblock;

  #[test]
  fn encode_decode_round_trips_small_block() {
    let (w, h) = (4, 4);
    let coeffs: Vec<i32> = vec![5, -3, 0, 1, 0, 0, -2, 0, 7, 0, 0, 0, 0, 0, 0, 0];
    let max_bp = 3;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Ll, max_bp, CodingOptions::default());
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, max_bp, CodingOptions::default());
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn all_zero_column_uses_run_length_shortcut_and_round_trips() {
    let (w, h) = (1, 4);
    let coeffs: Vec<i32> = vec![0, 0, 6, 0];
    let max_bp = 3;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Ll, max_bp, CodingOptions::default());
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, max_bp, CodingOptions::default());
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn wide_all_zero_block_round_trips_with_many_rlc_columns() {
    let (w, h) = (8, 8);
    let mut coeffs = vec![0i32; w * h];
    coeffs[w * 5 + 3] = -4;
    let max_bp = 2;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Hl, max_bp, CodingOptions::default());
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Hl, max_bp, CodingOptions::default());
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn bypass_option_round_trips() {
    let (w, h) = (4, 8);
    let coeffs: Vec<i32> = vec![31, -17, 5, 0, 0, 2, 0, -9, 4, 0, 0, 0, 12, 0, -1, 0, 0, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { bypass: true, ..Default::default() };
    let max_bp = 5;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Lh, max_bp, opts);
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Lh, max_bp, opts);
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn reset_mq_per_pass_round_trips() {
    let (w, h) = (4, 4);
    let coeffs: Vec<i32> = vec![5, -3, 0, 1, 0, 0, -2, 0, 7, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { reset_mq_per_pass: true, ..Default::default() };
    let max_bp = 3;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Ll, max_bp, opts);
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, max_bp, opts);
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn terminate_per_pass_round_trips() {
    let (w, h) = (4, 4);
    let coeffs: Vec<i32> = vec![5, -3, 0, 1, 0, 0, -2, 0, 7, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { terminate_per_pass: true, ..Default::default() };
    let max_bp = 3;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Ll, max_bp, opts);
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, max_bp, opts);
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn predictable_termination_round_trips_clean_and_detects_corruption() {
    let (w, h) = (4, 4);
    let coeffs: Vec<i32> = vec![9, -3, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { terminate_per_pass: true, predictable_termination: true, ..Default::default() };
    let max_bp = 4;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Ll, max_bp, opts);
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, max_bp, opts);
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);

    // Flip the last byte of a middle segment's termination marker; the
    // decoder must detect the broken padding pattern rather than trusting
    // corrupted bits.
    let mut corrupted = bytes.clone();
    if corrupted.len() > 4 {
      let i = corrupted.len() / 2;
      corrupted[i] ^= 0xFF;
    }
    let (decoded, _outcome) = decode_codeblock(&corrupted, w, h, Orientation::Ll, max_bp, opts);
    assert_eq!(decoded.len(), w * h); // must not panic; concealment (if any) is covered in tier1::decode's tests
  }

  #[test]
  fn vert_causal_context_round_trips() {
    let (w, h) = (4, 9);
    let mut coeffs = vec![0i32; w * h];
    coeffs[3 * w + 1] = 6;
    coeffs[4 * w + 1] = -2;
    coeffs[8 * w + 2] = 3;
    let opts = CodingOptions { vert_causal_context: true, ..Default::default() };
    let max_bp = 3;
    let (bytes, _passes) = encode_codeblock(&coeffs, w, h, Orientation::Hh, max_bp, opts);
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Hh, max_bp, opts);
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }
}
