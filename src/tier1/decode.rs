//! Inverse bit-plane coding: mirrors [`crate::tier1::encode`] pass-for-pass,
//! with segment-symbol verification and (when requested) per-pass
//! termination-marker verification both triggering concealment (Annex
//! D.4, and the recoverable-corruption policy in the error design).

use crate::error::DecodeOutcome;
use crate::mq::{ContextBank, Decoder as MqDecoder, UNIFORM_CONTEXT};
use crate::tier1::contexts::{self, NeighborSignificance, Orientation, RLC_CONTEXT};
use crate::tier1::CodingOptions;

const STRIPE_HEIGHT: usize = 4;
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
  fn new(width: usize, height: usize, vert_causal: bool) -> Self {
    Self {
      width,
      height,
      states: vec![CoeffState::default(); width * height],
      magnitudes: vec![0; width * height],
      vert_causal,
    }
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

  fn into_coefficients(self) -> Vec<i32> {
    self
      .magnitudes
      .iter()
      .zip(self.states.iter())
      .map(|(&m, s)| if s.negative { -(m as i32) } else { m as i32 })
      .collect()
  }
}

/// Decodes one code-block's coefficients from `data`, mirroring
/// [`super::encode::encode_codeblock`]. Returns
/// [`DecodeOutcome::Concealed`] at the bit-plane where a segment-symbol
/// mismatch, or (when `predictable_termination` is set) a broken
/// per-pass termination marker, was detected; coefficients from that
/// plane downward are left at their last good (mid-point) value.
pub fn decode_codeblock(
  data: &[u8],
  width: usize,
  height: usize,
  orientation: Orientation,
  max_bitplane: u32,
  options: CodingOptions,
) -> (Vec<i32>, DecodeOutcome) {
  let mut grid = Grid::new(width, height, options.vert_causal_context);
  let mut ctxs = ContextBank::new();
  let mut outcome = DecodeOutcome::Ok;
  let mut cursor: usize = 0;
  let mut mqd = MqDecoder::new(data);

  'planes: for bp in (0..=max_bitplane).rev() {
    let bit_mask = 1u32 << bp;
    let is_first_plane = bp == max_bitplane;
    let plane_number = max_bitplane - bp;
    let bypass_active = options.bypass && plane_number >= BYPASS_FROM_PLANE;

    if !is_first_plane {
      if !advance_segment(data, &mut cursor, &options, &mut mqd) {
        outcome = DecodeOutcome::Concealed { bitplane: bp as i32 };
        conceal_below(&mut grid, bit_mask);
        break 'planes;
      }
      for y in 0..height {
        for x in 0..width {
          let i = y * width + x;
          if grid.states[i].significant || grid.states[i].visited {
            continue;
          }
          if !grid.has_significant_8_neighbor(x, y) {
            continue;
          }
          let bit = if bypass_active { mqd.decode(&mut ctxs, UNIFORM_CONTEXT) } else {
            let ns = grid.neighbor_significance(x, y);
            let ctx = contexts::zc_context(orientation, ns);
            mqd.decode(&mut ctxs, ctx)
          };
          grid.states[i].visited = true;
          if bit == 1 {
            grid.magnitudes[i] |= bit_mask;
            grid.states[i].significant = true;
            let (sctx, predicted_negative) = grid.sign_context(x, y);
            let flip = if bypass_active { mqd.decode(&mut ctxs, UNIFORM_CONTEXT) } else { mqd.decode(&mut ctxs, sctx) } == 1;
            grid.states[i].negative = flip != predicted_negative;
          }
        }
      }

      if !advance_segment(data, &mut cursor, &options, &mut mqd) {
        outcome = DecodeOutcome::Concealed { bitplane: bp as i32 };
        conceal_below(&mut grid, bit_mask);
        break 'planes;
      }
      for y in 0..height {
        for x in 0..width {
          let i = y * width + x;
          if !grid.states[i].significant || grid.states[i].visited {
            continue;
          }
          let bit = if bypass_active {
            mqd.decode(&mut ctxs, UNIFORM_CONTEXT)
          } else {
            let has_sig_neighbor = grid.has_significant_8_neighbor(x, y);
            let ctx = contexts::mr_context(!grid.states[i].refined, has_sig_neighbor);
            mqd.decode(&mut ctxs, ctx)
          };
          if bit == 1 {
            grid.magnitudes[i] |= bit_mask;
          }
          grid.states[i].refined = true;
        }
      }
    }

    if !advance_segment(data, &mut cursor, &options, &mut mqd) {
      outcome = DecodeOutcome::Concealed { bitplane: bp as i32 };
      conceal_below(&mut grid, bit_mask);
      break 'planes;
    }
    run_cleanup_pass(&mut grid, &mut mqd, &mut ctxs, orientation, bit_mask);

    if options.segment_symbols {
      let expected = [1u8, 0, 1, 0];
      for &e in expected.iter() {
        let got = mqd.decode(&mut ctxs, UNIFORM_CONTEXT);
        if got != e {
          outcome = DecodeOutcome::Concealed { bitplane: bp as i32 };
          conceal_below(&mut grid, bit_mask);
          break 'planes;
        }
      }
    }
  }

  (grid.into_coefficients(), outcome)
}

fn run_cleanup_pass(grid: &mut Grid, mqd: &mut MqDecoder, ctxs: &mut ContextBank, orientation: Orientation, bit_mask: u32) {
  let width = grid.width;
  let height = grid.height;
  let mut y0 = 0;
  while y0 < height {
    let stripe_h = (height - y0).min(STRIPE_HEIGHT);
    for x in 0..width {
      if stripe_h == STRIPE_HEIGHT && rlc_eligible(grid, x, y0) {
        let any_bit = mqd.decode(ctxs, RLC_CONTEXT);
        if any_bit == 0 {
          continue;
        }
        let hi = mqd.decode(ctxs, UNIFORM_CONTEXT);
        let lo = mqd.decode(ctxs, UNIFORM_CONTEXT);
        let r = ((hi << 1) | lo) as usize;
        let y = y0 + r;
        let i = y * width + x;
        grid.magnitudes[i] |= bit_mask;
        grid.states[i].significant = true;
        let (sctx, predicted_negative) = grid.sign_context(x, y);
        let flip = mqd.decode(ctxs, sctx) == 1;
        grid.states[i].negative = flip != predicted_negative;
        for dy in (r + 1)..STRIPE_HEIGHT {
          decode_cleanup_sample(grid, mqd, ctxs, orientation, x, y0 + dy, bit_mask);
        }
      } else {
        for dy in 0..stripe_h {
          decode_cleanup_sample(grid, mqd, ctxs, orientation, x, y0 + dy, bit_mask);
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

fn decode_cleanup_sample(
  grid: &mut Grid,
  mqd: &mut MqDecoder,
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
  let bit = mqd.decode(ctxs, ctx);
  if bit == 1 {
    grid.magnitudes[i] |= bit_mask;
    grid.states[i].significant = true;
    let (sctx, predicted_negative) = grid.sign_context(x, y);
    let flip = mqd.decode(ctxs, sctx) == 1;
    grid.states[i].negative = flip != predicted_negative;
  }
}

/// When `terminate_per_pass` is set, moves `mqd` onto the next
/// length-prefixed segment in `data` (advancing `cursor`); a no-op
/// returning `true` otherwise, since the stream is then one continuous
/// MQ codeword. Returns `false` on truncated/malformed framing or (with
/// `predictable_termination`) a segment whose trailing bytes don't match
/// the expected termination padding, both treated as corruption.
fn advance_segment<'a>(data: &'a [u8], cursor: &mut usize, options: &CodingOptions, mqd: &mut MqDecoder<'a>) -> bool {
  if !options.terminate_per_pass {
    return true;
  }
  match next_segment(data, cursor) {
    Some(seg) if !options.predictable_termination || ends_with_termination_marker(seg) => {
      *mqd = MqDecoder::new(seg);
      true
    }
    _ => false,
  }
}

fn next_segment<'a>(data: &'a [u8], cursor: &mut usize) -> Option<&'a [u8]> {
  let start = *cursor;
  if start + 2 > data.len() {
    return None;
  }
  let len = u16::from_be_bytes([data[start], data[start + 1]]) as usize;
  let body_start = start + 2;
  let body_end = body_start.checked_add(len)?;
  if body_end > data.len() {
    return None;
  }
  *cursor = body_end;
  Some(&data[body_start..body_end])
}

fn ends_with_termination_marker(segment: &[u8]) -> bool {
  segment.ends_with(&[0xFF, 0xAC]) || segment.last() == Some(&0xFF)
}

/// Mid-point reconstruction for coefficients whose bit-planes below
/// `from_mask` were never decoded: any coefficient already significant
/// gets its lowest undecoded bit set, so its magnitude sits at the centre
/// of the remaining uncertainty interval (Annex D.4's concealment note).
fn conceal_below(grid: &mut Grid, from_mask: u32) {
  let half = from_mask >> 1;
  for (m, s) in grid.magnitudes.iter_mut().zip(grid.states.iter()) {
    if s.significant && half != 0 {
      *m |= half;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tier1::encode::encode_codeblock;

  #[test]
  fn clean_stream_with_segment_symbols_decodes_without_concealment() {
    let (w, h) = (4, 4);
    let coeffs = vec![9i32, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { segment_symbols: true, ..Default::default() };
    let (bytes, _) = encode_codeblock(&coeffs, w, h, Orientation::Ll, 4, opts);
    let (decoded, outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, 4, opts);
    assert!(!outcome.is_concealed());
    assert_eq!(decoded, coeffs);
  }

  #[test]
  fn corrupted_stream_yields_right_length_without_panicking() {
    let (w, h) = (4, 4);
    let coeffs = vec![9i32, -3, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { segment_symbols: true, ..Default::default() };
    let (mut bytes, _) = encode_codeblock(&coeffs, w, h, Orientation::Ll, 4, opts);
    if bytes.len() > 2 {
      let mid = bytes.len() / 2;
      bytes[mid] ^= 0x55;
    }
    let (decoded, _outcome) = decode_codeblock(&bytes, w, h, Orientation::Ll, 4, opts);
    assert_eq!(decoded.len(), w * h);
  }

  #[test]
  fn truncated_terminated_stream_conceals_without_panicking() {
    let (w, h) = (4, 4);
    let coeffs = vec![9i32, -3, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let opts = CodingOptions { terminate_per_pass: true, ..Default::default() };
    let (bytes, _) = encode_codeblock(&coeffs, w, h, Orientation::Ll, 4, opts);
    let truncated = &bytes[..bytes.len() / 2];
    let (decoded, outcome) = decode_codeblock(truncated, w, h, Orientation::Ll, 4, opts);
    assert_eq!(decoded.len(), w * h);
    assert!(outcome.is_concealed());
  }
}
