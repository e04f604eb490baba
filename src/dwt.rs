//! Forward/inverse discrete wavelet transform: the reversible 5/3 integer
//! filter bank and the irreversible 9/7 floating-point filter bank (Annex
//! F), each applied separably (row then column) with a Mallat multi-level
//! decomposition.
//!
//! Coefficients live in a single `width * height` buffer per tile-component,
//! addressed in-place: after an `N`-level forward transform the LL band at
//! level `N` occupies the top-left quadrant of size `ceil(w/2^N) x
//! ceil(h/2^N)`, HL/LH/HH occupy the remaining three quadrants at each
//! level, exactly where Tier-2 expects to find each subband. This is the
//! classic in-place convention: decoding walks decomposition levels
//! outward, interleaving the LL quadrant with its three siblings before
//! running the inverse 1-D filter on rows then columns.

use crate::geometry::ceil_div;

/// Which filter bank a tile-component uses, chosen by the coding style
/// (reversible transforms are mandatory for lossless, Annex F.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
  Reversible53,
  Irreversible97,
}

/// 9/7 lifting constants (Annex F.4.4, Table F.4).
const ALPHA: f32 = -1.586_134_342;
const BETA: f32 = -0.052_980_118;
const GAMMA: f32 = 0.882_911_075;
const DELTA: f32 = 0.443_506_852;
const KAPPA: f32 = 1.230_174_105;
const INV_KAPPA: f32 = 1.0 / KAPPA;

/// Mirrors an out-of-range index using whole-sample symmetric extension,
/// e.g. for `n = 5`: `-1 -> 1`, `-2 -> 2`, `5 -> 3`, `6 -> 2`.
fn mirror(i: isize, n: usize) -> usize {
  if n <= 1 {
    return 0;
  }
  let period = 2 * (n as isize - 1);
  let mut m = i % period;
  if m < 0 {
    m += period;
  }
  if m >= n as isize {
    (period - m) as usize
  } else {
    m as usize
  }
}

/// In-place forward 5/3 lifting over one 1-D line of length `n`, reading
/// through `get`/writing through `set` so the same routine serves rows and
/// columns of a 2-D buffer without copying.
fn lift_53_forward(line: &mut [i32]) {
  let n = line.len();
  if n < 2 {
    return;
  }
  // Predict: odd samples become detail coefficients.
  let mut i = 1;
  while i < n {
    let left = line[i - 1];
    let right = line[mirror(i as isize + 1, n)];
    line[i] -= (left + right) >> 1;
    i += 2;
  }
  // Update: even samples become approximation coefficients.
  let mut i = 0;
  while i < n {
    let left = line[mirror(i as isize - 1, n)];
    let right = line[(i + 1).min(n - 1)];
    line[i] += (left + right + 2) >> 2;
    i += 2;
  }
}

fn lift_53_inverse(line: &mut [i32]) {
  let n = line.len();
  if n < 2 {
    return;
  }
  let mut i = 0;
  while i < n {
    let left = line[mirror(i as isize - 1, n)];
    let right = line[(i + 1).min(n - 1)];
    line[i] -= (left + right + 2) >> 2;
    i += 2;
  }
  let mut i = 1;
  while i < n {
    let left = line[i - 1];
    let right = line[mirror(i as isize + 1, n)];
    line[i] += (left + right) >> 1;
    i += 2;
  }
}

/// In-place forward 9/7 lifting over one 1-D line of floats.
fn lift_97_forward(line: &mut [f32]) {
  let n = line.len();
  if n < 2 {
    return;
  }
  let step = |line: &mut [f32], coeff: f32, even_from_odd: bool| {
    if even_from_odd {
      let mut i = 0;
      while i < n {
        let left = line[mirror(i as isize - 1, n)];
        let right = line[(i + 1).min(n - 1)];
        line[i] += coeff * (left + right);
        i += 2;
      }
    } else {
      let mut i = 1;
      while i < n {
        let left = line[i - 1];
        let right = line[mirror(i as isize + 1, n)];
        line[i] += coeff * (left + right);
        i += 2;
      }
    }
  };
  step(line, ALPHA, false);
  step(line, BETA, true);
  step(line, GAMMA, false);
  step(line, DELTA, true);
  let mut i = 0;
  while i < n {
    line[i] *= INV_KAPPA;
    i += 1;
  }
  let mut i = 1;
  while i < n {
    line[i] *= KAPPA;
    i += 1;
  }
}

fn lift_97_inverse(line: &mut [f32]) {
  let n = line.len();
  if n < 2 {
    return;
  }
  let mut i = 0;
  while i < n {
    line[i] *= KAPPA;
    i += 1;
  }
  let mut i = 1;
  while i < n {
    line[i] *= INV_KAPPA;
    i += 1;
  }
  let step = |line: &mut [f32], coeff: f32, even_from_odd: bool| {
    if even_from_odd {
      let mut i = 0;
      while i < n {
        let left = line[mirror(i as isize - 1, n)];
        let right = line[(i + 1).min(n - 1)];
        line[i] -= coeff * (left + right);
        i += 2;
      }
    } else {
      let mut i = 1;
      while i < n {
        let left = line[i - 1];
        let right = line[mirror(i as isize + 1, n)];
        line[i] -= coeff * (left + right);
        i += 2;
      }
    }
  };
  step(line, DELTA, true);
  step(line, GAMMA, false);
  step(line, BETA, true);
  step(line, ALPHA, false);
}

/// Separates (forward) or interleaves (inverse) even/odd-indexed samples
/// of `line` through `scratch`, the 1-D analogue of Annex F's 2D_INTERLEAVE
/// at a single decomposition level, reused as the row/column scratch
/// buffer spec.md §4.3 calls for.
fn deinterleave<T: Copy + Default>(line: &[T], scratch: &mut [T]) {
  let n = line.len();
  let low_len = ceil_div(n as u32, 2) as usize;
  for (i, chunk) in line.chunks(2).enumerate() {
    scratch[i] = chunk[0];
    if chunk.len() == 2 {
      scratch[low_len + i] = chunk[1];
    }
  }
}

fn interleave<T: Copy + Default>(scratch: &[T], line: &mut [T]) {
  let n = line.len();
  let low_len = ceil_div(n as u32, 2) as usize;
  for i in 0..n {
    line[i] = if i % 2 == 0 { scratch[i / 2] } else { scratch[low_len + i / 2] };
  }
}

macro_rules! impl_transform {
  ($name:ident, $ty:ty, $lift_fwd:ident, $lift_inv:ident) => {
    /// Runs an `N`-level forward Mallat decomposition of `buf` (row-major,
    /// `width * height`) in place: rows then columns at each level, each
    /// followed by a deinterleave so the next level only touches the LL
    /// quadrant.
    pub fn forward(buf: &mut [$ty], width: usize, height: usize, levels: u32) {
      let mut row_scratch = vec![<$ty>::default(); width];
      let mut col_scratch = vec![<$ty>::default(); height];
      let (mut w, mut h) = (width, height);
      for _ in 0..levels {
        if w == 0 || h == 0 {
          break;
        }
        for y in 0..h {
          let row = &mut buf[y * width..y * width + w];
          $lift_fwd(row);
          deinterleave(row, &mut row_scratch[..w]);
          row.copy_from_slice(&row_scratch[..w]);
        }
        for x in 0..w {
          for y in 0..h {
            col_scratch[y] = buf[y * width + x];
          }
          $lift_fwd(&mut col_scratch[..h]);
          let mut tmp = vec![<$ty>::default(); h];
          deinterleave(&col_scratch[..h], &mut tmp);
          for y in 0..h {
            buf[y * width + x] = tmp[y];
          }
        }
        w = ceil_div(w as u32, 2) as usize;
        h = ceil_div(h as u32, 2) as usize;
      }
    }

    /// Runs an `N`-level inverse Mallat reconstruction, mirroring
    /// `forward` level-by-level from the innermost LL band outward.
    pub fn inverse(buf: &mut [$ty], width: usize, height: usize, levels: u32) {
      let mut sizes = Vec::with_capacity(levels as usize + 1);
      let (mut w, mut h) = (width, height);
      sizes.push((w, h));
      for _ in 0..levels {
        if w == 0 || h == 0 {
          break;
        }
        w = ceil_div(w as u32, 2) as usize;
        h = ceil_div(h as u32, 2) as usize;
        sizes.push((w, h));
      }
      for &(w, h) in sizes.iter().rev().skip(1) {
        for x in 0..w {
          let mut col = vec![<$ty>::default(); h];
          for y in 0..h {
            col[y] = buf[y * width + x];
          }
          let mut tmp = vec![<$ty>::default(); h];
          interleave(&col, &mut tmp);
          $lift_inv(&mut tmp);
          for y in 0..h {
            buf[y * width + x] = tmp[y];
          }
        }
        for y in 0..h {
          let row = &mut buf[y * width..y * width + w];
          let mut tmp = vec![<$ty>::default(); w];
          interleave(row, &mut tmp);
          $lift_inv(&mut tmp);
          row.copy_from_slice(&tmp);
        }
      }
    }
  };
}

pub mod reversible {
  use super::*;
  impl_transform!(_unused_marker, i32, lift_53_forward, lift_53_inverse);
}

pub mod irreversible {
  use super::*;
  impl_transform!(_unused_marker, f32, lift_97_forward, lift_97_inverse);
}
