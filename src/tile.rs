//! Tiling and subband geometry derivation (Annex B.3, B.5): partitions the
//! canvas into a uniform `XTsiz x YTsiz` grid, and derives each
//! tile-component's per-level subband rectangles and code-block grid, the
//! preflight pass Tier-2 needs for exact code-block counts before any
//! coding happens.

use crate::dwt::FilterKind;
use crate::geometry::{ceil_div, ceil_div_pow2, Rect};
use crate::tier1::contexts::Orientation;

/// One tile's grid coordinate and canvas rectangle.
#[derive(Debug, Clone, Copy)]
pub struct Tile {
  pub p: u32,
  pub q: u32,
  pub rect: Rect,
}

/// Partitions `canvas` into tiles of `tile_width x tile_height`, anchored
/// at `(tile_x0, tile_y0)` per Annex B.3's tiling-grid-offset rule.
pub fn tile_grid(canvas: Rect, tile_x0: u32, tile_y0: u32, tile_width: u32, tile_height: u32) -> Vec<Tile> {
  let num_x = ceil_div(canvas.x1.saturating_sub(tile_x0), tile_width).max(1);
  let num_y = ceil_div(canvas.y1.saturating_sub(tile_y0), tile_height).max(1);
  let mut tiles = Vec::with_capacity((num_x * num_y) as usize);
  for q in 0..num_y {
    for p in 0..num_x {
      let x0 = (tile_x0 + p * tile_width).max(canvas.x0);
      let y0 = (tile_y0 + q * tile_height).max(canvas.y0);
      let x1 = (tile_x0 + (p + 1) * tile_width).min(canvas.x1);
      let y1 = (tile_y0 + (q + 1) * tile_height).min(canvas.y1);
      tiles.push(Tile { p, q, rect: Rect::from_ltrb(x0, y0, x1, y1) });
    }
  }
  tiles
}

/// One subband's geometry within a tile-component at a given
/// decomposition level (Annex B.5, equations B-5..B-15).
#[derive(Debug, Clone, Copy)]
pub struct Subband {
  pub orientation: Orientation,
  pub level: u32,
  pub rect: Rect,
}

/// Derives every subband rectangle for an `N`-level decomposition of
/// `tile_comp_rect`: level 0 is the LL band after all `N` levels; levels
/// 1..=N each contribute HL/LH/HH at that resolution.
pub fn derive_subbands(tile_comp_rect: Rect, levels: u32) -> Vec<Subband> {
  let mut out = Vec::with_capacity(3 * levels as usize + 1);
  let ll_rect = Rect::from_ltrb(
    ceil_div_pow2(tile_comp_rect.x0, levels),
    ceil_div_pow2(tile_comp_rect.y0, levels),
    ceil_div_pow2(tile_comp_rect.x1, levels),
    ceil_div_pow2(tile_comp_rect.y1, levels),
  );
  out.push(Subband { orientation: Orientation::Ll, level: 0, rect: ll_rect });
  for level in 1..=levels {
    // `full` is the tile-component downsampled by one level less than the
    // LL band at this level; `half` is that level's LL nested within it.
    // HL/LH/HH are the three remaining quadrants of `full`, sized by the
    // difference between `full` and `half` along each axis (Annex B.5).
    let shift = levels - level;
    let full_x0 = ceil_div_pow2(tile_comp_rect.x0, shift);
    let full_y0 = ceil_div_pow2(tile_comp_rect.y0, shift);
    let full_x1 = ceil_div_pow2(tile_comp_rect.x1, shift);
    let full_y1 = ceil_div_pow2(tile_comp_rect.y1, shift);
    let half_x1 = ceil_div_pow2(tile_comp_rect.x1, shift + 1);
    let half_y1 = ceil_div_pow2(tile_comp_rect.y1, shift + 1);
    let width_half = half_x1.saturating_sub(full_x0);
    let height_half = half_y1.saturating_sub(full_y0);

    let hl = Rect::from_ltrb(full_x0 + width_half, full_y0, full_x1, full_y0 + height_half);
    let lh = Rect::from_ltrb(full_x0, full_y0 + height_half, full_x0 + width_half, full_y1);
    let hh = Rect::from_ltrb(full_x0 + width_half, full_y0 + height_half, full_x1, full_y1);
    out.push(Subband { orientation: Orientation::Hl, level, rect: hl });
    out.push(Subband { orientation: Orientation::Lh, level, rect: lh });
    out.push(Subband { orientation: Orientation::Hh, level, rect: hh });
  }
  out
}

/// Splits a subband rectangle into a `cblk_width x cblk_height` grid of
/// code-block rectangles (Annex B.7); the caller is responsible for
/// ensuring `cblk_width`/`cblk_height` are powers of two in `[4,64]` with
/// area `<= 4096`.
pub fn code_block_grid(subband: Rect, cblk_width: u32, cblk_height: u32) -> Vec<Rect> {
  if subband.is_empty() {
    return Vec::new();
  }
  let mut out = Vec::new();
  let mut y = subband.y0 - subband.y0 % cblk_height;
  while y < subband.y1 {
    let mut x = subband.x0 - subband.x0 % cblk_width;
    while x < subband.x1 {
      let rect = Rect::from_ltrb(x.max(subband.x0), y.max(subband.y0), (x + cblk_width).min(subband.x1), (y + cblk_height).min(subband.y1));
      if !rect.is_empty() {
        out.push(rect);
      }
      x += cblk_width;
    }
    y += cblk_height;
  }
  out
}

/// Which filter bank and how many decomposition levels a tile-component
/// uses; derived from COD/COC once per tile.
#[derive(Debug, Clone, Copy)]
pub struct TileComponentPlan {
  pub filter: FilterKind,
  pub levels: u32,
  pub cblk_width: u32,
  pub cblk_height: u32,
}
