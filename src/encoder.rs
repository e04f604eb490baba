//! Top-level encoder orchestration: tiling, MCT, DWT, quantization, ROI,
//! Tier-1 entropy coding, rate-distortion layer assembly, Tier-2 packet
//! writing, and JP2/codestream emission (mirrors the teacher's `tcd.c`
//! tile-coding-data orchestration, generalized to this crate's safe,
//! struct-of-arrays pipeline).

use std::collections::HashMap;

use crate::bit_io::BitWriter;
use crate::codestream::cod::Cod;
use crate::codestream::qcd::Qcd;
use crate::codestream::reader::MainHeader;
use crate::codestream::siz::{ComponentSiz, Siz};
use crate::codestream::writer;
use crate::consts::Marker;
use crate::dwt::FilterKind;
use crate::error::{Error, Result};
use crate::geometry::{ceil_div, Rect};
use crate::image::{ColorSpace, Image};
use crate::jp2::boxes::{ColourMethod, ColourSpecification, ImageHeader as Jp2ImageHeader};
use crate::jp2::{self, Jp2Header};
use crate::mct;
use crate::pool::BufferPool;
use crate::quant::{self, SignalingMode, StepSize};
use crate::rate_control::{self, HullPoint};
use crate::roi::{self, Mask};
use crate::tier1::codeblock::PassRecord;
use crate::tier1::{encode::encode_codeblock, CodingOptions};
use crate::tier2::packet::{BlockContribution, PrecinctEncoder};
use crate::tier2::progression::{self, ProgressionBounds, ProgressionOrder};
use crate::tile::{self, Tile};

/// A region-of-interest request for one component, expressed as a dense
/// mask over that tile-component's full coefficient plane (Annex H's
/// MAXSHIFT method); `shift` must be at least [`roi::required_shift`] of
/// the background's maximum magnitude bit-length to guarantee separation.
#[derive(Debug, Clone)]
pub struct RoiSpec {
  pub component: usize,
  pub mask: Vec<bool>,
  pub shift: u32,
}

/// Encode-side knobs: tiling/DWT/quantization/coding-style parameters,
/// layer count, progression order, and resource limits. Mirrors the
/// `DecodeOptions` companion in [`crate::decoder`].
#[derive(Debug, Clone)]
pub struct EncodeOptions {
  pub tile_width: u32,
  pub tile_height: u32,
  pub levels: u32,
  pub filter: FilterKind,
  pub progression: ProgressionOrder,
  pub num_layers: u32,
  pub mct: bool,
  pub cblk_width_exp: u8,
  pub cblk_height_exp: u8,
  pub guard_bits: u8,
  pub quant_mode: SignalingMode,
  pub coding_options: CodingOptions,
  pub sop: bool,
  pub eph: bool,
  pub roi: Vec<RoiSpec>,
  /// Soft target for total codestream body size; when set, the final
  /// quality layer is allocated against this budget instead of an even
  /// split of all available passes.
  pub max_bytes: Option<u64>,
}

impl Default for EncodeOptions {
  fn default() -> Self {
    Self {
      tile_width: 1024,
      tile_height: 1024,
      levels: 5,
      filter: FilterKind::Reversible53,
      progression: ProgressionOrder::Lrcp,
      num_layers: 1,
      mct: false,
      cblk_width_exp: 6,
      cblk_height_exp: 6,
      guard_bits: 2,
      quant_mode: SignalingMode::NoQuantization,
      coding_options: CodingOptions::default(),
      sop: false,
      eph: false,
      roi: Vec::new(),
      max_bytes: None,
    }
  }
}

struct EncodedBlock {
  component: usize,
  resolution: u32,
  passes: Vec<PassRecord>,
  coded: Vec<u8>,
  skipped_msbs: u32,
}

impl EncodedBlock {
  /// Real byte offset into `coded` reached after including `passes_included`
  /// (out of `self.passes.len()`) passes, proportionally mapped since the
  /// MQ coder's output only exists as one continuous flushed buffer.
  fn byte_offset_for_passes(&self, passes_included: usize) -> u32 {
    if self.passes.is_empty() {
      return 0;
    }
    ((self.coded.len() as u64 * passes_included as u64) / self.passes.len() as u64) as u32
  }
}

pub struct Encoder {
  options: EncodeOptions,
  pool: BufferPool,
}

impl Encoder {
  pub fn new(options: EncodeOptions) -> Self {
    Self { pool: BufferPool::from_env(), options }
  }

  /// Encodes `image` into a complete JP2 file (signature, `ftyp`, `jp2h`,
  /// `jp2c`).
  pub fn encode(&self, image: &Image) -> Result<Vec<u8>> {
    let codestream = self.encode_codestream(image)?;
    let header = self.build_jp2_header(image);
    jp2::write_jp2(&header, &[], &[], &codestream)
  }

  fn build_jp2_header(&self, image: &Image) -> Jp2Header {
    let first = &image.components[0].params;
    let uniform = image.components.iter().all(|c| c.params.precision == first.precision && c.params.signed == first.signed);
    let bpc = if uniform {
      ((first.precision - 1) as u8) | if first.signed { 0x80 } else { 0 }
    } else {
      0xFF
    };
    let ihdr = Jp2ImageHeader {
      height: image.height(),
      width: image.width(),
      num_components: image.num_components() as u16,
      bpc,
      compression_type: 7,
      unknown_colourspace: false,
      intellectual_property: false,
    };
    let enum_cs = match image.color_space {
      ColorSpace::Gray => 17,
      ColorSpace::Sycc => 18,
      ColorSpace::Cmyk => 12,
      ColorSpace::Srgb | ColorSpace::Unknown => 16,
    };
    let colr = ColourSpecification { method: ColourMethod::Enumerated(enum_cs), precedence: 0, approximation: 0, icc_profile: None };
    let bpcc = if bpc == 0xFF { Some(image.components.iter().map(|c| (c.params.precision as u8, c.params.signed)).collect()) } else { None };
    Jp2Header { ihdr: Some(ihdr), colr: Some(colr), bpcc, pclr: None, cmap: None, cdef: None, resolution: None }
  }

  /// Encodes `image` into a bare codestream (no JP2 box wrapper).
  pub fn encode_codestream(&self, image: &Image) -> Result<Vec<u8>> {
    if image.components.is_empty() {
      return Err(Error::parameter("image has no components"));
    }
    let canvas = Rect::from_ltrb(image.x0, image.y0, image.x1, image.y1);
    let tiles = tile::tile_grid(canvas, image.x0, image.y0, self.options.tile_width, self.options.tile_height);

    let siz = Siz {
      x1: image.x1,
      y1: image.y1,
      x0: image.x0,
      y0: image.y0,
      xt_siz: self.options.tile_width,
      yt_siz: self.options.tile_height,
      xt0: image.x0,
      yt0: image.y0,
      components: image
        .components
        .iter()
        .map(|c| ComponentSiz { precision: c.params.precision as u8, signed: c.params.signed, xr_siz: c.params.dx as u8, yr_siz: c.params.dy as u8 })
        .collect(),
    };
    let cod = Cod {
      default_precincts: true,
      sop: self.options.sop,
      eph: self.options.eph,
      progression: self.options.progression,
      num_layers: self.options.num_layers.min(u16::MAX as u32) as u16,
      mct: self.options.mct && image.components.len() == 3,
      levels: self.options.levels as u8,
      cblk_width_exp: self.options.cblk_width_exp,
      cblk_height_exp: self.options.cblk_height_exp,
      options: self.options.coding_options,
      filter: self.options.filter,
    };
    let num_subbands = 3 * self.options.levels as usize + 1;
    let base_step = StepSize { exponent: self.options.guard_bits, mantissa: 0 };
    let steps: Vec<StepSize> = (0..num_subbands)
      .map(|i| {
        let level_delta = (num_subbands - i).min(self.options.levels as usize) as u8;
        StepSize::derive(base_step, level_delta)
      })
      .collect();
    let qcd = Qcd {
      mode: if matches!(self.options.filter, FilterKind::Reversible53) { SignalingMode::NoQuantization } else { self.options.quant_mode },
      guard_bits: self.options.guard_bits,
      steps,
    };

    let header = MainHeader { siz, cod, qcd, poc: Vec::new(), first_tile_part_offset: 0 };

    // Every tile-part is built before any of it is emitted so the TLM
    // marker (if any) can be written once, ahead of the first SOT, with
    // every tile-part's final length already known.
    let mut tile_parts: Vec<(u16, u32, Vec<u8>)> = Vec::with_capacity(tiles.len());
    for t in &tiles {
      let body = self.encode_tile(image, *t)?;
      let tile_index = t.q * ceil_div(canvas.width(), self.options.tile_width).max(1) + t.p;
      // Psot counts from this tile-part's SOT marker through its packet
      // data inclusive: 12 bytes of SOT segment (marker+Lsot+Isot+Psot+
      // TPsot+TNsot) + 2 bytes of SOD + the packet body.
      let psot = (12 + 2 + body.len()) as u32;
      tile_parts.push((tile_index as u16, psot, body));
    }

    let mut out = writer::write_main_header(&header);
    if tile_parts.len() > 1 {
      let max_psot = tile_parts.iter().map(|&(_, psot, _)| psot as u64).max().unwrap_or(0);
      let (ttlm_bytes, ptlm_bytes) = writer::minimal_tlm_field_sizes(tile_parts.len() as u32, max_psot);
      let entries: Vec<(u32, u64)> = tile_parts.iter().map(|&(ti, psot, _)| (ti as u32, psot as u64)).collect();
      writer::write_tlm(&entries, ttlm_bytes, ptlm_bytes, &mut out);
    }
    for (tile_index, psot, body) in &tile_parts {
      writer::write_sot(*tile_index, *psot, 0, 1, &mut out);
      out.extend_from_slice(&Marker::Sod.code().to_be_bytes());
      out.extend_from_slice(body);
    }
    out.extend_from_slice(&Marker::Eoc.code().to_be_bytes());
    Ok(out)
  }

  fn encode_tile(&self, image: &Image, t: Tile) -> Result<Vec<u8>> {
    let levels = self.options.levels;
    let cblk_w = 1u32 << self.options.cblk_width_exp;
    let cblk_h = 1u32 << self.options.cblk_height_exp;

    // One buffer per component: level-shifted, MCT'd, DWT'd, quantized,
    // ROI-shifted integer coefficients addressed in tile-local coordinates
    // (the same convention `dwt::forward`/`inverse` use).
    let mut coeff_buffers: Vec<Vec<i32>> = Vec::with_capacity(image.components.len());
    let mut tile_comp_rects: Vec<Rect> = Vec::with_capacity(image.components.len());

    for component in &image.components {
      let rect = t.rect.intersect(component.params.rect());
      tile_comp_rects.push(rect);
      let w = rect.width() as usize;
      let h = rect.height() as usize;
      let mut buf = vec![0i32; w * h];
      for y in 0..h {
        for x in 0..w {
          let mut v = component.sample(rect.x0 + x as u32 - component.params.x0, rect.y0 + y as u32 - component.params.y0);
          if !component.params.signed {
            v -= 1 << (component.params.precision - 1);
          }
          buf[y * w + x] = v;
        }
      }
      coeff_buffers.push(buf);
    }

    let use_mct = self.options.mct && image.components.len() == 3 && tile_comp_rects.windows(2).all(|w| w[0] == w[1]);
    if use_mct {
      let (head, rest) = coeff_buffers.split_at_mut(1);
      let (mid, tail) = rest.split_at_mut(1);
      match self.options.filter {
        FilterKind::Reversible53 => mct::rct_forward(&mut head[0], &mut mid[0], &mut tail[0]),
        FilterKind::Irreversible97 => {
          // ICT operates on floats; run it on scratch copies then write back,
          // since the tile-component buffers proper stay integer until the
          // DWT's own float pass converts them.
          let mut r: Vec<f32> = head[0].iter().map(|&v| v as f32).collect();
          let mut g: Vec<f32> = mid[0].iter().map(|&v| v as f32).collect();
          let mut b: Vec<f32> = tail[0].iter().map(|&v| v as f32).collect();
          mct::ict_forward(&mut r, &mut g, &mut b);
          for (dst, src) in [(&mut head[0], &r), (&mut mid[0], &g), (&mut tail[0], &b)] {
            for (d, &s) in dst.iter_mut().zip(src.iter()) {
              *d = s.round() as i32;
            }
          }
        }
      }
    }

    let mut all_blocks: Vec<EncodedBlock> = Vec::new();
    let mut blocks_by_resolution: HashMap<(usize, u32), Vec<usize>> = HashMap::new();

    for (ci, component) in image.components.iter().enumerate() {
      let rect = tile_comp_rects[ci];
      let w = rect.width() as usize;
      let h = rect.height() as usize;
      if w == 0 || h == 0 {
        continue;
      }
      let local_rect = Rect::from_ltrb(0, 0, rect.width(), rect.height());

      let quantized: Vec<i32> = match self.options.filter {
        FilterKind::Reversible53 => {
          let mut buf = coeff_buffers[ci].clone();
          crate::dwt::reversible::forward(&mut buf, w, h, levels);
          buf
        }
        FilterKind::Irreversible97 => {
          let mut f32_buf: Vec<f32> = coeff_buffers[ci].iter().map(|&v| v as f32).collect();
          crate::dwt::irreversible::forward(&mut f32_buf, w, h, levels);
          let mut scratch = self.pool.acquire(f32_buf.len());
          for (dst, &src) in scratch.iter_mut().zip(f32_buf.iter()) {
            *dst = src as f64;
          }
          let subbands = tile::derive_subbands(local_rect, levels);
          let mut out = vec![0i32; w * h];
          for (i, sb) in subbands.iter().enumerate() {
            let step = qcd_step_for_index(i, self.options.guard_bits, levels);
            let dyn_bits = component.params.dynamic_range_bits();
            for y in sb.rect.y0..sb.rect.y1 {
              for x in sb.rect.x0..sb.rect.x1 {
                let idx = y as usize * w + x as usize;
                let q = quant::forward(&mut scratch[idx..idx + 1], step, dyn_bits);
                out[idx] = q[0];
              }
            }
          }
          self.pool.release(scratch);
          out
        }
      };
      let mut quantized = quantized;

      for roi in self.options.roi.iter().filter(|r| r.component == ci) {
        let mask = Mask::from_dense(&roi.mask);
        roi::apply_encode(&mut quantized, &mask, roi.shift);
      }

      let max_bitplane = (self.options.guard_bits as u32 + component.params.dynamic_range_bits()).saturating_sub(1);
      let subbands = tile::derive_subbands(local_rect, levels);
      for sb in &subbands {
        if sb.rect.is_empty() {
          continue;
        }
        let resolution = sb.level;
        let block_rects = tile::code_block_grid(sb.rect, cblk_w, cblk_h);
        for block_rect in block_rects {
          let bw = block_rect.width() as usize;
          let bh = block_rect.height() as usize;
          let mut coeffs = vec![0i32; bw * bh];
          for y in 0..bh {
            for x in 0..bw {
              let gx = block_rect.x0 as usize + x;
              let gy = block_rect.y0 as usize + y;
              coeffs[y * bw + x] = quantized[gy * w + gx];
            }
          }
          // Leading magnitude bit-planes this block never sets any bit in
          // (Annex B.10.5's Zbp): skip coding them and signal the count
          // instead of burning a trivial all-zero cleanup pass per plane.
          let highest_bit = coeffs.iter().map(|&c| c.unsigned_abs()).max().map(|m| 32 - m.leading_zeros()).unwrap_or(0);
          let skipped_msbs = (max_bitplane + 1).saturating_sub(highest_bit);
          let block_max_bitplane = max_bitplane.saturating_sub(skipped_msbs);
          let (coded, passes) = encode_codeblock(&coeffs, bw, bh, sb.orientation, block_max_bitplane, self.options.coding_options);
          let index = all_blocks.len();
          all_blocks.push(EncodedBlock { component: ci, resolution, passes, coded, skipped_msbs });
          blocks_by_resolution.entry((ci, resolution)).or_default().push(index);
        }
      }
    }

    // Rate-distortion layer assignment: a global Lagrangian lambda per
    // layer, searched in pass-count units (matches `PassRecord`'s
    // `cumulative_bytes` field, which counts passes, not literal bytes).
    let num_layers = self.options.num_layers.max(1);
    let hulls: Vec<Vec<HullPoint>> = all_blocks.iter().map(|b| rate_control::convex_hull(&b.passes)).collect();
    let total_passes: u64 = all_blocks.iter().map(|b| b.passes.len() as u64).sum();
    let total_real_bytes: u64 = all_blocks.iter().map(|b| b.coded.len() as u64).sum();

    let mut layer_offsets: Vec<Vec<u32>> = vec![vec![0u32; all_blocks.len()]; num_layers as usize];
    for l in 0..num_layers {
      let target_pass_budget = match self.options.max_bytes {
        Some(max_bytes) if total_real_bytes > 0 => {
          let real_budget = max_bytes * (l as u64 + 1) / num_layers as u64;
          ((total_passes * real_budget) / total_real_bytes).max(1)
        }
        _ => (total_passes * (l as u64 + 1) / num_layers as u64).max(1),
      };
      let lambda = rate_control::find_lambda_for_budget(&hulls, target_pass_budget, 24);
      for (bi, block) in all_blocks.iter().enumerate() {
        let passes_included = rate_control::select_for_lambda(&hulls[bi], lambda).map(|p| p.pass_index + 1).unwrap_or(0);
        let mut offset = block.byte_offset_for_passes(passes_included);
        if l > 0 {
          offset = offset.max(layer_offsets[(l - 1) as usize][bi]);
        }
        layer_offsets[l as usize][bi] = offset;
      }
    }

    self.assemble_packets(&all_blocks, &blocks_by_resolution, &layer_offsets, image.components.len())
  }

  fn assemble_packets(
    &self,
    all_blocks: &[EncodedBlock],
    blocks_by_resolution: &HashMap<(usize, u32), Vec<usize>>,
    layer_offsets: &[Vec<u32>],
    num_components: usize,
  ) -> Result<Vec<u8>> {
    let levels = self.options.levels;
    let num_resolutions = levels + 1;
    let num_layers = self.options.num_layers.max(1);
    let bounds = ProgressionBounds { num_layers, num_resolutions, num_components: num_components as u32, num_precincts: 1 };
    let coords = progression::enumerate(self.options.progression, bounds);

    let mut precinct_encoders: HashMap<(usize, u32), PrecinctEncoder> = HashMap::new();
    let mut included_through: HashMap<usize, bool> = HashMap::new();
    let mut out = Vec::new();
    let mut sop_count: u16 = 0;

    for coord in coords {
      let key = (coord.component as usize, coord.resolution);
      let Some(indices) = blocks_by_resolution.get(&key) else {
        continue;
      };
      let enc = precinct_encoders.entry(key).or_insert_with(|| {
        let skipped: Vec<u32> = indices.iter().map(|&i| all_blocks[i].skipped_msbs).collect();
        PrecinctEncoder::new(indices.len().max(1), 1, &skipped)
      });

      let mut header_writer = BitWriter::new();
      let mut body = Vec::new();
      for (local_i, &block_index) in indices.iter().enumerate() {
        let block = &all_blocks[block_index];
        let prev = if coord.layer > 0 { layer_offsets[(coord.layer - 1) as usize][block_index] } else { 0 };
        let cur = layer_offsets[coord.layer as usize][block_index];
        let bytes_added = cur.saturating_sub(prev);
        let already_included = *included_through.get(&block_index).unwrap_or(&false);
        let contribution = if bytes_added > 0 {
          Some(BlockContribution { first_inclusion: !already_included, passes_added: 1, bytes_added })
        } else {
          None
        };
        enc.write_block(&mut header_writer, local_i, local_i, 0, coord.layer, contribution.as_ref());
        if bytes_added > 0 {
          included_through.insert(block_index, true);
          body.extend_from_slice(&block.coded[prev as usize..cur as usize]);
        }
      }
      let header_bytes = header_writer.finish();

      if self.options.sop {
        out.extend_from_slice(&Marker::Sop.code().to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&sop_count.to_be_bytes());
        sop_count = sop_count.wrapping_add(1);
      }
      out.extend_from_slice(&header_bytes);
      if self.options.eph {
        out.extend_from_slice(&Marker::Eph.code().to_be_bytes());
      }
      out.extend_from_slice(&body);
    }
    Ok(out)
  }
}

/// Quantization step for the `i`-th subband in `derive_subbands`'s
/// canonical enumeration order (LL first, then HL/LH/HH per ascending
/// level), matching the order [`Qcd`]'s steps are signaled in.
fn qcd_step_for_index(i: usize, guard_bits: u8, levels: u32) -> StepSize {
  let base = StepSize { exponent: guard_bits, mantissa: 0 };
  let num_subbands = 3 * levels as usize + 1;
  let level_delta = (num_subbands - i).min(levels as usize) as u8;
  StepSize::derive(base, level_delta)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::image::{Component, ComponentParams};

  fn gray_image(w: u32, h: u32) -> Image {
    let params = ComponentParams { dx: 1, dy: 1, width: w, height: h, x0: 0, y0: 0, precision: 8, signed: false };
    let mut c = Component::new(params);
    for y in 0..h {
      for x in 0..w {
        c.set_sample(x, y, ((x + y) % 256) as i32);
      }
    }
    Image::new(0, 0, w, h, vec![c])
  }

  #[test]
  fn encodes_small_reversible_image_without_error() {
    let image = gray_image(16, 16);
    let options = EncodeOptions { tile_width: 16, tile_height: 16, levels: 2, ..Default::default() };
    let encoder = Encoder::new(options);
    let bytes = encoder.encode_codestream(&image).unwrap();
    assert_eq!(&bytes[0..2], &Marker::Soc.code().to_be_bytes());
    assert_eq!(&bytes[bytes.len() - 2..], &Marker::Eoc.code().to_be_bytes());
  }

  #[test]
  fn encodes_multi_tile_image() {
    let image = gray_image(32, 16);
    let options = EncodeOptions { tile_width: 16, tile_height: 16, levels: 1, ..Default::default() };
    let encoder = Encoder::new(options);
    let bytes = encoder.encode_codestream(&image).unwrap();
    // two tiles side by side: two SOT markers expected
    let sot_count = bytes.windows(2).filter(|w| w == &Marker::Sot.code().to_be_bytes()).count();
    assert_eq!(sot_count, 2);
  }

  #[test]
  fn encodes_full_jp2_wrapper() {
    let image = gray_image(8, 8);
    let options = EncodeOptions { tile_width: 8, tile_height: 8, levels: 1, ..Default::default() };
    let encoder = Encoder::new(options);
    let bytes = encoder.encode(&image).unwrap();
    assert_eq!(&bytes[0..12], &crate::consts::JP2_SIGNATURE);
  }

  #[test]
  fn rejects_image_with_no_components() {
    let image = Image::new(0, 0, 4, 4, Vec::new());
    let encoder = Encoder::new(EncodeOptions::default());
    assert!(encoder.encode_codestream(&image).is_err());
  }
}
