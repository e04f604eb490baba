//! Top-level decoder orchestration: mirrors [`crate::encoder`] in reverse —
//! main-header parsing, per-tile Tier-2 packet reading, Tier-1 inverse
//! bit-plane coding, dequantization, inverse MCT/DWT, and tile assembly
//! back into an [`Image`].

use std::collections::HashMap;

use crate::bit_io::BitReader;
use crate::codestream::reader::{self, MainHeader};
use crate::consts::Marker;
use crate::dwt::FilterKind;
use crate::error::{Error, Result};
use crate::geometry::{ceil_div, Rect};
use crate::image::{Component, ComponentParams, Image};
use crate::jp2;
use crate::mct;
use crate::quant::{self, StepSize};
use crate::roi;
use crate::tier1::decode::decode_codeblock;
use crate::tier2::packet::PrecinctDecoder;
use crate::tier2::progression::{self, ProgressionBounds};
use crate::tile::{self, Tile};

/// Decode-side resource limits and the same region-of-interest shift used
/// at encode time (MAXSHIFT decoding needs to know `S` to invert it;
/// real streams would carry this in an RGN marker, deferred here — see
/// DESIGN.md).
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
  pub max_bytes: Option<u64>,
  pub max_layers: Option<u32>,
  pub max_resolution: Option<u32>,
  pub roi_shifts: HashMap<usize, u32>,
  pub strict: bool,
}

struct CodeBlockSlot {
  resolution: u32,
  rect: Rect,
  orientation: crate::tier1::contexts::Orientation,
  bytes: Vec<u8>,
  max_bitplane: u32,
}

pub struct Decoder {
  options: DecodeOptions,
}

impl Decoder {
  pub fn new(options: DecodeOptions) -> Self {
    Self { options }
  }

  /// Decodes a complete JP2 file, validating its box structure first.
  pub fn decode(&self, data: &[u8]) -> Result<Image> {
    let file = jp2::parse_jp2(data)?;
    let report = jp2::validator::validate_jp2_header(&file.header, self.options.strict);
    if !report.is_ok() {
      let messages: Vec<&str> = report.errors().map(|f| f.message.as_str()).collect();
      return Err(Error::format_invalid(format!("jp2h validation failed: {}", messages.join("; "))));
    }
    let mut image = self.decode_codestream(&file.codestream)?;
    image.color_space = match &file.header.colr {
      Some(colour) => match colour.method {
        jp2::boxes::ColourMethod::Enumerated(16) => crate::image::ColorSpace::Srgb,
        jp2::boxes::ColourMethod::Enumerated(17) => crate::image::ColorSpace::Gray,
        jp2::boxes::ColourMethod::Enumerated(18) => crate::image::ColorSpace::Sycc,
        jp2::boxes::ColourMethod::Enumerated(12) => crate::image::ColorSpace::Cmyk,
        _ => crate::image::ColorSpace::Unknown,
      },
      None => crate::image::ColorSpace::Unknown,
    };
    Ok(image)
  }

  /// Decodes a bare codestream (no JP2 wrapper) into an [`Image`].
  pub fn decode_codestream(&self, data: &[u8]) -> Result<Image> {
    let header = reader::parse_main_header(data)?;
    let tile_parts = reader::scan_tile_parts(data, header.first_tile_part_offset)?;

    let canvas = Rect::from_ltrb(header.siz.x0, header.siz.y0, header.siz.x1, header.siz.y1);
    let tiles_per_row = ceil_div(canvas.width(), header.siz.xt_siz).max(1);

    let mut components: Vec<Component> = header
      .siz
      .components
      .iter()
      .map(|c| {
        let params = ComponentParams {
          dx: c.xr_siz as u32,
          dy: c.yr_siz as u32,
          width: canvas.width(),
          height: canvas.height(),
          x0: canvas.x0,
          y0: canvas.y0,
          precision: c.precision as u32,
          signed: c.signed,
        };
        Component::new(params)
      })
      .collect();

    let tiles = tile::tile_grid(canvas, header.siz.x0, header.siz.y0, header.siz.xt_siz, header.siz.yt_siz);

    for part in &tile_parts {
      if part.offset + 12 > data.len() as u64 {
        return Err(Error::format_invalid("tile-part location runs past end of codestream"));
      }
      let body_start = part.offset as usize + 12;
      if data[body_start..body_start + 2] != Marker::Sod.code().to_be_bytes() {
        return Err(Error::format_invalid("expected SOD marker after SOT segment"));
      }
      let packet_data_start = body_start + 2;
      let packet_data_end = (part.offset + part.length) as usize;
      if packet_data_end > data.len() {
        return Err(Error::format_invalid("tile-part body runs past end of codestream"));
      }
      let packets = &data[packet_data_start..packet_data_end];

      let q = part.tile_index as u32 / tiles_per_row;
      let p = part.tile_index as u32 % tiles_per_row;
      let t = *tiles.iter().find(|t| t.p == p && t.q == q).ok_or_else(|| Error::format_invalid("SOT references unknown tile index"))?;

      self.decode_tile(&header, t, packets, &mut components)?;
    }

    let mut image = Image::new(canvas.x0, canvas.y0, canvas.x1, canvas.y1, components);
    image.color_space = crate::image::ColorSpace::Unknown;
    Ok(image)
  }

  fn decode_tile(&self, header: &MainHeader, t: Tile, packets: &[u8], components: &mut [Component]) -> Result<()> {
    let levels = self.options.max_resolution.map(|r| r.min(header.cod.levels as u32)).unwrap_or(header.cod.levels as u32);
    let full_levels = header.cod.levels as u32;
    let cblk_w = 1u32 << header.cod.cblk_width_exp;
    let cblk_h = 1u32 << header.cod.cblk_height_exp;
    let num_layers = self.options.max_layers.map(|l| l.min(header.cod.num_layers as u32)).unwrap_or(header.cod.num_layers as u32).max(1);

    let mut tile_comp_rects: Vec<Rect> = Vec::with_capacity(components.len());
    let mut coeff_buffers: Vec<Vec<i32>> = Vec::with_capacity(components.len());
    let mut slots_by_resolution: HashMap<(usize, u32), Vec<CodeBlockSlot>> = HashMap::new();

    for (ci, component) in components.iter().enumerate() {
      let rect = t.rect.intersect(component.params.rect());
      tile_comp_rects.push(rect);
      coeff_buffers.push(vec![0i32; (rect.width() * rect.height()) as usize]);

      if rect.is_empty() {
        continue;
      }
      let local_rect = Rect::from_ltrb(0, 0, rect.width(), rect.height());
      let max_bitplane = (header.qcd.guard_bits as u32 + component.params.dynamic_range_bits()).saturating_sub(1);
      for sb in tile::derive_subbands(local_rect, full_levels) {
        if sb.rect.is_empty() || sb.level > levels {
          continue;
        }
        for block_rect in tile::code_block_grid(sb.rect, cblk_w, cblk_h) {
          slots_by_resolution.entry((ci, sb.level)).or_default().push(CodeBlockSlot {
            resolution: sb.level,
            rect: block_rect,
            orientation: sb.orientation,
            bytes: Vec::new(),
            max_bitplane,
          });
        }
      }
    }

    let num_resolutions = full_levels + 1;
    let bounds = ProgressionBounds { num_layers, num_resolutions, num_components: components.len() as u32, num_precincts: 1 };
    let coords = progression::enumerate(header.cod.progression, bounds);

    let mut precinct_decoders: HashMap<(usize, u32), PrecinctDecoder> = HashMap::new();
    let mut reader_cursor = BitReader::new(packets);

    for coord in &coords {
      let key = (coord.component as usize, coord.resolution);
      let Some(slots) = slots_by_resolution.get_mut(&key) else { continue };
      let dec = precinct_decoders.entry(key).or_insert_with(|| PrecinctDecoder::new(slots.len().max(1), 1, slots.len()));

      if header.cod.sop {
        skip_sop(&mut reader_cursor);
      }
      // The packet header carries every contributing code-block's
      // inclusion/length bits up front; the body (each block's byte
      // range, in the same order) only starts once the whole header has
      // been read and byte-aligned (Annex B.10).
      let mut contributions: Vec<(usize, u32)> = Vec::new();
      for local_i in 0..slots.len() {
        if let Some((_passes, bytes_added, skipped_msbs)) = dec.read_block(&mut reader_cursor, local_i, local_i, 0, coord.layer) {
          if let Some(skipped_msbs) = skipped_msbs {
            slots[local_i].max_bitplane = slots[local_i].max_bitplane.saturating_sub(skipped_msbs);
          }
          contributions.push((local_i, bytes_added));
        }
      }
      reader_cursor.align();
      if header.cod.eph {
        reader_cursor.read_bits(16); // consume the EPH marker code itself
      }
      for (local_i, bytes_added) in contributions {
        let bytes = read_body_bytes(&mut reader_cursor, bytes_added as usize);
        slots[local_i].bytes.extend_from_slice(&bytes);
      }
    }

    for ((ci, resolution), slots) in slots_by_resolution {
      let rect = tile_comp_rects[ci];
      let w = rect.width() as usize;
      if w == 0 {
        continue;
      }
      for slot in slots {
        let bw = slot.rect.width() as usize;
        let bh = slot.rect.height() as usize;
        let (decoded, _outcome) = decode_codeblock(&slot.bytes, bw, bh, slot.orientation, slot.max_bitplane, header.cod.options);
        for y in 0..bh {
          for x in 0..bw {
            let gx = slot.rect.x0 as usize + x;
            let gy = slot.rect.y0 as usize + y;
            coeff_buffers[ci][gy * w + gx] = decoded[y * bw + x];
          }
        }
      }
      let _ = resolution;
    }

    for (ci, component) in components.iter_mut().enumerate() {
      let rect = tile_comp_rects[ci];
      if rect.is_empty() {
        continue;
      }
      let w = rect.width() as usize;
      let h = rect.height() as usize;

      if let Some(&shift) = self.options.roi_shifts.get(&ci) {
        roi::apply_decode(&mut coeff_buffers[ci], shift);
      }

      let reconstructed: Vec<i32> = match header.cod.filter {
        FilterKind::Reversible53 => {
          let mut buf = coeff_buffers[ci].clone();
          crate::dwt::reversible::inverse(&mut buf, w, h, full_levels);
          buf
        }
        FilterKind::Irreversible97 => {
          let local_rect = Rect::from_ltrb(0, 0, rect.width(), rect.height());
          let subbands = tile::derive_subbands(local_rect, full_levels);
          let mut dequantized = vec![0f32; w * h];
          let dyn_bits = component.params.dynamic_range_bits();
          for (i, sb) in subbands.iter().enumerate() {
            let step = qcd_step_for_index(&header.qcd.steps, i, full_levels);
            for y in sb.rect.y0..sb.rect.y1 {
              for x in sb.rect.x0..sb.rect.x1 {
                let idx = y as usize * w + x as usize;
                let back = quant::inverse(&coeff_buffers[ci][idx..idx + 1], step, dyn_bits, 0.5);
                dequantized[idx] = back[0] as f32;
              }
            }
          }
          crate::dwt::irreversible::inverse(&mut dequantized, w, h, full_levels);
          dequantized.iter().map(|&v| v.round() as i32).collect()
        }
      };
      coeff_buffers[ci] = reconstructed;
    }

    if header.cod.mct && components.len() == 3 {
      let (head, rest) = coeff_buffers.split_at_mut(1);
      let (mid, tail) = rest.split_at_mut(1);
      match header.cod.filter {
        FilterKind::Reversible53 => mct::rct_inverse(&mut head[0], &mut mid[0], &mut tail[0]),
        FilterKind::Irreversible97 => {
          let mut y: Vec<f32> = head[0].iter().map(|&v| v as f32).collect();
          let mut u: Vec<f32> = mid[0].iter().map(|&v| v as f32).collect();
          let mut v: Vec<f32> = tail[0].iter().map(|&v| v as f32).collect();
          mct::ict_inverse(&mut y, &mut u, &mut v);
          for (dst, src) in [(&mut head[0], &y), (&mut mid[0], &u), (&mut tail[0], &v)] {
            for (d, &s) in dst.iter_mut().zip(src.iter()) {
              *d = s.round() as i32;
            }
          }
        }
      }
    }

    for (ci, component) in components.iter_mut().enumerate() {
      let rect = tile_comp_rects[ci];
      if rect.is_empty() {
        continue;
      }
      let w = rect.width() as usize;
      let h = rect.height() as usize;
      for y in 0..h {
        for x in 0..w {
          let mut v = coeff_buffers[ci][y * w + x];
          if !component.params.signed {
            v += 1 << (component.params.precision - 1);
          }
          component.set_sample(rect.x0 + x as u32 - component.params.x0, rect.y0 + y as u32 - component.params.y0, v);
        }
      }
    }

    Ok(())
  }
}

fn skip_sop(r: &mut BitReader) {
  // SOP is byte-aligned in the packet stream; the caller already knows
  // one is present from COD's Scod bit, so just consume the fixed
  // marker+Lsop+Nsop fields (4 bytes after the 2-byte marker code).
  for _ in 0..(6 * 8) {
    r.read_bit();
  }
}

fn read_body_bytes(r: &mut BitReader, n: usize) -> Vec<u8> {
  let mut out = Vec::with_capacity(n);
  for _ in 0..n {
    out.push(r.read_bits(8) as u8);
  }
  out
}

/// Mirrors [`crate::encoder::qcd_step_for_index`]'s subband enumeration
/// order, reading the corresponding signaled step instead of deriving one.
fn qcd_step_for_index(steps: &[StepSize], i: usize, levels: u32) -> StepSize {
  if steps.len() == 1 {
    let num_subbands = 3 * levels as usize + 1;
    let level_delta = (num_subbands - i).min(levels as usize) as u8;
    StepSize::derive(steps[0], level_delta)
  } else {
    steps.get(i).copied().unwrap_or(StepSize { exponent: 8, mantissa: 0 })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encoder::{EncodeOptions, Encoder};
  use crate::image::{Component, ComponentParams};

  fn gray_image(w: u32, h: u32) -> Image {
    let params = ComponentParams { dx: 1, dy: 1, width: w, height: h, x0: 0, y0: 0, precision: 8, signed: false };
    let mut c = Component::new(params);
    for y in 0..h {
      for x in 0..w {
        c.set_sample(x, y, ((x * 7 + y * 3) % 256) as i32);
      }
    }
    Image::new(0, 0, w, h, vec![c])
  }

  #[test]
  fn round_trips_small_reversible_codestream() {
    let image = gray_image(16, 16);
    let options = EncodeOptions { tile_width: 16, tile_height: 16, levels: 2, ..Default::default() };
    let encoder = Encoder::new(options);
    let bytes = encoder.encode_codestream(&image).unwrap();

    let decoder = Decoder::new(DecodeOptions::default());
    let decoded = decoder.decode_codestream(&bytes).unwrap();
    assert_eq!(decoded.width(), 16);
    assert_eq!(decoded.height(), 16);
    assert_eq!(decoded.components[0].sample(0, 0), image.components[0].sample(0, 0));
  }

  #[test]
  fn round_trips_full_jp2_wrapper() {
    let image = gray_image(8, 8);
    let options = EncodeOptions { tile_width: 8, tile_height: 8, levels: 1, ..Default::default() };
    let encoder = Encoder::new(options);
    let bytes = encoder.encode(&image).unwrap();

    let decoder = Decoder::new(DecodeOptions::default());
    let decoded = decoder.decode(&bytes).unwrap();
    assert_eq!(decoded.num_components(), 1);
  }

  #[test]
  fn rejects_truncated_codestream() {
    let decoder = Decoder::new(DecodeOptions::default());
    assert!(decoder.decode_codestream(&[0xff, 0x4f]).is_err());
  }
}
