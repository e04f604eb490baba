//! Main-header and tile-part-header marker-segment reading (Annex A.4),
//! plus TLM-based O(1) tile seek with a sequential-SOT-scan fallback.

use crate::codestream::cod::Cod;
use crate::codestream::poc::parse as parse_poc;
use crate::codestream::qcd::Qcd;
use crate::codestream::siz::Siz;
use crate::consts::{Marker, J2K_CODESTREAM_MAGIC};
use crate::error::{Error, Result};
use crate::tier2::progression::PocEntry;

/// One tile-part's location within the codestream byte source.
#[derive(Debug, Clone, Copy)]
pub struct TilePartLocation {
  pub tile_index: u16,
  pub offset: u64,
  pub length: u64,
}

/// Everything parsed from the main header, before any tile-part is read.
#[derive(Debug, Clone)]
pub struct MainHeader {
  pub siz: Siz,
  pub cod: Cod,
  pub qcd: Qcd,
  pub poc: Vec<PocEntry>,
  /// Byte offset of the first SOT marker, i.e. where tile-part scanning
  /// should resume from if TLM entries are absent or incomplete.
  pub first_tile_part_offset: u64,
}

/// Reads marker segments from `data` starting at `SOC`, accumulating
/// `(marker, body_without_length_field, segment_start_offset)` until the
/// first `SOT`, then parses the mandatory SIZ/COD/QCD plus optional POC.
pub fn parse_main_header(data: &[u8]) -> Result<MainHeader> {
  if data.len() < 4 || data[0..2] != Marker::Soc.code().to_be_bytes() {
    return Err(Error::format_invalid("missing SOC marker at start of codestream"));
  }
  if data.len() >= 4 && data[0..4] == J2K_CODESTREAM_MAGIC {
    // also valid; SOC+SIZ marker bytes happen to match the magic constant.
  }

  let mut siz = None;
  let mut cod = None;
  let mut qcd = None;
  let mut poc = Vec::new();
  let mut pos = 2usize;

  loop {
    if pos + 2 > data.len() {
      return Err(Error::format_invalid("codestream truncated before SOT"));
    }
    let code = u16::from_be_bytes([data[pos], data[pos + 1]]);
    if code == Marker::Sot.code() {
      let siz = siz.ok_or_else(|| Error::format_invalid("main header missing SIZ"))?;
      let cod = cod.ok_or_else(|| Error::format_invalid("main header missing COD"))?;
      let qcd = qcd.ok_or_else(|| Error::format_invalid("main header missing QCD"))?;
      return Ok(MainHeader { siz, cod, qcd, poc, first_tile_part_offset: pos as u64 });
    }
    let Some(marker) = Marker::from_u16(code) else {
      return Err(Error::at(crate::error::ErrorKind::FormatInvalid, pos as u64, format!("unknown marker 0x{code:04x}")));
    };
    if !marker.has_length() {
      pos += 2;
      continue;
    }
    if pos + 4 > data.len() {
      return Err(Error::format_invalid("marker segment length field truncated"));
    }
    let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
    if pos + 2 + seg_len > data.len() {
      return Err(Error::format_invalid("marker segment runs past end of buffer"));
    }
    let body = &data[pos..pos + 2 + seg_len];
    match marker {
      Marker::Siz => siz = Some(Siz::parse(body)?),
      Marker::Cod => cod = Some(Cod::parse(body)?),
      Marker::Qcd => qcd = Some(Qcd::parse(body)?),
      Marker::Poc => {
        let two_byte = siz.as_ref().map(|s| s.components.len() > 256).unwrap_or(false);
        poc = parse_poc(body, two_byte)?;
      }
      _ => {}
    }
    pos += 2 + seg_len;
  }
}

/// Parses every `TLM` marker segment between `SOC` and the first `SOT`,
/// returning `(tile_index, tile_part_length)` pairs in the order they
/// were written (Annex A.8.5). Tile-part lengths accumulate from
/// `first_tile_part_offset` in that same order to locate any tile
/// without scanning its preceding tile-parts' bodies.
fn parse_tlm_entries(data: &[u8]) -> Vec<(u16, u64)> {
  let mut entries = Vec::new();
  let mut pos = 2usize;
  while pos + 2 <= data.len() {
    let code = u16::from_be_bytes([data[pos], data[pos + 1]]);
    if code == Marker::Sot.code() {
      break;
    }
    let Some(marker) = Marker::from_u16(code) else { break };
    if !marker.has_length() {
      pos += 2;
      continue;
    }
    if pos + 4 > data.len() {
      break;
    }
    let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
    if pos + 2 + seg_len > data.len() {
      break;
    }
    if marker == Marker::Tlm {
      let body = &data[pos + 4..pos + 2 + seg_len];
      if body.len() >= 2 {
        let stlm = body[1];
        let ttlm_bytes = match (stlm >> 4) & 0x3 {
          0 => 0usize,
          1 => 1,
          _ => 2,
        };
        let ptlm_bytes = if stlm & 0x40 != 0 { 4usize } else { 2 };
        let per_entry = ttlm_bytes + ptlm_bytes;
        let mut i = 2;
        let mut implicit_index = 0u16;
        while per_entry > 0 && i + per_entry <= body.len() {
          let tile_index = match ttlm_bytes {
            0 => {
              let v = implicit_index;
              implicit_index = implicit_index.wrapping_add(1);
              v
            }
            1 => body[i] as u16,
            _ => u16::from_be_bytes([body[i], body[i + 1]]),
          };
          let off = i + ttlm_bytes;
          let length = match ptlm_bytes {
            2 => u16::from_be_bytes([body[off], body[off + 1]]) as u64,
            _ => u32::from_be_bytes(body[off..off + 4].try_into().unwrap()) as u64,
          };
          entries.push((tile_index, length));
          i += per_entry;
        }
      }
    }
    pos += 2 + seg_len;
  }
  entries
}

/// Locates one tile-part by tile index: reads any `TLM` marker segments
/// to answer in O(1) arithmetic, falling back to [`scan_tile_parts`] (a
/// linear SOT walk) when the codestream carries none.
pub fn seek_to_tile(data: &[u8], header: &MainHeader, tile_index: u16) -> Result<TilePartLocation> {
  let entries = parse_tlm_entries(data);
  let mut offset = header.first_tile_part_offset;
  for &(ti, length) in &entries {
    if ti == tile_index {
      return Ok(TilePartLocation { tile_index, offset, length });
    }
    offset += length;
  }
  scan_tile_parts(data, header.first_tile_part_offset)?
    .into_iter()
    .find(|loc| loc.tile_index == tile_index)
    .ok_or_else(|| Error::format_invalid(format!("tile index {tile_index} not found in codestream")))
}

/// Scans forward from `start` locating every `SOT` marker and its
/// tile-part length (`Psot`), used when TLM entries are absent or
/// incomplete.
pub fn scan_tile_parts(data: &[u8], start: u64) -> Result<Vec<TilePartLocation>> {
  let mut out = Vec::new();
  let mut pos = start as usize;
  while pos + 2 <= data.len() {
    let code = u16::from_be_bytes([data[pos], data[pos + 1]]);
    if code == Marker::Eoc.code() {
      break;
    }
    if code != Marker::Sot.code() {
      return Err(Error::at(crate::error::ErrorKind::FormatInvalid, pos as u64, "expected SOT marker"));
    }
    if pos + 10 > data.len() {
      return Err(Error::format_invalid("SOT segment truncated"));
    }
    let tile_index = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
    let psot = u32::from_be_bytes(data[pos + 6..pos + 10].try_into().unwrap()) as u64;
    let length = if psot == 0 { (data.len() - pos) as u64 } else { psot };
    out.push(TilePartLocation { tile_index, offset: pos as u64, length });
    pos += length as usize;
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codestream::writer;
  use crate::dwt::FilterKind;
  use crate::tier1::CodingOptions;
  use crate::tier2::progression::ProgressionOrder;

  fn sample_header() -> MainHeader {
    MainHeader {
      siz: crate::codestream::siz::Siz {
        x1: 8,
        y1: 8,
        x0: 0,
        y0: 0,
        xt_siz: 8,
        yt_siz: 8,
        xt0: 0,
        yt0: 0,
        components: vec![crate::codestream::siz::ComponentSiz { precision: 8, signed: false, xr_siz: 1, yr_siz: 1 }],
      },
      cod: crate::codestream::cod::Cod {
        default_precincts: true,
        sop: false,
        eph: false,
        progression: ProgressionOrder::Lrcp,
        num_layers: 1,
        mct: false,
        levels: 1,
        cblk_width_exp: 6,
        cblk_height_exp: 6,
        options: CodingOptions::default(),
        filter: FilterKind::Reversible53,
      },
      qcd: crate::codestream::qcd::Qcd {
        mode: crate::quant::SignalingMode::NoQuantization,
        guard_bits: 1,
        steps: vec![crate::quant::StepSize::reversible()],
      },
      poc: Vec::new(),
      first_tile_part_offset: 0,
    }
  }

  #[test]
  fn parses_minimal_main_header() {
    let header = sample_header();
    let bytes = writer::write_main_header(&header);
    let parsed = parse_main_header(&bytes).unwrap();
    assert_eq!(parsed.siz.x1, 8);
    assert_eq!(parsed.cod.num_layers, 1);
  }

  fn synthetic_multi_tile_stream(with_tlm: bool) -> (Vec<u8>, Vec<(u16, Vec<u8>)>) {
    let tiles = vec![(0u16, vec![1u8, 2, 3, 4]), (1u16, vec![9u8, 9, 9])];
    let mut out = writer::write_main_header(&sample_header());
    if with_tlm {
      let entries: Vec<(u32, u64)> = tiles.iter().map(|(ti, body)| (*ti as u32, (12 + 2 + body.len()) as u64)).collect();
      let (ttlm_bytes, ptlm_bytes) = writer::minimal_tlm_field_sizes(tiles.len() as u32, entries.iter().map(|e| e.1).max().unwrap());
      writer::write_tlm(&entries, ttlm_bytes, ptlm_bytes, &mut out);
    }
    for (tile_index, body) in &tiles {
      let psot = (12 + 2 + body.len()) as u32;
      writer::write_sot(*tile_index, psot, 0, 1, &mut out);
      out.extend_from_slice(&crate::consts::Marker::Sod.code().to_be_bytes());
      out.extend_from_slice(body);
    }
    out.extend_from_slice(&crate::consts::Marker::Eoc.code().to_be_bytes());
    (out, tiles)
  }

  #[test]
  fn seek_to_tile_uses_tlm_marker_when_present() {
    let (bytes, _tiles) = synthetic_multi_tile_stream(true);
    let header = parse_main_header(&bytes).unwrap();
    let location = seek_to_tile(&bytes, &header, 1).unwrap();
    assert_eq!(location.tile_index, 1);
    assert_eq!(&bytes[location.offset as usize..location.offset as usize + 2], &Marker::Sot.code().to_be_bytes());
  }

  #[test]
  fn seek_to_tile_falls_back_to_sequential_scan_without_tlm() {
    let (bytes, _tiles) = synthetic_multi_tile_stream(false);
    let header = parse_main_header(&bytes).unwrap();
    let location = seek_to_tile(&bytes, &header, 1).unwrap();
    assert_eq!(location.tile_index, 1);
    assert_eq!(&bytes[location.offset as usize..location.offset as usize + 2], &Marker::Sot.code().to_be_bytes());
  }

  #[test]
  fn seek_to_tile_errors_for_unknown_tile_index() {
    let (bytes, _tiles) = synthetic_multi_tile_stream(true);
    let header = parse_main_header(&bytes).unwrap();
    assert!(seek_to_tile(&bytes, &header, 7).is_err());
  }
}
