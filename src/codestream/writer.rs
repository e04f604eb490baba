//! Marker-segment emission (Annex A.4): deterministic main-header order
//! (SOC, SIZ, COD, QCD, POC?), plus helpers for tile-part framing and
//! TLM field-size minimization.

use crate::codestream::reader::MainHeader;
use crate::consts::Marker;

/// Writes the main header in the canonical order this codec always
/// emits: `SOC, SIZ, COD, QCD, POC?`. Real encoders may also interleave
/// COC/QCC/RGN/PPM/TLM/PLM/CRG/COM, all omitted here since nothing in
/// this codec's encode path signals component overrides or packed
/// headers.
pub fn write_main_header(header: &MainHeader) -> Vec<u8> {
  let mut out = Vec::new();
  out.extend_from_slice(&Marker::Soc.code().to_be_bytes());
  header.siz.write(&mut out);
  header.cod.write(&mut out);
  header.qcd.write(&mut out);
  if !header.poc.is_empty() {
    let two_byte = header.siz.components.len() > 256;
    crate::codestream::poc::write(&header.poc, two_byte, &mut out);
  }
  out
}

/// Smallest `Ttlm` field width (0, 1, or 2 bytes) able to index every
/// tile in `num_tiles`, and smallest `Ptlm` width (2 or 4 bytes) able to
/// hold the largest tile-part length observed, per the TLM field-size
/// minimization the spec's codestream layer calls for.
pub fn minimal_tlm_field_sizes(num_tiles: u32, max_tile_part_length: u64) -> (u8, u8) {
  let ttlm = if num_tiles <= 1 {
    0
  } else if num_tiles <= 255 {
    1
  } else {
    2
  };
  let ptlm = if max_tile_part_length <= u16::MAX as u64 { 2 } else { 4 };
  (ttlm, ptlm)
}

/// Writes a TLM marker segment for a batch of tile-part lengths, sized
/// per [`minimal_tlm_field_sizes`].
pub fn write_tlm(entries: &[(u32, u64)], ttlm_bytes: u8, ptlm_bytes: u8, out: &mut Vec<u8>) {
  out.extend_from_slice(&Marker::Tlm.code().to_be_bytes());
  let per_entry = ttlm_bytes as usize + ptlm_bytes as usize;
  let len = 4 + per_entry * entries.len();
  out.extend_from_slice(&(len as u16).to_be_bytes());
  out.push(0); // Ztlm: single TLM marker, not split across segments
  let stlm = ((ttlm_bytes.min(2)) << 4) | if ptlm_bytes == 4 { 0x40 } else { 0 };
  out.push(stlm);
  for &(tile_index, length) in entries {
    match ttlm_bytes {
      0 => {}
      1 => out.push(tile_index as u8),
      _ => out.extend_from_slice(&(tile_index as u16).to_be_bytes()),
    }
    match ptlm_bytes {
      2 => out.extend_from_slice(&(length as u16).to_be_bytes()),
      _ => out.extend_from_slice(&(length as u32).to_be_bytes()),
    }
  }
}

/// Writes one tile-part's `SOT` header. `psot` is the total tile-part
/// length including this SOT segment; pass 0 if unknown ahead of time
/// (not used by this encoder, which always knows it before emission).
pub fn write_sot(tile_index: u16, psot: u32, tile_part_index: u8, num_tile_parts: u8, out: &mut Vec<u8>) {
  out.extend_from_slice(&Marker::Sot.code().to_be_bytes());
  out.extend_from_slice(&10u16.to_be_bytes());
  out.extend_from_slice(&tile_index.to_be_bytes());
  out.extend_from_slice(&psot.to_be_bytes());
  out.push(tile_part_index);
  out.push(num_tile_parts);
}
