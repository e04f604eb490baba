//! JP2 box payload layouts (Annex I): Image Header, Colour Specification,
//! Bits Per Component, Palette, Component Mapping, Channel Definitions,
//! Resolution, and File Type.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct ImageHeader {
  pub height: u32,
  pub width: u32,
  pub num_components: u16,
  /// Bit depth; `0xFF` means per-component depths differ and a `bpcc` box
  /// must follow (Annex I.5.3.1).
  pub bpc: u8,
  pub compression_type: u8,
  pub unknown_colourspace: bool,
  pub intellectual_property: bool,
}

impl ImageHeader {
  pub fn write(&self, out: &mut Vec<u8>) {
    let payload_len = 14;
    out.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
    out.extend_from_slice(&crate::consts::box_type::IMAGE_HEADER.to_be_bytes());
    out.extend_from_slice(&self.height.to_be_bytes());
    out.extend_from_slice(&self.width.to_be_bytes());
    out.extend_from_slice(&self.num_components.to_be_bytes());
    out.push(self.bpc);
    out.push(self.compression_type);
    out.push(self.unknown_colourspace as u8);
    out.push(self.intellectual_property as u8);
  }

  pub fn parse(payload: &[u8]) -> Result<Self> {
    if payload.len() < 14 {
      return Err(Error::format_invalid("ihdr box shorter than 14 bytes"));
    }
    Ok(Self {
      height: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
      width: u32::from_be_bytes(payload[4..8].try_into().unwrap()),
      num_components: u16::from_be_bytes([payload[8], payload[9]]),
      bpc: payload[10],
      compression_type: payload[11],
      unknown_colourspace: payload[12] != 0,
      intellectual_property: payload[13] != 0,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourMethod {
  Enumerated(u32),
  RestrictedIcc,
  AnyIcc,
}

#[derive(Debug, Clone)]
pub struct ColourSpecification {
  pub method: ColourMethod,
  pub precedence: i8,
  pub approximation: u8,
  pub icc_profile: Option<Vec<u8>>,
}

impl ColourSpecification {
  pub fn write(&self, out: &mut Vec<u8>) {
    let icc_len = self.icc_profile.as_ref().map(|v| v.len()).unwrap_or(0);
    let payload_len = 3 + if matches!(self.method, ColourMethod::Enumerated(_)) { 4 } else { icc_len };
    out.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
    out.extend_from_slice(&crate::consts::box_type::COLOUR_SPEC.to_be_bytes());
    let method_byte = match self.method {
      ColourMethod::Enumerated(_) => 1,
      ColourMethod::RestrictedIcc => 2,
      ColourMethod::AnyIcc => 3,
    };
    out.push(method_byte);
    out.push(self.precedence as u8);
    out.push(self.approximation);
    match self.method {
      ColourMethod::Enumerated(cs) => out.extend_from_slice(&cs.to_be_bytes()),
      _ => {
        if let Some(icc) = &self.icc_profile {
          out.extend_from_slice(icc);
        }
      }
    }
  }

  pub fn parse(payload: &[u8]) -> Result<Self> {
    if payload.len() < 3 {
      return Err(Error::format_invalid("colr box shorter than 3 bytes"));
    }
    let precedence = payload[1] as i8;
    let approximation = payload[2];
    let (method, icc_profile) = match payload[0] {
      1 => {
        if payload.len() < 7 {
          return Err(Error::format_invalid("enumerated colr box missing EnumCS field"));
        }
        (ColourMethod::Enumerated(u32::from_be_bytes(payload[3..7].try_into().unwrap())), None)
      }
      2 => (ColourMethod::RestrictedIcc, Some(payload[3..].to_vec())),
      3 => (ColourMethod::AnyIcc, Some(payload[3..].to_vec())),
      other => return Err(Error::format_invalid(format!("unknown colour specification method {other}"))),
    };
    Ok(Self { method, precedence, approximation, icc_profile })
  }
}

/// Bits Per Component box (Annex I.5.3.3): one byte per component, same
/// encoding as `ihdr`'s BPC field, present only when `ihdr.bpc == 0xFF`.
pub fn parse_bpcc(payload: &[u8]) -> Vec<(u8, bool)> {
  payload.iter().map(|&b| ((b & 0x7F) + 1, b & 0x80 != 0)).collect()
}

pub fn write_bpcc(components: &[(u8, bool)], out: &mut Vec<u8>) {
  out.extend_from_slice(&((8 + components.len()) as u32).to_be_bytes());
  out.extend_from_slice(&crate::consts::box_type::BITS_PER_COMPONENT.to_be_bytes());
  for &(precision, signed) in components {
    out.push((precision - 1) | if signed { 0x80 } else { 0 });
  }
}

/// Palette box (Annex I.5.3.4): `NE` entries, `NPC` columns, one bit-depth
/// byte per column, then `NE * NPC` values stored at the widest column's
/// byte width.
#[derive(Debug, Clone)]
pub struct Palette {
  pub bit_depths: Vec<(u8, bool)>,
  pub entries: Vec<Vec<i32>>,
}

impl Palette {
  pub fn parse(payload: &[u8]) -> Result<Self> {
    if payload.len() < 3 {
      return Err(Error::format_invalid("pclr box shorter than 3 bytes"));
    }
    let ne = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let npc = payload[2] as usize;
    if payload.len() < 3 + npc {
      return Err(Error::format_invalid("pclr box missing per-column bit-depth bytes"));
    }
    let bit_depths: Vec<(u8, bool)> = payload[3..3 + npc].iter().map(|&b| ((b & 0x7F) + 1, b & 0x80 != 0)).collect();
    let mut off = 3 + npc;
    let mut entries = Vec::with_capacity(ne);
    for _ in 0..ne {
      let mut row = Vec::with_capacity(npc);
      for &(precision, signed) in &bit_depths {
        let bytes = ((precision as usize) + 7) / 8;
        if off + bytes > payload.len() {
          return Err(Error::format_invalid("pclr box truncated in entry table"));
        }
        let mut v: i64 = 0;
        for i in 0..bytes {
          v = (v << 8) | payload[off + i] as i64;
        }
        off += bytes;
        if signed {
          let shift = 64 - 8 * bytes as u32;
          v = (v << shift) >> shift;
        }
        row.push(v as i32);
      }
      entries.push(row);
    }
    Ok(Self { bit_depths, entries })
  }

  pub fn write(&self, out: &mut Vec<u8>) {
    let npc = self.bit_depths.len();
    let row_bytes: usize = self.bit_depths.iter().map(|&(p, _)| ((p as usize) + 7) / 8).sum();
    let payload_len = 3 + npc + self.entries.len() * row_bytes;
    out.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
    out.extend_from_slice(&crate::consts::box_type::PALETTE.to_be_bytes());
    out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
    out.push(npc as u8);
    for &(precision, signed) in &self.bit_depths {
      out.push((precision - 1) | if signed { 0x80 } else { 0 });
    }
    for row in &self.entries {
      for (&v, &(precision, _signed)) in row.iter().zip(&self.bit_depths) {
        let bytes = ((precision as usize) + 7) / 8;
        let bits = v.to_be_bytes();
        out.extend_from_slice(&bits[4 - bytes..4]);
      }
    }
  }
}

/// Component Mapping box (Annex I.5.3.5): one `{MCmp, MTYP, PCOL}` triplet
/// per output channel.
#[derive(Debug, Clone, Copy)]
pub struct ComponentMappingEntry {
  pub component_index: u16,
  pub is_palette_mapped: bool,
  pub palette_column: u8,
}

pub fn parse_cmap(payload: &[u8]) -> Result<Vec<ComponentMappingEntry>> {
  if payload.len() % 4 != 0 {
    return Err(Error::format_invalid("cmap box length is not a multiple of 4"));
  }
  Ok(
    payload
      .chunks(4)
      .map(|c| ComponentMappingEntry {
        component_index: u16::from_be_bytes([c[0], c[1]]),
        is_palette_mapped: c[2] != 0,
        palette_column: c[3],
      })
      .collect(),
  )
}

pub fn write_cmap(entries: &[ComponentMappingEntry], out: &mut Vec<u8>) {
  out.extend_from_slice(&((8 + entries.len() * 4) as u32).to_be_bytes());
  out.extend_from_slice(&crate::consts::box_type::COMPONENT_MAPPING.to_be_bytes());
  for e in entries {
    out.extend_from_slice(&e.component_index.to_be_bytes());
    out.push(e.is_palette_mapped as u8);
    out.push(e.palette_column);
  }
}

/// Channel Definitions box (Annex I.5.3.6): one `{Cn, Typ, Asoc}` triplet
/// per described channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDefinitionEntry {
  pub channel_index: u16,
  /// 0 = colour, 1 = opacity, 2 = premultiplied opacity, 0xFFFF = unspecified.
  pub channel_type: u16,
  pub association: u16,
}

pub fn parse_cdef(payload: &[u8]) -> Result<Vec<ChannelDefinitionEntry>> {
  if payload.len() < 2 {
    return Err(Error::format_invalid("cdef box shorter than 2 bytes"));
  }
  let n = u16::from_be_bytes([payload[0], payload[1]]) as usize;
  if payload.len() < 2 + n * 6 {
    return Err(Error::format_invalid("cdef box truncated"));
  }
  Ok(
    payload[2..2 + n * 6]
      .chunks(6)
      .map(|c| ChannelDefinitionEntry {
        channel_index: u16::from_be_bytes([c[0], c[1]]),
        channel_type: u16::from_be_bytes([c[2], c[3]]),
        association: u16::from_be_bytes([c[4], c[5]]),
      })
      .collect(),
  )
}

pub fn write_cdef(entries: &[ChannelDefinitionEntry], out: &mut Vec<u8>) {
  out.extend_from_slice(&((8 + 2 + entries.len() * 6) as u32).to_be_bytes());
  out.extend_from_slice(&crate::consts::box_type::CHANNEL_DEFINITION.to_be_bytes());
  out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
  for e in entries {
    out.extend_from_slice(&e.channel_index.to_be_bytes());
    out.extend_from_slice(&e.channel_type.to_be_bytes());
    out.extend_from_slice(&e.association.to_be_bytes());
  }
}
