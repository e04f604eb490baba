//! Marker codes (Annex A.2), box types (Annex I.4), and file-format magic
//! bytes.

/// Magic bytes for the JP2 signature box (ISO/IEC 15444-1 Annex I.5.1).
pub const JP2_SIGNATURE: [u8; 12] =
  [0x00, 0x00, 0x00, 0x0c, 0x6a, 0x50, 0x20, 0x20, 0x0d, 0x0a, 0x87, 0x0a];
/// Magic bytes for the bare codestream (`.j2k`/`.j2c`).
pub const J2K_CODESTREAM_MAGIC: [u8; 4] = [0xff, 0x4f, 0xff, 0x51];

/// Codestream markers, network byte order (Annex A.2, Table A.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Marker {
  Soc = 0xff4f,
  Siz = 0xff51,
  Cod = 0xff52,
  Coc = 0xff53,
  Tlm = 0xff55,
  Qcd = 0xff5c,
  Qcc = 0xff5d,
  Rgn = 0xff5e,
  Poc = 0xff5f,
  Ppm = 0xff60,
  Ppt = 0xff61,
  Plm = 0xff57,
  Plt = 0xff58,
  Crg = 0xff63,
  Com = 0xff64,
  Sot = 0xff90,
  Sop = 0xff91,
  Eph = 0xff92,
  Sod = 0xff93,
  Eoc = 0xffd9,
}

impl Marker {
  pub fn from_u16(code: u16) -> Option<Self> {
    use Marker::*;
    Some(match code {
      0xff4f => Soc,
      0xff51 => Siz,
      0xff52 => Cod,
      0xff53 => Coc,
      0xff55 => Tlm,
      0xff5c => Qcd,
      0xff5d => Qcc,
      0xff5e => Rgn,
      0xff5f => Poc,
      0xff60 => Ppm,
      0xff61 => Ppt,
      0xff57 => Plm,
      0xff58 => Plt,
      0xff63 => Crg,
      0xff64 => Com,
      0xff90 => Sot,
      0xff91 => Sop,
      0xff92 => Eph,
      0xff93 => Sod,
      0xffd9 => Eoc,
      _ => return None,
    })
  }

  pub fn code(self) -> u16 {
    self as u16
  }

  /// Whether this marker is followed by a `Lseg` length field, i.e. is a
  /// marker *segment* rather than a standalone delimiter.
  pub fn has_length(self) -> bool {
    !matches!(self, Marker::Soc | Marker::Sod | Marker::Eoc | Marker::Sop | Marker::Eph)
  }
}

/// Four-character box type codes (Annex I.4), stored as their big-endian
/// `u32` encoding for cheap comparison.
pub mod box_type {
  pub const SIGNATURE: u32 = u32::from_be_bytes(*b"jP  ");
  pub const FILE_TYPE: u32 = u32::from_be_bytes(*b"ftyp");
  pub const JP2_HEADER: u32 = u32::from_be_bytes(*b"jp2h");
  pub const IMAGE_HEADER: u32 = u32::from_be_bytes(*b"ihdr");
  pub const COLOUR_SPEC: u32 = u32::from_be_bytes(*b"colr");
  pub const BITS_PER_COMPONENT: u32 = u32::from_be_bytes(*b"bpcc");
  pub const PALETTE: u32 = u32::from_be_bytes(*b"pclr");
  pub const COMPONENT_MAPPING: u32 = u32::from_be_bytes(*b"cmap");
  pub const CHANNEL_DEFINITION: u32 = u32::from_be_bytes(*b"cdef");
  pub const RESOLUTION: u32 = u32::from_be_bytes(*b"res ");
  pub const RESOLUTION_CAPTURE: u32 = u32::from_be_bytes(*b"resc");
  pub const RESOLUTION_DEFAULT: u32 = u32::from_be_bytes(*b"resd");
  pub const CONTIGUOUS_CODESTREAM: u32 = u32::from_be_bytes(*b"jp2c");
  pub const XML: u32 = u32::from_be_bytes(*b"xml ");
  pub const UUID: u32 = u32::from_be_bytes(*b"uuid");
  pub const UUID_INFO: u32 = u32::from_be_bytes(*b"jp2i");
  pub const LABEL: u32 = u32::from_be_bytes(*b"lbl ");
}

pub const JP2_FTYP_BRAND: u32 = u32::from_be_bytes(*b"jp2 ");
