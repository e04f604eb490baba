//! JP2 file format: the ISO-BMFF-style box container wrapping a codestream
//! (Annex I). `boxes` holds individual payload layouts, `validator`
//! accumulates structural diagnostics without short-circuiting on the
//! first one found.

pub mod boxes;
pub mod validator;

use crate::consts::{box_type, JP2_FTYP_BRAND, JP2_SIGNATURE};
use crate::error::{Error, Result};
use boxes::{ChannelDefinitionEntry, ColourSpecification, ComponentMappingEntry, ImageHeader, Palette};

/// One top-level box as read off disk: its four-character type and raw
/// payload (length/type header stripped).
#[derive(Debug, Clone)]
pub struct RawBox {
  pub box_type: u32,
  pub payload: Vec<u8>,
}

/// Splits a byte buffer into top-level boxes, honoring the length=0
/// ("extends to end of file") and length=1 (8-byte extended length)
/// conventions (Annex I.4).
pub fn split_boxes(data: &[u8]) -> Result<Vec<RawBox>> {
  let mut out = Vec::new();
  let mut pos = 0usize;
  while pos < data.len() {
    if pos + 8 > data.len() {
      return Err(Error::format_invalid("box header truncated"));
    }
    let len32 = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap());
    let box_type = u32::from_be_bytes(data[pos + 4..pos + 8].try_into().unwrap());
    let (header_len, total_len) = if len32 == 1 {
      if pos + 16 > data.len() {
        return Err(Error::format_invalid("extended box length truncated"));
      }
      let ext = u64::from_be_bytes(data[pos + 8..pos + 16].try_into().unwrap());
      (16usize, ext as usize)
    } else if len32 == 0 {
      (8usize, data.len() - pos)
    } else {
      (8usize, len32 as usize)
    };
    if total_len < header_len || pos + total_len > data.len() {
      return Err(Error::format_invalid("box length runs past end of buffer"));
    }
    let payload = data[pos + header_len..pos + total_len].to_vec();
    out.push(RawBox { box_type, payload });
    pos += total_len;
  }
  Ok(out)
}

fn write_simple_box(box_type: u32, payload: &[u8], out: &mut Vec<u8>) {
  out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
  out.extend_from_slice(&box_type.to_be_bytes());
  out.extend_from_slice(payload);
}

/// Parsed contents of the `jp2h` superbox (Annex I.5.3): everything needed
/// to reconstruct an [`Image`](crate::image::Image)'s colour and palette
/// metadata, independent of sample data.
#[derive(Debug, Clone, Default)]
pub struct Jp2Header {
  pub ihdr: Option<ImageHeader>,
  pub colr: Option<ColourSpecification>,
  pub bpcc: Option<Vec<(u8, bool)>>,
  pub pclr: Option<Palette>,
  pub cmap: Option<Vec<ComponentMappingEntry>>,
  pub cdef: Option<Vec<ChannelDefinitionEntry>>,
  pub resolution: Option<Vec<u8>>,
}

/// Top-level contents of a JP2 file, in the order this reader encountered
/// them, plus the embedded codestream bytes.
#[derive(Debug, Clone, Default)]
pub struct Jp2File {
  pub header: Jp2Header,
  pub xml_boxes: Vec<Vec<u8>>,
  pub uuid_boxes: Vec<(u128, Vec<u8>)>,
  pub codestream: Vec<u8>,
}

/// Parses a complete JP2 file: signature, `ftyp`, `jp2h`, metadata boxes,
/// and the `jp2c` codestream payload, per the reader contract in Annex I.
/// Unknown boxes are skipped rather than rejected.
pub fn parse_jp2(data: &[u8]) -> Result<Jp2File> {
  if data.len() < 12 || data[0..12] != JP2_SIGNATURE {
    return Err(Error::format_invalid("missing or malformed JP2 signature box"));
  }
  let boxes = split_boxes(&data[12..])?;
  let mut iter = boxes.into_iter();
  let ftyp = iter.next().ok_or_else(|| Error::format_invalid("JP2 file has no File Type box"))?;
  if ftyp.box_type != box_type::FILE_TYPE {
    return Err(Error::format_invalid("second box is not a File Type box"));
  }
  if ftyp.payload.len() < 8 {
    return Err(Error::format_invalid("ftyp box shorter than 8 bytes"));
  }
  let compat_list = &ftyp.payload[8..];
  let is_compatible = compat_list.chunks(4).any(|c| c.len() == 4 && u32::from_be_bytes(c.try_into().unwrap()) == JP2_FTYP_BRAND);
  if !is_compatible {
    return Err(Error::format_invalid("ftyp compatibility list does not contain 'jp2 '"));
  }

  let mut file = Jp2File::default();
  let mut seen_jp2h = false;
  for b in iter {
    match b.box_type {
      box_type::JP2_HEADER => {
        if seen_jp2h {
          return Err(Error::format_invalid("multiple jp2h boxes"));
        }
        seen_jp2h = true;
        file.header = parse_jp2_header(&b.payload)?;
      }
      box_type::CONTIGUOUS_CODESTREAM => {
        if !seen_jp2h {
          return Err(Error::format_invalid("jp2c box appears before jp2h"));
        }
        file.codestream = b.payload;
      }
      box_type::XML => file.xml_boxes.push(b.payload),
      box_type::UUID => {
        if b.payload.len() < 16 {
          return Err(Error::format_invalid("uuid box shorter than 16 bytes"));
        }
        let id = u128::from_be_bytes(b.payload[0..16].try_into().unwrap());
        file.uuid_boxes.push((id, b.payload[16..].to_vec()));
      }
      _ => {
        log::debug!("skipping unknown top-level box type 0x{:08x}", b.box_type);
      }
    }
  }
  if !seen_jp2h {
    return Err(Error::format_invalid("JP2 file has no jp2h box"));
  }
  if file.codestream.is_empty() {
    return Err(Error::format_invalid("JP2 file has no jp2c box"));
  }
  Ok(file)
}

fn parse_jp2_header(payload: &[u8]) -> Result<Jp2Header> {
  let mut header = Jp2Header::default();
  for b in split_boxes(payload)? {
    match b.box_type {
      box_type::IMAGE_HEADER => header.ihdr = Some(ImageHeader::parse(&b.payload)?),
      box_type::COLOUR_SPEC => header.colr = Some(ColourSpecification::parse(&b.payload)?),
      box_type::BITS_PER_COMPONENT => header.bpcc = Some(boxes::parse_bpcc(&b.payload)),
      box_type::PALETTE => header.pclr = Some(Palette::parse(&b.payload)?),
      box_type::COMPONENT_MAPPING => header.cmap = Some(boxes::parse_cmap(&b.payload)?),
      box_type::CHANNEL_DEFINITION => header.cdef = Some(boxes::parse_cdef(&b.payload)?),
      box_type::RESOLUTION => header.resolution = Some(b.payload),
      _ => log::debug!("skipping unknown jp2h sub-box type 0x{:08x}", b.box_type),
    }
  }
  if header.ihdr.is_none() {
    return Err(Error::format_invalid("jp2h box has no ihdr box"));
  }
  Ok(header)
}

/// Writes a complete JP2 file: signature, `ftyp`, `jp2h` (in the Annex
/// I.5.3 sub-box order: ihdr, colr, bpcc?, pclr?, cmap?, cdef?, res?),
/// then any XML/UUID metadata boxes, then `jp2c` last, per the writer
/// contract.
pub fn write_jp2(header: &Jp2Header, xml_boxes: &[Vec<u8>], uuid_boxes: &[(u128, Vec<u8>)], codestream: &[u8]) -> Result<Vec<u8>> {
  let ihdr = header.ihdr.as_ref().ok_or_else(|| Error::programmer("write_jp2 requires an ihdr box"))?;
  let mut out = Vec::new();
  out.extend_from_slice(&JP2_SIGNATURE);

  let mut ftyp_payload = Vec::new();
  ftyp_payload.extend_from_slice(&JP2_FTYP_BRAND.to_be_bytes());
  ftyp_payload.extend_from_slice(&0u32.to_be_bytes()); // minimum version
  ftyp_payload.extend_from_slice(&JP2_FTYP_BRAND.to_be_bytes()); // sole compatible brand
  write_simple_box(box_type::FILE_TYPE, &ftyp_payload, &mut out);

  let mut jp2h_payload = Vec::new();
  ihdr.write(&mut jp2h_payload);
  if let Some(colr) = &header.colr {
    colr.write(&mut jp2h_payload);
  }
  if let Some(bpcc) = &header.bpcc {
    boxes::write_bpcc(bpcc, &mut jp2h_payload);
  }
  if let Some(pclr) = &header.pclr {
    pclr.write(&mut jp2h_payload);
  }
  if let Some(cmap) = &header.cmap {
    boxes::write_cmap(cmap, &mut jp2h_payload);
  }
  if let Some(cdef) = &header.cdef {
    boxes::write_cdef(cdef, &mut jp2h_payload);
  }
  if let Some(res) = &header.resolution {
    write_simple_box(box_type::RESOLUTION, res, &mut jp2h_payload);
  }
  write_simple_box(box_type::JP2_HEADER, &jp2h_payload, &mut out);

  for xml in xml_boxes {
    write_simple_box(box_type::XML, xml, &mut out);
  }
  for (id, payload) in uuid_boxes {
    let mut full = Vec::with_capacity(16 + payload.len());
    full.extend_from_slice(&id.to_be_bytes());
    full.extend_from_slice(payload);
    write_simple_box(box_type::UUID, &full, &mut out);
  }

  write_simple_box(box_type::CONTIGUOUS_CODESTREAM, codestream, &mut out);
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use boxes::ColourMethod;

  fn sample_header() -> Jp2Header {
    Jp2Header {
      ihdr: Some(ImageHeader {
        height: 16,
        width: 16,
        num_components: 1,
        bpc: 7,
        compression_type: 7,
        unknown_colourspace: false,
        intellectual_property: false,
      }),
      colr: Some(ColourSpecification { method: ColourMethod::Enumerated(17), precedence: 0, approximation: 0, icc_profile: None }),
      bpcc: None,
      pclr: None,
      cmap: None,
      cdef: None,
      resolution: None,
    }
  }

  #[test]
  fn write_then_parse_round_trips_minimal_file() {
    let header = sample_header();
    let codestream = vec![0xffu8, 0x4f, 0xff, 0xd9]; // SOC, EOC stand-in
    let bytes = write_jp2(&header, &[], &[], &codestream).unwrap();
    let parsed = parse_jp2(&bytes).unwrap();
    assert_eq!(parsed.header.ihdr.unwrap().width, 16);
    assert_eq!(parsed.codestream, codestream);
  }

  #[test]
  fn rejects_missing_signature() {
    let err = parse_jp2(&[0u8; 20]).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::FormatInvalid);
  }

  #[test]
  fn rejects_jp2c_before_jp2h() {
    let mut out = Vec::new();
    out.extend_from_slice(&JP2_SIGNATURE);
    let mut ftyp_payload = Vec::new();
    ftyp_payload.extend_from_slice(&JP2_FTYP_BRAND.to_be_bytes());
    ftyp_payload.extend_from_slice(&0u32.to_be_bytes());
    ftyp_payload.extend_from_slice(&JP2_FTYP_BRAND.to_be_bytes());
    write_simple_box(box_type::FILE_TYPE, &ftyp_payload, &mut out);
    write_simple_box(box_type::CONTIGUOUS_CODESTREAM, &[0xff, 0x4f], &mut out);
    let err = parse_jp2(&out).unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::FormatInvalid);
  }

  #[test]
  fn split_boxes_handles_length_zero_extends_to_end() {
    let mut data = Vec::new();
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(b"xml ");
    data.extend_from_slice(b"<a/>");
    let boxes = split_boxes(&data).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].payload, b"<a/>");
  }
}
