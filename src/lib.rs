//! A bit-exact encoder/decoder for the JPEG 2000 Part 1 (ISO/IEC
//! 15444-1) JP2 file format and codestream: tiling, the 5/3 reversible
//! and 9/7 irreversible wavelet transforms, scalar quantization,
//! MAXSHIFT region-of-interest coding, EBCOT Tier-1 entropy coding,
//! post-compression rate-distortion optimal truncation, and Tier-2
//! packet/progression assembly.

#![allow(clippy::too_many_arguments)]

pub mod bit_io;
pub mod codestream;
pub mod consts;
pub mod decoder;
pub mod dwt;
pub mod encoder;
pub mod error;
pub mod geometry;
pub mod image;
pub mod jp2;
pub mod mct;
pub mod mq;
pub mod pool;
pub mod quant;
pub mod rate_control;
pub mod roi;
pub mod tag_tree;
pub mod tier1;
pub mod tier2;
pub mod tile;

pub use decoder::{DecodeOptions, Decoder};
pub use encoder::{EncodeOptions, Encoder, RoiSpec};
pub use error::{Error, ErrorKind, Result};
pub use image::Image;

/// Which container a byte buffer or file extension identifies as,
/// distinguishing the box-wrapped `.jp2` format from a bare `.j2k`/`.j2c`
/// codestream (Annex I vs Annex A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum J2KFormat {
  Jp2,
  J2k,
}

/// Detects the container format from the leading bytes: the 12-byte JP2
/// signature box, or the bare codestream's `SOC` marker.
pub fn detect_format(buf: &[u8]) -> Result<J2KFormat> {
  if buf.len() >= 12 && buf[0..12] == consts::JP2_SIGNATURE {
    Ok(J2KFormat::Jp2)
  } else if buf.len() >= 2 && buf[0..2] == consts::Marker::Soc.code().to_be_bytes() {
    Ok(J2KFormat::J2k)
  } else {
    Err(Error::format_invalid("buffer does not start with a JP2 signature box or an SOC marker"))
  }
}

/// Detects the container format from a file extension (case-insensitive).
pub fn detect_format_from_extension(ext: Option<&std::ffi::OsStr>) -> Result<J2KFormat> {
  let lower = ext.and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
  match lower.as_deref() {
    Some("jp2") => Ok(J2KFormat::Jp2),
    Some("j2k") | Some("j2c") | Some("jpc") => Ok(J2KFormat::J2k),
    Some(other) => Err(Error::parameter(format!("unknown file extension: {other}"))),
    None => Err(Error::parameter("no file extension")),
  }
}

/// Detects the container format from a file path, reading only its
/// leading bytes, and warns (via `log::warn!`) if the extension disagrees
/// with the magic bytes actually found.
pub fn detect_format_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<J2KFormat> {
  use std::io::Read;

  let path = path.as_ref();
  let ext_format = detect_format_from_extension(path.extension()).ok();

  let mut buf = [0u8; 12];
  let mut file = std::fs::File::open(path).map_err(|e| Error::format_invalid(format!("opening {}: {e}", path.display())))?;
  let n = file.read(&mut buf).map_err(|e| Error::format_invalid(format!("reading {}: {e}", path.display())))?;
  let magic_format = detect_format(&buf[..n])?;

  if let Some(ext_format) = ext_format {
    if ext_format != magic_format {
      log::warn!("file extension suggests {ext_format:?} but magic bytes indicate {magic_format:?}: {}", path.display());
    }
  }
  Ok(magic_format)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detects_jp2_from_signature() {
    assert_eq!(detect_format(&consts::JP2_SIGNATURE).unwrap(), J2KFormat::Jp2);
  }

  #[test]
  fn detects_j2k_from_soc_marker() {
    let bytes = [0xff, 0x4f, 0xff, 0x51];
    assert_eq!(detect_format(&bytes).unwrap(), J2KFormat::J2k);
  }

  #[test]
  fn rejects_unknown_bytes() {
    assert!(detect_format(&[0, 1, 2, 3]).is_err());
  }

  #[test]
  fn extension_detection_is_case_insensitive() {
    assert_eq!(detect_format_from_extension(Some(std::ffi::OsStr::new("JP2"))).unwrap(), J2KFormat::Jp2);
  }
}
