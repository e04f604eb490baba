//! SIZ marker segment (Annex A.5.1): image and tile geometry plus
//! per-component bit depth/subsampling.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSiz {
  pub precision: u8,
  pub signed: bool,
  pub xr_siz: u8,
  pub yr_siz: u8,
}

#[derive(Debug, Clone)]
pub struct Siz {
  pub x1: u32,
  pub y1: u32,
  pub x0: u32,
  pub y0: u32,
  pub xt_siz: u32,
  pub yt_siz: u32,
  pub xt0: u32,
  pub yt0: u32,
  pub components: Vec<ComponentSiz>,
}

impl Siz {
  pub fn write(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(&crate::consts::Marker::Siz.code().to_be_bytes());
    let len = 38 + 3 * self.components.len();
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // Rsiz: no capability profile restriction
    out.extend_from_slice(&self.x1.to_be_bytes());
    out.extend_from_slice(&self.y1.to_be_bytes());
    out.extend_from_slice(&self.x0.to_be_bytes());
    out.extend_from_slice(&self.y0.to_be_bytes());
    out.extend_from_slice(&self.xt_siz.to_be_bytes());
    out.extend_from_slice(&self.yt_siz.to_be_bytes());
    out.extend_from_slice(&self.xt0.to_be_bytes());
    out.extend_from_slice(&self.yt0.to_be_bytes());
    out.extend_from_slice(&(self.components.len() as u16).to_be_bytes());
    for c in &self.components {
      let ssiz = (c.precision - 1) | if c.signed { 0x80 } else { 0 };
      out.push(ssiz);
      out.push(c.xr_siz);
      out.push(c.yr_siz);
    }
  }

  pub fn parse(body: &[u8]) -> Result<Self> {
    if body.len() < 38 {
      return Err(Error::format_invalid("SIZ segment shorter than the fixed 38-byte header"));
    }
    let u32_at = |o: usize| u32::from_be_bytes(body[o..o + 4].try_into().unwrap());
    let x1 = u32_at(2);
    let y1 = u32_at(6);
    let x0 = u32_at(10);
    let y0 = u32_at(14);
    let xt_siz = u32_at(18);
    let yt_siz = u32_at(22);
    let xt0 = u32_at(26);
    let yt0 = u32_at(30);
    let csiz = u16::from_be_bytes([body[34], body[35]]) as usize;
    let mut components = Vec::with_capacity(csiz);
    let mut off = 36;
    for _ in 0..csiz {
      if off + 3 > body.len() {
        return Err(Error::format_invalid("SIZ segment truncated in component table"));
      }
      let ssiz = body[off];
      components.push(ComponentSiz {
        precision: (ssiz & 0x7F) + 1,
        signed: ssiz & 0x80 != 0,
        xr_siz: body[off + 1],
        yr_siz: body[off + 2],
      });
      off += 3;
    }
    Ok(Self { x1, y1, x0, y0, xt_siz, yt_siz, xt0, yt0, components })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn write_then_parse_round_trips() {
    let siz = Siz {
      x1: 256,
      y1: 128,
      x0: 0,
      y0: 0,
      xt_siz: 256,
      yt_siz: 128,
      xt0: 0,
      yt0: 0,
      components: vec![ComponentSiz { precision: 8, signed: false, xr_siz: 1, yr_siz: 1 }],
    };
    let mut out = Vec::new();
    siz.write(&mut out);
    let parsed = Siz::parse(&out[4..]).unwrap();
    assert_eq!(parsed.x1, 256);
    assert_eq!(parsed.components.len(), 1);
    assert_eq!(parsed.components[0].precision, 8);
    assert!(!parsed.components[0].signed);
  }
}
