//! COD/COC marker segments (Annex A.6.1/A.6.2): default and
//! component-override coding style, carrying the progression order,
//! layer count, decomposition levels, code-block size and style flags,
//! and the filter selector.

use crate::dwt::FilterKind;
use crate::error::{Error, Result};
use crate::tier1::CodingOptions;
use crate::tier2::progression::ProgressionOrder;

#[derive(Debug, Clone, Copy)]
pub struct Cod {
  pub default_precincts: bool,
  pub sop: bool,
  pub eph: bool,
  pub progression: ProgressionOrder,
  pub num_layers: u16,
  pub mct: bool,
  pub levels: u8,
  pub cblk_width_exp: u8,
  pub cblk_height_exp: u8,
  pub options: CodingOptions,
  pub filter: FilterKind,
}

impl Cod {
  fn scod_byte(&self) -> u8 {
    let mut b = 0u8;
    if !self.default_precincts {
      b |= 0x01;
    }
    if self.sop {
      b |= 0x02;
    }
    if self.eph {
      b |= 0x04;
    }
    b
  }

  fn scb_byte(&self) -> u8 {
    let o = &self.options;
    (o.bypass as u8)
      | ((o.reset_mq_per_pass as u8) << 1)
      | ((o.terminate_per_pass as u8) << 2)
      | ((o.vert_causal_context as u8) << 3)
      | ((o.predictable_termination as u8) << 4)
      | ((o.segment_symbols as u8) << 5)
  }

  pub fn write(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(&crate::consts::Marker::Cod.code().to_be_bytes());
    let len: u16 = 12;
    out.extend_from_slice(&len.to_be_bytes());
    out.push(self.scod_byte());
    out.push(self.progression.code());
    out.extend_from_slice(&self.num_layers.to_be_bytes());
    out.push(self.mct as u8);
    out.push(self.levels);
    out.push(self.cblk_width_exp - 2);
    out.push(self.cblk_height_exp - 2);
    out.push(self.scb_byte());
    out.push(match self.filter {
      FilterKind::Reversible53 => 1,
      FilterKind::Irreversible97 => 0,
    });
  }

  pub fn parse(body: &[u8]) -> Result<Self> {
    if body.len() < 12 {
      return Err(Error::format_invalid("COD segment shorter than expected"));
    }
    let scod = body[2];
    let progression = ProgressionOrder::from_code(body[3])
      .ok_or_else(|| Error::format_invalid(format!("unknown progression order code {}", body[3])))?;
    let num_layers = u16::from_be_bytes([body[4], body[5]]);
    let mct = body[6] != 0;
    let levels = body[7];
    let cblk_width_exp = body[8] + 2;
    let cblk_height_exp = body[9] + 2;
    let scb = body[10];
    let filter = match body[11] {
      1 => FilterKind::Reversible53,
      0 => FilterKind::Irreversible97,
      other => return Err(Error::format_invalid(format!("unknown wavelet transform selector {other}"))),
    };
    Ok(Self {
      default_precincts: scod & 0x01 == 0,
      sop: scod & 0x02 != 0,
      eph: scod & 0x04 != 0,
      progression,
      num_layers,
      mct,
      levels,
      cblk_width_exp,
      cblk_height_exp,
      options: CodingOptions {
        bypass: scb & 0x01 != 0,
        reset_mq_per_pass: scb & 0x02 != 0,
        terminate_per_pass: scb & 0x04 != 0,
        vert_causal_context: scb & 0x08 != 0,
        predictable_termination: scb & 0x10 != 0,
        segment_symbols: scb & 0x20 != 0,
      },
      filter,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn write_then_parse_round_trips() {
    let cod = Cod {
      default_precincts: true,
      sop: false,
      eph: true,
      progression: ProgressionOrder::Rpcl,
      num_layers: 4,
      mct: true,
      levels: 5,
      cblk_width_exp: 6,
      cblk_height_exp: 6,
      options: CodingOptions { segment_symbols: true, ..Default::default() },
      filter: FilterKind::Reversible53,
    };
    let mut out = Vec::new();
    cod.write(&mut out);
    let parsed = Cod::parse(&out[4..]).unwrap();
    assert_eq!(parsed.progression, ProgressionOrder::Rpcl);
    assert_eq!(parsed.num_layers, 4);
    assert!(parsed.mct);
    assert_eq!(parsed.cblk_width_exp, 6);
    assert!(parsed.options.segment_symbols);
    assert!(matches!(parsed.filter, FilterKind::Reversible53));
  }
}
