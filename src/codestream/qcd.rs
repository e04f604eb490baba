//! QCD/QCC marker segments (Annex A.6.4): quantization signaling mode
//! plus one step-size pair per subband (expounded) or a single base pair
//! (derived/reversible).

use crate::error::{Error, Result};
use crate::quant::{SignalingMode, StepSize};

#[derive(Debug, Clone)]
pub struct Qcd {
  pub mode: SignalingMode,
  pub guard_bits: u8,
  pub steps: Vec<StepSize>,
}

impl Qcd {
  fn sqcd_byte(&self) -> u8 {
    let style = match self.mode {
      SignalingMode::NoQuantization => 0,
      SignalingMode::ScalarDerived => 1,
      SignalingMode::ScalarExpounded => 2,
    };
    style | (self.guard_bits << 5)
  }

  pub fn write(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(&crate::consts::Marker::Qcd.code().to_be_bytes());
    let per_step_bytes = if matches!(self.mode, SignalingMode::NoQuantization) { 1 } else { 2 };
    let len = 3 + per_step_bytes * self.steps.len();
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.push(self.sqcd_byte());
    for step in &self.steps {
      if matches!(self.mode, SignalingMode::NoQuantization) {
        out.push(step.exponent << 3);
      } else {
        let word = ((step.exponent as u16) << 11) | (step.mantissa & 0x07FF);
        out.extend_from_slice(&word.to_be_bytes());
      }
    }
  }

  pub fn parse(body: &[u8]) -> Result<Self> {
    if body.len() < 3 {
      return Err(Error::format_invalid("QCD segment shorter than expected"));
    }
    let sqcd = body[2];
    let mode = match sqcd & 0x1F {
      0 => SignalingMode::NoQuantization,
      1 => SignalingMode::ScalarDerived,
      2 => SignalingMode::ScalarExpounded,
      other => return Err(Error::format_invalid(format!("unknown quantization style {other}"))),
    };
    let guard_bits = sqcd >> 5;
    let mut steps = Vec::new();
    let mut off = 3;
    if matches!(mode, SignalingMode::NoQuantization) {
      while off < body.len() {
        steps.push(StepSize { exponent: body[off] >> 3, mantissa: 0 });
        off += 1;
      }
    } else {
      while off + 2 <= body.len() {
        let word = u16::from_be_bytes([body[off], body[off + 1]]);
        steps.push(StepSize { exponent: (word >> 11) as u8, mantissa: word & 0x07FF });
        off += 2;
      }
    }
    Ok(Self { mode, guard_bits, steps })
  }
}
