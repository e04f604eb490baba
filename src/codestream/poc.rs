//! POC marker segment (Annex A.3.4): progression-order-change entries,
//! each `{RSpoc, CSpoc, LYEpoc, REpoc, CEpoc, Ppoc}`.

use crate::error::{Error, Result};
use crate::tier2::progression::{PocEntry, ProgressionOrder};

pub fn write(entries: &[PocEntry], component_count_needs_two_bytes: bool, out: &mut Vec<u8>) {
  out.extend_from_slice(&crate::consts::Marker::Poc.code().to_be_bytes());
  let per_entry = if component_count_needs_two_bytes { 9 } else { 7 };
  let len = 2 + per_entry * entries.len();
  out.extend_from_slice(&(len as u16).to_be_bytes());
  for e in entries {
    out.push(e.start_resolution as u8);
    if component_count_needs_two_bytes {
      out.extend_from_slice(&(e.start_component as u16).to_be_bytes());
    } else {
      out.push(e.start_component as u8);
    }
    out.extend_from_slice(&(e.end_layer as u16).to_be_bytes());
    out.push(e.end_resolution as u8);
    if component_count_needs_two_bytes {
      out.extend_from_slice(&(e.end_component as u16).to_be_bytes());
    } else {
      out.push(e.end_component as u8);
    }
    out.push(e.order.code());
  }
}

pub fn parse(body: &[u8], component_count_needs_two_bytes: bool) -> Result<Vec<PocEntry>> {
  let per_entry = if component_count_needs_two_bytes { 9 } else { 7 };
  if body.len() < 2 {
    return Err(Error::format_invalid("POC segment too short"));
  }
  let mut entries = Vec::new();
  let mut off = 2;
  while off + per_entry <= body.len() {
    let start_resolution = body[off] as u32;
    let (start_component, off2) = if component_count_needs_two_bytes {
      (u16::from_be_bytes([body[off + 1], body[off + 2]]) as u32, off + 3)
    } else {
      (body[off + 1] as u32, off + 2)
    };
    let end_layer = u16::from_be_bytes([body[off2], body[off2 + 1]]) as u32;
    let end_resolution = body[off2 + 2] as u32;
    let (end_component, off3) = if component_count_needs_two_bytes {
      (u16::from_be_bytes([body[off2 + 3], body[off2 + 4]]) as u32, off2 + 5)
    } else {
      (body[off2 + 3] as u32, off2 + 4)
    };
    let order = ProgressionOrder::from_code(body[off3])
      .ok_or_else(|| Error::format_invalid(format!("unknown POC progression code {}", body[off3])))?;
    entries.push(PocEntry { start_resolution, start_component, end_layer, end_resolution, end_component, order });
    off = off3 + 1;
  }
  Ok(entries)
}
