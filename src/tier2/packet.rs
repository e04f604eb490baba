//! Packet header bit-packing (Annex B.10): per-code-block inclusion via a
//! tag tree, zero-bitplane count via a second tag tree, comma-coded
//! `Lblock` increments, and length fields sized from the running
//! `Lblock`.

use crate::bit_io::{BitReader, BitWriter};
use crate::tag_tree::{TagTree, TagTreeDecoder};

/// Per-code-block contribution recorded for one packet: how many new
/// passes this layer adds and the resulting byte length, mirroring the
/// spec's Packet entity ("list of (code-block, first-included?,
/// passes-added, bytes-added)").
#[derive(Debug, Clone, Copy)]
pub struct BlockContribution {
  pub first_inclusion: bool,
  pub passes_added: u32,
  pub bytes_added: u32,
}

/// Tracks the `Lblock` state machine (starts at 3, grows by the
/// comma-coded increment) and the inclusion/zero-bitplane tag trees for
/// one precinct's code-blocks, reused across every layer's packet for
/// that precinct.
pub struct PrecinctEncoder {
  inclusion: TagTree,
  zero_bitplanes: TagTree,
  skipped_msbs: Vec<u32>,
  lblock: Vec<u32>,
  included: Vec<bool>,
}

impl PrecinctEncoder {
  /// `skipped_msbs[i]` is code-block `i`'s count of leading all-zero
  /// magnitude bit-planes above its own highest significant one, as
  /// computed by the caller from its real coefficients (not a stand-in
  /// zero) and signaled once, at first inclusion, via the zero-bitplane
  /// tag tree.
  pub fn new(grid_width: usize, grid_height: usize, skipped_msbs: &[u32]) -> Self {
    let mut zero_bitplanes = TagTree::new(grid_width, grid_height);
    for (i, &skip) in skipped_msbs.iter().enumerate() {
      let (x, y) = (i % grid_width, i / grid_width);
      zero_bitplanes.set_leaf(x, y, skip);
    }
    Self {
      inclusion: TagTree::new(grid_width, grid_height),
      zero_bitplanes,
      skipped_msbs: skipped_msbs.to_vec(),
      lblock: vec![3; skipped_msbs.len()],
      included: vec![false; skipped_msbs.len()],
    }
  }

  /// Writes one code-block's contribution into `w`; `layer` is used as
  /// the inclusion tag tree's threshold value, so a block first becomes
  /// included the moment its true inclusion layer is `<= layer`.
  pub fn write_block(
    &mut self,
    w: &mut BitWriter,
    index: usize,
    x: usize,
    y: usize,
    layer: u32,
    contribution: Option<&BlockContribution>,
  ) {
    let was_included = self.included[index];
    if !was_included {
      self.inclusion.set_leaf(x, y, if contribution.is_some() { layer } else { u32::MAX });
      for bit in self.inclusion.encode_to_threshold(x, y, layer) {
        w.write_bit(bit);
      }
    } else {
      w.write_bit(contribution.is_some());
    }

    let Some(contrib) = contribution else {
      return;
    };

    if !was_included {
      self.included[index] = true;
      for bit in self.zero_bitplanes.encode_to_threshold(x, y, self.zero_bitplanes_of(index)) {
        w.write_bit(bit);
      }
    }

    let passes_added = contrib.passes_added.max(1);
    let needed_bits = 32 - (passes_added.leading_zeros());
    while self.lblock[index] < needed_bits {
      self.lblock[index] += 1;
      w.write_bit(true);
    }
    w.write_bit(false);
    w.write_bits(contrib.bytes_added, self.lblock[index] + needed_bits.max(1) - 1);
  }

  fn zero_bitplanes_of(&self, index: usize) -> u32 {
    self.skipped_msbs[index]
  }
}

/// Decode-side mirror of [`PrecinctEncoder`].
pub struct PrecinctDecoder {
  inclusion: TagTreeDecoder,
  zero_bitplanes: TagTreeDecoder,
  lblock: Vec<u32>,
  included: Vec<bool>,
}

impl PrecinctDecoder {
  pub fn new(grid_width: usize, grid_height: usize, num_blocks: usize) -> Self {
    Self {
      inclusion: TagTreeDecoder::new(grid_width, grid_height),
      zero_bitplanes: TagTreeDecoder::new(grid_width, grid_height),
      lblock: vec![3; num_blocks],
      included: vec![false; num_blocks],
    }
  }

  /// Reads one code-block's contribution from `r`; returns `None` when
  /// the block does not contribute to this layer. The third element of
  /// the returned tuple carries the block's zero-bitplane count, decoded
  /// off the wire, but only on the packet where the block is first
  /// included — later layers for the same block never resend it.
  pub fn read_block(&mut self, r: &mut BitReader, index: usize, x: usize, y: usize, layer: u32) -> Option<(u32, u32, Option<u32>)> {
    let was_included = self.included[index];
    let contributes = if !was_included {
      let value = self.inclusion.decode(x, y, layer as i32, || r.read_bit());
      value.is_some()
    } else {
      r.read_bit()
    };

    if !contributes {
      return None;
    }

    let skipped_msbs = if !was_included {
      self.included[index] = true;
      self.zero_bitplanes.decode(x, y, i32::MAX, || r.read_bit())
    } else {
      None
    };

    while r.read_bit() {
      self.lblock[index] += 1;
    }
    let length_bits = self.lblock[index].max(1);
    let bytes_added = r.read_bits(length_bits);
    Some((1, bytes_added, skipped_msbs))
  }
}
