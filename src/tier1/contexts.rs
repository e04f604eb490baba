//! Context derivation for Zero Coding (ZC), Sign Coding (SC), and
//! Magnitude Refinement (MR), per Annex D Tables D.1/D.2/D.3. Each
//! coefficient's 8-neighborhood significance/sign state maps to one of
//! the 19 MQ contexts.

/// Subband orientation, which changes how ZC weighs horizontal vs.
/// vertical neighbors (Annex D.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
  Ll,
  Hl,
  Lh,
  Hh,
}

/// Significance of the eight neighbors, already reduced to the
/// horizontal/vertical/diagonal counts ZC needs (Annex D Table D.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborSignificance {
  pub horizontal: u8, // 0..=2
  pub vertical: u8,   // 0..=2
  pub diagonal: u8,   // 0..=4
}

/// Zero-coding context labels 0..=8 (context 0 reserved for "all
/// insignificant").
pub fn zc_context(orientation: Orientation, n: NeighborSignificance) -> usize {
  use Orientation::*;
  let (h, v, d) = (n.horizontal, n.vertical, n.diagonal);
  match orientation {
    Ll | Lh => match (h, v, d) {
      (2, _, _) => 8,
      (1, 2, _) => 7,
      (1, _, 2..=4) => 6,
      (1, _, 1) => 5,
      (1, _, 0) => 4,
      (0, 2, _) => 3,
      (0, 1, 2..=4) => 2,
      (0, 1, 0..=1) => 1,
      (0, 0, d) if d >= 2 => 2,
      (0, 0, 1) => 1,
      _ => 0,
    },
    Hl => match (v, h, d) {
      (2, _, _) => 8,
      (1, 2, _) => 7,
      (1, _, 2..=4) => 6,
      (1, _, 1) => 5,
      (1, _, 0) => 4,
      (0, 2, _) => 3,
      (0, 1, 2..=4) => 2,
      (0, 1, 0..=1) => 1,
      (0, 0, d) if d >= 2 => 2,
      (0, 0, 1) => 1,
      _ => 0,
    },
    Hh => {
      let hv = h + v;
      match (d, hv) {
        (d, _) if d >= 3 => 8,
        (2, hv) if hv >= 1 => 7,
        (2, 0) => 6,
        (1, hv) if hv >= 2 => 6,
        (1, 1) => 5,
        (1, 0) => 4,
        (0, hv) if hv >= 2 => 3,
        (0, 1) => 2,
        _ => 0,
      }
    }
  }
}

/// Sign-coding context plus the predicted sign bit (Annex D.3.2's
/// `sign(hC) + sign(vC)` table). `h_sign`/`v_sign` are -1/0/+1 contributions
/// from significant horizontal/vertical neighbors.
pub fn sc_context(h_sign: i8, v_sign: i8) -> (usize, bool) {
  const TABLE: [(usize, bool); 9] = [
    (13, true),  // (-1,-1)
    (12, true),  // (-1, 0)
    (11, true),  // (-1, 1)
    (10, true),  // ( 0,-1)
    (9, false),  // ( 0, 0)
    (10, false), // ( 0, 1)
    (11, false), // ( 1,-1)
    (12, false), // ( 1, 0)
    (13, false), // ( 1, 1)
  ];
  let hi = (h_sign + 1) as usize;
  let vi = (v_sign + 1) as usize;
  TABLE[vi * 3 + hi]
}

/// Magnitude-refinement context: 14 (first refinement, no significant
/// neighbor), 15 (first refinement, has a significant neighbor), 16
/// (subsequent refinements), per Annex D.3.3.
pub fn mr_context(first_refinement: bool, has_significant_neighbor: bool) -> usize {
  if !first_refinement {
    16
  } else if has_significant_neighbor {
    15
  } else {
    14
  }
}

/// The run-length context used by the cleanup pass's all-insignificant
/// 4-sample-column shortcut.
pub const RLC_CONTEXT: usize = 17;
