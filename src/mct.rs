//! Multiple Component Transform (Annex G): reversible (RCT, used with the
//! 5/3 filter) and irreversible (ICT, used with the 9/7 filter) RGB<->YCbCr.
//! Norms are needed by the rate allocator to compare distortion across
//! subbands of different components after MCT.

/// L2 norms of the basis functions of the reversible MCT (Annex G.2),
/// used by the PCRD allocator to weigh per-component distortion.
pub const RCT_NORMS: [f64; 3] = [1.732, 0.8292, 0.8292];
/// L2 norms of the basis functions of the irreversible MCT (Annex G.2).
pub const ICT_NORMS: [f64; 3] = [1.732, 1.805, 1.573];

/// Forward reversible (integer) RGB -> YUV (Annex G.3):
/// `Y = floor((R + 2G + B) / 4)`, `U = B - G`, `V = R - G`.
pub fn rct_forward(r: &mut [i32], g: &mut [i32], b: &mut [i32]) {
  debug_assert_eq!(r.len(), g.len());
  debug_assert_eq!(r.len(), b.len());
  for i in 0..r.len() {
    let (rr, gg, bb) = (r[i], g[i], b[i]);
    let y = (rr + 2 * gg + bb) >> 2;
    let u = bb - gg;
    let v = rr - gg;
    r[i] = y;
    g[i] = u;
    b[i] = v;
  }
}

/// Inverse reversible MCT: `G = Y - floor((U + V) / 4)`, `R = V + G`,
/// `B = U + G`.
pub fn rct_inverse(y: &mut [i32], u: &mut [i32], v: &mut [i32]) {
  debug_assert_eq!(y.len(), u.len());
  debug_assert_eq!(y.len(), v.len());
  for i in 0..y.len() {
    let (yy, uu, vv) = (y[i], u[i], v[i]);
    let g = yy - ((uu + vv) >> 2);
    let r = vv + g;
    let b = uu + g;
    y[i] = r;
    u[i] = g;
    v[i] = b;
  }
}

/// Forward irreversible MCT: standard BT.601 Y'CbCr.
pub fn ict_forward(r: &mut [f32], g: &mut [f32], b: &mut [f32]) {
  debug_assert_eq!(r.len(), g.len());
  debug_assert_eq!(r.len(), b.len());
  for i in 0..r.len() {
    let (rr, gg, bb) = (r[i], g[i], b[i]);
    r[i] = 0.299 * rr + 0.587 * gg + 0.114 * bb;
    g[i] = -0.168_75 * rr - 0.331_26 * gg + 0.5 * bb;
    b[i] = 0.5 * rr - 0.418_69 * gg - 0.081_31 * bb;
  }
}

/// Inverse irreversible MCT.
pub fn ict_inverse(y: &mut [f32], u: &mut [f32], v: &mut [f32]) {
  debug_assert_eq!(y.len(), u.len());
  debug_assert_eq!(y.len(), v.len());
  for i in 0..y.len() {
    let (yy, uu, vv) = (y[i], u[i], v[i]);
    y[i] = yy + vv * 1.402;
    u[i] = yy - uu * 0.344_13 - vv * 0.714_14;
    v[i] = yy + uu * 1.772;
  }
}
