//! Scalar quantization (Annex E): the reversible no-op quantizer paired
//! with the 5/3 filter, and the irreversible quantizer paired with the
//! 9/7 filter, in either derived or expounded signaling mode.

/// One subband's quantization step, expressed the way QCD/QCC encode it:
/// an 11-bit mantissa and a 5-bit exponent (Annex E.1, equation E-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
  pub exponent: u8,
  pub mantissa: u16,
}

impl StepSize {
  /// `Delta_b = 2^(Rb - exponent) * (1 + mantissa / 2^11)`.
  pub fn delta(&self, dynamic_range_bits: u32) -> f64 {
    let base = 2f64.powi(dynamic_range_bits as i32 - self.exponent as i32);
    base * (1.0 + self.mantissa as f64 / 2048.0)
  }

  /// Reversible step size is always 1 (Annex E.1, "no quantization").
  pub fn reversible() -> Self {
    Self { exponent: 0, mantissa: 0 }
  }

  /// Derives a subband's exponent from the LL_N "base" exponent and the
  /// difference in decomposition level, scaling mantissa unchanged
  /// (Annex E.1, derived quantization, equation E-5).
  pub fn derive(base: StepSize, level_delta: u8) -> Self {
    Self { exponent: base.exponent.saturating_add(level_delta), mantissa: base.mantissa }
  }
}

/// Signaling mode carried by SQcd/SQcc (Annex A.6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingMode {
  /// Reversible, no quantization; the filter itself is lossless.
  NoQuantization,
  /// One (exponent,mantissa) pair signaled for LL_N; every other subband's
  /// step is derived from it.
  ScalarDerived,
  /// One (exponent,mantissa) pair per subband, signaled explicitly.
  ScalarExpounded,
}

/// Quantizes one subband's coefficients in place. For the reversible mode
/// this is a no-op (callers should not invoke it at all, but it is exact
/// the identity if they do for code-path symmetry).
pub fn forward(coefficients: &mut [f64], step: StepSize, dynamic_range_bits: u32) -> Vec<i32> {
  let delta = step.delta(dynamic_range_bits);
  coefficients
    .iter()
    .map(|&x| {
      if delta == 0.0 {
        0
      } else {
        let sign = if x < 0.0 { -1 } else { 1 };
        sign * (x.abs() / delta).floor() as i32
      }
    })
    .collect()
}

/// Dequantizes, `bias` is the reconstruction offset `r`: 0 for lossless
/// paths, ~0.5 otherwise (Annex E.1, equation E-4).
pub fn inverse(quantized: &[i32], step: StepSize, dynamic_range_bits: u32, bias: f64) -> Vec<f64> {
  let delta = step.delta(dynamic_range_bits);
  quantized
    .iter()
    .map(|&q| {
      if q == 0 {
        0.0
      } else {
        let sign = if q < 0 { -1.0 } else { 1.0 };
        sign * (q.unsigned_abs() as f64 + bias) * delta
      }
    })
    .collect()
}
