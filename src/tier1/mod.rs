//! Tier-1: the EBCOT bit-plane entropy codec (Annex D). Combines the MQ
//! arithmetic coder (`crate::mq`) with the ZC/SC/MR context derivation in
//! [`contexts`] and the per-code-block bookkeeping in [`codeblock`].

pub mod codeblock;
pub mod contexts;
pub mod decode;
pub mod encode;

/// Per-code-block coding-style options signaled via COD/COC (Annex A.6.1,
/// `SPcod`/`SPcoc` bit 6 `Scb`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CodingOptions {
  pub bypass: bool,
  pub reset_mq_per_pass: bool,
  pub terminate_per_pass: bool,
  pub vert_causal_context: bool,
  pub predictable_termination: bool,
  pub segment_symbols: bool,
}

pub use codeblock::CodeBlock;
