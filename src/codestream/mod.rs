//! Codestream structure: marker-segment parsing/emission, main-header
//! state, and tile-part framing (Annex A).

pub mod cod;
pub mod poc;
pub mod qcd;
pub mod reader;
pub mod siz;
pub mod writer;
