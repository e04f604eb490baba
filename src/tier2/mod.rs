//! Tier-2: packet assembly and reading (Annex B.9/B.10). [`packet`] packs
//! and unpacks one packet's header/body; [`progression`] enumerates the
//! packet visiting order for the five progression orders plus POC
//! overrides.

pub mod packet;
pub mod progression;
