//! Inbound event model and text normalization.

pub mod text;
pub mod types;
