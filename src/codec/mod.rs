//! The framing codec: binary LPM framing plus a whole-body JSON codec, each
//! with optional compression.

pub(crate) mod binary;
pub(crate) mod compression;
#[cfg(feature = "json")]
pub(crate) mod json;

pub use compression::Compression;
