//! Response-side pipeline: bytes → lines → events → word-safe render text.

pub mod buffer;
pub mod decoder;
pub mod event;
pub mod transform;
pub mod wire;

pub use buffer::{BOUNDARY_CHARS, Emission, WordBoundaryBuffer};
pub use decoder::{DecodedResponse, MAX_LINE_BYTES, StreamDecoder};
pub use event::RenderEvent;
pub use transform::{IdentityTransformer, SpellingNormalizer, SpellingTableError, TextTransformer};
pub use wire::{WireLine, parse_line};
