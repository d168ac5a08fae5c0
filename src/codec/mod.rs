//! Standard MIDI File reading and writing for the canonical sequence.

mod decoder;
mod encoder;

pub use decoder::decode;
pub use encoder::{EncodeOptions, encode, encode_with};
