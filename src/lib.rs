mod codec;
mod compiler;
mod engine;
mod error;
mod extract;
mod model;
mod notation;
mod tempo;
mod util;

pub use codec::*;
pub use compiler::*;
pub use engine::*;
pub use error::*;
pub use extract::*;
pub use model::config::*;
pub use model::score::*;
pub use model::sequence::*;
pub use notation::*;
pub use tempo::*;
pub use util::*;
