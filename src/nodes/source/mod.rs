mod player;
mod mic;

pub use player::*;
pub use mic::*;
