mod gain;
mod splitter;
mod merger;
mod bus;

pub use gain::*;
pub use splitter::*;
pub use merger::*;
pub use bus::*;
