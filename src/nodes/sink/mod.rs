mod cpal_sink;
mod rtrb_sink;
mod capture;
mod analyser;

pub use cpal_sink::*;
pub use rtrb_sink::*;
pub use capture::*;
pub use analyser::*;
