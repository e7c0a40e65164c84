//! Object model shared by both storage backends, the dual writer and the
//! watch set.

mod object;
mod options;

pub use object::*;
pub use options::*;
