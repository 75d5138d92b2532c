//! Twitter API service implementations.

mod media;
mod upload;

pub use media::*;
pub use upload::*;
