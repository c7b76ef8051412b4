mod connect;
mod envelope;
mod error;
mod geometry;

pub use connect::*;
pub use envelope::*;
pub use error::*;
pub use geometry::*;
