//! The external application side of the stratus SDK: an HTTP server that
//! answers the collaboration server's lifecycle calls, refusing any call
//! whose signature does not verify.

#[macro_use]
extern crate tracing;

mod app;
mod error;
mod extractors;
mod handlers;
mod scope;
mod storage;

pub use app::*;
pub use error::*;
pub use extractors::*;
pub use scope::*;
pub use storage::*;
