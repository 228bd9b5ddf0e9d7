//! Authenticated access to the server's OCS and DAV surfaces.

mod request;
mod session;

#[cfg(feature = "blocking")]
pub mod blocking;

pub use request::*;
pub use session::*;
