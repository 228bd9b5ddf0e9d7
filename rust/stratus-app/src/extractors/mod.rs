//! Axum extractors, used to create arguments in routes from a request.

mod verified;

pub use verified::*;
