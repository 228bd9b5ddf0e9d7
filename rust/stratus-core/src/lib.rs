//! Core of the stratus SDK: resolves credentials, signs outbound requests,
//! verifies inbound application callbacks and wraps both in an authenticated
//! [api::Session] that every feature API builds upon.
//!
//! The signing and verification logic in [auth] is pure and shared by the
//! async [api::Session] and (with the `blocking` feature) the
//! [api::blocking::BlockingSession], so the canonicalization rules that both
//! sides of the application channel must agree on exist exactly once.

#[macro_use]
extern crate tracing as extern_tracing;

pub mod api;
pub mod auth;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod tracing;

pub use error::*;
