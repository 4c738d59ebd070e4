//! Turnstile - Per-Key Actor Rate Limiting Service
//!
//! This crate decides whether a request identified by an opaque key may
//! proceed, under either a minimum-gap rate limit or a fixed-window quota.
//! Every key is owned by a single actor that processes one check at a time,
//! which makes check-and-increment atomic without any external lock service.

pub mod clock;
pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
pub mod store;
