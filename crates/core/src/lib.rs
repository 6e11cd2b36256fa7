//! Feed pipeline, seen tracking and
//! like state for the swipefeed media
//! viewer, plus the adapters that talk
//! to the swipefeed server.
pub mod app;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ports;
