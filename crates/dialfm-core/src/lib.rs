//! Core of the dial radio: station frequencies, the catalog index, content
//! sync against the remote catalog, and the playback state machine that the
//! tuner drives from dial readings.
//!
//! Hardware lives behind the traits in [`audio`], [`display`] and [`dial`];
//! the binary crate supplies the adapters.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod dial;
pub mod display;
pub mod error;
pub mod frequency;
pub mod manifest;
pub mod platform;
pub mod playback;
pub mod sync;
pub mod tuner;

pub use error::{RadioError, Result};
