//! Hardware-independent core library for airlog
//!
//! This crate contains the platform-agnostic store-and-forward engine of the
//! airlog telemetry agent: reading timestamps, the tiered RAM/flash buffer,
//! the persistent message counter, the delivery pipeline and the
//! connectivity supervisor, tied together by a single cooperative
//! [`agent::Agent`] loop.
//!
//! Radio, sensor and storage hardware are reached only through the traits in
//! [`sensors`], [`storage`], [`delivery`] and [`connectivity`].
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod agent;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod counter;
pub mod delivery;
pub mod metrics;
pub mod reading;
pub mod sensors;
pub mod status;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, CycleReport};
pub use reading::Reading;
