//! # rvc-app
//!
//! Application layer: the bridge engine and its **port definitions**.
//!
//! ## Responsibilities
//! - Decode transport payloads and classify them into typed events
//!   ([`classifier`], [`codec`])
//! - Fan events out to the per-family device reducers ([`discovery_bus`],
//!   [`reducers`])
//! - Encode outbound commands, including timed signature bursts with
//!   confirm/retry ([`codec`], [`burst`], [`signature`])
//! - Own all of the above in a single actor ([`bridge`]) and broadcast the
//!   resulting state changes ([`event_bus`], [`refresh`])
//! - Define the outbound port, [`ports::CommandPublisher`]
//!
//! ## Dependency rule
//! Depends on `rvc-domain` only (plus `tokio` for tasks, channels and
//! timers). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod bridge;
pub mod burst;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod discovery_bus;
pub mod event_bus;
pub mod ports;
pub mod reducers;
pub mod refresh;
pub mod signature;
