//! # rvc-domain
//!
//! Pure domain model for the RV-C bridge.
//!
//! ## Responsibilities
//! - Foundational types: instances, error conventions, timestamps
//! - Define the **classified event** produced from a raw bus message
//! - Define per-family **device state** (lights, climate zones, locks, covers,
//!   switches, sensors, GPS tracker) and the typed partial updates that
//!   modify it
//! - Define the shared **availability** policy and tracker
//! - Define the outbound **command vocabulary** (dimmer codes, thermostat
//!   signatures, negative acknowledgements)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! String-keyed payload access is confined to the decoders in [`fields`] and
//! the `decode` functions of each device family.

pub mod error;
pub mod instance;
pub mod time;

pub mod availability;
pub mod command;
pub mod device;
pub mod event;
pub mod fields;
