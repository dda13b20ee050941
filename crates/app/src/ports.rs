//! Port definitions, the traits adapters implement.
//!
//! The bridge core never talks to a broker directly: outbound frames go
//! through a [`CommandPublisher`] provided by the transport adapter.

pub mod publisher;

pub use publisher::CommandPublisher;
