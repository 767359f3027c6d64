//! # tether-core
//!
//! Wire protocol for the tether transport client: the frame schema shared
//! with the device backend, classification of inbound frames into message
//! kinds, the length-prefixed binary codec for stream frames, and
//! correlation-id minting.

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod frame;
pub mod ids;
pub mod message;

pub use errors::FrameError;
pub use frame::{Frame, FrameKind};
pub use ids::CorrelationIds;
pub use message::InboundMessage;
