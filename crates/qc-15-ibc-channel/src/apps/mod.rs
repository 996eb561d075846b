//! # Applications
//!
//! [`ChannelModule`](crate::ports::ChannelModule) implementations shipped
//! with the crate.
//!
//! - `mock` - reference application for tests and local networks
//! - `fee` - ICS-29 fee middleware, wraps any other application

pub mod fee;
pub mod mock;

pub use fee::{
    FeeController, FeeError, FeeMetadata, FeeMiddleware, IncentivizedAcknowledgement,
    PacketFee, FEE_VERSION,
};
pub use mock::{CallLog, MockModule, MockRecv, MOCK_ACK_RESULT};
