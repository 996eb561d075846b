//! # Application Layer
//!
//! The channel keeper and the state machines it drives.
//!
//! - `handshake` - opening and closing handshake
//! - `upgrade` - upgrade handshake and restore
//! - `packet` - packet lifecycle
//! - `verify` - counterparty proofs
//! - `store` - typed ICS-24 accessors over a write overlay

mod api;
pub mod context;
pub mod handshake;
pub mod keeper;
pub mod packet;
pub mod router;
pub mod store;
pub mod upgrade;
mod verify;

pub use context::{ExecutionContext, HostBlock};
pub use handshake::Allocated;
pub use keeper::ChannelKeeper;
pub use router::ModuleRouter;
pub use store::{decode_record, encode_record, encode_u64, CacheStore, RECEIPT_OK};
pub use upgrade::restore;
