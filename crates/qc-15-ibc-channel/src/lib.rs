//! # QC-15 IBC Channel Layer
//!
//! Channel handshakes, channel upgrades and the packet lifecycle of the
//! inter-blockchain communication protocol (ICS-04).
//!
//! **Subsystem ID:** 15  
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Move opaque application packets between two chains that trust each other
//! only through light clients:
//! - Four-step opening handshake and two-step closing handshake
//! - Channel upgrades (version / ordering / connection) with crossing hellos,
//!   cancellation, timeout and restore
//! - Packet send, receive, acknowledgement and timeout with commitments
//!
//! ## Safety Properties
//!
//! | Property | Enforcement |
//! |----------|-------------|
//! | Atomicity | Every entry point commits one store batch or nothing |
//! | Exactly-once delivery | Receipts (UNORDERED) / `nextSequenceRecv` (ORDERED) |
//! | Proof-gated transitions | Counterparty state checked through [`ports::ProofVerifier`] |
//! | Exclusive ownership | Capabilities, never reassigned |
//! | No stuck upgrades | Abort restores the pre-upgrade end and writes an error receipt |
//!
//! ## Module Structure
//!
//! ```text
//! qc-15-ibc-channel/
//! ├── domain/          # Identifiers, channel ends, packets, messages, errors
//! ├── algorithms/      # Commitments, version negotiation
//! ├── ports/           # ChannelApi, KeyValueStore, ProofVerifier, ChannelModule
//! ├── application/     # ChannelKeeper and the handshake/upgrade/packet FSMs
//! ├── adapters/        # In-memory + RocksDB stores, capabilities, mock light client
//! └── apps/            # Mock application, ICS-29 fee middleware
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod apps;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{InMemoryCapabilities, InMemoryStore, MockLightClient};
pub use algorithms::{compute_ack_commitment, compute_packet_commitment, PacketCommitment};
pub use application::{ChannelKeeper, ExecutionContext, HostBlock};
pub use apps::{FeeController, FeeMiddleware, MockModule};
pub use config::ChannelConfig;
pub use domain::{
    Acknowledgement, CapabilityToken, ChannelEnd, ChannelError, ChannelEvent, ChannelId,
    ClientId, CommitmentProof, ConnectionEnd, ConnectionId, Counterparty, ErrorKind,
    ErrorReceipt, Height, Order, Packet, Path, PortId, ProofError, RecvOutcome, Sequence, State,
    StoreError, Timeout, Timestamp, Upgrade,
};
pub use ports::{
    CapabilityAdapter, ChannelApi, ChannelModule, ChannelOpenResult, KeyValueStore,
    ProofVerifier, UpgradeOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
