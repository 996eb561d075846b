//! # Algorithms Module
//!
//! Commitment hashing and version negotiation.

pub mod commitment;
pub mod version;

pub use commitment::{compute_ack_commitment, compute_packet_commitment, PacketCommitment};
pub use version::{intersect_versions, negotiate_version, split_versions, version_supported};
