//! # Commitments
//!
//! Deterministic packet and acknowledgement commitments (SHA-256).
//!
//! Packet layout, concatenated in this order:
//!
//! ```text
//! timeout_timestamp (u64 BE) | timeout revision number (u64 BE) |
//! timeout revision height (u64 BE) | len(dest_port) (u64 BE) | dest_port |
//! len(dest_channel) (u64 BE) | dest_channel | sha256(data)
//! ```

use sha2::{Digest, Sha256};

use crate::domain::{Acknowledgement, Hash, Packet};

/// A 32-byte commitment as stored under `commitments/...` or `acks/...`.
pub type PacketCommitment = Hash;

fn write_len_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Commitment over every packet field the receiving chain can check.
///
/// The source endpoint is implied by the store path, so it is not hashed.
pub fn compute_packet_commitment(packet: &Packet) -> PacketCommitment {
    let mut hasher = Sha256::new();
    hasher.update(packet.timeout_timestamp.nanos().to_be_bytes());
    hasher.update(packet.timeout_height.revision_number.to_be_bytes());
    hasher.update(packet.timeout_height.revision_height.to_be_bytes());
    write_len_prefixed(&mut hasher, packet.destination_port.as_str().as_bytes());
    write_len_prefixed(&mut hasher, packet.destination_channel.as_str().as_bytes());
    hasher.update(Sha256::digest(&packet.data));
    hasher.finalize().into()
}

/// Commitment over the raw acknowledgement bytes.
pub fn compute_ack_commitment(ack: &Acknowledgement) -> PacketCommitment {
    Sha256::digest(ack.as_bytes()).into()
}
