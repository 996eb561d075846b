//! # Identifiers
//!
//! Port, channel, connection and client identifiers plus packet sequences.
//!
//! Validation follows ICS-24: bounded length and the character set
//! `[a-zA-Z0-9._+-#[]<>]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ChannelError;

/// Default prefix for generated channel identifiers.
pub const CHANNEL_ID_PREFIX: &str = "channel";

const PORT_ID_BOUNDS: (usize, usize) = (2, 128);
const CHANNEL_ID_BOUNDS: (usize, usize) = (8, 64);
const CONNECTION_ID_BOUNDS: (usize, usize) = (10, 64);
const CLIENT_ID_BOUNDS: (usize, usize) = (9, 64);

fn is_valid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-' | '#' | '[' | ']' | '<' | '>')
}

/// Validate an identifier against ICS-24 rules.
pub fn validate_identifier(id: &str, min: usize, max: usize) -> Result<(), ChannelError> {
    let reject = |reason: String| ChannelError::InvalidIdentifier {
        id: id.to_string(),
        reason,
    };

    if id.is_empty() {
        return Err(reject("identifier is empty".to_string()));
    }
    if id.contains('/') {
        return Err(reject("identifier contains a path separator".to_string()));
    }
    if id.len() < min || id.len() > max {
        return Err(reject(format!("length must be within [{min}, {max}]")));
    }
    if !id.chars().all(is_valid_char) {
        return Err(reject("identifier contains invalid characters".to_string()));
    }
    Ok(())
}

macro_rules! string_identifier {
    ($(#[$doc:meta])* $name:ident, $bounds:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string without validation.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow as `&str`.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Check ICS-24 rules.
            pub fn validate(&self) -> Result<(), ChannelError> {
                validate_identifier(&self.0, $bounds.0, $bounds.1)
            }
        }

        impl FromStr for $name {
            type Err = ChannelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = Self(s.to_string());
                id.validate()?;
                Ok(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_identifier!(
    /// Named endpoint within a chain's channel module.
    PortId,
    PORT_ID_BOUNDS
);

string_identifier!(
    /// Connection identifier (e.g. `connection-0`).
    ConnectionId,
    CONNECTION_ID_BOUNDS
);

string_identifier!(
    /// Light client identifier (e.g. `07-tendermint-0`).
    ClientId,
    CLIENT_ID_BOUNDS
);

/// Channel identifier, generated as `{prefix}-{counter}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Build `channel-{counter}`.
    pub fn new(counter: u64) -> Self {
        Self::with_prefix(CHANNEL_ID_PREFIX, counter)
    }

    /// Build `{prefix}-{counter}`.
    pub fn with_prefix(prefix: &str, counter: u64) -> Self {
        Self(format!("{prefix}-{counter}"))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check ICS-24 rules.
    pub fn validate(&self) -> Result<(), ChannelError> {
        validate_identifier(&self.0, CHANNEL_ID_BOUNDS.0, CHANNEL_ID_BOUNDS.1)
    }
}

impl FromStr for ChannelId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_string());
        id.validate()?;
        Ok(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The sequence number of a packet enforces ordering among packets from the same source.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Sequence(u64);

impl Sequence {
    /// True for the zero sequence (never assigned to a packet).
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Next sequence, `None` once the counter is exhausted.
    pub fn checked_increment(&self) -> Option<Sequence> {
        self.0.checked_add(1).map(Sequence)
    }

    /// Raw value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Big-endian encoding used in the store and in proofs.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for Sequence {
    fn from(seq: u64) -> Self {
        Sequence(seq)
    }
}

impl From<Sequence> for u64 {
    fn from(s: Sequence) -> u64 {
        s.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_format() {
        assert_eq!(ChannelId::new(7).as_str(), "channel-7");
        assert_eq!(ChannelId::with_prefix("chan", 1).as_str(), "chan-1");
    }

    #[test]
    fn test_valid_identifiers() {
        assert!("transfer".parse::<PortId>().is_ok());
        assert!("channel-0".parse::<ChannelId>().is_ok());
        assert!("connection-0".parse::<ConnectionId>().is_ok());
        assert!("07-tendermint-0".parse::<ClientId>().is_ok());
    }

    #[test]
    fn test_identifier_too_short() {
        assert!("p".parse::<PortId>().is_err());
        assert!("chan-0".parse::<ChannelId>().is_err());
    }

    #[test]
    fn test_identifier_bad_chars() {
        assert!("trans/fer".parse::<PortId>().is_err());
        assert!("trans fer".parse::<PortId>().is_err());
        assert!("".parse::<PortId>().is_err());
    }

    #[test]
    fn test_sequence_increment() {
        let seq = Sequence::from(41);
        assert_eq!(seq.checked_increment(), Some(Sequence::from(42)));
        assert_eq!(Sequence::from(u64::MAX).checked_increment(), None);
        assert!(Sequence::default().is_zero());
        assert_eq!(Sequence::from(1).to_be_bytes(), [0, 0, 0, 0, 0, 0, 0, 1]);
    }
}
