//! # Domain Value Objects
//!
//! Heights, timestamps, timeouts and the channel state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height of a chain, split into revision number and revision height.
///
/// The zero height means "unset" wherever it appears in a timeout.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Height {
    /// Revision (chain upgrade epoch).
    pub revision_number: u64,
    /// Height within the revision.
    pub revision_height: u64,
}

impl Height {
    /// Create a height.
    pub fn new(revision_number: u64, revision_height: u64) -> Self {
        Self {
            revision_number,
            revision_height,
        }
    }

    /// The unset height.
    pub fn zero() -> Self {
        Self::default()
    }

    /// True when both components are zero.
    pub fn is_zero(&self) -> bool {
        self.revision_number == 0 && self.revision_height == 0
    }

    /// Next height in the same revision.
    pub fn increment(&self) -> Self {
        Self::new(self.revision_number, self.revision_height + 1)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

/// Unix time in nanoseconds. Zero means "unset".
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// From nanoseconds since the epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// The unset timestamp.
    pub fn none() -> Self {
        Self(0)
    }

    /// Nanoseconds since the epoch.
    pub fn nanos(&self) -> u64 {
        self.0
    }

    /// True when set.
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute timeout expressed on the clock of the chain that evaluates it.
///
/// Expired as soon as either the height or the timestamp bound is reached.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeout {
    /// Timeout height (zero = unset).
    pub height: Height,
    /// Timeout timestamp (zero = unset).
    pub timestamp: Timestamp,
}

impl Timeout {
    /// Create a timeout from both bounds.
    pub fn new(height: Height, timestamp: Timestamp) -> Self {
        Self { height, timestamp }
    }

    /// Height-only timeout.
    pub fn at_height(height: Height) -> Self {
        Self::new(height, Timestamp::none())
    }

    /// Timestamp-only timeout.
    pub fn at_timestamp(timestamp: Timestamp) -> Self {
        Self::new(Height::zero(), timestamp)
    }

    /// At least one bound is set.
    pub fn is_set(&self) -> bool {
        !self.height.is_zero() || self.timestamp.is_set()
    }

    /// Has the timeout elapsed at `height` / `timestamp`?
    pub fn has_elapsed(&self, height: Height, timestamp: Timestamp) -> bool {
        let height_elapsed = !self.height.is_zero() && height >= self.height;
        let time_elapsed = self.timestamp.is_set() && timestamp >= self.timestamp;
        height_elapsed || time_elapsed
    }
}

/// Channel ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    /// Packets may be delivered in any order.
    Unordered,
    /// Packets are delivered strictly by sequence.
    Ordered,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Unordered => f.write_str("ORDER_UNORDERED"),
            Order::Ordered => f.write_str("ORDER_ORDERED"),
        }
    }
}

/// Channel end state machine.
///
/// ```text
/// UNINITIALIZED ──init──→ INIT ──ack──→ OPEN ──close──→ CLOSED
///       │                  │              ↑ │
///       └──try──→ TRYOPEN ←┘ (crossing)   │ ├──upgrade init──→ INITUPGRADE
///                    └──confirm───────────┘ │                     │
///                                           └──upgrade try──→ TRYUPGRADE
///   INITUPGRADE / TRYUPGRADE ──ack / confirm / restore──→ OPEN
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// No channel end stored.
    #[default]
    Uninitialized,
    /// Opening handshake started locally.
    Init,
    /// Opening handshake acknowledged the counterparty's INIT.
    TryOpen,
    /// Open for packets.
    Open,
    /// Terminal.
    Closed,
    /// Local upgrade proposal outstanding.
    InitUpgrade,
    /// Counterparty upgrade proposal accepted locally.
    TryUpgrade,
}

impl State {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: State) -> bool {
        match (self, next) {
            (Self::Uninitialized, Self::Init) => true,
            (Self::Uninitialized, Self::TryOpen) => true,
            (Self::Init, Self::TryOpen) => true, // Crossing hellos
            (Self::Init, Self::Open) => true,
            (Self::TryOpen, Self::Open) => true,
            (Self::Open, Self::Closed) => true,
            (Self::Open, Self::InitUpgrade) => true,
            (Self::Open, Self::TryUpgrade) => true,
            (Self::InitUpgrade, Self::TryUpgrade) => true, // Crossing hellos
            (Self::TryUpgrade, Self::TryUpgrade) => true,
            (Self::InitUpgrade, Self::Open) => true,
            (Self::TryUpgrade, Self::Open) => true,
            // An ordered-channel timeout is fatal even mid-upgrade.
            (Self::InitUpgrade, Self::Closed) => true,
            (Self::TryUpgrade, Self::Closed) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True while an upgrade handshake is in flight.
    pub fn is_upgrading(&self) -> bool {
        matches!(self, Self::InitUpgrade | Self::TryUpgrade)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Uninitialized => "UNINITIALIZED",
            State::Init => "INIT",
            State::TryOpen => "TRYOPEN",
            State::Open => "OPEN",
            State::Closed => "CLOSED",
            State::InitUpgrade => "INITUPGRADE",
            State::TryUpgrade => "TRYUPGRADE",
        };
        f.write_str(s)
    }
}

/// Connection handshake state (read-only from the channel layer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not yet initialised.
    #[default]
    Uninitialized,
    /// Handshake started.
    Init,
    /// Handshake acknowledged.
    TryOpen,
    /// Usable by channels.
    Open,
}
