//! Lamport logical clock for ordering distributed events.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A Lamport logical clock for establishing causal ordering of events.
///
/// Each node maintains its own clock. The clock value increases monotonically
/// and is updated on local events and when receiving messages from other nodes.
///
/// # Example
///
/// ```rust
/// use slirc_proto::crdt::LamportClock;
///
/// let mut clock_a = LamportClock::new();
/// let mut clock_b = LamportClock::new();
///
/// // Node A performs some events
/// clock_a.tick();
/// clock_a.tick();
/// assert_eq!(clock_a.value(), 2);
///
/// // Node B receives a message from A and merges
/// clock_b.merge(&clock_a);
/// assert_eq!(clock_b.value(), 3); // max(0, 2) + 1 = 3
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LamportClock {
    value: u64,
}

impl Default for LamportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LamportClock {
    /// Creates a new clock initialized to 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Creates a clock with a specific initial value.
    #[must_use]
    pub const fn with_value(value: u64) -> Self {
        Self { value }
    }

    /// Returns the current clock value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Increments the clock for a local event and returns the new value.
    pub fn tick(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Merges with another clock (typically from a received message).
    ///
    /// Sets this clock to `max(self, other) + 1` to maintain causal ordering.
    pub fn merge(&mut self, other: &LamportClock) -> u64 {
        self.value = self.value.max(other.value) + 1;
        self.value
    }

    /// Compares two clocks for happens-before relationship.
    ///
    /// Returns `true` if `self` definitely happened before `other`.
    /// Note: Lamport clocks only provide partial ordering - if this returns
    /// `false`, it doesn't mean `other` happened before `self`.
    #[must_use]
    pub const fn happened_before(&self, other: &LamportClock) -> bool {
        self.value < other.value
    }
}
