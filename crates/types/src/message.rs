//! One-shot election messages carried inside status blocks.

use std::fmt;

/// Kind of message a node is currently broadcasting via its status block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Nothing to say.
    #[default]
    None = 0,
    /// "I propose myself as master."
    Bid = 1,
    /// "I acknowledge node `arg` as master" (a vote for `arg`).
    Ack = 2,
    /// "I reject node `arg`'s bid." Parsed and counted, never emitted.
    Nack = 3,
}

impl MessageKind {
    /// Decode a raw on-disk value.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(MessageKind::None),
            1 => Some(MessageKind::Bid),
            2 => Some(MessageKind::Ack),
            3 => Some(MessageKind::Nack),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::None => "None",
            MessageKind::Bid => "Bid",
            MessageKind::Ack => "Ack",
            MessageKind::Nack => "Nack",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message together with its target and sequence number, as read from or
/// written to a status block.
///
/// `seq` increments whenever the outbound message changes, so peers can tell
/// a fresh message from a stale one. An `Ack` echoes the sequence number of
/// the bid it is voting for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskMessage {
    /// What is being said.
    pub kind: MessageKind,
    /// Target node id (the bidder being acked/nacked), 0 when unused.
    pub arg: u32,
    /// Sequence number of this message.
    pub seq: u32,
}
