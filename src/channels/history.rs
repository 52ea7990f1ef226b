//! Channel message history storage.
//!
//! Stores recent inbound and outbound messages for UI display and debugging.
//! Uses a fixed-capacity ring buffer to prevent unbounded growth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Direction of a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// Message received from external channel.
    Inbound,
    /// Message sent to external channel.
    Outbound,
}

/// A recorded channel message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Unique message identifier (generated on record).
    pub id: String,
    /// Channel name (e.g., "discord", "whatsapp").
    pub channel: String,
    /// Direction (inbound or outbound).
    pub direction: MessageDirection,
    /// Sender identifier (user ID, phone number, etc.).
    pub sender: String,
    /// Message text content.
    pub text: String,
    /// Timestamp when message was recorded.
    pub timestamp: DateTime<Utc>,
    /// Reply target (channel-specific, e.g., Discord message ID, WhatsApp phone).
    pub reply_target: String,
}

/// Channel message history with fixed capacity.
#[derive(Debug, Clone)]
pub struct ChannelHistory {
    /// Messages stored in insertion order (oldest first).
    messages: VecDeque<ChannelMessage>,
    /// Maximum number of messages to retain.
    max_messages: usize,
    /// Counter for generating message IDs.
    next_id: u64,
}

impl ChannelHistory {
    /// Create a new history with the given capacity.
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_messages),
            max_messages,
            next_id: 1,
        }
    }

    /// Push a new message, evicting the oldest if at capacity.
    pub fn push(&mut self, mut message: ChannelMessage) {
        // Generate ID if not set
        if message.id.is_empty() {
            message.id = format!("msg_{}", self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
        }

        // Evict oldest if at capacity
        if self.messages.len() >= self.max_messages {
            self.messages.pop_front();
        }

        self.messages.push_back(message);
    }

    /// Get all messages for a specific channel, in reverse chronological order.
    #[must_use]
    pub fn messages_for_channel(&self, channel: &str) -> Vec<ChannelMessage> {
        self.messages
            .iter()
            .filter(|m| m.channel == channel)
            .rev()
            .cloned()
            .collect()
    }

    /// Get all messages across all channels, in reverse chronological order.
    #[must_use]
    pub fn all_messages(&self) -> Vec<ChannelMessage> {
        self.messages.iter().rev().cloned().collect()
    }

    /// Clear all messages for a specific channel.
    pub fn clear_channel(&mut self, channel: &str) {
        self.messages.retain(|m| m.channel != channel);
    }

    /// Get the total number of messages stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for ChannelHistory {
    fn default() -> Self {
        Self::new(500)
    }
}
