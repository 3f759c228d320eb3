//! Core data types flowing between pipeline stages.

use serde::{Deserialize, Serialize};

/// A resolved user account.
///
/// Passed by value between stages; nothing mutates a `User` after the
/// directory creates it. `id` is the identity the dedup stage keys on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable account identity (dedup key)
    pub id: u64,

    /// Normalized contact address the user was resolved from
    pub email: String,
}

/// Opaque identifier for a single message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A classified message, produced by the spam-check stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub has_spam: bool,
}

impl MessageRecord {
    /// Render the record as one output line: `"<has_spam> <id>"`.
    pub fn to_line(&self) -> String {
        format!("{} {}", self.has_spam, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_ordering() {
        assert!(MessageId(1) < MessageId(2));
        assert_eq!(MessageId(7), MessageId(7));
    }

    #[test]
    fn test_record_line_format() {
        let rec = MessageRecord {
            id: MessageId(42),
            has_spam: true,
        };
        assert_eq!(rec.to_line(), "true 42");

        let rec = MessageRecord {
            id: MessageId(3),
            has_spam: false,
        };
        assert_eq!(rec.to_line(), "false 3");
    }
}
