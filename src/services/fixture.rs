//! Deterministic in-process collaborators.
//!
//! These back the CLI when no real services are wired up, and double as a
//! realistic backend for end-to-end tests: user ids are derived from the
//! normalized contact (so duplicate contacts collide on the same id, which is
//! exactly what the dedup stage exists to handle), message ids are synthesized
//! per user, and classification is a pure function of the message id.

use crate::services::{MessageStore, SpamClassifier, UserDirectory};
use crate::types::{MessageId, MessageRecord, User};
use anyhow::Result;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};

fn contact_key(contact: &str) -> u64 {
    let normalized = contact.trim().to_ascii_lowercase();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}

/// Directory that derives a stable user id from the contact string itself.
#[derive(Debug, Default)]
pub struct FixtureDirectory;

#[async_trait]
impl UserDirectory for FixtureDirectory {
    async fn resolve(&self, contact: &str) -> Result<User> {
        Ok(User {
            id: contact_key(contact),
            email: contact.trim().to_ascii_lowercase(),
        })
    }
}

/// Message store that synthesizes a fixed number of message ids per user.
#[derive(Debug)]
pub struct FixtureMessageStore {
    /// Messages synthesized per user
    pub messages_per_user: u64,
}

impl Default for FixtureMessageStore {
    fn default() -> Self {
        Self {
            messages_per_user: 4,
        }
    }
}

#[async_trait]
impl MessageStore for FixtureMessageStore {
    async fn fetch_for_users(&self, users: &[User]) -> Result<Vec<MessageId>> {
        let mut ids = Vec::with_capacity(users.len() * self.messages_per_user as usize);
        for user in users {
            for k in 0..self.messages_per_user {
                // Mix the user id so message ids from different users interleave
                // when sorted, rather than forming contiguous runs.
                ids.push(MessageId(user.id.wrapping_mul(31).wrapping_add(k)));
            }
        }
        Ok(ids)
    }
}

/// Classifier that flags roughly a third of all messages by id arithmetic.
#[derive(Debug, Default)]
pub struct FixtureClassifier;

#[async_trait]
impl SpamClassifier for FixtureClassifier {
    async fn classify(&self, id: MessageId) -> Result<bool> {
        Ok(id.0 % 3 == 0)
    }
}

impl FixtureClassifier {
    /// Classify synchronously; handy for assertions in tests.
    pub fn expected(id: MessageId) -> MessageRecord {
        MessageRecord {
            id,
            has_spam: id.0 % 3 == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_is_deterministic() {
        let dir = FixtureDirectory;
        let a = dir.resolve("A@example.com").await.unwrap();
        let b = dir.resolve("  a@example.com ").await.unwrap();
        assert_eq!(a.id, b.id, "normalized contacts must collide on one id");

        let c = dir.resolve("other@example.com").await.unwrap();
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_store_yields_messages_per_user() {
        let store = FixtureMessageStore {
            messages_per_user: 3,
        };
        let users = vec![
            User {
                id: 1,
                email: "a@x".into(),
            },
            User {
                id: 2,
                email: "b@x".into(),
            },
        ];
        let ids = store.fetch_for_users(&users).await.unwrap();
        assert_eq!(ids.len(), 6);

        // No collisions across users for small ids
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[tokio::test]
    async fn test_classifier_matches_expected() {
        let clf = FixtureClassifier;
        for raw in 0..20u64 {
            let id = MessageId(raw);
            let got = clf.classify(id).await.unwrap();
            assert_eq!(got, FixtureClassifier::expected(id).has_spam);
        }
    }
}
