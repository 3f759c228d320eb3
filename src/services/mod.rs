//! External collaborator contracts.
//!
//! The pipeline core never talks to a directory, mailbox store, or classifier
//! directly; it consumes these traits behind `Arc<dyn _>`. Production
//! deployments plug in network-backed implementations; [`fixture`] provides
//! deterministic in-process ones for the CLI demo and tests.

mod fixture;

pub use fixture::{FixtureClassifier, FixtureDirectory, FixtureMessageStore};

use crate::types::{MessageId, User};
use anyhow::Result;
use async_trait::async_trait;

/// Resolves a raw contact string to a user account.
///
/// Safe to call concurrently without limit; the dedup stage fans out one call
/// per inbound contact.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, contact: &str) -> Result<User>;
}

/// Batched message retrieval for a set of users.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch the message ids for every user in `users` in one call.
    async fn fetch_for_users(&self, users: &[User]) -> Result<Vec<MessageId>>;
}

/// Per-message spam classification.
///
/// The spam-check stage caps concurrent calls at its configured worker count;
/// this is the only collaborator with an admission-control guarantee.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, id: MessageId) -> Result<bool>;
}
