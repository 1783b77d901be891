//! User identity and remote-classification credits

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::LOCAL_SCOPE;
use crate::error::Result;

/// External account service: who is running, and how many credits they have
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Current user id, or `None` in local/unauthenticated mode
    async fn identity(&self) -> Option<String>;

    async fn remaining_credits(&self) -> Result<u32>;

    /// Charge `used` credits and return the new balance (never below zero)
    async fn debit(&self, used: u32) -> Result<u32>;
}

/// Cache scope for an optional identity
pub fn cache_scope(identity: Option<&str>) -> String {
    match identity {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => LOCAL_SCOPE.to_string(),
    }
}

/// Decide whether remote classification runs and with what budget.
///
/// With no credits left remote classification is silently disabled.
pub fn effective_budget(remote_requested: bool, credits: u32) -> (bool, u32) {
    if remote_requested && credits > 0 {
        (true, credits)
    } else {
        (false, 0)
    }
}

/// Anonymous account holding an in-memory credit balance
#[derive(Debug)]
pub struct LocalAccount {
    credits: Mutex<u32>,
}

impl LocalAccount {
    pub fn new(credits: u32) -> Self {
        Self {
            credits: Mutex::new(credits),
        }
    }
}

#[async_trait]
impl AccountService for LocalAccount {
    async fn identity(&self) -> Option<String> {
        None
    }

    async fn remaining_credits(&self) -> Result<u32> {
        Ok(*self.credits.lock().await)
    }

    async fn debit(&self, used: u32) -> Result<u32> {
        let mut credits = self.credits.lock().await;
        *credits = credits.saturating_sub(used);
        tracing::info!("[Account] Debited {} credits, {} remaining", used, *credits);
        Ok(*credits)
    }
}
