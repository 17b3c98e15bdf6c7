//! Credential providers
//!
//! The gateway never caches an API key. It asks its provider once per call
//! and tells the provider when the remote API rejects the key it handed out.

use async_trait::async_trait;
use tokio::sync::RwLock;

pub const DEFAULT_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current API key, or `None` when no credential is configured.
    async fn api_key(&self) -> Option<String>;

    /// Called when the remote API rejects `rejected`, the key a call was
    /// made with. A provider must leave any key selected since then alone.
    async fn invalidate(&self, _rejected: &str) {}
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads the key from environment variables on every call.
pub struct EnvCredentialProvider {
    vars: Vec<String>,
}

impl EnvCredentialProvider {
    pub fn new() -> Self {
        dotenvy::dotenv().ok();
        Self::with_vars(DEFAULT_KEY_VARS.iter().map(|v| v.to_string()).collect())
    }

    /// Checks `vars` in order; the first non-empty value wins.
    pub fn with_vars(vars: Vec<String>) -> Self {
        Self { vars }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn api_key(&self) -> Option<String> {
        self.vars
            .iter()
            .find_map(|name| std::env::var(name).ok().and_then(non_empty))
    }
}

pub struct StaticCredentialProvider {
    key: Option<String>,
}

impl StaticCredentialProvider {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: non_empty(key.into()),
        }
    }

    pub fn missing() -> Self {
        Self { key: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn api_key(&self) -> Option<String> {
        self.key.clone()
    }
}

/// Holds a key chosen interactively by the user. Invalidation clears it, so
/// the front-end has to ask for a new one before video features work again.
#[derive(Default)]
pub struct SelectableCredentialProvider {
    selected: RwLock<Option<String>>,
}

impl SelectableCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn select(&self, key: impl Into<String>) {
        *self.selected.write().await = non_empty(key.into());
    }

    pub async fn has_selected_key(&self) -> bool {
        self.selected.read().await.is_some()
    }
}

#[async_trait]
impl CredentialProvider for SelectableCredentialProvider {
    async fn api_key(&self) -> Option<String> {
        self.selected.read().await.clone()
    }

    async fn invalidate(&self, rejected: &str) {
        let mut selected = self.selected.write().await;
        if selected.as_deref() == Some(rejected) {
            tracing::warn!("Selected API key was rejected; clearing selection");
            *selected = None;
        } else {
            tracing::debug!("Rejected key is no longer selected; keeping current selection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        assert_eq!(
            StaticCredentialProvider::new("abc").api_key().await,
            Some("abc".to_string())
        );
        assert_eq!(StaticCredentialProvider::missing().api_key().await, None);
    }

    #[tokio::test]
    async fn test_blank_key_counts_as_missing() {
        assert_eq!(StaticCredentialProvider::new("   ").api_key().await, None);
    }

    #[tokio::test]
    async fn test_selectable_provider_invalidate() {
        let provider = SelectableCredentialProvider::new();
        assert!(!provider.has_selected_key().await);

        provider.select("user-key").await;
        assert_eq!(provider.api_key().await, Some("user-key".to_string()));

        provider.invalidate("user-key").await;
        assert!(!provider.has_selected_key().await);
        assert_eq!(provider.api_key().await, None);
    }

    #[tokio::test]
    async fn test_stale_rejection_keeps_newer_selection() {
        let provider = SelectableCredentialProvider::new();
        provider.select("old-key").await;
        provider.select("new-key").await;

        provider.invalidate("old-key").await;
        assert_eq!(provider.api_key().await, Some("new-key".to_string()));
    }

    #[tokio::test]
    async fn test_env_provider_reads_first_set_var() {
        let provider = EnvCredentialProvider::with_vars(vec![
            "NOVA_TEST_UNSET_KEY_VAR".to_string(),
            "NOVA_TEST_PRESENT_KEY_VAR".to_string(),
        ]);
        std::env::set_var("NOVA_TEST_PRESENT_KEY_VAR", "env-key");

        assert_eq!(provider.api_key().await, Some("env-key".to_string()));
    }
}
