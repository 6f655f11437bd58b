//! Store configuration.

use crate::storage::ExpiryConfig;
use crate::term::Term;
use std::time::Duration;

/// Options the runtime applies to a store, independent of its adapter.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Name used in logs and by the registry (generated when None)
    pub name: Option<String>,

    /// Expiry engine settings (None = expiry operations are refused)
    pub expiry: Option<ExpiryConfig>,

    /// Entries written during start, before the first request
    pub seed: Vec<(Term, Term)>,

    /// How long a caller waits for a reply (None = forever)
    pub call_timeout: Option<Duration>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_seed<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Term>,
        V: Into<Term>,
    {
        self.seed
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.name.is_none());
        assert!(config.expiry.is_none());
        assert!(config.seed.is_empty());
        assert!(config.call_timeout.is_none());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::named("cache")
            .with_expiry(ExpiryConfig::with_default_ttl(Duration::from_secs(60)))
            .with_seed([("a", 1), ("b", 2)])
            .with_seed([("c", "three")])
            .with_call_timeout(Duration::from_millis(500));

        assert_eq!(config.name.as_deref(), Some("cache"));
        assert_eq!(
            config.expiry.and_then(|e| e.default_ttl),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.seed.len(), 3);
        assert_eq!(config.seed[2], (Term::from("c"), Term::from("three")));
        assert_eq!(config.call_timeout, Some(Duration::from_millis(500)));
    }
}
