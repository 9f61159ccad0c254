//! Provider capability set and registry
//!
//! All site-specific scraping lives behind the [`Provider`] trait. The
//! pipeline core is source-agnostic: it resolves manga identities and page
//! URLs through a provider and never parses site HTML itself.

use crate::error::ProviderError;
use crate::types::{Chapter, MangaInfo, PageRef, SearchResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Selects a manga either by provider-scoped identity or by URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MangaSelector {
    /// A provider-scoped manga identity
    Id(String),
    /// A manga page URL, routed to whichever provider claims the URL
    Url(String),
}

impl MangaSelector {
    /// The raw identity or URL string
    pub fn as_str(&self) -> &str {
        match self {
            MangaSelector::Id(id) => id,
            MangaSelector::Url(url) => url,
        }
    }
}

/// Capability set a manga source must implement
///
/// Implementations are expected to be cheap to clone behind an `Arc` and
/// safe to call concurrently. All methods return [`ProviderError`] on
/// failure; the orchestrator treats those as unit-level failures and never
/// retries them.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identity used for registry lookup (e.g. "mangadex")
    fn id(&self) -> &str;

    /// Human-readable source name
    fn name(&self) -> &str;

    /// Base URL of the source site
    fn base_url(&self) -> &str;

    /// Whether this provider claims the given URL
    fn handles_url(&self, url: &str) -> bool {
        url.starts_with(self.base_url())
    }

    /// Extract the provider-scoped manga identity from a manga page URL
    fn manga_id_from_url(&self, url: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "provider {} cannot derive a manga id from {url}",
            self.id()
        )))
    }

    /// Search the source for manga matching a query
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError>;

    /// Resolve full metadata for a manga identity
    async fn get_manga_info(&self, manga_id: &str) -> Result<MangaInfo, ProviderError>;

    /// List all chapters of a manga
    async fn get_chapters(&self, manga_id: &str) -> Result<Vec<Chapter>, ProviderError>;

    /// Resolve the ordered page URLs of a chapter
    async fn get_chapter_pages(&self, chapter: &Chapter) -> Result<Vec<PageRef>, ProviderError>;
}

/// Registry of available providers
///
/// Providers are registered explicitly at startup. Lookup is by provider
/// identity or by URL (first registered provider that claims the URL wins).
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    /// Registration order, so URL routing is deterministic
    order: Vec<String>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    ///
    /// A duplicate identity is logged and ignored; the first registration
    /// wins.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        if self.providers.contains_key(&id) {
            warn!(provider = %id, "provider already registered, ignoring duplicate");
            return;
        }
        debug!(provider = %id, name = provider.name(), "registered provider");
        self.order.push(id.clone());
        self.providers.insert(id, provider);
    }

    /// Look up a provider by identity
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// Route a URL to the first registered provider that claims it
    pub fn provider_for_url(&self, url: &str) -> Option<Arc<dyn Provider>> {
        self.order
            .iter()
            .filter_map(|id| self.providers.get(id))
            .find(|p| p.handles_url(url))
            .cloned()
    }

    /// Resolve a selector to a provider
    ///
    /// `Id` selectors require an explicit provider identity; `Url` selectors
    /// are routed by URL.
    pub fn resolve(
        &self,
        provider_id: Option<&str>,
        selector: &MangaSelector,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        match (provider_id, selector) {
            (Some(id), _) => self
                .get(id)
                .ok_or_else(|| ProviderError::Unsupported(format!("unknown provider: {id}"))),
            (None, MangaSelector::Url(url)) => self.provider_for_url(url).ok_or_else(|| {
                ProviderError::Unsupported(format!("no provider claims URL: {url}"))
            }),
            (None, MangaSelector::Id(id)) => Err(ProviderError::Unsupported(format!(
                "manga id {id} requires an explicit provider"
            ))),
        }
    }

    /// Identities of all registered providers, in registration order
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True when no provider is registered
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        id: &'static str,
        base: &'static str,
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            "Fake"
        }

        fn base_url(&self) -> &str {
            self.base
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, ProviderError> {
            Ok(Vec::new())
        }

        async fn get_manga_info(&self, manga_id: &str) -> Result<MangaInfo, ProviderError> {
            Err(ProviderError::NotFound(manga_id.to_string()))
        }

        async fn get_chapters(&self, _manga_id: &str) -> Result<Vec<Chapter>, ProviderError> {
            Ok(Vec::new())
        }

        async fn get_chapter_pages(
            &self,
            _chapter: &Chapter,
        ) -> Result<Vec<PageRef>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn fake(id: &'static str, base: &'static str) -> Arc<dyn Provider> {
        Arc::new(FakeProvider { id, base })
    }

    #[test]
    fn register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry.register(fake("alpha", "https://alpha.example.com"));

        assert!(registry.get("alpha").is_some());
        assert!(registry.get("beta").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut registry = ProviderRegistry::new();
        registry.register(fake("alpha", "https://first.example.com"));
        registry.register(fake("alpha", "https://second.example.com"));

        assert_eq!(registry.len(), 1);
        let kept = registry.get("alpha").unwrap();
        assert_eq!(kept.base_url(), "https://first.example.com");
    }

    #[test]
    fn url_routing_picks_claiming_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(fake("alpha", "https://alpha.example.com"));
        registry.register(fake("beta", "https://beta.example.com"));

        let routed = registry
            .provider_for_url("https://beta.example.com/manga/123")
            .unwrap();
        assert_eq!(routed.id(), "beta");

        assert!(
            registry
                .provider_for_url("https://unknown.example.com/m/1")
                .is_none()
        );
    }

    #[test]
    fn resolve_id_selector_requires_explicit_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(fake("alpha", "https://alpha.example.com"));

        let selector = MangaSelector::Id("m-1".to_string());
        assert!(registry.resolve(Some("alpha"), &selector).is_ok());
        assert!(matches!(
            registry.resolve(None, &selector),
            Err(ProviderError::Unsupported(_))
        ));
    }

    #[test]
    fn resolve_url_selector_routes_by_url() {
        let mut registry = ProviderRegistry::new();
        registry.register(fake("alpha", "https://alpha.example.com"));

        let selector = MangaSelector::Url("https://alpha.example.com/manga/1".to_string());
        let provider = registry.resolve(None, &selector).unwrap();
        assert_eq!(provider.id(), "alpha");
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(fake("beta", "https://beta.example.com"));
        registry.register(fake("alpha", "https://alpha.example.com"));

        assert_eq!(registry.list(), vec!["beta", "alpha"]);
    }
}
