//! Core downloader implementation split into focused submodules.
//!
//! The `MangaDownloader` struct and its methods are organized by domain:
//! - [`chapter_task`] - Single-chapter execution (pages, packaging, outcome)
//! - [`orchestration`] - Run-level fan-out across chapters and reporting

pub(crate) mod chapter_task;
mod orchestration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::PageFetcher;
use crate::provider::{MangaSelector, Provider, ProviderRegistry};
use crate::rate_limiter::RateLimiter;
use crate::types::{Chapter, Event, MangaInfo, SearchResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the HTTP client, the per-host rate limiter, the provider registry
/// and the event channel. One instance drives any number of runs; the
/// run-level cancellation token is shared, so [`MangaDownloader::cancel`]
/// stops everything this instance started.
#[derive(Clone)]
pub struct MangaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Page fetcher sharing the HTTP client and rate limiter
    pub(crate) fetcher: PageFetcher,
    /// Registered providers, mutable at runtime
    pub(crate) registry: Arc<tokio::sync::RwLock<ProviderRegistry>>,
    /// Run-level cancellation token
    pub(crate) cancel_token: CancellationToken,
}

impl MangaDownloader {
    /// Create a new downloader from a validated configuration
    ///
    /// Fails with [`Error::Config`] when the configuration is invalid and
    /// with [`Error::Http`] when the HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.network.timeout)
            .user_agent(config.network.user_agent.clone())
            .build()?;

        let rate_limiter = RateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.max_in_flight,
        );

        // Buffer of 1000 events so multiple subscribers can lag independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let fetcher = PageFetcher::new(client, rate_limiter, config.retry.clone());

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            fetcher,
            registry: Arc::new(tokio::sync::RwLock::new(ProviderRegistry::new())),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Register a provider with this downloader
    ///
    /// Duplicate identities are ignored; the first registration wins.
    pub async fn register_provider(&self, provider: Arc<dyn Provider>) {
        self.registry.write().await.register(provider);
    }

    /// Identities of all registered providers, in registration order
    pub async fn providers(&self) -> Vec<String> {
        self.registry.read().await.list()
    }

    /// Subscribe to download lifecycle events
    ///
    /// Each subscriber gets an independent receiver. A slow subscriber lags
    /// and loses the oldest events rather than blocking the pipeline.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Trigger run-level cancellation
    ///
    /// In-flight chapters stop at the next await point; already-written page
    /// files are kept so a later run resumes where this one stopped.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether run-level cancellation has been triggered
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Search a provider for manga matching a query
    pub async fn search(&self, provider_id: &str, query: &str) -> Result<Vec<SearchResult>> {
        let provider = self.resolve_provider(Some(provider_id), None).await?;
        Ok(provider.search(query).await?)
    }

    /// Resolve full metadata for a manga
    pub async fn get_manga_info(
        &self,
        provider_id: Option<&str>,
        selector: &MangaSelector,
    ) -> Result<MangaInfo> {
        let provider = self.resolve_provider(provider_id, Some(selector)).await?;
        let manga_id = manga_id_for(&provider, selector)?;
        Ok(provider.get_manga_info(&manga_id).await?)
    }

    /// List all chapters of a manga, filtered by the configured preferences
    /// and sorted to canonical chapter order
    pub async fn get_chapters(
        &self,
        provider_id: Option<&str>,
        selector: &MangaSelector,
    ) -> Result<Vec<Chapter>> {
        let provider = self.resolve_provider(provider_id, Some(selector)).await?;
        let manga_id = manga_id_for(&provider, selector)?;
        let chapters = provider.get_chapters(&manga_id).await?;

        let mut chapters = crate::utils::filter_chapters(
            chapters,
            self.config.filters.preferred_language.as_deref(),
            self.config.filters.preferred_scanlator.as_deref(),
        );
        chapters.sort_by(|a, b| {
            a.sort_key()
                .partial_cmp(&b.sort_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(chapters)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped,
    /// so downloads proceed whether or not anyone is listening.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Resolve a provider by explicit identity or by selector URL
    pub(crate) async fn resolve_provider(
        &self,
        provider_id: Option<&str>,
        selector: Option<&MangaSelector>,
    ) -> Result<Arc<dyn Provider>> {
        let registry = self.registry.read().await;
        let provider = match selector {
            Some(selector) => registry.resolve(provider_id, selector)?,
            None => match provider_id {
                Some(id) => registry.get(id).ok_or_else(|| {
                    Error::Provider(crate::error::ProviderError::Unsupported(format!(
                        "unknown provider: {id}"
                    )))
                })?,
                None => {
                    return Err(Error::Provider(crate::error::ProviderError::Unsupported(
                        "no provider specified".to_string(),
                    )));
                }
            },
        };
        Ok(provider)
    }
}

/// Derive the provider-scoped manga id from a selector
pub(crate) fn manga_id_for(
    provider: &Arc<dyn Provider>,
    selector: &MangaSelector,
) -> Result<String> {
    match selector {
        MangaSelector::Id(id) => Ok(id.clone()),
        MangaSelector::Url(url) => Ok(provider.manga_id_from_url(url)?),
    }
}
