//! Per-host rate limiting using token bucket algorithm
//!
//! The RateLimiter provides request pacing and an in-flight cap, keyed by
//! remote host so that two different image hosts never throttle each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// One request costs this many micro-tokens. Fractional rates like 0.5
/// requests per second stay exact in integer arithmetic.
const TOKENS_PER_REQUEST: u64 = 1_000_000;

/// Rate limiter shared across all downloads, bucketed by remote host
///
/// Each host gets its own token bucket (request pacing) and its own
/// semaphore (simultaneous in-flight cap). Acquiring a permit waits for
/// both; the in-flight slot is released when the returned [`HostPermit`]
/// is dropped.
///
/// # Algorithm
///
/// - Tokens represent requests that may be issued now
/// - Tokens refill at a constant rate (requests per second)
/// - A request consumes one token before being sent
/// - If no token is available, the caller waits until refill
#[derive(Clone)]
pub struct RateLimiter {
    /// Requests per second per host, in micro-tokens (0 = unlimited)
    rate: u64,
    /// Maximum simultaneous in-flight requests per host
    max_in_flight: usize,
    /// Per-host state, created lazily on first request to a host
    hosts: Arc<Mutex<HashMap<String, Arc<HostLimiter>>>>,
}

/// Token bucket plus in-flight semaphore for a single host
struct HostLimiter {
    /// Available micro-tokens
    tokens: AtomicU64,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: AtomicU64,
    /// Caps simultaneous in-flight requests
    in_flight: Arc<Semaphore>,
}

/// Permission to issue one request to a host
///
/// Holds the host's in-flight slot; dropping the permit releases the slot.
/// The pacing token consumed to obtain the permit is never returned — it
/// represents a request that was (or is about to be) issued.
pub struct HostPermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    /// Create a new RateLimiter
    ///
    /// # Arguments
    ///
    /// * `requests_per_second` - Pacing rate per host (0.0 = unlimited)
    /// * `max_in_flight` - Simultaneous in-flight cap per host (must be > 0)
    ///
    /// # Examples
    ///
    /// ```
    /// use manga_dl::rate_limiter::RateLimiter;
    ///
    /// // 2 requests per second, at most 4 in flight, per host
    /// let limiter = RateLimiter::new(2.0, 4);
    ///
    /// // Unpaced but still capped at 8 in flight
    /// let uncapped = RateLimiter::new(0.0, 8);
    /// ```
    #[must_use]
    pub fn new(requests_per_second: f64, max_in_flight: usize) -> Self {
        let rate = if requests_per_second > 0.0 {
            (requests_per_second * TOKENS_PER_REQUEST as f64) as u64
        } else {
            0
        };

        Self {
            rate,
            max_in_flight: max_in_flight.max(1),
            hosts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquire permission to issue one request to the given host
    ///
    /// Waits first for a pacing token, then for an in-flight slot. Hosts are
    /// independent: a saturated host never delays requests to another.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        let limiter = self.host_limiter(host).await;

        // Pacing first, so a held in-flight slot is not wasted on waiting
        limiter.acquire_token(self.rate).await;

        // Semaphore is never closed, so acquire cannot fail
        let permit = match limiter.in_flight.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => unreachable!("in-flight semaphore is never closed"),
        };

        HostPermit { _permit: permit }
    }

    /// Number of hosts with limiter state allocated
    pub async fn host_count(&self) -> usize {
        self.hosts.lock().await.len()
    }

    async fn host_limiter(&self, host: &str) -> Arc<HostLimiter> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostLimiter {
                    // Start with one full token so the first request is immediate
                    tokens: AtomicU64::new(TOKENS_PER_REQUEST),
                    last_refill: AtomicU64::new(now_nanos()),
                    in_flight: Arc::new(Semaphore::new(self.max_in_flight)),
                })
            })
            .clone()
    }
}

impl HostLimiter {
    /// Wait until one pacing token is available, then consume it
    async fn acquire_token(&self, rate: u64) {
        // Fast path: unpaced
        if rate == 0 {
            return;
        }

        loop {
            self.refill_tokens(rate);

            let current = self.tokens.load(Ordering::SeqCst);
            if current >= TOKENS_PER_REQUEST {
                if self
                    .tokens
                    .compare_exchange(
                        current,
                        current - TOKENS_PER_REQUEST,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    return;
                }
                // CAS lost to another task — retry immediately
                continue;
            }

            // No token available — wait roughly until the next one accrues.
            // Cap sleep at 100ms so concurrent waiters interleave fairly.
            let deficit = TOKENS_PER_REQUEST - current;
            let wait_ms = (deficit as f64 / rate as f64 * 1000.0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Refill tokens based on elapsed time since last refill
    fn refill_tokens(&self, rate: u64) {
        let now = now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_nanos = now.saturating_sub(last);
        let elapsed_secs = elapsed_nanos as f64 / 1_000_000_000.0;

        let tokens_to_add = (rate as f64 * elapsed_secs) as u64;

        if tokens_to_add > 0 {
            // Try to update last_refill timestamp atomically
            if self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                // Add tokens, but cap at one request of burst capacity
                let current = self.tokens.load(Ordering::SeqCst);
                let new_tokens = (current + tokens_to_add).min(TOKENS_PER_REQUEST);
                self.tokens.store(new_tokens, Ordering::SeqCst);
            }
        }
    }
}

/// Get current monotonic time in nanoseconds
///
/// Uses a monotonic clock that is not affected by system time changes.
/// The epoch is arbitrary but consistent within a process lifetime.
fn now_nanos() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}
