//! Paced page fetching. Every request to the site goes through one shared [`Pacer`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::Html;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Longest pause the pacer honors. Larger intervals are capped to it.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Global pacing gate: at most one operation at a time, and at least `interval`
/// between the end of one operation and the start of the next.
///
/// The pause follows every operation, failed ones included. Callers that arrive
/// while the gate is closed wait their turn; nobody is turned away.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_free: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.min(MAX_INTERVAL),
            next_free: Mutex::new(None),
        }
    }

    /// Runs `op` once the gate is free, then closes the gate for `interval`.
    pub async fn run<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut next_free = self.next_free.lock().await;
        if let Some(at) = *next_free {
            sleep_until(at).await;
        }
        let out = op.await;
        *next_free = Some(Instant::now() + self.interval);
        out
    }
}

/// Raw page content for one URL.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl Page {
    /// Parses the body. `Html` is not `Send`; parse where it is consumed.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// HTTP client bound to a pacer. Clones share the same pacer.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    pacer: Arc<Pacer>,
}

impl Fetcher {
    pub fn new(user_agent: &str, pacer: Arc<Pacer>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(user_agent)
            .map_err(|_| FetchError::UserAgent(user_agent.to_string()))?;
        headers.insert(USER_AGENT, agent);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, pacer })
    }

    /// Fetch one page. No retries; a failure still consumes a pacing slot.
    pub async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        self.pacer.run(self.fetch_unpaced(url)).await
    }

    async fn fetch_unpaced(&self, url: &str) -> Result<Page, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(url.to_string(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(url.to_string(), e))?;
        Ok(Page {
            url: final_url,
            body,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid user agent {0:?}")]
    UserAgent(String),
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),
    #[error("request to {0} failed: {1}")]
    Request(String, reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn first_operation_runs_immediately() {
        let pacer = Pacer::new(SECOND);
        let start = Instant::now();
        pacer.run(async {}).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_operations_are_spaced() {
        let pacer = Pacer::new(SECOND);
        let start = Instant::now();
        let mut starts = Vec::new();
        for _ in 0..3 {
            pacer.run(async { starts.push(start.elapsed()) }).await;
        }
        assert_eq!(starts, vec![Duration::ZERO, SECOND, 2 * SECOND]);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_counts_from_completion() {
        let pacer = Pacer::new(SECOND);
        let start = Instant::now();
        pacer
            .run(tokio::time::sleep(Duration::from_millis(300)))
            .await;
        pacer.run(async {}).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_paced_too() {
        let pacer = Pacer::new(SECOND);
        let start = Instant::now();
        let failed: Result<(), &str> = pacer.run(async { Err("boom") }).await;
        assert!(failed.is_err());
        pacer.run(async {}).await;
        assert_eq!(start.elapsed(), SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_gate() {
        let pacer = Arc::new(Pacer::new(SECOND));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pacer = Arc::clone(&pacer);
                tokio::spawn(async move { pacer.run(async move { start.elapsed() }).await })
            })
            .collect();
        let mut starts = Vec::new();
        for h in handles {
            starts.push(h.await.unwrap());
        }
        starts.sort();
        assert_eq!(starts, vec![Duration::ZERO, SECOND, 2 * SECOND, 3 * SECOND]);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_interval_is_capped() {
        let pacer = Pacer::new(Duration::from_millis(u64::MAX));
        let start = Instant::now();
        pacer.run(async {}).await;
        pacer.run(async {}).await;
        assert_eq!(start.elapsed(), MAX_INTERVAL);
    }

    #[test]
    fn rejects_invalid_user_agent() {
        let err = Fetcher::new("bad\nagent", Arc::new(Pacer::new(SECOND))).unwrap_err();
        assert!(matches!(err, FetchError::UserAgent(_)));
    }
}
