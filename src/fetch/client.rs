//! Concurrency-bounded polite HTTP fetcher.
//!
//! Every URL passes the domain policy, robots.txt, and opt-out checks
//! before a request is made. Requests to the same host are serialized
//! with a minimum inter-request delay; transient failures retry with
//! exponential backoff bounded by the per-request timeout; successful
//! responses land in the content-addressed HTTP cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::policy::DomainPolicy;
use super::robots::RobotsTxt;
use super::{ACCEPT_HEADER, FetchedPayload, Fetcher, USER_AGENT};
use crate::cache::{Cache, CachedHttpResponse, HttpSidecar};
use crate::error::FetchError;

/// Base delay for the exponential retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Fetcher behavior knobs.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent sent with every request and matched against robots.txt.
    pub user_agent: String,
    /// Attempts per URL (first try plus retries).
    pub max_attempts: u32,
    /// Timeout applied to each individual request.
    pub per_request_timeout: Duration,
    /// Maximum redirect hops before giving up.
    pub redirect_max_hops: usize,
    /// Concurrent fetch workers.
    pub concurrency: usize,
    /// Minimum delay between requests to the same host.
    pub per_host_delay: Duration,
    /// Skip the HTTP cache on reads (still writes).
    pub bypass_cache: bool,
    /// Serve only from cache; any miss fails fast.
    pub cache_only: bool,
    /// Verify TLS certificates. Disable only for self-signed deployments.
    pub verify_tls: bool,
    /// Hosts where robots/opt-out may be overridden.
    pub robots_override_domains: Vec<String>,
    /// Second key for the robots override; both must be set.
    pub robots_override_confirm: bool,
    /// Host allow/deny policy.
    pub domain_policy: DomainPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            max_attempts: 2,
            per_request_timeout: Duration::from_secs(15),
            redirect_max_hops: 5,
            concurrency: 8,
            per_host_delay: Duration::from_millis(500),
            bypass_cache: false,
            cache_only: false,
            verify_tls: true,
            robots_override_domains: Vec::new(),
            robots_override_confirm: false,
            domain_policy: DomainPolicy::default(),
        }
    }
}

#[derive(Debug, Default)]
struct HostState {
    last_request: Option<Instant>,
}

/// The production [`Fetcher`]: polite, cached, and isolated per URL.
pub struct PoliteFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    cache: Option<Arc<Cache>>,
    hosts: Mutex<HashMap<String, Arc<Mutex<HostState>>>>,
    robots: Mutex<HashMap<String, Arc<Option<RobotsTxt>>>>,
    cancel: CancellationToken,
}

impl PoliteFetcher {
    /// Builds a fetcher from configuration.
    pub fn new(
        config: FetchConfig,
        cache: Option<Arc<Cache>>,
        cancel: CancellationToken,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.per_request_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.redirect_max_hops))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("client build failed: {e}"),
            })?;

        Ok(Self {
            client,
            config,
            cache,
            hosts: Mutex::new(HashMap::new()),
            robots: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Whether robots/opt-out signals may be overridden for `host`.
    /// Requires both the domain listing and the confirm flag.
    fn robots_overridden(&self, host: &str) -> bool {
        self.config.robots_override_confirm
            && self
                .config
                .robots_override_domains
                .iter()
                .any(|d| d.eq_ignore_ascii_case(host))
    }

    /// Loads robots.txt for a host, via the HTTP cache when available.
    /// Unreachable or missing robots.txt permits fetching.
    async fn robots_for(&self, scheme: &str, host_port: &str) -> Arc<Option<RobotsTxt>> {
        {
            let map = self.robots.lock().await;
            if let Some(cached) = map.get(host_port) {
                return Arc::clone(cached);
            }
        }

        let robots_url = format!("{scheme}://{host_port}/robots.txt");
        let parsed = match self.raw_get(&robots_url).await {
            Ok((body, status)) if status.is_success() => {
                Some(RobotsTxt::parse(&String::from_utf8_lossy(&body)))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt unavailable");
                None
            }
        };

        let entry = Arc::new(parsed);
        self.robots
            .lock()
            .await
            .insert(host_port.to_string(), Arc::clone(&entry));
        entry
    }

    /// One cached GET without robots evaluation (used for robots.txt
    /// itself).
    async fn raw_get(&self, url: &str) -> Result<(Vec<u8>, StatusCode), FetchError> {
        let key = Cache::http_key("GET", url, "text/plain");
        if let Some(cache) = &self.cache
            && !self.config.bypass_cache
            && let Some(hit) = cache.get_http(&key)?
        {
            return Ok((
                hit.body,
                StatusCode::from_u16(hit.meta.status).unwrap_or(StatusCode::OK),
            ));
        }
        if self.config.cache_only {
            return Err(FetchError::CacheOnlyMiss {
                url: url.to_string(),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, &e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport(url, &e))?
            .to_vec();

        if let Some(cache) = &self.cache {
            let entry = CachedHttpResponse {
                body: body.clone(),
                meta: HttpSidecar {
                    status: status.as_u16(),
                    content_type: "text/plain".to_string(),
                    fetched_at: Utc::now(),
                },
            };
            if let Err(e) = cache.put_http(&key, &entry) {
                warn!(url, error = %e, "failed to cache robots.txt");
            }
        }

        Ok((body, status))
    }

    /// Acquires (creating on first use) the pacing lock for a host.
    async fn host_lock(&self, host: &str) -> Arc<Mutex<HostState>> {
        let mut map = self.hosts.lock().await;
        Arc::clone(
            map.entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(HostState::default()))),
        )
    }

    /// Runs the attempt loop for one URL. The per-host lock is held by the
    /// caller, so at most one request per host is in flight.
    async fn request_with_retries(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let mut last_error = FetchError::Transport {
            url: url.to_string(),
            reason: "no attempts made".to_string(),
        };

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let backoff = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                let backoff = backoff.min(self.config.per_request_timeout);
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    () = self.cancel.cancelled() => {
                        return Err(transport_reason(url, "cancelled"));
                    }
                }
            }

            let send = self.client.get(url).header("Accept", ACCEPT_HEADER).send();
            let result = tokio::select! {
                r = send => r,
                () = self.cancel.cancelled() => {
                    return Err(transport_reason(url, "cancelled"));
                }
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let error = FetchError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    };
                    if !error.is_transient() {
                        return Err(error);
                    }
                    last_error = error;
                }
                Err(e) => {
                    if e.is_redirect() {
                        return Err(transport_reason(url, "redirect limit exceeded"));
                    }
                    last_error = transport(url, &e);
                }
            }
            debug!(url, attempt, error = %last_error, "retrying fetch");
        }

        Err(last_error)
    }
}

#[async_trait]
impl Fetcher for PoliteFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        let host = parsed.host_str().ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;

        self.config.domain_policy.check(host)?;

        let host_port = parsed
            .port()
            .map_or_else(|| host.to_string(), |p| format!("{host}:{p}"));

        let overridden = self.robots_overridden(host);
        if !overridden {
            let robots = self.robots_for(parsed.scheme(), &host_port).await;
            if let Some(robots) = robots.as_ref()
                && !robots.is_allowed(&self.config.user_agent, parsed.path())
            {
                return Err(FetchError::RobotsDisallowed {
                    url: url.to_string(),
                });
            }
        }

        let key = Cache::http_key("GET", url, ACCEPT_HEADER);
        if let Some(cache) = &self.cache
            && !self.config.bypass_cache
            && let Some(hit) = cache.get_http(&key)?
        {
            debug!(url, "http cache hit");
            return Ok(FetchedPayload {
                body: hit.body,
                content_type: hit.meta.content_type,
                fetched_at: hit.meta.fetched_at,
                from_cache: true,
            });
        }
        if self.config.cache_only {
            return Err(FetchError::CacheOnlyMiss {
                url: url.to_string(),
            });
        }

        // Per-host serialization with minimum spacing. The lock is held
        // across the request so a slow host never sees two of us at once.
        let host_lock = self.host_lock(&host_port).await;
        let mut state = host_lock.lock().await;
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.config.per_host_delay {
                tokio::time::sleep(self.config.per_host_delay - elapsed).await;
            }
        }

        let response = self.request_with_retries(url).await;
        state.last_request = Some(Instant::now());
        drop(state);
        let response = response?;

        if let Some(tag) = response
            .headers()
            .get("x-robots-tag")
            .and_then(|v| v.to_str().ok())
        {
            let lower = tag.to_ascii_lowercase();
            if !overridden {
                for directive in ["noai", "notrain", "noindex"] {
                    if lower.contains(directive) {
                        return Err(FetchError::OptOut {
                            directive: directive.to_string(),
                            url: url.to_string(),
                        });
                    }
                }
            }
        }

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport(url, &e))?
            .to_vec();
        let fetched_at = Utc::now();

        if let Some(cache) = &self.cache {
            let entry = CachedHttpResponse {
                body: body.clone(),
                meta: HttpSidecar {
                    status,
                    content_type: content_type.clone(),
                    fetched_at,
                },
            };
            if let Err(e) = cache.put_http(&key, &entry) {
                warn!(url, error = %e, "failed to cache response");
            }
        }

        Ok(FetchedPayload {
            body,
            content_type,
            fetched_at,
            from_cache: false,
        })
    }
}

impl std::fmt::Debug for PoliteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoliteFetcher")
            .field("config", &self.config)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

fn transport(url: &str, err: &reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

fn transport_reason(url: &str, reason: &str) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
