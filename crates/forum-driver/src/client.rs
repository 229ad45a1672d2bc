//! Proxy gateway client: every outbound request goes through here.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{Client, Proxy};
use tracing::{debug, warn};

use crate::config::{SiteConfig, UserAgent};
use crate::{DriverError, Result};

/// Bounded retry for transient fetch failures.
const FETCH_TRIES: u32 = 3;
const FETCH_DELAY: Duration = Duration::from_secs(2);
const FETCH_BACKOFF: f64 = 1.5;

// ─── GatewayClient ────────────────────────────────────────────────────────

/// An HTTP session routed through the SOCKS proxy.
///
/// One client per run: the cookie jar is the session, and dropping the
/// client ends it. Requests rotate through the configured
/// User-Agent/Referer pairs.
pub struct GatewayClient {
    http: Client,
    agents: Vec<UserAgent>,
}

impl GatewayClient {
    pub fn new(config: &SiteConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10));
        if !config.proxy_url.is_empty() {
            let proxy = Proxy::all(&config.proxy_url)
                .map_err(|e| DriverError::Proxy(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| DriverError::Proxy(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            agents: config.user_agents.clone(),
        })
    }

    fn pick_agent(&self) -> Option<&UserAgent> {
        self.agents.choose(&mut rand::thread_rng())
    }

    /// One cheap request to prove the circuit works. Any HTTP response
    /// counts; only a connection-level failure is fatal.
    pub async fn probe(&self, url: &str) -> Result<()> {
        match self.http.get(url).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(classify(e, url)),
        }
    }

    /// GET `url` and return its body, retrying transient failures with
    /// backoff.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut delay = FETCH_DELAY;
        let mut last_err: Option<DriverError> = None;
        for attempt in 1..=FETCH_TRIES {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt < FETCH_TRIES {
                        warn!(url, attempt, error = %e, "fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                        delay = delay.mul_f64(FETCH_BACKOFF);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let mut request = self.http.get(url);
        if let Some(ua) = self.pick_agent() {
            request = request
                .header("User-Agent", ua.agent.as_str())
                .header("Referer", ua.referer.as_str());
        }
        debug!(url, "fetching");
        let response = request.send().await.map_err(|e| classify(e, url))?;
        let response = response
            .error_for_status()
            .map_err(|e| DriverError::Site(format!("{url} returned {e}")))?;
        response
            .text()
            .await
            .map_err(|e| DriverError::Site(format!("cannot read body of {url}: {e}")))
    }

    /// POST a form to `url` with the login referer headers. Not retried:
    /// form submissions are not idempotent from the site's point of view.
    pub async fn post_form(
        &self,
        url: &str,
        origin: &str,
        form: &[(String, String)],
    ) -> Result<String> {
        let mut request = self.http.post(url).form(form);
        if let Some(ua) = self.pick_agent() {
            request = request.header("User-Agent", ua.agent.as_str());
        }
        request = request.header("Referer", url).header("Origin", origin);
        let response = request.send().await.map_err(|e| classify(e, url))?;
        let response = response
            .error_for_status()
            .map_err(|e| DriverError::Site(format!("{url} returned {e}")))?;
        response
            .text()
            .await
            .map_err(|e| DriverError::Site(format!("cannot read body of {url}: {e}")))
    }
}

/// Split connection-level failures (proxy or circuit down) from site-side
/// failures so `error_detail` tells the operator which side broke.
fn classify(err: reqwest::Error, url: &str) -> DriverError {
    if err.is_connect() {
        DriverError::Proxy(format!("cannot connect while fetching {url}: {err}"))
    } else if err.is_timeout() {
        DriverError::Site(format!("navigation timeout at {url}"))
    } else {
        DriverError::Site(format!("request to {url} failed: {err}"))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
