// src/core/net.rs
//! Live register client: blocking HTTPS with a session cookie, one form POST
//! per query, exponential backoff on throttling and server errors.

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use crate::classify::Limits;
use crate::config::consts::{SEARCH_PATH, USER_AGENT, WARMUP_PATH};
use crate::config::{RegistryOptions, ScrapeOptions};
use crate::error::{Error, Result};
use crate::query::{DoctorType, Query};
use crate::record::QueryResult;
use crate::registry::{decode_response, RegistryService, ServiceError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): doubles each time.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1u64 << shift))
    }
}

/// Pause before every request; the jitter is derived from the query key so
/// reruns space requests the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pause {
    pub pause_ms: u64,
    pub jitter_ms: u64,
}

impl Pause {
    pub fn for_key(&self, key: &str) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            key.bytes()
                .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)))
                % self.jitter_ms
        };
        Duration::from_millis(self.pause_ms.saturating_add(jitter))
    }
}

pub struct HttpRegistry {
    client: Client,
    base_url: String,
    specialist_type: String,
    limits: Limits,
    retry: RetryPolicy,
    pause: Pause,
    warmed: OnceLock<()>,
}

impl HttpRegistry {
    pub fn new(registry: &RegistryOptions, scrape: &ScrapeOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));

        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(registry.timeout())
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: registry.base_url.trim_end_matches('/').to_string(),
            specialist_type: registry.specialist_type.clone(),
            limits: registry.limits()?,
            retry: RetryPolicy {
                max_attempts: scrape.max_attempts.max(1),
                initial_backoff_ms: scrape.initial_backoff_ms,
            },
            pause: Pause { pause_ms: scrape.pause_ms, jitter_ms: scrape.jitter_ms },
            warmed: OnceLock::new(),
        })
    }

    /// The search endpoint wants the session cookie the search page sets.
    fn warm_up(&self) {
        self.warmed.get_or_init(|| {
            let url = format!("{}{}", self.base_url, WARMUP_PATH);
            match self.client.get(&url).send() {
                Ok(resp) => logd!("Session warm-up: {} {}", resp.status(), url),
                Err(e) => logw!("Session warm-up failed ({url}): {e}"),
            }
        });
    }

    fn attempt(&self, query: &Query) -> Result<QueryResult, ServiceError> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        let form = search_form(query, &self.specialist_type);

        let resp = self.client.post(&url).form(&form).send().map_err(classify_send_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Http {
                status: status.as_u16(),
                msg: format!("{} for {}", status.canonical_reason().unwrap_or("error"), query.key()),
            });
        }
        let body = resp.text().map_err(classify_send_error)?;
        decode_response(query, &body, &self.limits)
    }
}

impl RegistryService for HttpRegistry {
    fn query(&self, query: &Query) -> Result<QueryResult, ServiceError> {
        self.warm_up();
        thread::sleep(self.pause.for_key(&query.key())); // be polite

        let mut attempt = 1;
        loop {
            logd!("POST {} (attempt {attempt}/{})", query.key(), self.retry.max_attempts);
            match self.attempt(query) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    logw!("{}: {e}; backing off {} ms", query.key(), delay.as_millis());
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify_send_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(e.to_string())
    } else if e.is_decode() || e.is_body() {
        ServiceError::Decode(e.to_string())
    } else {
        ServiceError::Transport(e.to_string())
    }
}

/// Form fields of the register's advanced search.
pub fn search_form(query: &Query, specialist_type: &str) -> Vec<(&'static str, String)> {
    let mut form = vec![("cbx-includeinactive", s!("on"))];
    if let Some(name) = query.last_name() {
        form.push(("lastName", s!(name)));
    }
    form.push(("postalCode", query.postal_code().spaced()));
    form.push(("doctorType", s!(query.doctor_type().form_value())));
    if query.doctor_type() == DoctorType::Specialist {
        form.push(("SpecialistType", s!(specialist_type)));
    }
    form
}
