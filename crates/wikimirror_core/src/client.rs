use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::HttpSettings;
use crate::error::{MirrorError, Result};

/// Key-value request parameters, sent as a query string or a form body.
pub type Params<'a> = [(&'a str, String)];

/// The structured request/response exchange with a MediaWiki `api.php`.
///
/// Implementations add `format=json` and `formatversion=2`, and turn an
/// envelope `error` object into [`MirrorError::Api`].
pub trait ApiTransport {
    fn get(&self, params: &Params<'_>) -> Result<Value>;
    fn post(&self, params: &Params<'_>) -> Result<Value>;
    fn request_count(&self) -> usize;
}

impl<T: ApiTransport + ?Sized> ApiTransport for &T {
    fn get(&self, params: &Params<'_>) -> Result<Value> {
        (**self).get(params)
    }

    fn post(&self, params: &Params<'_>) -> Result<Value> {
        (**self).post(params)
    }

    fn request_count(&self) -> usize {
        (**self).request_count()
    }
}

pub struct MediaWikiClient {
    client: Client,
    api_url: Url,
    settings: HttpSettings,
    last_request_at: Mutex<Option<Instant>>,
    request_count: AtomicUsize,
}

impl MediaWikiClient {
    pub fn new(api_url: &str, settings: HttpSettings) -> Result<Self> {
        let api_url = Url::parse(api_url).map_err(|error| MirrorError::InvalidSetting {
            setting: "WIKI_API",
            value: api_url.to_string(),
            message: error.to_string(),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.clone())
            .cookie_store(true)
            .build()
            .map_err(|source| MirrorError::Transport {
                message: "failed to build MediaWiki HTTP client".to_string(),
                source: Some(source),
            })?;

        Ok(Self {
            client,
            api_url,
            settings,
            last_request_at: Mutex::new(None),
            request_count: AtomicUsize::new(0),
        })
    }

    fn request(&self, params: &Params<'_>, method: Method) -> Result<Value> {
        let pairs = envelope_pairs(params);
        let max_retries = match method {
            Method::Get => self.settings.max_retries,
            // Replaying a login consumes the token; never retry it.
            Method::Post => 0,
        };

        for attempt in 0..=max_retries {
            self.apply_rate_limit();
            let request = match method {
                Method::Get => self.client.get(self.api_url.clone()).query(&pairs),
                Method::Post => self.client.post(self.api_url.clone()).form(&pairs),
            };

            let response = match request.send() {
                Ok(response) => response,
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, &error.to_string());
                        continue;
                    }
                    return Err(MirrorError::Transport {
                        message: "failed to call MediaWiki API".to_string(),
                        source: Some(error),
                    });
                }
            };

            let status = response.status();
            if !status.is_success() {
                if attempt < max_retries && is_retryable_status(status) {
                    self.wait_before_retry(attempt, &format!("HTTP {status}"));
                    continue;
                }
                return Err(MirrorError::transport(format!("HTTP {status}")));
            }

            let payload: Value = response.json().map_err(|source| MirrorError::Transport {
                message: "failed to decode MediaWiki API JSON response".to_string(),
                source: Some(source),
            })?;
            check_envelope(&payload)?;
            return Ok(payload);
        }

        Err(MirrorError::transport(
            "MediaWiki API request exhausted retry budget",
        ))
    }

    fn apply_rate_limit(&self) {
        let delay = Duration::from_millis(self.settings.rate_limit_read_ms);
        let mut last = self
            .last_request_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        *last = Some(Instant::now());
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    fn wait_before_retry(&self, attempt: usize, cause: &str) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .settings
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let delay = base.saturating_add(jitter);
        warn!(attempt = attempt + 1, delay_ms = delay, cause, "retrying MediaWiki request");
        sleep(Duration::from_millis(delay));
    }
}

impl ApiTransport for MediaWikiClient {
    fn get(&self, params: &Params<'_>) -> Result<Value> {
        debug!(?params, "GET api.php");
        self.request(params, Method::Get)
    }

    fn post(&self, params: &Params<'_>) -> Result<Value> {
        // Login parameters carry the password; only log the action.
        debug!(
            action = params
                .iter()
                .find(|(key, _)| *key == "action")
                .map(|(_, value)| value.as_str()),
            "POST api.php"
        );
        self.request(params, Method::Post)
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

fn envelope_pairs(params: &Params<'_>) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        pairs.push(((*key).to_string(), value.clone()));
    }
    pairs
}

/// Turns a `{"error": {...}}` envelope into an error.
pub(crate) fn check_envelope(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        return Err(MirrorError::Api {
            code: code.to_string(),
            info: info.to_string(),
        });
    }
    Ok(())
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}
