//! HTTP client for the FDSN event and station web services.

use std::time::Duration;

use reqwest::header;
use seistomo_core::AcquisitionRequest;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::retry::{is_retryable_error, is_retryable_status, RetryPolicy};

/// Event (bulletin) query path, relative to the service base.
pub const EVENT_PATH: &str = "/fdsnws/event/1/query";

/// Station (inventory) query path, relative to the service base.
pub const STATION_PATH: &str = "/fdsnws/station/1/query";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!("seistomo/", env!("CARGO_PKG_VERSION"));

const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Raw bulletin and inventory payloads for one acquisition request.
#[derive(Debug, Clone)]
pub struct FdsnPayloads {
    pub bulletin: Vec<u8>,
    pub inventory: Vec<u8>,
}

/// Client for an FDSN-style data service.
#[derive(Debug, Clone)]
pub struct FdsnClient {
    inner: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl FdsnClient {
    /// Create a client with the default timeout and retry policy.
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests are bounded by `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Builder method to replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the event bulletin for a request.
    pub async fn fetch_bulletin(&self, request: &AcquisitionRequest) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(EVENT_PATH, &event_query(request)).await
    }

    /// Fetch the station inventory for a request.
    pub async fn fetch_inventory(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(STATION_PATH, &station_query(request)).await
    }

    /// Fetch bulletin and inventory concurrently. Fails if either fails.
    pub async fn fetch_all(&self, request: &AcquisitionRequest) -> Result<FdsnPayloads, FetchError> {
        let (bulletin, inventory) =
            tokio::join!(self.fetch_bulletin(request), self.fetch_inventory(request));

        Ok(FdsnPayloads {
            bulletin: bulletin?,
            inventory: inventory?,
        })
    }

    /// GET a path with query parameters, retrying transient failures.
    pub async fn get_bytes(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url = %url, attempt, "GET request");

            let failure = match self.inner.get(&url).query(params).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(body) => {
                            info!(url = %url, attempt, bytes = body.len(), "Fetched payload");
                            return Ok(body.to_vec());
                        }
                        Err(e) => Attempt::Transport(e),
                    }
                }
                Ok(response) => Attempt::Status(response.status()),
                Err(e) => Attempt::Transport(e),
            };

            match failure {
                Attempt::Status(status)
                    if is_retryable_status(status) && self.retry.should_retry(attempt) =>
                {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        status = status.as_u16(),
                        backoff_ms = delay.as_millis() as u64,
                        "Retryable status from data service"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Status(status) => {
                    return Err(FetchError::Status {
                        url,
                        status: status.as_u16(),
                        attempts: attempt,
                    });
                }
                Attempt::Transport(e)
                    if is_retryable_error(&e) && self.retry.should_retry(attempt) =>
                {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        error = %e,
                        backoff_ms = delay.as_millis() as u64,
                        "Transport error from data service"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Transport(e) => {
                    return Err(FetchError::Transport {
                        url,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

enum Attempt {
    Status(reqwest::StatusCode),
    Transport(reqwest::Error),
}

/// Query parameters for the event service.
pub fn event_query(request: &AcquisitionRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        (
            "starttime",
            request.start_time.format(QUERY_TIME_FORMAT).to_string(),
        ),
        (
            "endtime",
            request.end_time.format(QUERY_TIME_FORMAT).to_string(),
        ),
        ("includeallorigins", "true".to_string()),
        ("includearrivals", "true".to_string()),
        ("includeallmagnitudes", "true".to_string()),
        ("nodata", "404".to_string()),
    ];

    let bbox = &request.bbox;
    for (name, value) in [
        ("minlatitude", bbox.min_latitude),
        ("maxlatitude", bbox.max_latitude),
        ("minlongitude", bbox.min_longitude),
        ("maxlongitude", bbox.max_longitude),
    ] {
        if let Some(v) = value {
            params.push((name, v.to_string()));
        }
    }

    params
}

/// Query parameters for the station service.
pub fn station_query(request: &AcquisitionRequest) -> Vec<(&'static str, String)> {
    vec![
        ("network", request.network.clone()),
        ("level", "station".to_string()),
        ("nodata", "404".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use chrono::{TimeZone, Utc};
    use seistomo_core::BoundingBox;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request() -> AcquisitionRequest {
        AcquisitionRequest::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
            "XX",
        )
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Router whose event endpoint answers `first` once, then 200.
    fn flaky(first: StatusCode, hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            EVENT_PATH,
            get(move || {
                let hits = hits.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (first, "nope")
                    } else {
                        (StatusCode::OK, "<q:quakeml/>")
                    }
                }
            }),
        )
    }

    #[test]
    fn test_event_query_without_bbox() {
        let params = event_query(&request());
        let names: Vec<_> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec![
                "starttime",
                "endtime",
                "includeallorigins",
                "includearrivals",
                "includeallmagnitudes",
                "nodata"
            ]
        );
        assert_eq!(params[0].1, "2024-03-01T00:00:00");
    }

    #[test]
    fn test_event_query_includes_present_bbox_edges_only() {
        let req = request().with_bbox(BoundingBox {
            min_latitude: Some(70.0),
            max_longitude: Some(30.5),
            ..Default::default()
        });
        let params = event_query(&req);
        assert!(params.contains(&("minlatitude", "70".to_string())));
        assert!(params.contains(&("maxlongitude", "30.5".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "maxlatitude"));
    }

    #[test]
    fn test_station_query() {
        let params = station_query(&request());
        assert_eq!(params[0], ("network", "XX".to_string()));
        assert!(params.contains(&("level", "station".to_string())));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(flaky(StatusCode::SERVICE_UNAVAILABLE, hits.clone())).await;
        let client = FdsnClient::new(&base)
            .unwrap()
            .with_retry(RetryPolicy::immediate(3));

        let body = client.fetch_bulletin(&request()).await.unwrap();
        assert_eq!(body, b"<q:quakeml/>");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(flaky(StatusCode::BAD_REQUEST, hits.clone())).await;
        let client = FdsnClient::new(&base)
            .unwrap()
            .with_retry(RetryPolicy::immediate(3));

        let err = client.fetch_bulletin(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 400, attempts: 1, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = hits.clone();
        let router = Router::new().route(
            EVENT_PATH,
            get(move || {
                hits_handler.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::BAD_GATEWAY }
            }),
        );
        let base = serve(router).await;
        let client = FdsnClient::new(&base)
            .unwrap()
            .with_retry(RetryPolicy::immediate(3));

        let err = client.fetch_bulletin(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 502, attempts: 3, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_fails_when_either_fails() {
        let router = Router::new()
            .route(EVENT_PATH, get(|| async { "<q:quakeml/>" }))
            .route(STATION_PATH, get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(router).await;
        let client = FdsnClient::new(&base)
            .unwrap()
            .with_retry(RetryPolicy::immediate(3));

        let err = client.fetch_all(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
