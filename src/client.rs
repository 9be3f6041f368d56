//! Authenticated HTTP access to the Planet Data and Orders APIs.
use crate::config::{Config, PollConfig, RetryPolicy};
use crate::error::ApiError;
use crate::retry::{with_retry, with_retry_when};
use anyhow::{Context, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

pub struct PlanetClient {
    http: reqwest::Client,
    api_key: String,
    data_url: Url,
    orders_url: String,
    retry: RetryPolicy,
    poll: PollConfig,
}

impl PlanetClient {
    /// Builds a client using the key resolved from the environment or the config file.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut data_url = config.data_url.clone();
        if !data_url.ends_with('/') {
            data_url.push('/');
        }
        let data_url = Url::parse(&data_url)
            .with_context(|| format!("Invalid data_url: {}", config.data_url))?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            data_url,
            orders_url: config.orders_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
            poll: config.poll.clone(),
        })
    }

    pub fn quick_search_url(&self) -> String {
        // "quick-search" is a valid relative reference, join can't fail on it
        self.data_url
            .join("quick-search")
            .map(String::from)
            .unwrap_or_else(|_| format!("{}quick-search", self.data_url))
    }

    pub fn orders_url(&self) -> &str {
        &self.orders_url
    }

    pub fn order_url(&self, order_id: &str) -> String {
        format!("{}/{}", self.orders_url, order_id)
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send(|| self.authed(self.http.get(url))).await?;
        decode(url, response).await
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(|| self.authed(self.http.post(url)).json(body))
            .await?;
        decode(url, response).await
    }

    /// POSTs a request that creates something on the server, such as an order.
    ///
    /// Only a 429 is retried: the server turned the request away, so sending it again cannot
    /// create a duplicate. A 5xx or a dropped connection may have been accepted already.
    pub async fn submit_json<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let build = || self.authed(self.http.post(url)).json(body);
        let build = &build;
        let response = with_retry_when(
            &self.retry,
            |e| matches!(e, ApiError::RateLimited { .. }),
            move || async move {
                let response = build().send().await?;
                check_status(response).await
            },
        )
        .await?;
        decode(url, response).await
    }

    /// Starts fetching a result location, in a single attempt.
    ///
    /// Locations are pre-signed, so no credentials are attached. Callers retry the request
    /// together with reading the body, see `download_plan::try_download`.
    pub async fn download(&self, url: &str) -> Result<Response, ApiError> {
        let response = self.http.get(url).send().await?;
        check_status(response).await
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.api_key, Some(""))
    }

    async fn send<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        with_retry(&self.retry, move || async move {
            let response = build().send().await?;
            check_status(response).await
        })
        .await
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ApiError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::mock_client;
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_urls() {
        let client = PlanetClient::with_key(&Config::default(), "key").unwrap();
        assert_eq!(
            client.quick_search_url(),
            "https://api.planet.com/data/v1/quick-search"
        );
        assert_eq!(
            client.order_url("abc-123"),
            "https://api.planet.com/compute/ops/orders/v2/abc-123"
        );
    }

    #[test]
    fn test_data_url_without_trailing_slash() {
        let config = Config {
            data_url: "https://api.planet.com/data/v1".to_string(),
            orders_url: "https://api.planet.com/compute/ops/orders/v2/".to_string(),
            ..Config::default()
        };
        let client = PlanetClient::with_key(&config, "key").unwrap();
        assert_eq!(
            client.quick_search_url(),
            "https://api.planet.com/data/v1/quick-search"
        );
        assert_eq!(
            client.orders_url(),
            "https://api.planet.com/compute/ops/orders/v2"
        );
    }

    #[tokio::test]
    async fn test_requests_use_basic_auth_with_empty_password() {
        let server = MockServer::start().await;
        // base64("test-key:")
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("authorization", "Basic dGVzdC1rZXk6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let body: Value = client
            .get_json(&format!("{}/ping", server.uri()))
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"n": 1})))
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let body: Value = client
            .get_json(&format!("{}/busy", server.uri()))
            .await
            .unwrap();
        assert_eq!(body["n"], 1);
    }

    #[tokio::test]
    async fn test_client_error_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reject"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let err = client
            .post_json::<_, Value>(&format!("{}/reject", server.uri()), &json!({}))
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "bad filter");
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_is_not_repeated_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "dup"})))
            .expect(0)
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let err = client
            .submit_json::<_, Value>(&format!("{}/create", server.uri()), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status: StatusCode::BAD_GATEWAY, .. }
        ));
    }

    #[tokio::test]
    async fn test_submit_is_repeated_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": "one"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let body: Value = client
            .submit_json(&format!("{}/create", server.uri()), &json!({}))
            .await
            .unwrap();
        assert_eq!(body["id"], "one");
    }

    #[tokio::test]
    async fn test_download_makes_a_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/result.tif"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let err = client
            .download(&format!("{}/result.tif", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = mock_client(&server.uri());
        let err = client
            .get_json::<Value>(&format!("{}/html", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}
