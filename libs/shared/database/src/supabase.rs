use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// A non-success PostgREST response that is not an auth or not-found error.
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {body}")]
pub struct ApiError {
    pub status: StatusCode,
    pub body: String,
}

impl ApiError {
    /// PostgREST rejected the query because a selected column does not exist.
    pub fn is_missing_column(&self) -> bool {
        self.status == StatusCode::BAD_REQUEST
            && (self.body.contains("42703") || self.body.contains("PGRST"))
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Without a user token PostgREST is addressed with the anon key itself.
        let bearer = auth_token.unwrap_or(&self.anon_key);
        if !bearer.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", bearer))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow::Error::new(ApiError { status, body: error_text }),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Call a Postgres function exposed through `/rest/v1/rpc/{function}`.
    /// Each call runs in its own transaction on the server.
    pub async fn rpc<T>(&self, function: &str, args: Value) -> Result<T>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, None, Some(args)).await
    }

    /// PATCH rows matching `filter` and return the updated representation.
    pub async fn patch_returning<T>(&self, table: &str, filter: &str, body: Value) -> Result<Vec<T>>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/{}?{}", table, filter);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(Method::PATCH, &path, None, Some(body), Some(headers)).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use wiremock::matchers::{header, method, path};

    fn config_for(server: &MockServer) -> AppConfig {
        AppConfig {
            supabase_url: format!("{}/", server.uri()),
            supabase_anon_key: "test-anon-key".to_string(),
            ..AppConfig::in_memory()
        }
    }

    #[tokio::test]
    async fn rpc_posts_arguments_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/ping"))
            .and(header("apikey", "test-anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server));
        let result: Value = client.rpc("ping", json!({})).await.expect("rpc should succeed");

        assert_eq!(result["ok"], json!(true));
    }

    #[tokio::test]
    async fn non_success_status_becomes_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/queue"))
            .respond_with(ResponseTemplate::new(400).set_body_string("column does not exist"))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server));
        let result: Result<Vec<Value>> = client.request(Method::GET, "/rest/v1/queue", None, None).await;

        let message = result.expect_err("400 must be an error").to_string();
        assert!(message.contains("column does not exist"));
    }

    #[tokio::test]
    async fn missing_column_is_distinguished_from_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/queue"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "42703",
                "message": "column queue.q_status does not exist"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server));

        let missing = client
            .request::<Vec<Value>>(Method::GET, "/rest/v1/queue", None, None)
            .await
            .expect_err("400 must be an error");
        let missing = missing.downcast_ref::<ApiError>().expect("400 is an ApiError");
        assert!(missing.is_missing_column());

        let down = client
            .request::<Vec<Value>>(Method::GET, "/rest/v1/appointments", None, None)
            .await
            .expect_err("503 must be an error");
        let down = down.downcast_ref::<ApiError>().expect("503 is an ApiError");
        assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!down.is_missing_column());
    }
}
