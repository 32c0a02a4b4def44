//! REST transport for the multicloud API.
//!
//! Resources live under regional endpoints
//! (`https://{location}-gkemulticloud.googleapis.com/v1`). Every mutation
//! returns a long-running operation.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{ApiError, MultiCloudError, Result};
use crate::resources::{ParentRef, ResourceRef};

use super::transport::{Operation, Page, Transport, UpdateRequest};

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 200;

/// Longest server-requested wait honoured before a retry.
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// HTTP implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client.
    client: Client,
    /// Client configuration (base path override, token).
    config: ClientConfig,
}

/// A single request description, replayable across retries.
struct ApiRequest<'a> {
    method: Method,
    url: String,
    query: Vec<(&'static str, String)>,
    body: Option<&'a Value>,
    resource: String,
}

impl HttpTransport {
    /// Creates a transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn resource_url(&self, resource: &ResourceRef) -> String {
        format!(
            "{}/{}",
            self.config.base_url(&resource.parent.location),
            resource.path()
        )
    }

    fn collection_url(&self, parent: &ParentRef) -> String {
        format!(
            "{}/{}",
            self.config.base_url(&parent.location),
            parent.collection_path()
        )
    }

    /// Executes a request, retrying transient failures.
    ///
    /// Waits as long as a rate-limited response asks (capped), otherwise
    /// backs off linearly.
    async fn execute(&self, request: &ApiRequest<'_>) -> Result<Value> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if let Some(e) = &last_error {
                let delay = retry_delay(e, attempt);
                debug!(
                    "Retry attempt {attempt} of {MAX_RETRIES} for {} in {delay:?}",
                    request.url
                );
                tokio::time::sleep(delay).await;
            }

            match self.execute_once(request).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MultiCloudError::Api(ApiError::Network {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    /// Executes a single request and classifies the response status.
    async fn execute_once(&self, request: &ApiRequest<'_>) -> Result<Value> {
        trace!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .query(&request.query);
        if let Some(token) = &self.config.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 60 } else { retry_after };

            return Err(ApiError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into());
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::AuthenticationFailed { message: body }.into());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                resource: request.resource.clone(),
            }
            .into());
        }

        if status == StatusCode::CONFLICT || status == StatusCode::PRECONDITION_FAILED {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Conflict {
                resource: request.resource.clone(),
                message: body,
            }
            .into());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::request_failed(status.as_u16(), body).into());
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::invalid_response(format!("Failed to read response: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        serde_json::from_str(&text).map_err(|e| {
            ApiError::invalid_response(format!("Failed to parse response: {e}")).into()
        })
    }

    async fn operation(&self, request: &ApiRequest<'_>) -> Result<Operation> {
        let value = self.execute(request).await?;
        serde_json::from_value(value).map_err(|e| {
            ApiError::invalid_response(format!("Failed to parse operation: {e}")).into()
        })
    }
}

/// Delay before retry number `attempt` after `error`.
fn retry_delay(error: &MultiCloudError, attempt: u32) -> Duration {
    error.retry_delay_secs().map_or_else(
        || Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)),
        |secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)),
    )
}

/// Extracts the location segment of an operation name.
fn operation_location(name: &str) -> Option<&str> {
    let mut segments = name.split('/');
    while let Some(segment) = segments.next() {
        if segment == "locations" {
            return segments.next().filter(|s| !s.is_empty());
        }
    }
    None
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        let request = ApiRequest {
            method: Method::GET,
            url: self.resource_url(resource),
            query: Vec::new(),
            body: None,
            resource: resource.path(),
        };

        match self.execute(&request).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(
        &self,
        parent: &ParentRef,
        page_token: Option<String>,
        page_size: i32,
    ) -> Result<Page> {
        let mut query = Vec::new();
        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            query.push(("pageToken", token));
        }
        if page_size != -1 {
            query.push(("pageSize", page_size.to_string()));
        }

        let request = ApiRequest {
            method: Method::GET,
            url: self.collection_url(parent),
            query,
            body: None,
            resource: parent.collection_path(),
        };
        let value = self.execute(&request).await?;

        let items = match value.get(parent.kind.collection()) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ApiError::invalid_response(format!(
                    "'{}' is not a list",
                    parent.kind.collection()
                ))
                .into());
            }
        };
        let next_page_token = value
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string);

        Ok(Page {
            items,
            next_page_token,
        })
    }

    async fn create(&self, resource: &ResourceRef, body: Value) -> Result<Operation> {
        let request = ApiRequest {
            method: Method::POST,
            url: self.collection_url(&resource.parent),
            query: vec![(resource.kind().id_param(), resource.name.clone())],
            body: Some(&body),
            resource: resource.path(),
        };
        self.operation(&request).await
    }

    async fn update(&self, resource: &ResourceRef, request: UpdateRequest) -> Result<Operation> {
        let mut body = request.body;
        if let (Some(etag), Value::Object(map)) = (request.etag, &mut body) {
            map.insert("etag".to_string(), Value::String(etag));
        }

        debug!("{} on {} with mask {:?}", request.method, resource, request.update_mask);
        let api_request = ApiRequest {
            method: Method::PATCH,
            url: self.resource_url(resource),
            query: vec![("updateMask", request.update_mask.join(","))],
            body: Some(&body),
            resource: resource.path(),
        };
        self.operation(&api_request).await
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<Operation> {
        let request = ApiRequest {
            method: Method::DELETE,
            url: self.resource_url(resource),
            query: Vec::new(),
            body: None,
            resource: resource.path(),
        };
        self.operation(&request).await
    }

    async fn poll_operation(&self, operation: &Operation) -> Result<Operation> {
        let location = operation_location(&operation.name).ok_or_else(|| {
            ApiError::invalid_response(format!("operation name '{}' has no location", operation.name))
        })?;

        let request = ApiRequest {
            method: Method::GET,
            url: format!("{}/{}", self.config.base_url(location), operation.name),
            query: Vec::new(),
            body: None,
            resource: operation.name.clone(),
        };
        self.operation(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{AzureClient, Resource, ResourceKind};
    use serde_json::json;
    use wiremock::matchers::{
        body_partial_json, header, method, path, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_PATH: &str = "/projects/p/locations/us-west1/azureClients/c";

    fn transport(server: &MockServer) -> HttpTransport {
        let config = ClientConfig {
            base_path: Some(server.uri()),
            access_token: Some("secret".to_string()),
            ..ClientConfig::default()
        };
        HttpTransport::new(&config).expect("transport")
    }

    fn client_ref() -> ResourceRef {
        AzureClient::new("p", "us-west1", "c")
            .resource_ref()
            .expect("ref")
    }

    #[test]
    fn test_operation_location() {
        assert_eq!(
            operation_location("projects/p/locations/us-west1/operations/op-1"),
            Some("us-west1")
        );
        assert_eq!(operation_location("operations/op-1"), None);
    }

    #[tokio::test]
    async fn test_get_found_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tenantId": "t"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let found = transport.get(&client_ref()).await.expect("get");
        assert_eq!(found, Some(json!({"tenantId": "t"})));

        let missing = transport.get(&client_ref()).await.expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_sends_id_param() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/p/locations/us-west1/azureClients"))
            .and(query_param("azureClientId", "c"))
            .and(body_partial_json(json!({"tenantId": "t"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/p/locations/us-west1/operations/op-1",
                "done": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = transport(&server)
            .create(&client_ref(), json!({"tenantId": "t"}))
            .await
            .expect("create");
        assert!(!op.done);
        assert_eq!(op.name, "projects/p/locations/us-west1/operations/op-1");
    }

    #[tokio::test]
    async fn test_update_sends_mask_and_etag() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(CLIENT_PATH))
            .and(query_param("updateMask", "description,controlPlane.version"))
            .and(body_partial_json(json!({"etag": "e1", "description": "d"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/p/locations/us-west1/operations/op-2",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = UpdateRequest {
            method: "UpdateAzureCluster".to_string(),
            update_mask: vec!["description".to_string(), "controlPlane.version".to_string()],
            body: json!({"description": "d"}),
            etag: Some("e1".to_string()),
        };
        let op = transport(&server)
            .update(&client_ref(), request)
            .await
            .expect("update");
        assert!(op.done);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_string("etag mismatch"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let err = transport.delete(&client_ref()).await.expect_err("conflict");
        assert!(err.is_conflict());

        let err = transport.get(&client_ref()).await.expect_err("auth");
        assert!(matches!(
            err,
            MultiCloudError::Api(ApiError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "u"})))
            .mount(&server)
            .await;

        let found = transport(&server).get(&client_ref()).await.expect("get");
        assert_eq!(found, Some(json!({"uid": "u"})));
    }

    #[tokio::test]
    async fn test_rate_limit_waits_for_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLIENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "u"})))
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let found = transport(&server).get(&client_ref()).await.expect("get");

        assert_eq!(found, Some(json!({"uid": "u"})));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_retry_delay() {
        let limited = MultiCloudError::Api(ApiError::RateLimited {
            retry_after_secs: 600,
        });
        assert_eq!(
            retry_delay(&limited, 1),
            Duration::from_secs(MAX_RETRY_AFTER_SECS)
        );

        let server = MultiCloudError::Api(ApiError::request_failed(503, "unavailable"));
        assert_eq!(retry_delay(&server, 2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_list_paging_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p/locations/us-west1/azureClients"))
            .and(query_param_is_missing("pageSize"))
            .and(query_param("pageToken", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "azureClients": [{"name": "a"}, {"name": "b"}],
                "nextPageToken": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        let parent = ParentRef::new(ResourceKind::AzureClient, "p", "us-west1", None);
        let page = transport(&server)
            .list(&parent, Some("t1".to_string()), -1)
            .await
            .expect("list");
        assert_eq!(page.items.len(), 2);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_poll_operation_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/p/locations/us-west1/operations/op-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/p/locations/us-west1/operations/op-3",
                "done": true,
                "error": {"code": 3, "message": "bad request"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = transport(&server)
            .poll_operation(&Operation::pending("projects/p/locations/us-west1/operations/op-3"))
            .await
            .expect("poll");
        assert_eq!(op.error.map(|e| e.code), Some(3));
    }
}
