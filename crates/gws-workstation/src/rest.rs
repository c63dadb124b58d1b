//! HTTP/JSON implementation of the control API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use gws_auth::TokenSource;
use gws_core::{ApiError, RemoteHandle};

use crate::api::{Operation, Workstation, WorkstationApi};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    access_token: String,
}

/// Talks to the workstations REST surface with the broker's bearer token
pub struct HttpWorkstationApi {
    base_url: String,
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    operation_poll_interval: Duration,
}

impl HttpWorkstationApi {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        operation_poll_interval: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            tokens,
            operation_poll_interval,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn request(
        &self,
        operation: &str,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, ApiError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|source| ApiError::Auth {
                operation: operation.to_string(),
                source,
            })?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Request {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|e| ApiError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
    ) -> Result<T, ApiError> {
        let request = self.request(operation, method.clone(), path).await?;
        let request = if method == Method::POST {
            request.json(&serde_json::json!({}))
        } else {
            request
        };
        self.send(operation, request).await
    }
}

#[async_trait]
impl WorkstationApi for HttpWorkstationApi {
    async fn get_workstation(&self, handle: &RemoteHandle) -> Result<Workstation, ApiError> {
        self.call("GetWorkstation", Method::GET, &handle.resource_name())
            .await
    }

    async fn start(&self, handle: &RemoteHandle) -> Result<Operation, ApiError> {
        let path = format!("{}:start", handle.resource_name());
        self.call("StartWorkstation", Method::POST, &path).await
    }

    async fn stop(&self, handle: &RemoteHandle) -> Result<Operation, ApiError> {
        let path = format!("{}:stop", handle.resource_name());
        self.call("StopWorkstation", Method::POST, &path).await
    }

    async fn delete(&self, handle: &RemoteHandle) -> Result<Operation, ApiError> {
        self.call("DeleteWorkstation", Method::DELETE, &handle.resource_name())
            .await
    }

    async fn wait(&self, operation: &Operation) -> Result<(), ApiError> {
        let mut current = operation.clone();
        loop {
            if current.done {
                return match current.error {
                    Some(status) => Err(ApiError::Operation {
                        operation: current.name,
                        code: status.code,
                        message: status.message,
                    }),
                    None => Ok(()),
                };
            }

            tokio::time::sleep(self.operation_poll_interval).await;
            tracing::trace!("Polling operation {}", current.name);
            current = self
                .call("GetOperation", Method::GET, &operation.name)
                .await?;
        }
    }

    async fn generate_access_token(&self, handle: &RemoteHandle) -> Result<String, ApiError> {
        let path = format!("{}:generateAccessToken", handle.resource_name());
        let response: AccessTokenResponse = self
            .call("GenerateAccessToken", Method::POST, &path)
            .await?;
        Ok(response.access_token)
    }
}
