use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use super::HttpClusterError;
use super::types::{ApiResponse, ApplyRequest, RemoteResource};
use crate::resource::{LiveResource, ResourceId, ResourceSpec};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

#[derive(Clone)]
pub struct HttpClusterClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClusterClient {
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, HttpClusterError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", token);
        let mut header_value =
            HeaderValue::from_str(&auth_value).map_err(|_| HttpClusterError::Auth {
                message: "Invalid token format".to_string(),
            })?;
        header_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, header_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(HttpClusterError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.base_url
    }

    fn resource_url(&self, id: &ResourceId) -> String {
        format!(
            "{}/resources/{}/{}",
            self.base_url,
            urlencoding::encode(&id.kind),
            urlencoding::encode(&id.name)
        )
    }

    pub async fn get_resource(&self, id: &ResourceId) -> Result<LiveResource, HttpClusterError> {
        let response = self.client.get(self.resource_url(id)).send().await?;
        let remote: RemoteResource = Self::read_result(response, id).await?;
        Ok(remote.into_live(id))
    }

    pub async fn put_resource(&self, spec: &ResourceSpec) -> Result<LiveResource, HttpClusterError> {
        let response = self
            .client
            .put(self.resource_url(&spec.id))
            .json(&ApplyRequest::from(spec))
            .send()
            .await?;
        let remote: RemoteResource = Self::read_result(response, &spec.id).await?;
        Ok(remote.into_live(&spec.id))
    }

    pub async fn delete_resource(&self, id: &ResourceId) -> Result<(), HttpClusterError> {
        let response = self.client.delete(self.resource_url(id)).send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT
            || (status.is_success() && response.content_length() == Some(0))
        {
            return Ok(());
        }
        Self::read_envelope::<serde_json::Value>(response, id).await?;
        Ok(())
    }

    async fn read_result<T: DeserializeOwned>(
        response: Response,
        id: &ResourceId,
    ) -> Result<T, HttpClusterError> {
        Self::read_envelope(response, id)
            .await?
            .result
            .ok_or_else(|| HttpClusterError::Decode {
                message: format!("response for {} has no result", id),
            })
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: Response,
        id: &ResourceId,
    ) -> Result<ApiResponse<T>, HttpClusterError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(HttpClusterError::NotFound {
                resource: id.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(HttpClusterError::RateLimited { retry_after });
        }

        let body: ApiResponse<T> = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(HttpClusterError::Decode {
                    message: format!("Failed to parse response: {}", e),
                });
            }
            Err(_) => {
                return Err(HttpClusterError::Api {
                    status: status.as_u16(),
                    message: status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string(),
                });
            }
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HttpClusterError::Auth {
                message: body
                    .first_error()
                    .unwrap_or("Unknown authentication error")
                    .to_string(),
            });
        }

        if !status.is_success() || !body.success {
            return Err(HttpClusterError::Api {
                status: status.as_u16(),
                message: body.first_error().unwrap_or("Unknown error").to_string(),
            });
        }

        Ok(body)
    }
}

impl std::fmt::Debug for HttpClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClusterClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
