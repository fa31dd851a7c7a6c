//! Azure Blob Storage 租约存储
//!
//! 直接调用 Blob REST API（容器 URL + SAS token），多实例部署时共享同一容器。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};

use super::store::{encode_uri_component, BlobStore, StoreError};

const API_VERSION: &str = "2021-08-06";

/// Azure Blob 容器
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    client: Client,
    container_url: String,
    sas_token: String,
}

impl AzureBlobStore {
    /// container_url 形如 `https://{account}.blob.core.windows.net/{container}`；
    /// sas_token 可带或不带前导 `?`
    pub fn new(container_url: impl Into<String>, sas_token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            container_url: container_url.into().trim_end_matches('/').to_string(),
            sas_token: sas_token.into().trim_start_matches('?').to_string(),
        }
    }

    fn url(&self, blob: Option<&str>, query: &str) -> String {
        let mut url = match blob {
            // blob 名称已是 URI 编码后的形式，再编码一次使 `%` 成为名称的一部分
            Some(name) => format!("{}/{}", self.container_url, encode_uri_component(name)),
            None => self.container_url.clone(),
        };
        let mut params: Vec<&str> = Vec::new();
        if !query.is_empty() {
            params.push(query);
        }
        if !self.sas_token.is_empty() {
            params.push(&self.sas_token);
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                chrono::Utc::now()
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            )
    }
}

/// 把 Blob 服务的错误响应映射为 StoreError（依据 x-ms-error-code 头）
pub fn map_error(status: u16, error_code: Option<&str>, blob: &str) -> StoreError {
    match error_code {
        Some("BlobNotFound") => StoreError::BlobNotFound(blob.to_string()),
        Some("LeaseAlreadyPresent") | Some("LeaseIdMissing") => {
            StoreError::LeaseAlreadyPresent(blob.to_string())
        }
        Some("LeaseIdMismatchWithLeaseOperation") | Some("LeaseIdMismatchWithBlobOperation") => {
            StoreError::LeaseIdMismatch(blob.to_string())
        }
        Some("LeaseNotPresentWithLeaseOperation") => StoreError::LeaseNotPresent(blob.to_string()),
        Some(code) => StoreError::Backend(format!("HTTP {} {}", status, code)),
        None if status == 404 => StoreError::BlobNotFound(blob.to_string()),
        None => StoreError::Backend(format!("HTTP {}", status)),
    }
}

fn error_from_response(resp: &reqwest::Response, blob: &str) -> StoreError {
    let code = resp
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok());
    map_error(resp.status().as_u16(), code, blob)
}

fn network(e: reqwest::Error) -> StoreError {
    StoreError::Backend(format!("network error: {}", e))
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn create_container_if_not_exists(&self) -> Result<(), StoreError> {
        let resp = self
            .request(Method::PUT, self.url(None, "restype=container"))
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(network)?;
        if resp.status().is_success() || resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Err(error_from_response(&resp, ""))
    }

    async fn acquire_lease(&self, blob: &str, duration_secs: u32) -> Result<String, StoreError> {
        let resp = self
            .request(Method::PUT, self.url(Some(blob), "comp=lease"))
            .header("x-ms-lease-action", "acquire")
            .header("x-ms-lease-duration", duration_secs.to_string())
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(network)?;
        if !resp.status().is_success() {
            return Err(error_from_response(&resp, blob));
        }
        resp.headers()
            .get("x-ms-lease-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::Backend("LeaseId is undefined. Failed to acquire lease.".to_string())
            })
    }

    async fn release_lease(&self, blob: &str, lease_id: &str) -> Result<(), StoreError> {
        let resp = self
            .request(Method::PUT, self.url(Some(blob), "comp=lease"))
            .header("x-ms-lease-action", "release")
            .header("x-ms-lease-id", lease_id)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(network)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(&resp, blob))
        }
    }

    async fn blob_exists(&self, blob: &str) -> Result<bool, StoreError> {
        let resp = self
            .request(Method::HEAD, self.url(Some(blob), ""))
            .send()
            .await
            .map_err(network)?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(error_from_response(&resp, blob)),
        }
    }

    async fn create_empty_blob(&self, blob: &str) -> Result<(), StoreError> {
        let resp = self
            .request(Method::PUT, self.url(Some(blob), ""))
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Length", "0")
            .body(Vec::<u8>::new())
            .send()
            .await
            .map_err(network)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(&resp, blob))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error_codes() {
        assert_eq!(
            map_error(404, Some("BlobNotFound"), "k"),
            StoreError::BlobNotFound("k".into())
        );
        assert_eq!(
            map_error(409, Some("LeaseAlreadyPresent"), "k"),
            StoreError::LeaseAlreadyPresent("k".into())
        );
        // 在有租约的 blob 上写入
        assert_eq!(
            map_error(412, Some("LeaseIdMissing"), "k"),
            StoreError::LeaseAlreadyPresent("k".into())
        );
        assert_eq!(
            map_error(409, Some("LeaseIdMismatchWithLeaseOperation"), "k"),
            StoreError::LeaseIdMismatch("k".into())
        );
        assert_eq!(
            map_error(409, Some("LeaseNotPresentWithLeaseOperation"), "k"),
            StoreError::LeaseNotPresent("k".into())
        );
        assert_eq!(
            map_error(403, Some("AuthenticationFailed"), "k"),
            StoreError::Backend("HTTP 403 AuthenticationFailed".into())
        );
        assert_eq!(map_error(404, None, "k"), StoreError::BlobNotFound("k".into()));
        assert_eq!(map_error(500, None, "k"), StoreError::Backend("HTTP 500".into()));
    }

    #[test]
    fn test_url_building() {
        let store = AzureBlobStore::new(
            "https://acct.blob.core.windows.net/leases/",
            "?sv=2021&sig=abc",
        );
        assert_eq!(
            store.url(Some("msteams%2Fb%2Fconversations%2Fc"), "comp=lease"),
            "https://acct.blob.core.windows.net/leases/msteams%252Fb%252Fconversations%252Fc?comp=lease&sv=2021&sig=abc"
        );
        assert_eq!(
            store.url(None, "restype=container"),
            "https://acct.blob.core.windows.net/leases?restype=container&sv=2021&sig=abc"
        );
        let no_sas = AzureBlobStore::new("http://127.0.0.1:10000/dev/leases", "");
        assert_eq!(no_sas.url(Some("k"), ""), "http://127.0.0.1:10000/dev/leases/k");
    }
}
