//! reqwest-backed [`RelayClient`] for the hush-relay HTTP interface.

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use reqwest::StatusCode;

use hush_proto::v1::{KeyHistoryV1, PublishKeyRequestV1, PublishedKeyRecordV1};
use hush_proto::validation::validate_identifier;

use crate::relay::{RelayClient, RelayError};

const PROTOBUF: &str = "application/x-protobuf";

#[derive(Clone)]
pub struct HttpRelayClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| RelayError::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl std::fmt::Debug for HttpRelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Ids go into URL paths unencoded, so refuse anything the relay would.
fn segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str, RelayError> {
    validate_identifier(field, value).map_err(|_| RelayError::Rejected { status: 400 })?;
    Ok(value)
}

fn transport(e: reqwest::Error) -> RelayError {
    RelayError::Http(e.to_string())
}

/// Maps a non-success status to a relay error without reading key material
/// into the message.
async fn status_error(resp: reqwest::Response) -> RelayError {
    let status = resp.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RelayError::Unavailable(format!("status={}", status))
    } else if status.is_client_error() {
        RelayError::Rejected { status: status.as_u16() }
    } else {
        RelayError::BadResponse(format!("status={} body={:?}", status, resp.text().await.ok()))
    }
}

async fn decode<M: Message + Default>(resp: reqwest::Response) -> Result<M, RelayError> {
    let body = resp.bytes().await.map_err(transport)?;
    M::decode(body).map_err(|e| RelayError::Decode(e.to_string()))
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn publish_key(
        &self,
        user_id: &str,
        device_id: &str,
        request: &PublishKeyRequestV1,
    ) -> Result<PublishedKeyRecordV1, RelayError> {
        let resp = self
            .client
            .put(self.url(&format!(
                "/keys/{}/{}",
                segment("user_id", user_id)?,
                segment("device_id", device_id)?
            )))
            .header(reqwest::header::CONTENT_TYPE, PROTOBUF)
            .body(request.encode_to_vec())
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => decode(resp).await,
            _ => Err(status_error(resp).await),
        }
    }

    async fn fetch_current(&self, user_id: &str) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
        let resp = self
            .client
            .get(self.url(&format!("/keys/{}", segment("user_id", user_id)?)))
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK => decode(resp).await.map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(resp).await),
        }
    }

    async fn fetch_device_current(
        &self,
        user_id: &str,
        device_id: &str,
    ) -> Result<Option<PublishedKeyRecordV1>, RelayError> {
        let resp = self
            .client
            .get(self.url(&format!(
                "/keys/{}/{}",
                segment("user_id", user_id)?,
                segment("device_id", device_id)?
            )))
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK => decode(resp).await.map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(resp).await),
        }
    }

    async fn fetch_history(&self, user_id: &str, device_id: &str) -> Result<KeyHistoryV1, RelayError> {
        let resp = self
            .client
            .get(self.url(&format!(
                "/keys/{}/{}/history",
                segment("user_id", user_id)?,
                segment("device_id", device_id)?
            )))
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK => decode(resp).await,
            StatusCode::NOT_FOUND => Ok(KeyHistoryV1::default()),
            _ => Err(status_error(resp).await),
        }
    }

    async fn put_blob(&self, blob_id: &str, data: Bytes) -> Result<(), RelayError> {
        let resp = self
            .client
            .put(self.url(&format!("/blobs/{}", segment("blob_id", blob_id)?)))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            _ => Err(status_error(resp).await),
        }
    }

    async fn get_blob(&self, blob_id: &str) -> Result<Option<Bytes>, RelayError> {
        let resp = self
            .client
            .get(self.url(&format!("/blobs/{}", segment("blob_id", blob_id)?)))
            .send()
            .await
            .map_err(transport)?;

        match resp.status() {
            StatusCode::OK => resp.bytes().await.map(Some).map_err(transport),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(status_error(resp).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpRelayClient::new("http://relay.local:8088/").unwrap();
        assert_eq!(client.url("/keys/alice"), "http://relay.local:8088/keys/alice");
    }

    #[tokio::test]
    async fn test_path_segments_validated_before_request() {
        // nothing listens here; a validated request would fail as transport
        let client = HttpRelayClient::new("http://127.0.0.1:9").unwrap();
        assert_eq!(
            client.fetch_current("..").await.unwrap_err(),
            RelayError::Rejected { status: 400 }
        );
        assert_eq!(
            client.fetch_history("alice", "a/b").await.unwrap_err(),
            RelayError::Rejected { status: 400 }
        );
        assert_eq!(
            client.get_blob(".").await.unwrap_err(),
            RelayError::Rejected { status: 400 }
        );
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transient() {
        // port 9 (discard) on localhost is closed in test environments
        let client = HttpRelayClient::new("http://127.0.0.1:9").unwrap();
        let err = client.fetch_current("alice").await.unwrap_err();
        assert!(err.is_transient());
    }
}
