// ABOUTME: HTTP adapter for a REST query service - executes plans and stores documents
// ABOUTME: Implements QueryEngine over /v1/rows and DocumentBackend over /v1/documents

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::models::RowsResponse;
use crate::engine::{PointInTime, QueryEngine, QueryResult};
use crate::error::{BackendError, EngineError};
use crate::query::Plan;
use crate::watermark::{DocumentBackend, Permission};

const ROWS_PATH: &str = "v1/rows";
const DOCUMENTS_PATH: &str = "v1/documents";

/// Response header carrying the snapshot a rows request was evaluated at.
pub const TIMESTAMP_HEADER: &str = "ML-Effective-Timestamp";

/// Content type for pipeline query text.
pub const DSL_CONTENT_TYPE: &str = "application/vnd.marklogic.querydsl+javascript";

#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // Joining relative paths needs a trailing slash on the base
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("Invalid query service URL: {}", base_url))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/v1/rows[?timestamp=<token>]`
    pub fn rows_url(&self, at: Option<PointInTime>) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join(ROWS_PATH)?;
        if let Some(token) = at {
            url.query_pairs_mut()
                .append_pair("timestamp", &token.to_string());
        }
        Ok(url)
    }

    /// `{base}/v1/documents?uri=<uri>&perm:<role>=<cap>...&collection=<c>...`
    pub fn documents_url(
        &self,
        uri: &str,
        permissions: &str,
        collections: &[String],
    ) -> Result<Url, BackendError> {
        let grants = Permission::parse_list(permissions).map_err(BackendError::Permissions)?;
        let mut url = self
            .base_url
            .join(DOCUMENTS_PATH)
            .map_err(|_| BackendError::InvalidUri(uri.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uri", uri);
            for grant in &grants {
                query.append_pair(&format!("perm:{}", grant.role), &grant.capability);
            }
            for collection in collections {
                query.append_pair("collection", collection);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }
}

async fn status_and_body(response: Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}

#[async_trait]
impl QueryEngine for RestClient {
    async fn execute(&self, plan: &Plan, at: Option<PointInTime>) -> Result<QueryResult, EngineError> {
        let url = self.rows_url(at)?;
        let request = match plan {
            Plan::Dsl(text) => self
                .client
                .post(url)
                .header(CONTENT_TYPE, DSL_CONTENT_TYPE)
                .body(text.clone()),
            Plan::Serialized(tree) => self.client.post(url).json(tree),
        };

        let response = self
            .authorize(request)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(EngineError::Status { status, body });
        }

        let token = match response
            .headers()
            .get(TIMESTAMP_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            Some(raw) => raw.parse::<PointInTime>().map_err(|e| {
                EngineError::Decode(format!("invalid {} header '{}': {}", TIMESTAMP_HEADER, raw, e))
            })?,
            // A pinned request was evaluated at the requested token
            None => at.ok_or_else(|| {
                EngineError::Decode(format!("response has no {} header", TIMESTAMP_HEADER))
            })?,
        };

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(QueryResult {
                rows: Vec::new(),
                token,
            });
        }

        let body = response.text().await?;
        let parsed = RowsResponse::parse(&body).map_err(|e| EngineError::Decode(e.to_string()))?;
        tracing::trace!("Rows response at {}: {} rows", token, parsed.rows.len());

        Ok(QueryResult {
            rows: parsed.rows,
            token,
        })
    }
}

#[async_trait]
impl DocumentBackend for RestClient {
    async fn write_document(
        &self,
        uri: &str,
        permissions: &str,
        collections: &[String],
        body: &Value,
    ) -> Result<(), BackendError> {
        let url = self.documents_url(uri, permissions, collections)?;
        let response = self
            .authorize(self.client.put(url).json(body))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(BackendError::Status { status, body });
        }
        Ok(())
    }

    async fn read_document(&self, uri: &str) -> Result<Option<String>, BackendError> {
        let url = self.documents_url(uri, "", &[])?;
        let response = self
            .authorize(self.client.get(url).header(ACCEPT, "application/json"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let (status, body) = status_and_body(response).await;
            return Err(BackendError::Status { status, body });
        }
        Ok(Some(response.text().await?))
    }
}
