//! REST client for the row-oriented remote record store.

use async_trait::async_trait;
use chrono::SecondsFormat;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::sync::RwLock;

use mizanflow_core::sync::{
    RemoteFilter, RemoteResult, RemoteStore, TableName, OWNER_COLUMN, UPDATED_AT_COLUMN,
};

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};

const REST_PATH: &str = "rest/v1";
const MAX_LOG_BODY_CHARS: usize = 512;

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl PostgrestError {
    fn describe(&self) -> String {
        let mut text = match &self.code {
            Some(code) => format!("{}: {}", code, self.message),
            None => self.message.clone(),
        };
        if let Some(details) = self.details.as_deref().filter(|d| !d.is_empty()) {
            text.push_str(" (");
            text.push_str(details);
            text.push(')');
        }
        text
    }
}

/// Client for the remote tables.
///
/// Requests carry the project API key and, once a user signs in, the user's
/// access token. Row-level security on the server scopes what each token sees.
#[derive(Debug)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RemoteError::auth("API key is empty"));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            access_token: RwLock::new(config.access_token),
        })
    }

    /// Replaces the user token used for `Authorization`. `None` reverts to the API key.
    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn bearer(&self) -> String {
        let token = match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.unwrap_or_else(|| self.api_key.clone())
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| RemoteError::auth("Invalid API key format"))?;
        headers.insert("apikey", api_key);

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.bearer()))
            .map_err(|_| RemoteError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn table_url(&self, table: TableName) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, table.as_str())
    }

    /// Builds the query string for a select. Filters use PostgREST operators.
    fn select_query(filter: &RemoteFilter) -> String {
        let mut query = vec!["select=*".to_string()];
        if let Some(owner_id) = &filter.owner_id {
            query.push(format!(
                "{}=eq.{}",
                OWNER_COLUMN,
                urlencoding::encode(owner_id)
            ));
        }
        if let Some(watermark) = filter.updated_after {
            let ts = watermark.to_rfc3339_opts(SecondsFormat::Micros, true);
            query.push(format!("{}=gt.{}", UPDATED_AT_COLUMN, urlencoding::encode(&ts)));
        }
        query.join("&")
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Remote] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        warn!("[Remote] Response error ({}): {}", status, preview);
    }

    /// Reads the body and turns non-success statuses into [`RemoteError::Api`].
    async fn check_response(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if status.is_success() {
            return Ok(body);
        }
        let message = match serde_json::from_str::<PostgrestError>(&body) {
            Ok(error) => error.describe(),
            Err(_) if body.is_empty() => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
            Err(_) => format!("Request failed: {}", body),
        };
        Err(RemoteError::api(status.as_u16(), message))
    }

    pub async fn select_rows(
        &self,
        table: TableName,
        filter: &RemoteFilter,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}?{}", self.table_url(table), Self::select_query(filter));
        debug!("[Remote] GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        let body = Self::check_response(response).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn upsert_row(&self, table: TableName, record: &serde_json::Value) -> Result<()> {
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RemoteError::invalid_request("record has no id"))?;
        let url = format!("{}?on_conflict=id", self.table_url(table));
        debug!("[Remote] POST {} id={}", url, id);

        let mut headers = self.headers()?;
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(record)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    pub async fn delete_row(&self, table: TableName, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(RemoteError::invalid_request("delete needs a record id"));
        }
        let url = format!("{}?id=eq.{}", self.table_url(table), urlencoding::encode(id));
        debug!("[Remote] DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for RemoteClient {
    async fn select(
        &self,
        table: TableName,
        filter: &RemoteFilter,
    ) -> RemoteResult<Vec<serde_json::Value>> {
        Ok(self.select_rows(table, filter).await?)
    }

    async fn upsert(&self, table: TableName, record: &serde_json::Value) -> RemoteResult<()> {
        Ok(self.upsert_row(table, record).await?)
    }

    async fn delete(&self, table: TableName, id: &str) -> RemoteResult<()> {
        Ok(self.delete_row(table, id).await?)
    }
}
