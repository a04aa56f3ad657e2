use super::{Filter, Query, RecordStore};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

const REST_PATH: &str = "/rest/v1";

/// PostgREST-backed store, as exposed by a Supabase project.
#[derive(Debug, Clone)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(base_url, api_key, reqwest::Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn table_url(&self, resource: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PATH, resource)
    }

    fn request(&self, method: Method, resource: &str) -> RequestBuilder {
        self.client
            .request(method, self.table_url(resource))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn handle_response(resource: &str, response: Response) -> Result<Vec<Value>> {
        let response = Self::check_status(response).await?;
        let body: Value = response.json().await?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(StoreError::InvalidResponse(format!(
                "expected an array of {} rows, got {}",
                resource, other
            ))),
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(ErrorResponse {
                message: Some(message),
                hint,
            }) => match hint {
                Some(hint) => format!("{} ({})", message, hint),
                None => message,
            },
            _ if text.is_empty() => "Unknown error".to_string(),
            _ => text,
        };
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// PostgREST query parameters for `filter`. Bulk writes must carry at least
/// one condition, so an unconditional filter becomes `id=not.is.null`.
pub(crate) fn filter_params(filter: &Filter, for_write: bool) -> Vec<(String, String)> {
    if filter.is_unconditional() && for_write {
        return vec![("id".to_string(), "not.is.null".to_string())];
    }
    filter
        .conditions()
        .iter()
        .map(|condition| condition.to_rest_pair())
        .collect()
}

pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![(
        "select".to_string(),
        query
            .columns
            .as_deref()
            .map(|c| c.replace(' ', ""))
            .unwrap_or_else(|| "*".to_string()),
    )];
    params.extend(filter_params(&query.filter, false));
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    params
}

/// Total from a `Content-Range` header such as `0-9/42` or `*/0`.
pub(crate) fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl RecordStore for RestStore {
    async fn select(&self, resource: &str, query: &Query) -> Result<Vec<Value>> {
        let response = self
            .request(Method::GET, resource)
            .query(&query_params(query))
            .send()
            .await?;
        Self::handle_response(resource, response).await
    }

    async fn count(&self, resource: &str, filter: &Filter) -> Result<u64> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filter, false));
        let response = self
            .request(Method::HEAD, resource)
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::InvalidResponse("missing Content-Range header".into()))?;
        parse_content_range(range).ok_or_else(|| {
            StoreError::InvalidResponse(format!("unparseable Content-Range: {}", range))
        })
    }

    async fn insert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let response = self
            .request(Method::POST, resource)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        Self::handle_response(resource, response).await
    }

    async fn update(&self, resource: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        let response = self
            .request(Method::PATCH, resource)
            .header("Prefer", "return=representation")
            .query(&filter_params(filter, true))
            .json(&patch)
            .send()
            .await?;
        Self::handle_response(resource, response).await
    }

    async fn delete(&self, resource: &str, filter: &Filter) -> Result<Vec<Value>> {
        let response = self
            .request(Method::DELETE, resource)
            .header("Prefer", "return=representation")
            .query(&filter_params(filter, true))
            .send()
            .await?;
        tracing::debug!(resource, status = %response.status(), "rest delete");
        Self::handle_response(resource, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_trims_trailing_slash() {
        let store = RestStore::new("https://project.supabase.co/", "key");
        assert_eq!(
            store.table_url("applications"),
            "https://project.supabase.co/rest/v1/applications"
        );
    }

    #[test]
    fn test_unconditional_write_gets_guard_filter() {
        assert_eq!(
            filter_params(&Filter::all(), true),
            vec![("id".to_string(), "not.is.null".to_string())]
        );
        assert!(filter_params(&Filter::all(), false).is_empty());
    }

    #[test]
    fn test_query_params() {
        let query = Query::new()
            .filter(Filter::all().eq("application_id", "abc"))
            .order("applied_at", false)
            .columns("id, current_step");
        assert_eq!(
            query_params(&query),
            vec![
                ("select".to_string(), "id,current_step".to_string()),
                ("application_id".to_string(), "eq.abc".to_string()),
                ("order".to_string(), "applied_at.desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("*/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }
}
