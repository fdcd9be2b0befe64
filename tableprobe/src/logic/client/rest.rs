use reqwest::header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::error::Error as _;
use tracing::debug;
use url::Url;

use crate::logic::client::url_utils::build_select_url;
use crate::logic::error::ProbeError;
use crate::logic::types::{Credentials, QueryResult, QuerySpec};

/// Error body PostgREST sends alongside non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    hint: Option<String>,
}

/// HTTP client bound to one project endpoint, authorized with a static key
pub struct TableClient {
    http: Client,
    endpoint: Url,
}

impl TableClient {
    pub fn new(credentials: &Credentials) -> Result<Self, ProbeError> {
        let key = credentials.service_key();
        let invalid_key = |_: InvalidHeaderValue| {
            ProbeError::InvalidConfig("service key contains characters not allowed in an HTTP header".to_string())
        };

        let mut apikey = HeaderValue::from_str(key).map_err(invalid_key)?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid_key)?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), apikey);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("tableprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: credentials.endpoint().clone(),
        })
    }

    /// Run one bounded select and return whatever rows came back.
    pub async fn select(&self, spec: &QuerySpec) -> Result<QueryResult, ProbeError> {
        let url = build_select_url(&self.endpoint, spec)?;
        debug!(url = %url, "sending select");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Network(describe_transport(&e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProbeError::Network(describe_transport(&e)))?;
        debug!(status = status.as_u16(), bytes = body.len(), "received response");

        if !status.is_success() {
            return Err(classify_failure(status, &body, &spec.table));
        }

        QueryResult::from_json(&body)
    }
}

/// reqwest's top-level message is generic; the useful part (DNS, refused,
/// TLS) lives further down the source chain.
fn describe_transport(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Map a non-2xx response onto the error taxonomy.
pub(crate) fn classify_failure(status: StatusCode, body: &str, table: &str) -> ProbeError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();

    let mut message = match parsed.message {
        Some(m) if !m.is_empty() => m,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
    };
    if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
        message = format!("{} (hint: {})", message, hint);
    }

    match parsed.code.as_deref() {
        Some("42P01") | Some("PGRST205") => {
            return ProbeError::TableNotFound {
                table: table.to_string(),
                message,
            }
        }
        Some("42703") => return ProbeError::ColumnNotFound(message),
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProbeError::Unauthorized(message),
        StatusCode::NOT_FOUND => ProbeError::TableNotFound {
            table: table.to_string(),
            message,
        },
        _ => ProbeError::Service {
            status: status.as_u16(),
            message,
        },
    }
}
