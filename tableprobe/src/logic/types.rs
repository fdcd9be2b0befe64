use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use url::Url;

use crate::logic::error::ProbeError;

/// One returned row: column name -> value, in the order the service sent them
pub type Record = Map<String, Value>;

/// Endpoint + service key. Never prints the key in full.
#[derive(Clone)]
pub struct Credentials {
    endpoint: Url,
    service_key: String,
}

impl Credentials {
    pub fn new(endpoint: &str, service_key: &str) -> Result<Self, ProbeError> {
        let endpoint = endpoint.trim();
        let service_key = service_key.trim();

        if endpoint.is_empty() {
            return Err(ProbeError::InvalidConfig(
                "missing endpoint URL (set SUPABASE_URL or pass --url)".to_string(),
            ));
        }
        if service_key.is_empty() {
            return Err(ProbeError::InvalidConfig(
                "missing service key (set SUPABASE_SERVICE_KEY or pass --key)".to_string(),
            ));
        }

        let endpoint = parse_endpoint(endpoint)?;

        Ok(Self {
            endpoint,
            service_key: service_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }
}

/// An absolute http(s) URL that table paths can be appended to
pub fn parse_endpoint(raw: &str) -> Result<Url, ProbeError> {
    let raw = raw.trim();
    let endpoint = Url::parse(raw)
        .map_err(|e| ProbeError::InvalidConfig(format!("endpoint '{}' is not a valid URL: {}", raw, e)))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ProbeError::InvalidConfig(format!(
            "endpoint must use http or https, got '{}'",
            endpoint.scheme()
        )));
    }
    if endpoint.cannot_be_a_base() {
        return Err(ProbeError::InvalidConfig(format!(
            "endpoint '{}' cannot be used as a base URL",
            endpoint
        )));
    }
    Ok(endpoint)
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint.as_str())
            .field("service_key", &redact(&self.service_key))
            .finish()
    }
}

/// Keep just enough of a secret to tell two keys apart.
pub fn redact(secret: &str) -> String {
    if secret.chars().count() <= 6 {
        "***".to_string()
    } else {
        let head: String = secret.chars().take(6).collect();
        format!("{}…", head)
    }
}

/// What to read: `select=<columns>&limit=<limit>` against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub table: String,
    pub columns: Vec<String>,
    pub limit: u32,
}

impl QuerySpec {
    pub fn new(table: &str, columns: &[String], limit: u32) -> Result<Self, ProbeError> {
        let table = table.trim();
        if table.is_empty() {
            return Err(ProbeError::InvalidConfig("table name must not be empty".to_string()));
        }

        let columns: Vec<String> = columns
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(ProbeError::InvalidConfig("at least one column must be selected".to_string()));
        }

        if limit == 0 {
            return Err(ProbeError::InvalidConfig("row limit must be at least 1".to_string()));
        }

        Ok(Self {
            table: table.to_string(),
            columns,
            limit,
        })
    }
}

/// Rows returned by a single select
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Record>,
}

impl QueryResult {
    /// Parse a PostgREST response body, which must be a JSON array of objects.
    pub fn from_json(body: &str) -> Result<Self, ProbeError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ProbeError::MalformedResponse(format!("body is not JSON: {}", e)))?;

        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(ProbeError::MalformedResponse(format!(
                    "expected a JSON array of rows, got {}",
                    json_kind(&other)
                )))
            }
        };

        let rows = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(ProbeError::MalformedResponse(format!(
                    "row {} is {}, not an object",
                    i,
                    json_kind(&other)
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names present in the first row, if any row came back
    pub fn columns(&self) -> Option<Vec<String>> {
        self.rows.first().map(|r| r.keys().cloned().collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Successful probe outcome
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub endpoint: String,
    pub table: String,
    pub row_count: usize,
    pub columns: Option<Vec<String>>,
    pub elapsed_ms: u64,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_require_both_fields() {
        let err = Credentials::new("", "key").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidConfig(_)));

        let err = Credentials::new("https://abc.supabase.co", "   ").unwrap_err();
        assert!(matches!(err, ProbeError::InvalidConfig(_)));
    }

    #[test]
    fn test_credentials_reject_bad_urls() {
        assert!(Credentials::new("not a url", "key").is_err());
        assert!(Credentials::new("ftp://abc.supabase.co", "key").is_err());
        assert!(Credentials::new("mailto:someone@example.com", "key").is_err());
    }

    #[test]
    fn test_credentials_accept_https_and_http() {
        let c = Credentials::new(" https://abc.supabase.co ", "secret-key").unwrap();
        assert_eq!(c.endpoint().host_str(), Some("abc.supabase.co"));
        assert_eq!(c.service_key(), "secret-key");

        assert!(Credentials::new("http://127.0.0.1:54321", "secret-key").is_ok());
    }

    #[test]
    fn test_debug_never_shows_full_key() {
        let c = Credentials::new("https://abc.supabase.co", "eyJhbGciOiJIUzI1NiJ9.payload.sig").unwrap();
        let shown = format!("{:?}", c);
        assert!(shown.contains("eyJhbG…"));
        assert!(!shown.contains("payload"));
    }

    #[test]
    fn test_redact_short_secret() {
        assert_eq!(redact("abc"), "***");
        assert_eq!(redact("abcdefgh"), "abcdef…");
    }

    #[test]
    fn test_query_spec_validation() {
        let cols = vec!["id".to_string()];
        assert!(QuerySpec::new("", &cols, 1).is_err());
        assert!(QuerySpec::new("stories", &[], 1).is_err());
        assert!(QuerySpec::new("stories", &[" ".to_string()], 1).is_err());
        assert!(QuerySpec::new("stories", &cols, 0).is_err());

        let spec = QuerySpec::new(" stories ", &[" id ".to_string(), "title".to_string()], 1).unwrap();
        assert_eq!(spec.table, "stories");
        assert_eq!(spec.columns, vec!["id", "title"]);
    }

    #[test]
    fn test_query_result_columns_follow_first_row() {
        let result = QueryResult::from_json(r#"[{"id": 7, "title": "x"}, {"id": 8}]"#).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.columns(), Some(vec!["id".to_string(), "title".to_string()]));
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::from_json("[]").unwrap();
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.columns(), None);
    }

    #[test]
    fn test_query_result_rejects_non_rows() {
        let err = QueryResult::from_json(r#"{"id": 1}"#).unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));

        let err = QueryResult::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));

        let err = QueryResult::from_json("<html>").unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));
    }
}
