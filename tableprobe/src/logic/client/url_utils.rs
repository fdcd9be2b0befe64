/// Utility functions for building PostgREST request URLs
/// Accepts either the bare project URL or one that already points at `/rest/v1`
use url::Url;

use crate::logic::error::ProbeError;
use crate::logic::types::QuerySpec;

const REST_PREFIX: [&str; 2] = ["rest", "v1"];

/// Build `{endpoint}/rest/v1/{table}?select={columns}&limit={limit}`
///
/// Any query string or fragment on the endpoint is dropped, and a trailing
/// slash on the endpoint does not produce an empty path segment.
pub fn build_select_url(endpoint: &Url, spec: &QuerySpec) -> Result<Url, ProbeError> {
    let mut url = endpoint.clone();
    url.set_query(None);
    url.set_fragment(None);

    let already_rest = endpoint
        .path()
        .trim_end_matches('/')
        .ends_with("/rest/v1");

    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            ProbeError::InvalidConfig(format!("endpoint '{}' cannot be used as a base URL", endpoint))
        })?;
        segments.pop_if_empty();
        if !already_rest {
            segments.extend(REST_PREFIX);
        }
        segments.push(&spec.table);
    }

    url.query_pairs_mut()
        .append_pair("select", &spec.columns.join(","))
        .append_pair("limit", &spec.limit.to_string());

    Ok(url)
}
