use chrono::Utc;
use colored::*;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};

use crate::cli::{OutputFormat, ProbeArgs};
use crate::logic::client::rest::TableClient;
use crate::logic::config::{LayeredConfig, ProbeConfig};
use crate::logic::error::ProbeError;
use crate::logic::types::{Credentials, ProbeReport, QuerySpec};

/// Connect, run one bounded select, and describe what came back.
pub async fn run_probe(credentials: &Credentials, spec: &QuerySpec) -> Result<ProbeReport, ProbeError> {
    let started = Instant::now();

    let client = TableClient::new(credentials)?;
    let result = client.select(spec).await?;

    let report = ProbeReport {
        endpoint: credentials.endpoint().to_string(),
        table: spec.table.clone(),
        row_count: result.row_count(),
        columns: result.columns(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        checked_at: Utc::now(),
    };
    info!(
        table = %report.table,
        rows = report.row_count,
        elapsed_ms = report.elapsed_ms,
        "probe succeeded"
    );
    Ok(report)
}

pub fn banner_line(endpoint: &str) -> String {
    format!("🔧 Testing connection to {}...", endpoint)
}

pub fn success_line(report: &ProbeReport) -> String {
    let noun = if report.row_count == 1 { "row" } else { "rows" };
    format!(
        "✓ Connection OK! Found {} {} in '{}'",
        report.row_count, noun, report.table
    )
}

/// Only present when at least one row came back
pub fn columns_line(report: &ProbeReport) -> Option<String> {
    report
        .columns
        .as_ref()
        .map(|cols| format!("Columns available: {:?}", cols))
}

pub fn failure_line(err: &ProbeError) -> String {
    format!("✗ Error: {}", err)
}

pub fn outcome_json(outcome: &Result<ProbeReport, ProbeError>) -> serde_json::Result<Value> {
    match outcome {
        Ok(report) => {
            let mut out = Map::new();
            out.insert("status".to_string(), json!("ok"));
            if let Value::Object(fields) = serde_json::to_value(report)? {
                out.extend(fields);
            }
            Ok(Value::Object(out))
        }
        Err(err) => Ok(json!({
            "status": "error",
            "kind": err.kind(),
            "message": err.to_string(),
        })),
    }
}

/// 0 unless the caller opted into `--strict` and the probe failed
pub fn exit_status(failed: bool, strict: bool) -> u8 {
    if failed && strict {
        1
    } else {
        0
    }
}

/// Resolve configuration, probe, print. Failures are printed, not returned;
/// only errors writing the output itself escape.
pub async fn run(config_path: Option<&Path>, args: &ProbeArgs) -> anyhow::Result<ExitCode> {
    let status = run_with_env(config_path, args, |name| std::env::var(name).ok()).await?;
    Ok(ExitCode::from(status))
}

/// `run` with the environment layer read through `lookup`; returns the exit status
pub async fn run_with_env<F>(config_path: Option<&Path>, args: &ProbeArgs, lookup: F) -> anyhow::Result<u8>
where
    F: Fn(&str) -> Option<String>,
{
    let format = args.output_format();
    let layers = LayeredConfig::load(config_path, lookup, ProbeConfig::from(args));

    let effective = layers.as_ref().map(LayeredConfig::effective).unwrap_or_default();
    let shown_endpoint = effective
        .url
        .clone()
        .unwrap_or_else(|| "(no endpoint configured)".to_string());

    match format {
        OutputFormat::Text => println!("{}", banner_line(&shown_endpoint).bright_blue()),
        OutputFormat::Json => eprintln!("{}", banner_line(&shown_endpoint)),
    }

    let outcome = match layers {
        Ok(_) => match effective.resolve() {
            Ok((credentials, spec)) => run_probe(&credentials, &spec).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = &outcome {
        warn!(kind = e.kind(), error = %e, "probe failed");
    }

    match format {
        OutputFormat::Text => print_text(&outcome),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome)?)?),
    }

    Ok(exit_status(outcome.is_err(), args.strict))
}

fn print_text(outcome: &Result<ProbeReport, ProbeError>) {
    match outcome {
        Ok(report) => {
            println!("{}", success_line(report).green().bold());
            if let Some(line) = columns_line(report) {
                println!("{}", line);
            }
        }
        Err(err) => println!("{}", failure_line(err).red().bold()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use warp::http::StatusCode;
    use warp::reply::{json as warp_json, with_status};
    use warp::Filter;

    const KEY: &str = "service-role-test-key";

    /// Minimal PostgREST stand-in: one known table, key check, select/limit.
    fn spawn_fake(rows: Vec<Value>) -> SocketAddr {
        let route = warp::get()
            .and(warp::path!("rest" / "v1" / String))
            .and(warp::header::optional::<String>("apikey"))
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::query::<HashMap<String, String>>())
            .map(
                move |table: String, apikey: Option<String>, auth: Option<String>, query: HashMap<String, String>| {
                    let bearer = format!("Bearer {}", KEY);
                    if apikey.as_deref() != Some(KEY) || auth.as_deref() != Some(bearer.as_str()) {
                        return with_status(
                            warp_json(&json!({
                                "message": "Invalid API key",
                                "hint": "Double check your Supabase `anon` or `service_role` API key."
                            })),
                            StatusCode::UNAUTHORIZED,
                        );
                    }
                    if table != "stories" {
                        return with_status(
                            warp_json(&json!({
                                "code": "42P01",
                                "details": null,
                                "hint": null,
                                "message": format!("relation \"public.{}\" does not exist", table)
                            })),
                            StatusCode::NOT_FOUND,
                        );
                    }

                    let limit = query
                        .get("limit")
                        .and_then(|l| l.parse::<usize>().ok())
                        .unwrap_or(usize::MAX);
                    let select: Vec<String> = query
                        .get("select")
                        .map(|s| s.split(',').map(str::to_string).collect())
                        .unwrap_or_default();

                    let projected: Vec<Value> = rows
                        .iter()
                        .take(limit)
                        .map(|row| {
                            let mut out = serde_json::Map::new();
                            for col in &select {
                                if let Some(v) = row.get(col) {
                                    out.insert(col.clone(), v.clone());
                                }
                            }
                            Value::Object(out)
                        })
                        .collect();
                    with_status(warp_json(&projected), StatusCode::OK)
                },
            );

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    fn creds(addr: SocketAddr, key: &str) -> Credentials {
        Credentials::new(&format!("http://{}", addr), key).unwrap()
    }

    fn default_spec(table: &str) -> QuerySpec {
        QuerySpec::new(table, &["id".to_string()], 1).unwrap()
    }

    fn story_rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "title": "first", "slug": "first"}),
            json!({"id": 2, "title": "second", "slug": "second"}),
        ]
    }

    #[tokio::test]
    async fn test_probe_one_row() {
        let addr = spawn_fake(story_rows());
        let report = run_probe(&creds(addr, KEY), &default_spec("stories")).await.unwrap();

        assert_eq!(report.row_count, 1);
        assert_eq!(report.columns, Some(vec!["id".to_string()]));
        assert_eq!(success_line(&report), "✓ Connection OK! Found 1 row in 'stories'");
        assert_eq!(columns_line(&report).as_deref(), Some("Columns available: [\"id\"]"));
    }

    #[tokio::test]
    async fn test_probe_empty_table() {
        let addr = spawn_fake(Vec::new());
        let report = run_probe(&creds(addr, KEY), &default_spec("stories")).await.unwrap();

        assert_eq!(report.row_count, 0);
        assert_eq!(report.columns, None);
        assert_eq!(success_line(&report), "✓ Connection OK! Found 0 rows in 'stories'");
        assert_eq!(columns_line(&report), None);
    }

    #[tokio::test]
    async fn test_probe_honors_limit_and_columns() {
        let addr = spawn_fake(story_rows());
        let spec = QuerySpec::new("stories", &["id".to_string(), "title".to_string()], 5).unwrap();
        let report = run_probe(&creds(addr, KEY), &spec).await.unwrap();

        assert_eq!(report.row_count, 2);
        assert_eq!(report.columns, Some(vec!["id".to_string(), "title".to_string()]));
    }

    #[tokio::test]
    async fn test_probe_bad_key() {
        let addr = spawn_fake(story_rows());
        let err = run_probe(&creds(addr, "revoked"), &default_spec("stories"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Unauthorized(_)));
        assert!(failure_line(&err).starts_with("✗ Error: authorization rejected: Invalid API key"));
    }

    #[tokio::test]
    async fn test_probe_missing_table() {
        let addr = spawn_fake(story_rows());
        let err = run_probe(&creds(addr, KEY), &default_spec("storiez"))
            .await
            .unwrap_err();

        match &err {
            ProbeError::TableNotFound { table, message } => {
                assert_eq!(table, "storiez");
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_unreachable_endpoint() {
        // Grab a free port, then release it so nothing is listening there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let creds = Credentials::new(&format!("http://127.0.0.1:{}", port), KEY).unwrap();
        let outcome = run_probe(&creds, &default_spec("stories")).await;

        let err = outcome.as_ref().unwrap_err();
        assert!(matches!(err, ProbeError::Network(_)));
        assert_eq!(exit_status(outcome.is_err(), false), 0);
        assert_eq!(exit_status(outcome.is_err(), true), 1);
    }

    #[tokio::test]
    async fn test_probe_malformed_body() {
        let route = warp::path!("rest" / "v1" / "stories").map(|| warp_json(&json!({"rows": []})));
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let err = run_probe(&creds(addr, KEY), &default_spec("stories"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_probe_is_repeatable() {
        let addr = spawn_fake(story_rows());
        let c = creds(addr, KEY);
        let spec = default_spec("stories");

        let first = run_probe(&c, &spec).await.unwrap();
        let second = run_probe(&c, &spec).await.unwrap();
        assert_eq!(first.row_count, second.row_count);
        assert_eq!(first.columns, second.columns);
        assert_eq!(success_line(&first), success_line(&second));
    }

    #[test]
    fn test_outcome_json_shapes() {
        let report = ProbeReport {
            endpoint: "https://abc.supabase.co/".to_string(),
            table: "stories".to_string(),
            row_count: 1,
            columns: Some(vec!["id".to_string()]),
            elapsed_ms: 42,
            checked_at: Utc::now(),
        };
        let ok = outcome_json(&Ok(report)).unwrap();
        assert_eq!(ok["status"], "ok");
        assert_eq!(ok.as_object().unwrap().keys().next().map(String::as_str), Some("status"));
        assert_eq!(ok["elapsed_ms"], 42);
        assert!(ok["checked_at"].is_string());
        assert_eq!(ok["row_count"], 1);
        assert_eq!(ok["columns"], json!(["id"]));

        let err = outcome_json(&Err(ProbeError::Network("connection refused".into()))).unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["kind"], "network");
        assert_eq!(err["message"], "network error: connection refused");
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn args_for(url: String, strict: bool) -> ProbeArgs {
        ProbeArgs {
            url: Some(url),
            key: Some(KEY.to_string()),
            strict,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_unreachable_exits_zero_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let args = args_for(format!("http://127.0.0.1:{}", free_port()), false);

        let code = run_with_env(Some(&path), &args, no_env).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_run_unreachable_strict_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let args = args_for(format!("http://127.0.0.1:{}", free_port()), true);

        let code = run_with_env(Some(&path), &args, no_env).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_run_reachable_strict_exits_zero() {
        let addr = spawn_fake(story_rows());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut args = args_for(format!("http://{}", addr), true);
        args.format = Some(OutputFormat::Json);

        let code = run_with_env(Some(&path), &args, no_env).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_run_without_credentials_is_a_printed_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let code = run_with_env(Some(&path), &ProbeArgs::default(), no_env).await.unwrap();
        assert_eq!(code, 0);

        let strict = ProbeArgs {
            strict: true,
            ..Default::default()
        };
        let code = run_with_env(Some(&path), &strict, no_env).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_run_with_unparsable_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "url = [this is not toml").unwrap();

        let code = run_with_env(Some(&path), &ProbeArgs::default(), no_env).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_run_without_config_path() {
        let args = args_for(format!("http://127.0.0.1:{}", free_port()), false);
        let code = run_with_env(None, &args, no_env).await.unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_banner_line() {
        assert_eq!(
            banner_line("https://abc.supabase.co"),
            "🔧 Testing connection to https://abc.supabase.co..."
        );
    }
}
