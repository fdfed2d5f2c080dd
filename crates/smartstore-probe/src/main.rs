//! smartstore-probe: check that the back office answers.
//!
//! Runs `testConnection`, optionally signs in, and optionally issues one
//! more operation, printing each envelope as JSON. Exits non-zero on the
//! first failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};

use smartstore_rpc::{CallOptions, ClientConfig, Envelope, Params, RpcClient, RpcError, TransportKind};
use smartstore_telemetry::{init_logging, TelemetryConfig};

/// SmartStore back-office probe
#[derive(Parser, Debug)]
#[command(name = "smartstore-probe")]
#[command(about = "Probe the SmartStore back office over the RPC transport")]
struct Args {
    /// TOML configuration file (SMARTSTORE_* variables still apply on top)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend endpoint URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Channel: http or callback
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Per-attempt deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Sign in as this user after the connection test
    #[arg(short, long, requires = "password")]
    username: Option<String>,

    /// Password for --username
    #[arg(short, long)]
    password: Option<String>,

    /// Operation to issue after signing in
    #[arg(long)]
    call: Option<String>,

    /// JSON object of parameters for --call
    #[arg(long, default_value = "{}")]
    data: String,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let base = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        let mut config = base.with_overrides(|key| std::env::var(key).ok())?;

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(kind) = self.transport {
            config.transport = kind;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeouts.default = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    fn call_params(&self) -> anyhow::Result<Params> {
        let value: Value = serde_json::from_str(&self.data).context("--data is not JSON")?;
        match value {
            Value::Object(map) => Ok(map),
            other => bail!("--data must be a JSON object, got {}", other),
        }
    }
}

fn print_envelope(step: &str, envelope: &Envelope) {
    println!("{}: {}", step, envelope.to_value());
}

fn report(step: &str, err: &RpcError) {
    error!(step = step, code = %err.kind(), "Probe failed: {}", err);
    eprintln!("{}: {} ({})", step, err, err.kind());
}

async fn run(args: &Args) -> anyhow::Result<bool> {
    let config = args.client_config()?;
    let params = match &args.call {
        Some(_) => Some(args.call_params()?),
        None => None,
    };

    info!(
        endpoint = %config.endpoint,
        transport = ?config.transport,
        "Probing back office"
    );
    let client = RpcClient::from_config(config)?;

    match client.test_connection().await {
        Ok(envelope) => print_envelope("testConnection", &envelope),
        Err(e) => {
            report("testConnection", &e);
            return Ok(false);
        }
    }

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        match client.login(username, password).await {
            Ok(envelope) => print_envelope("login", &envelope),
            Err(e) => {
                report("login", &e);
                return Ok(false);
            }
        }
    }

    if let (Some(operation), Some(params)) = (&args.call, &params) {
        match client.call(operation, params, CallOptions::default()).await {
            Ok(envelope) => print_envelope(operation, &envelope),
            Err(e) => {
                report(operation, &e);
                return Ok(false);
            }
        }
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if args.verbose {
        telemetry = telemetry.with_level("debug");
    }
    if let Err(e) = init_logging(&telemetry) {
        eprintln!("Warning: {}", e);
    }

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("smartstore-probe").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "--endpoint",
            "http://backoffice.local/exec",
            "--transport",
            "callback",
            "--timeout-ms",
            "1500",
        ]);
        let config = args.client_config().unwrap();
        assert_eq!(config.endpoint, "http://backoffice.local/exec");
        assert_eq!(config.transport, TransportKind::Callback);
        assert_eq!(config.timeouts.default, Duration::from_millis(1500));
    }

    #[test]
    fn test_username_requires_password() {
        let result = Args::try_parse_from(["smartstore-probe", "--username", "admin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_call_params_must_be_object() {
        let args = parse(&["--call", "getRecentSales", "--data", r#"{"limit": 5}"#]);
        assert_eq!(args.call_params().unwrap().get("limit"), Some(&Value::from(5)));

        let args = parse(&["--call", "getRecentSales", "--data", "[1]"]);
        assert!(args.call_params().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = parse(&["--timeout-ms", "0"]);
        assert!(args.client_config().is_err());
    }
}
