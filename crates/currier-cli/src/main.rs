//! Currier CLI: a thin binary over `currier-core`'s public operations.
//!
//! Subcommands: `proxy` (C6/C5/C7 accept loop), `send` (one-shot C3 call),
//! `run` (C4 collection runner), `curl` (curl-command import).

mod curl_import;

use clap::{Parser, Subcommand};
use currier_core::model::BodyConfig;
use currier_core::runner::no_cancellation;
use currier_core::{Collection, Environment, Executor, ProxyCore, ProxyCoreConfig, RequestDefinition, Runner, Scope};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "currier")]
#[command(author, version, about = "Scripted HTTP client and intercepting HTTPS proxy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log everything at debug level
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the intercepting proxy.
    Proxy {
        #[arg(long, default_value = "8080", env = "CURRIER_PORT")]
        port: u16,

        /// Directory holding the root CA and leaf certificate cache.
        #[arg(long, default_value = "./.currier", env = "CURRIER_DATA_DIR")]
        data_dir: PathBuf,

        /// Write the root CA certificate (PEM) to PATH and exit without
        /// starting the listener.
        #[arg(long, value_name = "PATH")]
        export_ca: Option<PathBuf>,

        /// Capture ring capacity.
        #[arg(long, default_value = "1000")]
        buffer: usize,

        /// Host glob to intercept (TLS terminate + capture). Repeatable.
        #[arg(long = "include")]
        include: Vec<String>,

        /// Host glob to splice opaquely (never intercept). Repeatable.
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Globally enable/disable HTTPS interception (`--https=false` splices
        /// every CONNECT tunnel through untouched, regardless of include/exclude).
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        https: bool,
    },

    /// Send a single request through the executor.
    Send {
        method: String,
        url: String,

        #[arg(long = "header", short = 'H', value_name = "K:V")]
        headers: Vec<String>,

        #[arg(long)]
        body: Option<String>,

        /// Print the response as JSON instead of a human-readable summary.
        #[arg(long)]
        json: bool,
    },

    /// Run every request in a saved collection.
    Run {
        /// Path to a collection YAML document.
        collection: PathBuf,

        /// Path to an environment YAML document.
        #[arg(long = "env")]
        env: Option<PathBuf>,

        /// Print the run summary as JSON instead of a human-readable report.
        #[arg(long)]
        json: bool,
    },

    /// Import a curl command into a one-request collection and print it.
    #[command(trailing_var_arg = true)]
    Curl {
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install default crypto provider"))?;

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Proxy { port, data_dir, export_ca, buffer, include, exclude, https } => {
            runtime.block_on(run_proxy(port, data_dir, export_ca, buffer, include, exclude, https, cli.verbose))
        }
        Commands::Send { method, url, headers, body, json } => {
            runtime.block_on(run_send(method, url, headers, body, json))
        }
        Commands::Run { collection, env, json } => runtime.block_on(run_collection(collection, env, json)),
        Commands::Curl { args } => run_curl(args),
    }
}

async fn run_proxy(
    port: u16,
    data_dir: PathBuf,
    export_ca: Option<PathBuf>,
    buffer: usize,
    include: Vec<String>,
    exclude: Vec<String>,
    https: bool,
    verbose: bool,
) -> Result<(), anyhow::Error> {
    let listen_addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let core = ProxyCore::new(ProxyCoreConfig {
        listen_addr,
        data_dir,
        include_hosts: include,
        exclude_hosts: exclude,
        capture_capacity: buffer,
        https_enabled: https,
    })?;

    if let Some(path) = export_ca {
        std::fs::write(&path, core.root_cert_pem())?;
        info!("wrote root CA certificate to {:?}", path);
        return Ok(());
    }

    if verbose {
        let ring = core.capture_ring();
        let mut handle = ring.subscribe();
        tokio::spawn(async move {
            while let Some(capture) = handle.receiver.recv().await {
                info!(
                    "{} {}{} -> {:?}",
                    capture.method, capture.host, capture.path, capture.response_status
                );
            }
        });
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(true);
    });

    core.run(rx).await
}

async fn run_send(
    method: String,
    url: String,
    headers: Vec<String>,
    body: Option<String>,
    json: bool,
) -> Result<(), anyhow::Error> {
    let headers = headers
        .iter()
        .map(|h| {
            h.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| anyhow::anyhow!("malformed header: {h}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let request = RequestDefinition {
        id: uuid::Uuid::new_v4(),
        name: "send".to_string(),
        protocol: "http".to_string(),
        method,
        url,
        headers,
        query: vec![],
        body: body.map(|content| BodyConfig::Raw { content, content_type: "text/plain".to_string() }),
        auth: None,
        pre_request_script: None,
        post_response_script: None,
        tests: vec![],
        timeout_ms: None,
        verify_tls: None,
        follow_redirects: true,
        max_redirects: 10,
    };

    let executor = Executor::new(true, Duration::from_secs(30));
    let scope = Scope::new();
    let response = executor.send(&request, &scope).await?;

    if json {
        let out = serde_json::json!({
            "status": response.status,
            "headers": response.headers,
            "body": String::from_utf8_lossy(&response.body),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("HTTP {}", response.status);
        for (k, v) in &response.headers {
            println!("{k}: {v}");
        }
        println!();
        println!("{}", String::from_utf8_lossy(&response.body));
    }

    Ok(())
}

async fn run_collection(collection_path: PathBuf, env_path: Option<PathBuf>, json: bool) -> Result<(), anyhow::Error> {
    let contents = std::fs::read_to_string(&collection_path)?;
    let collection: Collection = serde_yaml::from_str(&contents)?;

    let environment_vars = match env_path {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)?;
            let environment: Environment = serde_yaml::from_str(&contents)?;
            let mut vars: Vec<(String, String)> = environment.variables.into_iter().collect();
            vars.push(("$environmentName".to_string(), environment.name.clone()));
            vars
        }
        None => Vec::new(),
    };

    let executor = Executor::new(true, Duration::from_secs(30));
    let runner = Runner::new(executor, Duration::from_secs(5), 4);
    let summary = runner.run(&collection, environment_vars, no_cancellation()).await;

    if json {
        let out: Vec<_> = summary
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "requestId": r.request_id,
                    "name": r.name,
                    "method": r.method,
                    "url": r.url,
                    "status": r.status,
                    "statusText": r.status_text,
                    "durationMs": r.duration.as_millis(),
                    "testsPassed": r.tests.iter().filter(|t| t.passed).count(),
                    "testsFailed": r.tests.iter().filter(|t| !t.passed).count(),
                    "error": r.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for result in &summary.results {
            let status = result
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "ERR".to_string());
            println!(
                "{status:>5}  {} ({} {}, {}ms)",
                result.name,
                result.method,
                result.url,
                result.duration.as_millis()
            );
            if let Some(err) = &result.error {
                println!("       error: {err}");
            }
            for test in &result.tests {
                let mark = if test.passed { "ok" } else { "FAIL" };
                println!("       [{mark}] {}", test.name);
            }
        }
        println!(
            "\n{} passed, {} failed ({} of {} requests executed)",
            summary.tests_passed(),
            summary.tests_failed(),
            summary.executed,
            summary.total_requests,
        );
    }

    Ok(())
}

fn run_curl(args: Vec<String>) -> Result<(), anyhow::Error> {
    // Reconstruct a single shell-quoted command, then re-tokenize it the way
    // the importer boundary expects, rather than consuming clap's own split.
    let command = shell_words::join(&args);
    let tokens = shell_words::split(&command)?;
    let collection = curl_import::import(&tokens).map_err(|e| anyhow::anyhow!(e))?;
    println!("{}", serde_yaml::to_string(&collection)?);
    Ok(())
}
