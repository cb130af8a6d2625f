/// driftkv command line tool.
///
/// Runs a cluster node or talks to one over HTTP:
///
///   driftkv start --port 5001 --nodes 127.0.0.1:5001,127.0.0.1:5002,127.0.0.1:5003
///   driftkv set <key> <value> [--url http://127.0.0.1:5001]
///   driftkv get <key>
///   driftkv del <key>
///   driftkv status
///   driftkv metrics
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use driftkv::config::{format_node_id, DEFAULT_PORT};
use driftkv::{Node, NodeConfig, ReplicaSettings};
use serde_json::Value as JsonValue;

#[derive(Parser)]
#[command(name = "driftkv", version, about = "Replicated, eventually-consistent key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a cluster node
    Start {
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Advertised host; peers must reach this node at host:port
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Comma-separated list of all nodes in the cluster
        #[arg(long)]
        nodes: Option<String>,
        /// Replication factor
        #[arg(long)]
        n: Option<usize>,
        /// Read quorum
        #[arg(long)]
        r: Option<usize>,
        /// Write quorum
        #[arg(long)]
        w: Option<usize>,
    },
    /// Store a value
    Set {
        key: String,
        /// JSON value (falls back to a plain string)
        value: String,
        #[arg(long, default_value = "http://127.0.0.1:5001")]
        url: String,
        #[arg(long)]
        n: Option<usize>,
        #[arg(long)]
        w: Option<usize>,
    },
    /// Retrieve a value (all current siblings)
    Get {
        key: String,
        #[arg(long, default_value = "http://127.0.0.1:5001")]
        url: String,
        #[arg(long)]
        r: Option<usize>,
        #[arg(long)]
        n: Option<usize>,
    },
    /// Delete a key
    Del {
        key: String,
        #[arg(long, default_value = "http://127.0.0.1:5001")]
        url: String,
        #[arg(long)]
        n: Option<usize>,
        #[arg(long)]
        w: Option<usize>,
    },
    /// Show node status
    Status {
        #[arg(long, default_value = "http://127.0.0.1:5001")]
        url: String,
    },
    /// Show node metrics
    Metrics {
        #[arg(long, default_value = "http://127.0.0.1:5001")]
        url: String,
    },
}

/// HTTP client for a remote driftkv node.
struct HttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: JsonValue,
        n: Option<usize>,
        w: Option<usize>,
    ) -> Result<(bool, u16)> {
        let url = format!("{}/kv/{}", self.base_url, key);
        let mut body = serde_json::json!({ "value": value });
        if let Some(n) = n {
            body["N"] = n.into();
        }
        if let Some(w) = w {
            body["W"] = w.into();
        }

        let response = self.client.put(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        let data: JsonValue = response.json().await.context("malformed response")?;
        Ok((
            data.get("success").and_then(JsonValue::as_bool).unwrap_or(false),
            status,
        ))
    }

    async fn get(
        &self,
        key: &str,
        r: Option<usize>,
        n: Option<usize>,
    ) -> Result<Vec<JsonValue>> {
        let url = format!("{}/kv/{}", self.base_url, key);
        let mut request = self.client.get(&url);
        if let Some(r) = r {
            request = request.query(&[("R", r)]);
        }
        if let Some(n) = n {
            request = request.query(&[("N", n)]);
        }

        let data: JsonValue = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed response")?;
        Ok(data
            .get("versions")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn del(&self, key: &str, n: Option<usize>, w: Option<usize>) -> Result<(bool, u16)> {
        let url = format!("{}/kv/{}", self.base_url, key);
        let mut body = serde_json::json!({});
        if let Some(n) = n {
            body["N"] = n.into();
        }
        if let Some(w) = w {
            body["W"] = w.into();
        }

        let response = self.client.delete(&url).json(&body).send().await?;
        let status = response.status().as_u16();
        let data: JsonValue = response.json().await.context("malformed response")?;
        Ok((
            data.get("success").and_then(JsonValue::as_bool).unwrap_or(false),
            status,
        ))
    }

    async fn fetch_json(&self, path: &str) -> Result<JsonValue> {
        let url = format!("{}{}", self.base_url, path);
        let data = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("malformed response")?;
        Ok(data)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start {
            port,
            host,
            nodes,
            n,
            r,
            w,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "driftkv=info".into()),
                )
                .init();

            let node_id = format_node_id(&host, port);
            let nodes: Vec<String> = nodes
                .unwrap_or_else(|| node_id.clone())
                .split(',')
                .map(str::to_string)
                .collect();

            let mut settings = ReplicaSettings::default();
            if let Some(n) = n {
                settings = settings.n(n);
            }
            if let Some(r) = r {
                settings = settings.r(r);
            }
            if let Some(w) = w {
                settings = settings.w(w);
            }

            let config = NodeConfig::new(node_id).nodes(nodes).settings(settings);
            Node::new(config)?.serve().await?;
        }

        Command::Set { key, value, url, n, w } => {
            // Accept raw JSON, else treat the argument as a string.
            let value: JsonValue = serde_json::from_str(&value)
                .unwrap_or_else(|_| JsonValue::String(value.clone()));

            let (success, status) = HttpClient::new(url).set(&key, value, n, w).await?;
            if success {
                println!("{} {}", "OK".green().bold(), key);
            } else {
                println!(
                    "{} write quorum not met (HTTP {})",
                    "FAILED".red().bold(),
                    status
                );
                std::process::exit(1);
            }
        }

        Command::Get { key, url, r, n } => {
            let versions = HttpClient::new(url).get(&key, r, n).await?;
            if versions.is_empty() {
                println!("{} {}", "NOT FOUND".yellow(), key);
                std::process::exit(1);
            }
            if versions.len() > 1 {
                println!(
                    "{} {} concurrent siblings:",
                    "CONFLICT".yellow().bold(),
                    versions.len()
                );
            }
            for version in versions {
                let value = version.get("value").cloned().unwrap_or(JsonValue::Null);
                let clock = version.get("vector_clock").cloned().unwrap_or(JsonValue::Null);
                println!(
                    "{}  {}",
                    serde_json::to_string_pretty(&value)?,
                    format!("clock: {}", clock).dimmed()
                );
            }
        }

        Command::Del { key, url, n, w } => {
            let (success, status) = HttpClient::new(url).del(&key, n, w).await?;
            if success {
                println!("{} {}", "DELETED".green().bold(), key);
            } else {
                println!(
                    "{} delete quorum not met (HTTP {})",
                    "FAILED".red().bold(),
                    status
                );
                std::process::exit(1);
            }
        }

        Command::Status { url } => {
            let status = HttpClient::new(url).fetch_json("/status").await?;
            println!("{}", "Node status".bold());
            println!(
                "  node:        {}",
                status.get("node_id").and_then(JsonValue::as_str).unwrap_or("?")
            );
            println!(
                "  consistency: {}",
                status
                    .get("consistency_level")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("?")
            );
            println!(
                "  keys:        {}",
                status.get("key_count").and_then(JsonValue::as_u64).unwrap_or(0)
            );
            println!(
                "  uptime:      {}s",
                status
                    .get("uptime_seconds")
                    .and_then(JsonValue::as_i64)
                    .unwrap_or(0)
            );
            if let Some(nodes) = status.get("nodes").and_then(JsonValue::as_array) {
                println!("  ring ({} nodes):", nodes.len());
                for node in nodes {
                    println!("    {}", node.as_str().unwrap_or("?"));
                }
            }
            if let Some(failed) = status.get("failed_nodes").and_then(JsonValue::as_array) {
                if !failed.is_empty() {
                    println!("  {}:", "failed nodes".red());
                    for node in failed {
                        println!("    {}", node.as_str().unwrap_or("?").red());
                    }
                }
            }
        }

        Command::Metrics { url } => {
            let metrics = HttpClient::new(url).fetch_json("/metrics").await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}
