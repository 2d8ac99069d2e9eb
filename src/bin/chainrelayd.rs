//! chainrelayd: the chainrelay stdio daemon.
//!
//! Reads line-delimited JSON-RPC 2.0 requests on stdin and writes replies on
//! stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use chainrelay::Dispatcher;
use chainrelay::server::{Config, RelayService};

/// chainrelay daemon, a caching bridge to blockchain RPC nodes.
#[derive(Parser)]
#[command(name = "chainrelayd")]
#[command(version = chainrelay::PKG_VERSION)]
#[command(about = "Caching JSON-RPC bridge for blockchain networks")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "CHAINRELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chainrelay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    let dispatcher = Dispatcher::builder()
        .registry(config.registry()?)
        .cache_config(config.cache_config())
        .build()?;

    let reload_path = args.config.clone();
    let service = RelayService::new(Arc::new(dispatcher)).with_reloader(Arc::new(move || {
        Config::load(reload_path.as_deref())?.endpoints()
    }));

    info!(
        version = chainrelay::version_string(),
        networks = ?service.dispatcher().registry().network_ids(),
        "chainrelayd starting"
    );

    serve_stdio(Arc::new(service)).await?;

    info!("chainrelayd shutting down");
    Ok(())
}

/// Read requests until EOF. Each line runs on its own task so a slow
/// upstream never blocks unrelated requests; a single writer task keeps
/// replies from interleaving.
async fn serve_stdio(service: Arc<RelayService>) -> io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(reply) = rx.recv().await {
            debug!(reply = %reply, "sending");
            if let Err(e) = write_line(&mut stdout, &reply).await {
                error!(error = %e, "failed to write response");
                break;
            }
        }
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!(request = %line, "received");

        let service = Arc::clone(&service);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = service.handle_line(&line).await {
                // Receiver only goes away after a write failure.
                let _ = tx.send(reply);
            }
        });
    }
    info!("EOF received");

    // In-flight tasks hold their own senders; the writer drains until the
    // last one finishes.
    drop(tx);
    if let Err(e) = writer.await {
        error!(error = %e, "writer task failed");
    }
    Ok(())
}

async fn write_line(stdout: &mut io::Stdout, reply: &str) -> io::Result<()> {
    stdout.write_all(reply.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
