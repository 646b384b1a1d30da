//! tabbridge-host: native-messaging host launched by the browser.
//!
//! stdin/stdout is the native-messaging stream to the extension, which serves
//! the browser-side commands. CLI invocations connect over a local socket and
//! every request they send is relayed to the extension through one shared
//! RPC client, so concurrent CLI calls are multiplexed over the single pipe.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::Instrument;
use uuid::Uuid;

use tabbridge::bridge::transport::SocketListener;
use tabbridge::{BridgeConfig, ClientConfig, Router, RouterConfig, RpcClient, relay_table};

#[derive(Parser, Debug)]
#[command(name = "tabbridge-host")]
#[command(about = "Native-messaging host bridging the tabbridge CLI to the browser", long_about = None)]
#[command(version)]
struct Args {
    /// Socket the CLI connects to (overrides TABBRIDGE_SOCKET)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Arguments supplied by the browser (extension origin, manifest path)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    browser_args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tabbridge::init_tracing("info");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let result = runtime.block_on(run(args));
    // The blocking stdin reader may still be parked in a read.
    runtime.shutdown_timeout(Duration::from_millis(100));

    if let Err(e) = &result {
        tracing::error!(error = format!("{e:#}"), "Host exiting with error");
    }
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = BridgeConfig::from_env().context("invalid configuration")?;
    if let Some(socket) = args.socket {
        config = config.with_socket_path(socket);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        browser_args = ?args.browser_args,
        socket = %config.socket_path.display(),
        relay_timeout = ?config.relay_timeout,
        "Starting native-messaging host"
    );

    let browser = RpcClient::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        ClientConfig::from(&config),
    );
    let listener = SocketListener::bind(&config.socket_path)
        .with_context(|| format!("failed to bind {}", config.socket_path.display()))?;
    let router = Arc::new(Router::new(
        relay_table(&browser, config.relay_timeout),
        RouterConfig::from(&config),
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Interrupted");
    };

    serve_connections(&listener, router, &browser, shutdown).await;
    tracing::info!("Host stopped");
    Ok(())
}

/// Accept CLI connections until the browser goes away or `shutdown` resolves.
async fn serve_connections(
    listener: &SocketListener,
    router: Arc<Router>,
    browser: &RpcClient,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = browser.closed() => {
                tracing::info!("Browser closed the native-messaging pipe");
                break;
            }

            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let connection_id = Uuid::new_v4();
                let router = Arc::clone(&router);
                let span = tracing::info_span!("connection", %connection_id);
                tokio::spawn(
                    async move {
                        tracing::debug!("CLI connected");
                        let (reader, writer) = stream.into_split();
                        match router.serve(reader, writer).await {
                            Ok(()) => tracing::debug!("CLI disconnected"),
                            Err(e) => tracing::warn!(error = %e, "CLI connection failed"),
                        }
                    }
                    .instrument(span),
                );
            }
        }
    }

    if let Err(e) = listener.cleanup() {
        tracing::warn!(error = %e, "Failed to remove socket");
    }
}
