#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use fleetid_kv_core::proto::key_value_server::KeyValueServer;
use futures::Stream;
use server::config::{CliArgs, ServerConfig};
use server::service::handler::KvService;
use server::telemetry::init_telemetry;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::transport::server::Connected;
use tonic_health::server::HealthReporter;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry()?;

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(incoming, config).await;
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(incoming, config).await
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    incoming: I,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<KeyValueServer<KvService>>()
        .await;

    let service = KvService::new(config.clone());
    let stopping = CancellationToken::new();

    let server = Server::builder()
        .add_service(health_service)
        .add_service(KeyValueServer::new(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, health_reporter, stopping.clone()),
        );

    // Open connections get `shutdown_timeout` to drain once a signal arrives.
    let drain_deadline = async {
        stopping.cancelled().await;
        tokio::time::sleep(config.shutdown_timeout).await;
    };

    tokio::select! {
        res = server => res?,
        () = drain_deadline => {
            warn!(timeout = ?config.shutdown_timeout, "connections still open; exiting");
        }
    }

    info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        info!("Starting key/value service on {} with full config: {:#?}", addr, config);
    } else {
        info!(
            "Starting key/value service on {} (max lease ttl {:?})",
            addr, config.max_lease_ttl
        );
    }
}

async fn shutdown_signal(
    service: KvService,
    health_reporter: HealthReporter,
    stopping: CancellationToken,
) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<KeyValueServer<KvService>>()
        .await;

    // 2. Refuse new requests and start the drain deadline
    service.shutdown();
    stopping.cancel();
}
