//! Gatescan producer binary.
//!
//! Usage:
//!     gatescan-producer serve

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tonic::transport::Server;
use tracing::{info, warn};

use gatescan_producer::{
    build_flags, BypassPolicy, CertAuthority, ExtProcService, IntelligentCache, ProducerCore,
    ScanAdapter, ScanOrchestrator, SdsService,
};
use gatescan_protocol::config::ProducerConfig;
use gatescan_xds::discovery::secret_discovery_service_server::SecretDiscoveryServiceServer;
use gatescan_xds::ext_proc::external_processor_server::ExternalProcessorServer;

#[derive(Parser, Debug)]
#[command(name = "gatescan-producer", about = "Gatescan ext_proc front filter")]
struct Args {
    /// Verbose logging (RUST_LOG overrides)
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gRPC services (default)
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    gatescan_logging::init_logging(gatescan_logging::LogConfig {
        verbose: args.verbose,
    });

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Arc::new(ProducerConfig::from_env());
    info!("starting gatescan producer");
    info!("  store: {}", config.state_store_url);
    info!("  port:  {}", config.grpc_port);
    info!("  mode:  {:?}", config.response_mode);

    let store = gatescan_state::open(&config.state_store_url)
        .await
        .context("failed to open state store")?;

    let orchestrator = Arc::new(ScanOrchestrator::new(
        ScanAdapter::new(store.clone()),
        store.clone(),
    ));
    let cache = Arc::new(IntelligentCache::new(store.clone(), BypassPolicy::default()));
    let flags = build_flags(&config, &cache);
    let core = Arc::new(ProducerCore {
        orchestrator,
        cache,
        flags,
        config: Arc::clone(&config),
    });

    let ext_proc = ExternalProcessorServer::new(ExtProcService::new(core));

    // SDS is only served when CA material is configured; configured-but-bad
    // material is fatal.
    let sds = match (&config.ca_cert_path, &config.ca_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let authority = CertAuthority::load(
                cert_path,
                key_path,
                config.sds_cache_max_size,
                Duration::from_secs(config.sds_cache_ttl_secs),
            )
            .context("failed to load SDS issuer CA")?;
            Some(SecretDiscoveryServiceServer::new(SdsService::new(Arc::new(
                authority,
            ))))
        }
        _ => {
            warn!("CA_CERT_PATH/CA_KEY_PATH unset; SDS disabled");
            None
        }
    };

    let addr: std::net::SocketAddr = format!("[::]:{}", config.grpc_port)
        .parse()
        .context("bad GRPC_PORT")?;
    info!("listening on {addr}");

    let router = Server::builder().add_service(ext_proc);
    let router = match sds {
        Some(sds) => router.add_service(sds),
        None => router,
    };
    router
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("gRPC server failed")?;
    Ok(())
}
