mod cli;
mod server;

use std::sync::Arc;
use std::time::Duration;

use bitcoin::Network;
use clap::Parser;
use eyre::{eyre, WrapErr};

use tally_core::{
    ChainSource, ClientConfig, Connector, ElectrumClient, Ordered, PeerRegistry, PeerSelection,
    ProtocolFlavor, Shuffled, TlsDialer, TlsPolicy, TransactionQuery,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let registry = build_registry(&args)?;
    tracing::info!(
        peers = registry.len(),
        network = %args.network,
        accept_invalid_certs = args.accept_invalid_certs,
        "peer registry loaded"
    );
    if args.accept_invalid_certs {
        tracing::warn!("TLS certificate validation is disabled; peers are not authenticated");
    }

    let dialer = TlsDialer::with_connect_timeout(Duration::from_secs(args.connect_timeout_secs))
        .wrap_err("build TLS dialer")?;
    let selection: Arc<dyn PeerSelection> = if args.shuffle_peers {
        Arc::new(Shuffled)
    } else {
        Arc::new(Ordered)
    };
    let connector = Connector::new(registry, Arc::new(dialer)).with_selection(selection);

    let config = ClientConfig {
        network: args.network,
        flavor: if args.legacy_address_methods {
            ProtocolFlavor::LegacyAddress
        } else {
            ProtocolFlavor::Scripthash
        },
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        ..ClientConfig::default()
    };
    let client: Arc<dyn ChainSource> = Arc::new(ElectrumClient::new(connector, config));

    let state = server::AppState {
        source: client.clone(),
        default_query: TransactionQuery {
            min_confirmations: args.min_confirmations,
            batch_size: args.batch_size,
        },
    };

    let bind_addr = format!("{}:{}", args.bind, args.port);
    let origin = format!("http://{}:{}", args.bind, args.port);
    let router = server::build_router(state, &origin).wrap_err("invalid server configuration")?;

    // Probe one peer before serving so a dead registry or a TLS policy
    // mismatch surfaces at startup.
    let version = client.server_version().await.map_err(|err| {
        let message = format_connect_error(&err.to_string());
        eyre!(message).wrap_err("while attempting to reach an Electrum server")
    })?;
    tracing::info!(
        server = %version.server_software,
        protocol = %version.protocol_version,
        "electrum server reachable"
    );

    if args.bind == "0.0.0.0" {
        tracing::warn!("server is bound to 0.0.0.0 and is accessible from the network");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context("bind TCP listener")?;

    tracing::info!("listening on http://{bind_addr}/api/v1");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run HTTP server")?;

    Ok(())
}

fn build_registry(args: &cli::Cli) -> eyre::Result<PeerRegistry> {
    let registry = if args.peers.is_empty() {
        if args.network != Network::Bitcoin {
            return Err(eyre!(
                "the built-in peers serve mainnet; pass --peer for {}",
                args.network
            ));
        }
        PeerRegistry::public()
    } else {
        PeerRegistry::new(args.peers.clone())
    };

    Ok(if args.accept_invalid_certs {
        registry.with_tls_policy(TlsPolicy::AcceptInvalidCerts)
    } else {
        registry
    })
}

fn format_connect_error(source_error: &str) -> String {
    let mut lines = vec![format!("Electrum error: {source_error}")];

    if source_error.contains("certificate") || source_error.contains("UnknownIssuer") {
        lines.push(
            "hint: the peer's certificate was rejected; most public Electrum servers are \
             self-signed, retry with --accept-invalid-certs"
                .into(),
        );
    } else if source_error.contains("timed out") {
        lines.push(
            "hint: the peer did not answer in time; check network access or raise \
             --connect-timeout-secs / --request-timeout-secs"
                .into(),
        );
    } else if source_error.contains("failed to lookup address")
        || source_error.contains("Name or service not known")
    {
        lines.push("hint: hostname resolution failed; verify the --peer host names".into());
    }

    lines.join("\n")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
