//! pincraft daemon binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use pincraft_core::traits::{ClaimSubmitter, EventPoller, LedgerQueries, PinExecutor};
use pincraft_daemon::{
    DaemonIpcHandler, DaemonOptions, DataAggregator, ModeController, PinnerDaemon,
    PolicyOfferFilter,
};
use pincraft_daemon::daemon::DaemonError;
use pincraft_hunter::{CidHunter, FlagPinnerSubmitter, KuboPinVerifier};
use pincraft_ipc::IpcServer;
use pincraft_ipfs::GatewayPinExecutor;
use pincraft_ledger::{
    CollectPinSubmitter, ContractEventPoller, ContractInvoker, ContractQueries, LedgerRpcClient,
};
use pincraft_store::StateStore;

/// Exit codes: 0 clean shutdown, 1 configuration error, 2 operator
/// identity not registered on-chain.
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_NOT_REGISTERED: i32 = 2;

#[derive(Parser)]
#[command(name = "pincraft", version, about = "Autonomous pinning daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon.
    Run {
        /// Path to the settings file (defaults to the platform config dir).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keyfile with the 32-byte operator secret; the PINCRAFT_SECRET
        /// environment variable takes precedence.
        #[arg(long)]
        keyfile: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let code = match cli.command {
        Command::Run { config, keyfile } => {
            match runtime.block_on(run(config.as_deref(), keyfile.as_deref())) {
                Ok(code) => code,
                Err(e) => {
                    // Logging may not be up yet; stderr always is.
                    eprintln!("pincraft: startup failed: {e:#}");
                    EXIT_CONFIG_ERROR
                }
            }
        }
    };
    std::process::exit(code);
}

async fn run(
    config_path: Option<&std::path::Path>,
    keyfile: Option<&std::path::Path>,
) -> anyhow::Result<i32> {
    // Settings file + env overrides; the secret never comes from the file.
    let cfg = pincraft_settings::load_config(config_path).context("loading settings")?;

    let level = pincraft_logging::LogLevel::parse(&cfg.log_level)
        .unwrap_or(pincraft_logging::LogLevel::Info);
    let _ = pincraft_logging::try_init(level);

    anyhow::ensure!(!cfg.contract_id.is_empty(), "contract_id is not configured");

    let keypair = pincraft_keystore::load_operator_keypair(keyfile).context("loading operator key")?;
    let our_address = keypair.address();

    info!("starting pincraft daemon");
    info!("  mode: {}", cfg.mode);
    info!("  address: {our_address}");
    info!("  contract: {}", cfg.contract_id);
    info!("  rpc: {}", cfg.rpc_url);
    info!("  kubo: {}", cfg.kubo_rpc_url);

    // State store.
    let db_path = pincraft_keystore::expand_path(&cfg.db_path);
    let store = Arc::new(
        StateStore::open(&db_path.to_string_lossy()).context("opening state store")?,
    );
    store
        .seed_daemon_config(&pincraft_core::DaemonConfigRecord {
            mode: cfg.mode,
            min_price: cfg.min_price,
            max_content_size: cfg.max_content_size,
        })
        .await
        .context("seeding daemon config")?;

    // Ledger plumbing.
    let rpc = Arc::new(LedgerRpcClient::new(&cfg.rpc_url));
    let queries: Arc<dyn LedgerQueries> = Arc::new(ContractQueries::new(
        rpc.clone(),
        &cfg.contract_id,
        &our_address,
    ));
    let invoker = Arc::new(ContractInvoker::new(
        rpc.clone(),
        &cfg.contract_id,
        &cfg.network_passphrase,
        keypair,
    ));
    let submitter: Arc<dyn ClaimSubmitter> = Arc::new(CollectPinSubmitter::new(invoker.clone()));
    // The supervisor restores the cursor from the store on startup.
    let poller: Box<dyn EventPoller> =
        Box::new(ContractEventPoller::new(rpc.clone(), &cfg.contract_id, None));

    // Storage node; unreachable at startup is a configuration error.
    let executor = Arc::new(GatewayPinExecutor::new(
        &cfg.kubo_rpc_url,
        Duration::from_secs(cfg.pin_timeout),
        cfg.max_content_size,
        cfg.fetch_retries,
    ));
    let node_id = executor
        .probe_node()
        .await
        .context("storage node is unreachable")?;
    info!("  node id: {node_id}");

    let filter = PolicyOfferFilter::new(
        store.clone(),
        queries.clone(),
        Some(executor.clone()),
        &our_address,
        cfg.fallback_tx_fee,
    );

    let mode = Arc::new(ModeController::new(store.clone(), cfg.mode));
    mode.restore().await.context("restoring mode")?;

    // Shutdown signal: SIGINT / SIGTERM flip the flag; the loop exits
    // after the current offer completes.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    // Hunter (optional).
    let hunter = if cfg.hunter.enabled {
        let verifier = Arc::new(KuboPinVerifier::new(
            &cfg.kubo_rpc_url,
            Duration::from_secs(cfg.hunter.check_timeout),
            &cfg.hunter.verification_methods,
        ));
        let flags = Arc::new(FlagPinnerSubmitter::new(invoker.clone(), store.clone()));
        let hunter = Arc::new(CidHunter::new(
            store.clone(),
            queries.clone(),
            verifier,
            flags,
            cfg.hunter.clone(),
            &our_address,
        ));
        hunter.spawn(shutdown_rx.clone());
        Some(hunter)
    } else {
        info!("hunter is disabled");
        None
    };

    // Control socket.
    let api = Arc::new(DataAggregator::new(
        store.clone(),
        queries.clone(),
        mode.clone(),
        hunter.clone(),
        &our_address,
        cfg.fallback_tx_fee,
    ));
    let socket_path = cfg.socket_path.clone();
    let ipc = IpcServer::new(&socket_path);
    tokio::spawn(async move {
        if let Err(e) = ipc.run(Arc::new(DaemonIpcHandler::new(api))).await {
            error!("IPC server failed: {e}");
        }
    });

    let mut daemon = PinnerDaemon::new(
        store,
        poller,
        filter,
        executor as Arc<dyn PinExecutor>,
        submitter,
        queries,
        mode,
        hunter,
        DaemonOptions {
            poll_interval: Duration::from_secs(cfg.poll_interval),
            error_backoff: Duration::from_secs(cfg.error_backoff),
            unpin_on_free: cfg.unpin_on_free,
        },
        shutdown_rx,
    );

    let code = match daemon.run().await {
        Ok(()) => 0,
        Err(DaemonError::NotRegistered) => {
            error!("operator identity is not registered on-chain");
            EXIT_NOT_REGISTERED
        }
        Err(e) => {
            error!("daemon failed: {e}");
            EXIT_CONFIG_ERROR
        }
    };
    let _ = std::fs::remove_file(&socket_path);
    Ok(code)
}

fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("signal handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        warn!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });
}
