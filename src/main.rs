//! Multi-chain DEX arbitrage engine — entry point.
//!
//! Spawns one independent task group per configured chain (§5): a
//! subscription loop, a mirror-apply handler, a dirty-flag-coalesced
//! detector worker, and a single-flight executor loop. Shutdown is
//! signal-driven, matching the teacher's `main.rs`.

use anyhow::{Context, Result};
use arb_engine::arbitrage::{ArbitrageDetector, DetectorConfig, RouteCooldown};
use arb_engine::chain::{ChainClient, NonceManager, PoolEventKind};
use arb_engine::config::{ChainConfig, EngineConfig};
use arb_engine::control::ControlHandle;
use arb_engine::execution::{Executor, ExecutorConfig, Simulator};
use arb_engine::graph::PricingGraph;
use arb_engine::oracle::GraphPriceOracle;
use arb_engine::pipeline::{OpportunityPipeline, PipelineConfig};
use arb_engine::pool::{PoolRegistry, StateMirror};
use arb_engine::types::{ChainId, DailyLossAccumulator, Pool, PoolId, TokenId};
use clap::Parser;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Startup flags. Operator pause/resume/status queries go through
/// `ControlHandle` directly (see DESIGN.md Open Question #1) rather than
/// this CLI; this covers only what makes sense to fix before the event
/// loop ever starts.
#[derive(Parser, Debug)]
#[command(version, about = "Multi-chain DEX arbitrage engine")]
struct Cli {
    /// Force dry-run mode regardless of the DRY_RUN environment variable.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("multi-chain arbitrage engine starting");

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env().context("failed to load engine configuration")?;
    if cli.dry_run {
        config.dry_run = true;
        info!("dry-run forced by --dry-run flag");
    }
    let control = ControlHandle::new();

    let mut handles = Vec::new();
    for chain_cfg in &config.chains {
        let config = config.clone();
        let chain_cfg = chain_cfg.clone();
        let control = control.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_chain(config, chain_cfg, control).await {
                error!(error = %e, "chain task exited with error");
            }
        }));
    }

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping engine");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Run the full pipeline for one chain: discovery, live event wiring,
/// detector loop, and execution loop. Returns only on an unrecoverable
/// setup error; steady-state failures are logged and retried by the
/// individual loops.
async fn run_chain(config: EngineConfig, chain_cfg: ChainConfig, control: ControlHandle) -> Result<()> {
    let chain_id = chain_cfg.chain_id;
    info!(chain = chain_id.0, name = %chain_cfg.name, "connecting chain client");

    let client = Arc::new(
        ChainClient::connect(chain_id, &chain_cfg.rpc_http_url, &chain_cfg.rpc_ws_url, &config.wallet_key)
            .await
            .with_context(|| format!("failed to connect chain client for chain {}", chain_id.0))?,
    );
    let nonce = NonceManager::init(client.http(), client.wallet_address())
        .await
        .context("failed to initialize nonce manager")?;

    let pools = PoolRegistry::discover(&client, &chain_cfg.dexes, &chain_cfg.discovery_tokens).await;
    info!(chain = chain_id.0, count = pools.len(), "pool discovery complete");

    let mirror = StateMirror::new();
    let graph = Arc::new(PricingGraph::new());
    let mut subscriptions = Vec::with_capacity(pools.len());
    for pool in &pools {
        mirror.register(pool.clone());
        graph.apply_pool(pool);
        subscriptions.push((pool.id.address, event_kind_for(pool)));
    }

    control.register_chain(chain_id, mirror.clone()).await;

    let source_token = TokenId::new(chain_id, chain_cfg.source_token);
    let oracle = Arc::new(GraphPriceOracle::new(graph.clone(), TokenId::new(chain_id, chain_cfg.stablecoin), chain_cfg.stablecoin_decimals));
    let pipeline = Arc::new(OpportunityPipeline::new(PipelineConfig {
        capacity: 256,
        dedup_window_ms: config.dedup_window_ms,
        min_profit_usd: config.min_profit_usd,
    }));
    let cooldown = Arc::new(Mutex::new(RouteCooldown::new(config.route_cooldown_blocks)));
    let loss_accumulator = Arc::new(Mutex::new(DailyLossAccumulator::new(chain_id, chain_cfg.daily_loss_limit_usd, now_ms())));
    let dirty = Arc::new(Notify::new());

    let rx = client.subscribe_pool_events(subscriptions);
    tokio::spawn(mirror_apply_loop(client.clone(), mirror.clone(), graph.clone(), rx, dirty.clone()));

    let detector_config = Arc::new(DetectorConfig {
        source_token,
        input_amount: detector_input_amount(&chain_cfg),
        min_profit: alloy::primitives::U256::ZERO,
        max_cycle_len: config.detector_max_cycle_len,
        liquidity_floor: config.liquidity_floor,
        opportunity_ttl_ms: config.opportunity_ttl_ms,
    });

    tokio::spawn(detector_loop(
        client.clone(),
        graph.clone(),
        detector_config,
        pipeline.clone(),
        cooldown.clone(),
        control.clone(),
        chain_id,
        dirty,
    ));

    let executor = Arc::new(Executor::new(
        client.clone(),
        nonce,
        config.arb_executor_address,
        ExecutorConfig {
            max_slippage_bps: config.max_slippage_bps,
            dry_run: config.dry_run,
            confirmations: 1,
            max_gas_price_gwei: chain_cfg.max_gas_price_gwei,
            per_tx_loss_limit_usd: chain_cfg.per_tx_loss_limit_usd,
        },
    ));

    execution_loop(
        client,
        executor,
        pipeline,
        cooldown,
        oracle,
        loss_accumulator,
        control,
        chain_id,
        chain_cfg.native_decimals,
        config.simulate_before_execute,
        config.arb_executor_address,
    )
    .await
    .context("execution loop halted")?;

    Ok(())
}

fn event_kind_for(pool: &Pool) -> PoolEventKind {
    match pool.dex.family {
        arb_engine::types::DexFamily::V3Concentrated => PoolEventKind::V3Swap,
        _ => PoolEventKind::V2Sync,
    }
}

/// A reasonable default probe size for the detector's executable quote:
/// one unit of the source token in its native precision. Chains whose
/// source token isn't 18-decimal still get a workable (if smaller or
/// larger) probe; the simulator's `eth_call` is the real gate.
fn detector_input_amount(chain_cfg: &ChainConfig) -> alloy::primitives::U256 {
    let _ = chain_cfg;
    alloy::primitives::U256::from(1_000_000_000_000_000_000u128)
}

async fn mirror_apply_loop(
    client: Arc<ChainClient>,
    mirror: StateMirror,
    graph: Arc<PricingGraph>,
    mut rx: tokio::sync::mpsc::Receiver<arb_engine::chain::RawPoolEvent>,
    dirty: Arc<Notify>,
) {
    while let Some(event) = rx.recv().await {
        let pool_id = PoolId { chain: client.chain_id, address: event.pool };
        match mirror.apply(pool_id, event) {
            Some(id) => {
                if let Some(pool) = mirror.get(&id) {
                    graph.apply_pool(&pool);
                    dirty.notify_one();
                }
            }
            None => {
                if mirror.get(&pool_id).is_none() {
                    mirror.warn_unknown_pool(&pool_id);
                }
            }
        }
    }
    warn!(chain = client.chain_id.0, "mirror-apply loop ended, event channel closed");
}

/// Debounced detector worker: coalesces a burst of pool updates into a
/// single detector run rather than one run per event (§5).
async fn detector_loop(
    client: Arc<ChainClient>,
    graph: Arc<PricingGraph>,
    config: Arc<DetectorConfig>,
    pipeline: Arc<OpportunityPipeline>,
    cooldown: Arc<Mutex<RouteCooldown>>,
    control: ControlHandle,
    chain_id: ChainId,
    dirty: Arc<Notify>,
) {
    loop {
        dirty.notified().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        if control.is_paused(chain_id).await {
            continue;
        }

        let now = now_ms();
        let opportunities = ArbitrageDetector::run(&graph, &config, now);
        let block = client.block_number().await.unwrap_or(0);

        let mut accepted = 0usize;
        {
            let cd = cooldown.lock().unwrap();
            for opportunity in opportunities {
                let route = opportunity.route_identity();
                if cd.is_cooled_down(&route, block) {
                    continue;
                }
                if pipeline.enqueue(opportunity, now) {
                    accepted += 1;
                }
            }
        }
        if accepted > 0 {
            info!(chain = chain_id.0, accepted, "new opportunities enqueued");
        }
        let active_cooldowns = cooldown.lock().unwrap().active_count();
        control.set_pipeline_len(chain_id, pipeline.len()).await;
        control.set_cooldown_count(chain_id, active_cooldowns).await;
        pipeline.gc(now);
    }
}

/// Returns `Err` only when the executor reports a hard-fail (the
/// per-transaction loss ceiling breached, §4.7 step 5) — that ends this
/// chain's task entirely rather than auto-pausing, since a breach that
/// large means the normal pause/resume recovery path is not trusted to
/// be safe on its own.
#[allow(clippy::too_many_arguments)]
async fn execution_loop(
    client: Arc<ChainClient>,
    executor: Arc<Executor>,
    pipeline: Arc<OpportunityPipeline>,
    cooldown: Arc<Mutex<RouteCooldown>>,
    oracle: Arc<GraphPriceOracle>,
    loss_accumulator: Arc<Mutex<DailyLossAccumulator>>,
    control: ControlHandle,
    chain_id: ChainId,
    native_decimals: u8,
    simulate_before_execute: bool,
    executor_contract: alloy::primitives::Address,
) -> Result<()> {
    loop {
        if control.is_paused(chain_id).await {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            continue;
        }

        let now = now_ms();
        let Some(opportunity) = pipeline.dequeue(now, Some(oracle.as_ref())) else {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
        };

        let route = opportunity.route_identity();
        let block = client.block_number().await.unwrap_or(0);

        if simulate_before_execute {
            let gas_price = client.gas_price().await.unwrap_or(0);
            let result = Simulator::simulate(&client, executor_contract, &opportunity, gas_price, Some(oracle.as_ref()), native_decimals).await;
            if !result.viable {
                warn!(chain = chain_id.0, reason = ?result.reason, "opportunity failed pre-flight simulation");
                cooldown.lock().unwrap().record_failure(&route, block);
                continue;
            }
        }

        let record = match executor
            .execute(&opportunity, &loss_accumulator, Some(oracle.as_ref()), native_decimals)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!(chain = chain_id.0, error = %e, "hard-fail, halting chain");
                control.pause(chain_id).await;
                return Err(e.into());
            }
        };

        if record.success {
            cooldown.lock().unwrap().record_success(&route);
        } else {
            cooldown.lock().unwrap().record_failure(&route, block);
        }

        let paused = loss_accumulator.lock().unwrap().paused;
        if paused {
            warn!(chain = chain_id.0, "daily loss limit breached, pausing chain");
            control.pause(chain_id).await;
        }

        control.record_trade(chain_id, record).await;
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}
