//! Tessera CLI - run the task engine against simulated chains, or work with key shares.

mod simulated;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tessera_core::app::{IndexerNotification, RetryConfig, TaskCounts};
use tessera_core::custody::{self, Share};
use tessera_core::domain::{
    Chain, ChainFamily, NewTask, ProjectId, TaskId, TaskPayload, TransferParams, Wallet, WalletId,
};
use tessera_core::ports::{TaskStore, WalletStore};
use tessera_core::{EngineBuilder, EngineConfig, Tessera};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use zeroize::Zeroizing;

use crate::simulated::SimulatedChain;

/// Tessera - multi-chain task engine
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine config (TOML)
    #[arg(short, long, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a wallet and run transfers on simulated EVM and NEAR chains
    Demo {
        /// Number of EVM transfers to queue
        #[arg(long, default_value_t = 6)]
        transfers: usize,

        /// Fail every n-th simulated EVM call (0 disables)
        #[arg(long, default_value_t = 4)]
        fail_every: u64,
    },
    /// Split a hex-encoded secret into shares
    Split {
        /// Secret as hex
        secret: String,

        #[arg(long, default_value_t = 3)]
        total: u8,

        #[arg(long, default_value_t = 2)]
        threshold: u8,
    },
    /// Rebuild a secret from shares
    Combine {
        #[arg(required = true)]
        shares: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tessera_core=debug,tessera=debug")
    } else {
        EnvFilter::new("tessera_core=info,tessera=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

/// Demo timings are shortened unless a config file is given.
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig {
            dependency_wait_ms: 200,
            retry: RetryConfig {
                base_delay_ms: 100,
                max_delay_ms: 1_000,
                ..RetryConfig::default()
            },
            ..EngineConfig::default()
        }),
    }
}

#[derive(Debug, Serialize)]
struct DemoReport {
    project: ProjectId,
    counts: TaskCounts,
    tasks: Vec<TaskLine>,
}

#[derive(Debug, Serialize)]
struct TaskLine {
    id: TaskId,
    kind: String,
    chain: String,
    state: String,
    tries: u32,
    tx_hash: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Demo {
            transfers,
            fail_every,
        } => {
            let config = load_config(args.config.as_ref())?;
            run_demo(config, transfers, fail_every).await?;
        }
        Command::Split {
            secret,
            total,
            threshold,
        } => {
            let secret = Zeroizing::new(hex::decode(secret.trim()).context("secret is not hex")?);
            for share in custody::split(&secret, total, threshold)? {
                println!("{share}");
            }
        }
        Command::Combine { shares } => {
            let shares = shares
                .iter()
                .map(|s| s.parse::<Share>())
                .collect::<Result<Vec<_>, _>>()?;
            let secret = custody::combine(&shares)?;
            println!("{}", hex::encode(secret.as_slice()));
        }
    }

    Ok(())
}

async fn run_demo(config: EngineConfig, transfers: usize, fail_every: u64) -> anyhow::Result<()> {
    let app = EngineBuilder::new(config)
        .register_adapter(Arc::new(SimulatedChain::evm(fail_every)))?
        .register_adapter(Arc::new(SimulatedChain::near(0)))?
        .expect_families(&[ChainFamily::Evm, ChainFamily::Near])
        .build()?;
    let project = ProjectId::generate();
    let mut ids = Vec::new();

    // NEAR wallet deployment hands back the tenant's key share.
    let near_wallet = Wallet::new(WalletId::generate(), project, Chain::new("near"));
    app.wallets.save(&near_wallet).await?;
    let deploy = NewTask::new(project, Chain::new("near"), TaskPayload::WalletDeploy)
        .from_wallet(near_wallet.id);
    let deploy = app.submitter.add_task(deploy, None).await?;
    ids.push(deploy);
    settle(&app, &[deploy]).await?;

    let deployed = app
        .store
        .get(deploy)
        .await?
        .context("wallet deployment disappeared")?;
    let tenant_share: Share = deployed
        .output
        .as_ref()
        .and_then(|output| output["tenant_shares"][0].as_str())
        .context("wallet deployment returned no tenant share")?
        .parse()?;

    let signed = app
        .submitter
        .submit_signed(transfer(project, "near", near_wallet.id, "5"), &tenant_share, None)
        .await?;
    ids.push(signed);

    let evm_wallet = Wallet::new(WalletId::generate(), project, Chain::new("polygon")).with_multi_nonce(true);
    app.wallets.save(&evm_wallet).await?;
    for n in 0..transfers {
        let amount = format!("{},5", n + 1);
        ids.push(app.submitter.add_task(transfer(project, "polygon", evm_wallet.id, &amount), None).await?);
    }

    settle(&app, &ids).await?;

    let mut lines = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(task) = app.store.get(*id).await? {
            lines.push(TaskLine {
                id: task.id,
                kind: task.kind().to_string(),
                chain: task.chain.to_string(),
                state: format!("{:?}", task.state),
                tries: task.tries,
                tx_hash: task.tx_hash.clone(),
            });
        }
    }
    let report = DemoReport {
        project,
        counts: app.store.counts().await?,
        tasks: lines,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn transfer(project: ProjectId, chain: &str, from: WalletId, amount: &str) -> NewTask {
    NewTask::new(
        project,
        Chain::new(chain),
        TaskPayload::Transfer(TransferParams {
            amount: amount.to_string(),
        }),
    )
    .from_wallet(from)
}

/// Plays the chain indexer: confirms every transaction left waiting until
/// all `ids` are final.
async fn settle(app: &Tessera, ids: &[TaskId]) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        let mut open = 0;
        for id in ids {
            let Some(task) = app.store.get(*id).await? else {
                continue;
            };
            if task.state.is_terminal() {
                continue;
            }
            open += 1;
            if task.is_awaiting_confirmation()
                && let Some(tx_hash) = &task.tx_hash
            {
                let outcome = app
                    .reconciler
                    .on_notification(&IndexerNotification::mined(tx_hash))
                    .await?;
                info!(?outcome, "indexer confirmed transaction");
            }
        }
        if open == 0 {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(open, "tasks still open at deadline");
            bail!("{open} tasks did not settle in time");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
