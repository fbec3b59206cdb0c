//! Stake settlement service.
//!
//! # Architecture Overview
//!
//! ```text
//!   fiat gateway ──callback──▶ http ──▶ PaymentGatewayAdapter
//!                                              │ start
//!                                              ▼
//!                                     SettlementPipeline ◀── admin resume
//!                                              │ queue
//!                                              ▼
//!                                      SettlementWorker(s)
//!                                              │
//!            ┌─────────────────┬───────────────┴──────┬────────────────┐
//!            ▼                 ▼                      ▼                ▼
//!       SwapRouter       TokenApprover          StakeExecutor    CampaignLedger
//!            └────────┬────────┴──────────────────────┘
//!                     ▼
//!        TxSubmitter (per-wallet nonce lock) ── WalletStore (signing)
//!                     │
//!                     ▼
//!           ChainRegistry ── ChainClient (BSC / Ethereum / Base)
//! ```

use clap::Parser;
use std::path::PathBuf;

use stake_settlement::lifecycle;

#[derive(Parser)]
#[command(name = "stake-settlement", version, about = "Fiat-to-stake settlement service")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when it is missing.
    #[arg(short, long, default_value_os_t = lifecycle::startup::default_config_path())]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = lifecycle::run(&args.config).await {
        tracing::error!(error = %e, "Fatal startup error");
        eprintln!("stake-settlement: {}", e);
        std::process::exit(1);
    }
}
