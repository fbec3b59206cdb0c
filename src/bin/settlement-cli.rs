use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "settlement-cli")]
#[command(about = "Operator CLI for the stake settlement service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "SETTLEMENT_URL")]
    url: String,

    #[arg(short, long, env = "SETTLEMENT_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service status: chains, settlement counts, wallets
    Status,
    /// List settlements, newest first
    List {
        /// Only show settlements in this status (pending, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one settlement with its transactions
    Show { id: Uuid },
    /// Resume a failed or stalled settlement
    Resume { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::List { status } => {
            let res = client
                .get(format!("{}/admin/settlements", base))
                .headers(headers)
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            let settlements: Vec<Value> = res.json().await?;
            for s in settlements
                .iter()
                .filter(|s| status.as_deref().map_or(true, |want| s["status"] == want))
            {
                println!(
                    "{}  {:<10} {:<9} {:<8} project={} usd={}",
                    s["id"].as_str().unwrap_or("-"),
                    s["stage"].as_str().unwrap_or("-"),
                    s["status"].as_str().unwrap_or("-"),
                    s["chain"].as_str().unwrap_or("-"),
                    s["project_id"],
                    s["usd_amount"].as_str().unwrap_or("-"),
                );
            }
        }
        Commands::Show { id } => {
            let res = client
                .get(format!("{}/settlements/{}", base, id))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Resume { id } => {
            let res = client
                .post(format!("{}/admin/settlements/{}/resume", base, id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    let body: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
