//! BudgetShare rates CLI
//!
//! Operator view of the exchange-rate service: list the resolved rates,
//! convert an amount, or list the supported currency codes.

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use budgetshare_common::Currency;
use budgetshare_fx::{ConversionRequest, FxConfig, FxService};

mod output;

/// BudgetShare exchange-rate CLI
#[derive(Parser, Debug)]
#[command(name = "ratesctl")]
#[command(about = "Inspect BudgetShare exchange rates and conversions")]
struct Args {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current rate table
    Rates,

    /// Convert an amount between two currencies
    Convert {
        /// Amount to convert
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        /// Source currency code
        from: Currency,
        /// Target currency code
        to: Currency,
    },

    /// List supported currency codes
    Supported,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    // Logs go to stderr so stdout stays clean for command output.
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.json_logs);

    // Load configuration; the service validates it
    let config = FxConfig::from_env();
    let service = FxService::from_config(&config).map_err(|e| {
        error!(error = %e, "Failed to start FX service");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    let rendered = match args.command {
        Command::Rates => {
            let rates = service.get_rates().await;
            if rates.freshness.is_degraded() {
                info!(freshness = %rates.freshness, "Serving degraded rates");
            }
            if args.json {
                output::rates_json(&rates)?
            } else {
                output::rates_text(&rates)
            }
        }
        Command::Convert { amount, from, to } => {
            let request = ConversionRequest::new(amount, from, to);
            let quote = service.quote(&request).await?;
            if args.json {
                output::quote_json(&quote)?
            } else {
                output::quote_text(&quote)
            }
        }
        Command::Supported => {
            let currencies = service.supported_currencies().await;
            if args.json {
                output::supported_json(&currencies)?
            } else {
                output::supported_text(&currencies)
            }
        }
    };

    print!("{}", rendered);
    if args.json {
        println!();
    }

    Ok(())
}
