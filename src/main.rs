use automarket::application::engine::MarketEngine;
use automarket::config::{MarketConfig, RawSettings};
use automarket::domain::ports::MarketStoreHandle;
use automarket::domain::store::PaymentFilter;
use automarket::infrastructure::in_memory::InMemoryMarketStore;
use automarket::infrastructure::ledger::SimulatedLedger;
use automarket::infrastructure::mailer::TracingMailer;
use automarket::infrastructure::rendering::TextInvoiceRenderer;
use automarket::interfaces::csv::payment_writer::PaymentWriter;
use automarket::interfaces::jsonl::command_reader::CommandReader;
use automarket::interfaces::jsonl::envelope::{Envelope, EnvelopeWriter};
use automarket::interfaces::seed::seed_users;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands file (JSON Lines, one command per line)
    input: PathBuf,

    /// JSON array of user profiles to load before processing
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Write every stored payment as CSV to this path once the input is processed
    #[arg(long)]
    export_payments: Option<PathBuf>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Platform commission taken from each captured payment
    #[arg(long, env = "AUTOMARKET_COMMISSION_RATE", default_value = "0.05")]
    commission_rate: Decimal,

    #[arg(long, env = "AUTOMARKET_CURRENCY", default_value = "eur")]
    currency: String,

    /// VAT added on buyer invoices
    #[arg(long, env = "AUTOMARKET_VAT_RATE", default_value = "0")]
    vat_rate: Decimal,

    #[arg(long, env = "AUTOMARKET_GATEWAY_TIMEOUT_MS", default_value_t = 10_000)]
    gateway_timeout_ms: u64,

    #[arg(long, env = "AUTOMARKET_RESERVATION_LEASE_SECS", default_value_t = 300)]
    reservation_lease_secs: u64,

    /// Also render the expert's payout receipt for each invoice
    #[arg(
        long,
        env = "AUTOMARKET_SELLER_RECEIPTS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    seller_receipts: bool,
}

impl Cli {
    fn settings(&self) -> RawSettings {
        RawSettings {
            commission_rate: self.commission_rate,
            currency: self.currency.clone(),
            vat_rate: self.vat_rate,
            gateway_timeout_ms: self.gateway_timeout_ms,
            reservation_lease_secs: self.reservation_lease_secs,
            seller_receipts: self.seller_receipts,
        }
    }
}

fn open_store(db_path: Option<PathBuf>) -> Result<MarketStoreHandle> {
    #[cfg(feature = "storage-rocksdb")]
    {
        if let Some(db_path) = db_path {
            use automarket::infrastructure::rocksdb::RocksDbMarketStore;
            let store = RocksDbMarketStore::open(db_path).into_diagnostic()?;
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    {
        if db_path.is_some() {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' \
                 feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    Ok(Arc::new(InMemoryMarketStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = MarketConfig::from_settings(cli.settings()).into_diagnostic()?;
    let store = open_store(cli.db_path.clone())?;

    if let Some(seed) = &cli.seed {
        let file = File::open(seed).into_diagnostic()?;
        seed_users(store.as_ref(), BufReader::new(file))
            .await
            .into_diagnostic()?;
    }

    let engine = MarketEngine::new(
        store.clone(),
        Arc::new(SimulatedLedger::new()),
        Arc::new(TextInvoiceRenderer::new()),
        Arc::new(TracingMailer),
        config,
    );

    // Process commands
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    let stdout = io::stdout();
    let mut writer = EnvelopeWriter::new(stdout.lock());
    for (line, request) in reader.requests() {
        let envelope = match request {
            Ok(request) => Envelope::from(engine.execute(request).await),
            Err(e) => {
                warn!(line, error = %e, "skipping unreadable command");
                Envelope::failure(&e)
            }
        };
        writer.write(&envelope).into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;

    engine.flush().await;

    if let Some(path) = &cli.export_payments {
        let payments = store
            .payments(&PaymentFilter::default())
            .await
            .into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        PaymentWriter::new(file)
            .write_payments(&payments)
            .into_diagnostic()?;
    }

    Ok(())
}
