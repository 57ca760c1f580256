use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use booking_notifier::airtable::{AirtableClient, RecordStore};
use booking_notifier::config;
use booking_notifier::dispatch::is_valid_chat_id;
use booking_notifier::extract;
use booking_notifier::render;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print the notifications the next poll cycle would send, without sending them"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = AirtableClient::from_config(&cfg)?;

    println!("Filter: {}", client.filter_formula());
    let records = client.fetch_due().await?;
    println!("Due bookings: {}", records.len());

    for record in &records {
        let booking = extract::booking_from_record(record, &cfg.airtable.fields);
        println!();
        match booking.recipient.as_deref() {
            Some(chat_id) if is_valid_chat_id(chat_id) => {
                println!("== {} -> {}", record.id, chat_id);
                let message = render::render(&booking, cfg.telegram.details_url.as_deref());
                println!("{}", message.text);
            }
            other => println!("== {} skipped: invalid chat id {:?}", record.id, other),
        }
    }
    Ok(())
}
