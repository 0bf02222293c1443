#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Mail queue consumer: sends a QR ticket email for every reservation message

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ticket_mailer::{
    domain::tickets::{TicketConfig, TicketServiceImpl},
    infrastructure::{
        email::smtp::{SMTPConfig, SMTPMailer},
        queue::rabbitmq::{RabbitMQConfig, RabbitMQConsumer},
        shutdown::shutdown_signal,
    },
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(name = "mail-consumer", version, about)]
pub struct Args {
    /// The SMTP server configuration
    #[clap(flatten)]
    pub smtp: SMTPConfig,

    /// The RabbitMQ connection and queue configuration
    #[clap(flatten)]
    pub rabbitmq: RabbitMQConfig,

    /// The ticket email settings
    #[clap(flatten)]
    pub tickets: TicketConfig,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mailer = Arc::new(
        SMTPMailer::connect(&args.smtp)
            .await
            .context("failed to open the SMTP session")?,
    );

    let tickets = TicketServiceImpl::new(mailer.clone(), args.tickets);

    let consumer = RabbitMQConsumer::connect(args.rabbitmq, tickets).await?;

    let outcome = consumer.run(shutdown_signal()).await;

    match Arc::try_unwrap(mailer) {
        Ok(mailer) => mailer.close(),
        Err(_) => warn!("SMTP session still in use, leaving it to process exit"),
    }

    outcome
}
