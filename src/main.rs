//! form-intake - replay a fixture of forms and submissions
//!
//! Seeds an in-memory database with the fixture's forms, submits each of its
//! responses and prints the accepted ones with their generated ids.

use anyhow::{Context, Result};
use form_intake::config::IntakeConfig;
use form_intake::fixture::{Fixture, Intake};
use form_intake::store::memory::MemoryDatabase;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "form_intake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: form-intake <fixture.json>")?;

    let config = IntakeConfig::load().context("loading configuration")?;
    let settings = config.gateway_settings();
    tracing::debug!("Gateway settings: {settings:?}");

    let fixture = Fixture::load(&path)?;
    let db = MemoryDatabase::new(settings);
    let report = Intake::new(&db).run(fixture).await?;

    for submission in &report.accepted {
        println!("{}", serde_json::to_string_pretty(submission)?);
    }

    if !report.rejected.is_empty() {
        eprintln!(
            "{} of {} submission(s) rejected",
            report.rejected.len(),
            report.rejected.len() + report.accepted.len()
        );
        std::process::exit(1);
    }

    Ok(())
}
