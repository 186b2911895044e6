use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use quote_inbox::config::PipelineConfig;
use quote_inbox::llm::LazyClient;
use quote_inbox::pipeline::QuoteResponseProcessor;
use quote_inbox::replay::{ReplaySummary, load_mail_dir, load_seed};
use quote_inbox::store::InMemoryStore;

/// Console logging, plus a daily-rotated file when `QUOTE_INBOX_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("QUOTE_INBOX_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "quote-inbox.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(seed_path), Some(mail_dir)) = (args.next(), args.next()) else {
        bail!("usage: quote-inbox <seed.json> <mail-dir>");
    };
    let seed_path = PathBuf::from(seed_path);
    let mail_dir = PathBuf::from(mail_dir);

    let config = PipelineConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        model = %config.model,
        timeout_secs = config.model_timeout.as_secs(),
        concurrency = config.batch_concurrency,
        "Quote inbox replay v{}",
        env!("CARGO_PKG_VERSION")
    );

    let seed = load_seed(&seed_path)
        .await
        .with_context(|| format!("failed to load seed {}", seed_path.display()))?;
    let store = Arc::new(InMemoryStore::from_seed(seed));
    let mails = load_mail_dir(&mail_dir, config.max_attachment_bytes)
        .await
        .with_context(|| format!("failed to read mail directory {}", mail_dir.display()))?;

    let processor = QuoteResponseProcessor::new(store, Arc::new(LazyClient::from_env(&config)), &config);
    let results = processor.process_batch(mails).await;

    let summary = ReplaySummary::new(results);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
