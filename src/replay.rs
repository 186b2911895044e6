//! Offline replay: seed a store from JSON and run saved `.eml` files
//! through the processor.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ConfigError, Error};
use crate::pipeline::{InboundMail, QuoteOutcome, parse_raw_mail};
use crate::store::StoreSeed;

/// Read a [`StoreSeed`] from a JSON file.
pub async fn load_seed(path: &Path) -> Result<StoreSeed, ConfigError> {
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
}

/// Parse every `.eml` file in `dir`, sorted by file name. The file stem is
/// used as the mail id. Unparseable files are logged and skipped.
pub async fn load_mail_dir(dir: &Path, max_attachment_bytes: usize) -> Result<Vec<InboundMail>, Error> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(ConfigError::from)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(ConfigError::from)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("eml")) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut mails = Vec::with_capacity(paths.len());
    for path in paths {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = tokio::fs::read(&path).await.map_err(ConfigError::from)?;
        match parse_raw_mail(&id, &raw, max_attachment_bytes) {
            Ok(mail) => mails.push(mail),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unparseable mail"),
        }
    }
    info!(dir = %dir.display(), count = mails.len(), "Loaded mail directory");
    Ok(mails)
}

/// Outcome counts plus per-mail detail, printed by the replay binary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub processed: usize,
    pub counts: BTreeMap<&'static str, usize>,
    pub outcomes: Vec<ReplayEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEntry {
    pub mail_id: String,
    #[serde(flatten)]
    pub outcome: QuoteOutcome,
}

impl ReplaySummary {
    pub fn new(results: Vec<(String, QuoteOutcome)>) -> Self {
        let mut counts = BTreeMap::new();
        for (_, outcome) in &results {
            *counts.entry(outcome.label()).or_insert(0) += 1;
        }
        Self {
            processed: results.len(),
            counts,
            outcomes: results
                .into_iter()
                .map(|(mail_id, outcome)| ReplayEntry { mail_id, outcome })
                .collect(),
        }
    }
}
