//! Input ingestion: model list, prior-run flags and error-list selection

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::application::query_generator::QueryGenerator;
use crate::domain::IngestError;
use crate::infrastructure::tabular::{RawModelRow, read_model_rows};

/// Validated models in input order.
#[derive(Debug, Default)]
pub struct ModelList {
    pub models: Vec<String>,
    /// Models a previous run already flagged as processed
    pub already_processed: Vec<String>,
    /// Rows that could not become a query, with their line numbers
    pub rejected: Vec<IngestError>,
}

impl ModelList {
    /// Validate raw rows: invalid names are reported per row, duplicates
    /// keep their first occurrence.
    pub fn from_rows(rows: Vec<RawModelRow>, generator: &QueryGenerator) -> Self {
        let mut list = Self::default();
        let mut seen = HashSet::new();

        for row in rows {
            let query = match generator.generate(&row.name) {
                Ok(query) => query,
                Err(_) => {
                    let err = IngestError::InvalidModelName {
                        row: Some(row.line),
                        value: row.name,
                    };
                    warn!("⚠️ Skipping input row: {}", err);
                    list.rejected.push(err);
                    continue;
                }
            };

            let name = query.canonical_name().to_string();
            if !seen.insert(name.clone()) {
                warn!("⚠️ Duplicate model '{}' at row {} ignored", name, row.line);
                continue;
            }
            if row.already_processed {
                list.already_processed.push(name.clone());
            }
            list.models.push(name);
        }

        list
    }

    /// Keep only the models picked by an error list; prior-run flags are
    /// dropped since these models are being retried on purpose.
    #[must_use]
    pub fn restrict_to(self, selected: Vec<String>) -> Self {
        Self {
            models: selected,
            already_processed: Vec::new(),
            rejected: self.rejected,
        }
    }
}

/// Comparison key for error-list matching: lower-case alphanumerics only.
fn loose_key(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Master models matched by an error list, in master order.
///
/// A master model matches when its loose key contains an error entry's key
/// or the other way round. Error entries matching nothing are logged.
pub fn select_error_list(master: &[String], errors: &[String]) -> Vec<String> {
    let error_keys: Vec<String> = errors.iter().map(|e| loose_key(e)).filter(|k| !k.is_empty()).collect();

    let selected: Vec<String> = master
        .iter()
        .filter(|m| {
            let key = loose_key(m);
            !key.is_empty()
                && error_keys
                    .iter()
                    .any(|e| key.contains(e.as_str()) || e.contains(key.as_str()))
        })
        .cloned()
        .collect();

    for (raw, key) in errors.iter().zip(errors.iter().map(|e| loose_key(e))) {
        let matched = !key.is_empty()
            && master.iter().any(|m| {
                let mk = loose_key(m);
                !mk.is_empty() && (mk.contains(key.as_str()) || key.contains(mk.as_str()))
            });
        if !matched {
            warn!("⚠️ Error-list entry '{}' matches no input model", raw.trim());
        }
    }

    selected
}

/// Load and validate the input list, optionally restricted by an error list.
pub async fn load_models(
    input: &Path,
    site: Option<&str>,
    error_list: Option<&Path>,
    generator: &QueryGenerator,
) -> Result<ModelList, IngestError> {
    let rows = read_model_rows(input, site).await?;
    let list = ModelList::from_rows(rows, generator);
    info!(
        "📋 Loaded {} model(s) from {:?} ({} flagged as done, {} rejected)",
        list.models.len(),
        input,
        list.already_processed.len(),
        list.rejected.len()
    );

    let Some(error_path) = error_list else {
        return Ok(list);
    };

    let error_rows = read_model_rows(error_path, None).await?;
    let errors: Vec<String> = error_rows.into_iter().map(|r| r.name).collect();
    let selected = select_error_list(&list.models, &errors);
    info!("🔁 Error list {:?}: {} of {} entries selected", error_path, selected.len(), errors.len());
    Ok(list.restrict_to(selected))
}
