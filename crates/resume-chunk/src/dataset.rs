//! Candidate dataset loading.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use resume_core::{Candidate, Result, SearchError};

/// Load candidates from a JSON array file.
///
/// Malformed records are skipped with a warning; an unreadable file or a
/// non-array document aborts the load.
pub fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    if !path.exists() {
        return Err(SearchError::DatasetNotFound {
            name: path.display().to_string(),
        });
    }

    info!("Loading candidates from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let candidates = parse_candidates(&content)?;
    info!("Found {} candidates", candidates.len());
    Ok(candidates)
}

/// Parse candidates from a JSON array document.
///
/// Field values of the wrong type fall back to empty; only records that are
/// not objects or carry no `candidate_id` are dropped.
pub fn parse_candidates(content: &str) -> Result<Vec<Candidate>> {
    let document: Value = serde_json::from_str(content)
        .map_err(|e| SearchError::data(format!("dataset is not valid JSON: {}", e)))?;

    let Value::Array(records) = document else {
        return Err(SearchError::data("dataset must be a JSON array of candidates"));
    };

    let mut candidates = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        if !record.is_object() {
            warn!(record = i, "Skipping candidate record that is not an object");
            continue;
        }
        match serde_json::from_value::<Candidate>(record) {
            Ok(candidate) if !candidate.candidate_id.trim().is_empty() => {
                candidates.push(candidate)
            }
            Ok(_) => warn!(record = i, "Skipping candidate without candidate_id"),
            Err(e) => warn!(record = i, error = %e, "Skipping malformed candidate record"),
        }
    }

    Ok(candidates)
}
