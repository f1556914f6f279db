//! JSON persistence for evaluation results.
//!
//! A dataset file maps each domain name to its list of results:
//!
//! ```json
//! { "employees": [ { "query": "...", "answer": "...", "response": "...", "tag": 3 } ] }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::result::QueryResult;

/// Results keyed by domain name.
pub type DomainResults = BTreeMap<String, Vec<QueryResult>>;

/// Load a per-domain dataset.
pub fn load_domains(path: &Path) -> Result<DomainResults> {
    let data = std::fs::read_to_string(path)?;
    let domains: DomainResults = serde_json::from_str(&data)?;
    debug!(
        path = %path.display(),
        domains = domains.len(),
        results = domains.values().map(Vec::len).sum::<usize>(),
        "Loaded dataset"
    );
    Ok(domains)
}

/// Load a single list of results, e.g. one cluster of a hypothesis test.
pub fn load_results(path: &Path) -> Result<Vec<QueryResult>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Save a per-domain dataset (atomic write).
pub fn save_domains(path: &Path, domains: &DomainResults) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(domains)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), domains = domains.len(), "Saved dataset");
    Ok(())
}
