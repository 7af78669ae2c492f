//! Target and PoC discovery
//!
//! Loads the scan inputs and feeds them into the dispatch streams. Target
//! lists are one entry per line; blank lines and `#` comments are ignored and
//! duplicates are dropped in first-seen order. PoCs are `*.toml` files in a
//! directory, loaded in file-name order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::models::Poc;
use crate::utils::{clean_target_line, is_malformed_target};

/// Targets split into usable and rejected entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    pub targets: Vec<String>,
    pub rejected: Vec<String>,
}

impl TargetList {
    /// Parse a newline-separated target list
    pub fn parse(content: &str) -> Self {
        let mut list = Self::default();
        list.extend(content.lines());
        list
    }

    /// Add entries, skipping blanks, comments and duplicates
    pub fn extend<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        let mut seen: HashSet<String> = self.targets.iter().cloned().collect();

        for line in lines {
            let Some(target) = clean_target_line(line) else {
                continue;
            };
            match validate_target(target) {
                Ok(target) => {
                    if seen.insert(target.to_string()) {
                        self.targets.push(target.to_string());
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Target rejected");
                    self.rejected.push(target.to_string());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Check that a cleaned target entry can be probed and scanned
pub fn validate_target(target: &str) -> Result<&str> {
    if is_malformed_target(target) {
        Err(Error::InvalidTarget(target.to_string()))
    } else {
        Ok(target)
    }
}

/// Collect targets from inline arguments and an optional file
pub fn load_targets(inline: &[String], file: Option<&Path>) -> Result<TargetList> {
    let mut list = TargetList::default();
    list.extend(inline.iter().map(String::as_str));

    if let Some(path) = file {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::with_source(format!("Failed to read target file: {}", path.display()), e)
        })?;
        list.extend(content.lines());
    }

    tracing::debug!(
        targets = list.targets.len(),
        rejected = list.rejected.len(),
        "Targets loaded"
    );
    Ok(list)
}

/// Parse a single PoC file
pub fn load_poc(path: &Path) -> Result<Poc> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::poc(path, e.to_string()))
}

/// Load every `*.toml` PoC in `dir`, sorted by file name
///
/// Any unreadable or unparseable file aborts loading.
pub fn load_pocs(dir: &Path) -> Result<Vec<Poc>> {
    if !dir.is_dir() {
        return Err(Error::poc(dir, "not a directory"));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let pocs = paths
        .iter()
        .map(|path| load_poc(path))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(dir = %dir.display(), pocs = pocs.len(), "PoCs loaded");
    Ok(pocs)
}

/// Send every item into `tx`, then close it by dropping the sender
///
/// Returns the number of items sent; stops early if the receiver is gone.
pub async fn feed<T>(tx: mpsc::Sender<T>, items: Vec<T>) -> usize {
    let mut sent = 0;
    for item in items {
        if tx.send(item).await.is_err() {
            tracing::debug!(sent, "Dispatch stream closed early");
            break;
        }
        sent += 1;
    }
    sent
}
