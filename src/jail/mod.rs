//! Jail navigator
//!
//! Browsing and listing confined to a single root directory (the user's
//! home by default). See [`Jail::resolve`] for the accepted path forms.

pub mod navigator;

pub use navigator::{format_size, FileEntry, Jail, DEFAULT_MAX_ENTRIES};

use crate::error::{Error, Result};
use crate::protocol::FileInfo;
use std::path::PathBuf;

/// Result of a `browse`: the canonical directory plus its entries
#[derive(Debug, Clone)]
pub struct Listing {
    pub dir: PathBuf,
    pub display_path: String,
    pub entries: Vec<FileEntry>,
}

impl Listing {
    pub fn file_infos(&self) -> Vec<FileInfo> {
        self.entries
            .iter()
            .map(|entry| FileInfo {
                name: entry.name.clone(),
                is_dir: entry.is_dir,
                size: entry.size_label(),
            })
            .collect()
    }
}

/// Resolve and list on the blocking pool
pub async fn browse(jail: &Jail, raw: &str) -> Result<Listing> {
    let jail = jail.clone();
    let raw = raw.to_string();
    tokio::task::spawn_blocking(move || {
        let dir = jail.resolve(&raw)?;
        let entries = jail.list(&dir)?;
        Ok(Listing {
            display_path: jail.display_path(&dir),
            dir,
            entries,
        })
    })
    .await
    .map_err(|e| Error::Internal(format!("listing task failed: {}", e)))?
}
