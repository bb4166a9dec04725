use super::backend::DynIndexBackend;
use crate::coordination::types::BackendError;

use std::collections::BTreeMap;
use thiserror::Error;

/// Namespace of holder sets in the metadata backend: `file:<filename>`.
pub const FILE_KEY_PREFIX: &str = "file:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("file location index unavailable: {0}")]
    Backend(#[from] BackendError),
}

/// Shared filename → holder-address index.
pub struct FileLocationIndex {
    backend: DynIndexBackend,
}

impl FileLocationIndex {
    pub fn new(backend: DynIndexBackend) -> Self {
        Self { backend }
    }

    /// Records `address` as a holder of `filename`. Repeated calls are no-ops.
    pub async fn record_holder(&self, filename: &str, address: &str) -> Result<(), IndexError> {
        let added = self
            .backend
            .add_to_set(&file_key(filename), address)
            .await?;

        if added {
            tracing::info!("Recorded {} as holder of {}", address, filename);
        } else {
            tracing::debug!("{} already recorded as holder of {}", address, filename);
        }
        Ok(())
    }

    /// Holders of `filename` in backend order. Unknown filenames yield an empty list.
    pub async fn get_holders(&self, filename: &str) -> Result<Vec<String>, IndexError> {
        Ok(self.backend.set_members(&file_key(filename)).await?)
    }

    /// Full filename → holders mapping.
    ///
    /// Walks every `file:*` key; fine for small catalogs, not meant to scale. A key whose
    /// members cannot be read is skipped rather than failing the whole listing.
    pub async fn list_all(&self) -> Result<BTreeMap<String, Vec<String>>, IndexError> {
        let keys = self.backend.keys_with_prefix(FILE_KEY_PREFIX).await?;

        let mut files = BTreeMap::new();
        for key in keys {
            let Some(filename) = key.strip_prefix(FILE_KEY_PREFIX) else {
                continue;
            };

            match self.backend.set_members(&key).await {
                Ok(holders) => {
                    files.insert(filename.to_string(), holders);
                }
                Err(e) => {
                    tracing::warn!("Skipping {} while listing files: {}", key, e);
                }
            }
        }

        Ok(files)
    }
}

pub fn file_key(filename: &str) -> String {
    format!("{}{}", FILE_KEY_PREFIX, filename)
}
