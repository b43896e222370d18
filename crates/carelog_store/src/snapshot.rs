//! CBOR snapshot persistence for the store.

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use std::fs;
use std::path::Path;
use tracing::info;

impl RecordStore {
    /// Writes the whole store (records, change log, watermarks, last-sync
    /// timestamp) to a snapshot file.
    ///
    /// The snapshot is written to a temporary sibling and renamed into place
    /// so a crash mid-write leaves the previous snapshot intact.
    pub fn save_to(&self, path: &Path) -> StoreResult<()> {
        let mut buf = Vec::new();
        self.with_inner(|inner| ciborium::ser::into_writer(inner, &mut buf))
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        let tmp = path.with_extension("snapshot.tmp");
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), bytes = buf.len(), "saved store snapshot");
        Ok(())
    }

    /// Restores a store from a snapshot file.
    pub fn load_from(path: &Path) -> StoreResult<Self> {
        let bytes = fs::read(path)?;
        let inner = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(Self::from_inner(inner))
    }
}
