//! Dataset versions and the single active pointer.
//!
//! Locks are always taken in the order `active` then `registry`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use transit_schedule_model::{DatasetVersion, VersionId, VersionState};

use crate::error::{ActivationConflictError, VersionError};
use crate::store::Dataset;

#[derive(Default)]
struct VersionRegistry {
    next_id: u64,
    versions: BTreeMap<VersionId, DatasetVersion>,
    datasets: FxHashMap<VersionId, Arc<Dataset>>,
}

/// Held for the whole of one import; concurrent imports queue on it.
pub struct ImportSlot<'a> {
    _gate: MutexGuard<'a, ()>,
    expected: Option<VersionId>,
}

impl ImportSlot<'_> {
    /// Active version observed when the import started.
    pub fn expected_active(&self) -> Option<VersionId> {
        self.expected
    }
}

#[derive(Default)]
pub struct VersionManager {
    active: RwLock<Option<Arc<Dataset>>>,
    registry: RwLock<VersionRegistry>,
    import_gate: Mutex<()>,
}

impl VersionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other import runs.
    pub fn begin_import(&self) -> ImportSlot<'_> {
        let gate = self
            .import_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let expected = self.active_id();
        ImportSlot {
            _gate: gate,
            expected,
        }
    }

    pub fn create_version(&self, filename: &str, uploaded_by: i64) -> DatasetVersion {
        let mut registry = self.write_registry();
        registry.next_id += 1;
        let version = DatasetVersion {
            id: VersionId(registry.next_id),
            filename: filename.to_string(),
            uploaded_by,
            uploaded_at: Utc::now(),
            active: false,
            state: VersionState::Importing,
        };
        registry.versions.insert(version.id, version.clone());
        version
    }

    pub fn discard(&self, id: VersionId) {
        let mut registry = self.write_registry();
        if let Some(version) = registry.versions.get_mut(&id) {
            version.state = VersionState::Discarded;
        }
        registry.datasets.remove(&id);
        warn!(version = %id, "dataset version discarded");
    }

    /// Swaps the imported dataset in as the active version.
    ///
    /// Fails when the active version is no longer the one observed by
    /// [`VersionManager::begin_import`]; the new version is then discarded.
    pub fn commit(
        &self,
        slot: ImportSlot<'_>,
        dataset: Dataset,
    ) -> Result<DatasetVersion, ActivationConflictError> {
        let id = dataset.version();
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let mut registry = self.write_registry();

        let found = active.as_ref().map(|current| current.version());
        if found != slot.expected {
            if let Some(version) = registry.versions.get_mut(&id) {
                version.state = VersionState::Discarded;
            }
            warn!(
                version = %id,
                expected = ?slot.expected,
                found = ?found,
                "activation conflict, version discarded"
            );
            return Err(ActivationConflictError {
                expected: slot.expected,
                found,
            });
        }

        let mut version = match registry.versions.get_mut(&id) {
            Some(version) => {
                version.state = VersionState::Imported;
                version.clone()
            }
            None => {
                return Err(ActivationConflictError {
                    expected: slot.expected,
                    found,
                })
            }
        };
        let dataset = Arc::new(dataset);
        registry.datasets.insert(id, Arc::clone(&dataset));
        *active = Some(dataset);
        version.active = true;
        info!(version = %id, previous = ?found, "dataset version activated");
        Ok(version)
    }

    /// Re-activates an imported version; a no-op when it is already active.
    pub fn activate(&self, id: VersionId) -> Result<DatasetVersion, VersionError> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let registry = self.read_registry();

        let mut version = registry
            .versions
            .get(&id)
            .cloned()
            .ok_or(VersionError::NotFound(id))?;
        let dataset = match (version.state, registry.datasets.get(&id)) {
            (VersionState::Imported, Some(dataset)) => Arc::clone(dataset),
            _ => return Err(VersionError::NotImported(id)),
        };

        let previous = active.as_ref().map(|current| current.version());
        if previous != Some(id) {
            *active = Some(dataset);
            info!(version = %id, previous = ?previous, "dataset version re-activated");
        }
        version.active = true;
        Ok(version)
    }

    /// Releases the dataset of an inactive version; its metadata stays
    /// listed as discarded. The active version cannot be forgotten.
    pub fn forget(&self, id: VersionId) -> Result<DatasetVersion, VersionError> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        let mut registry = self.write_registry();

        if active.as_ref().map(|current| current.version()) == Some(id) {
            return Err(VersionError::Active(id));
        }
        let version = registry
            .versions
            .get_mut(&id)
            .ok_or(VersionError::NotFound(id))?;
        if version.state == VersionState::Importing {
            return Err(VersionError::NotImported(id));
        }
        version.state = VersionState::Discarded;
        let version = version.clone();
        if registry.datasets.remove(&id).is_some() {
            info!(version = %id, "dataset version released");
        }
        Ok(version)
    }

    pub fn active_dataset(&self) -> Option<Arc<Dataset>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_id(&self) -> Option<VersionId> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dataset| dataset.version())
    }

    pub fn active_version(&self) -> Option<DatasetVersion> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        let id = active.as_ref()?.version();
        let registry = self.read_registry();
        let mut version = registry.versions.get(&id)?.clone();
        version.active = true;
        Some(version)
    }

    /// All versions in creation order, `active` derived from the pointer.
    pub fn versions(&self) -> Vec<DatasetVersion> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        let active_id = active.as_ref().map(|dataset| dataset.version());
        let registry = self.read_registry();
        registry
            .versions
            .values()
            .map(|version| DatasetVersion {
                active: Some(version.id) == active_id,
                ..version.clone()
            })
            .collect()
    }

    pub fn version(&self, id: VersionId) -> Option<DatasetVersion> {
        let active_id = self.active_id();
        let registry = self.read_registry();
        registry.versions.get(&id).map(|version| DatasetVersion {
            active: Some(id) == active_id,
            ..version.clone()
        })
    }

    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, VersionRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, VersionRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}
