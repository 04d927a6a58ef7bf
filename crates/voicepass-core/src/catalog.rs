//! Hot-swappable level table and item catalog.
//!
//! Both tables live in one immutable [`CatalogSnapshot`] behind an
//! [`Arc`]. Readers clone the `Arc` once per operation and keep using that
//! snapshot even if a reload lands mid-call. A reload builds and validates a
//! complete new snapshot before swapping it in, so readers never observe a
//! half-loaded or half-cleared table, and levels and items always change
//! together.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::items::ItemCatalog;
use crate::levels::LevelTable;

/// A consistent pair of level table and item catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// The level table.
    pub levels: LevelTable,
    /// The item catalog.
    pub items: ItemCatalog,
}

/// Entry counts of a loaded catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSizes {
    /// Number of level entries.
    pub levels: usize,
    /// Number of items.
    pub items: usize,
}

/// A value replaced wholesale and read as a shared snapshot.
#[derive(Debug, Default)]
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    /// A cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<T> {
        // The critical sections only clone or replace an `Arc`, so a
        // poisoned lock still guards a valid value.
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the snapshot, returning the previous one.
    pub fn swap(&self, value: T) -> Arc<T> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(value))
    }
}

/// The live catalog, optionally backed by files for reload.
#[derive(Debug)]
pub struct Catalog {
    cell: SnapshotCell<CatalogSnapshot>,
    sources: Option<(PathBuf, PathBuf)>,
}

impl Catalog {
    /// A catalog built in memory. [`reload`](Self::reload) is unavailable.
    pub fn new(levels: LevelTable, items: ItemCatalog) -> Self {
        Self {
            cell: SnapshotCell::new(CatalogSnapshot { levels, items }),
            sources: None,
        }
    }

    /// Load both files named in `config`.
    ///
    /// # Errors
    ///
    /// Any [`CatalogError`] from reading or validating either file.
    pub fn load(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let snapshot = read_snapshot(&config.levels_path, &config.items_path)?;
        info!(
            levels = snapshot.levels.len(),
            items = snapshot.items.len(),
            levels_path = %config.levels_path.display(),
            items_path = %config.items_path.display(),
            "Catalog loaded"
        );
        Ok(Self {
            cell: SnapshotCell::new(snapshot),
            sources: Some((config.levels_path.clone(), config.items_path.clone())),
        })
    }

    /// The current snapshot. Take one per operation.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.cell.load()
    }

    /// Re-read both source files and swap them in if both validate.
    ///
    /// On any error the previous snapshot stays active.
    pub fn reload(&self) -> Result<CatalogSizes, CatalogError> {
        let Some((levels_path, items_path)) = &self.sources else {
            return Err(CatalogError::NoSource);
        };
        match read_snapshot(levels_path, items_path) {
            Ok(snapshot) => Ok(self.replace(snapshot)),
            Err(e) => {
                warn!(error = %e, "Catalog reload rejected, keeping previous catalog");
                Err(e)
            }
        }
    }

    /// Swap in an already-validated snapshot.
    pub fn replace(&self, snapshot: CatalogSnapshot) -> CatalogSizes {
        let sizes = CatalogSizes {
            levels: snapshot.levels.len(),
            items: snapshot.items.len(),
        };
        let previous = self.cell.swap(snapshot);
        info!(
            levels = sizes.levels,
            items = sizes.items,
            previous_levels = previous.levels.len(),
            previous_items = previous.items.len(),
            "Catalog swapped"
        );
        sizes
    }
}

fn read_snapshot(
    levels_path: &std::path::Path,
    items_path: &std::path::Path,
) -> Result<CatalogSnapshot, CatalogError> {
    let levels = LevelTable::from_file(levels_path)?;
    let items = ItemCatalog::from_file(items_path)?;
    Ok(CatalogSnapshot { levels, items })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::levels::LevelEntry;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("voicepass-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn snapshot_outlives_a_swap() {
        let catalog = Catalog::new(
            LevelTable::from_entries(vec![LevelEntry::new(1, 100)]).unwrap(),
            ItemCatalog::empty(),
        );
        let before = catalog.snapshot();
        catalog.replace(CatalogSnapshot::default());

        assert_eq!(before.levels.threshold(1), Some(100));
        assert!(catalog.snapshot().levels.is_empty());
    }

    #[test]
    fn in_memory_catalog_cannot_reload() {
        let catalog = Catalog::new(LevelTable::empty(), ItemCatalog::empty());
        assert!(matches!(catalog.reload(), Err(CatalogError::NoSource)));
    }

    #[test]
    fn reload_swaps_only_when_both_files_validate() {
        let dir = scratch_dir("reload");
        let levels_path = write(&dir, "levels.yaml", "levels:\n  - { level: 1, exp_threshold: 100 }\n");
        let items_path = write(
            &dir,
            "items.yaml",
            "items:\n  - { id: shield, name: Shield, effect: { type: shield } }\n",
        );
        let config = CatalogConfig {
            levels_path: levels_path.clone(),
            items_path: items_path.clone(),
        };
        let catalog = Catalog::load(&config).unwrap();
        assert_eq!(catalog.snapshot().levels.len(), 1);

        // Valid levels, broken items: nothing changes.
        write(
            &dir,
            "levels.yaml",
            "levels:\n  - { level: 1, exp_threshold: 100 }\n  - { level: 2, exp_threshold: 250 }\n",
        );
        write(
            &dir,
            "items.yaml",
            "items:\n  - { id: a, name: A, effect: { type: passive } }\n  - { id: a, name: B, effect: { type: passive } }\n",
        );
        assert!(matches!(catalog.reload(), Err(CatalogError::DuplicateItem(_))));
        assert_eq!(catalog.snapshot().levels.len(), 1);
        assert_eq!(catalog.snapshot().items.len(), 1);

        // Fix the items file: both swap together.
        write(&dir, "items.yaml", "items: []\n");
        let sizes = catalog.reload().unwrap();
        assert_eq!(sizes, CatalogSizes { levels: 2, items: 0 });
        assert_eq!(catalog.snapshot().levels.threshold(2), Some(250));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let config = CatalogConfig {
            levels_path: PathBuf::from("/nonexistent/voicepass/levels.yaml"),
            items_path: PathBuf::from("/nonexistent/voicepass/items.yaml"),
        };
        assert!(matches!(Catalog::load(&config), Err(CatalogError::Io { .. })));
    }
}
