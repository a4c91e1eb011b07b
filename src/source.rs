use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::InventoryError;
use crate::inventory::{self, InventoryTable};

/// Where an inventory spreadsheet comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Upload { name: String, bytes: Arc<[u8]> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    Path(PathBuf),
    Content(u64),
}

impl Source {
    /// Reads a user chosen file completely into memory, like a browser upload.
    pub fn upload_from_path(path: &Path) -> Result<Self, InventoryError> {
        let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        Ok(Source::Upload {
            name,
            bytes: bytes.into(),
        })
    }

    pub fn id(&self) -> SourceId {
        match self {
            Source::Path(path) => SourceId::Path(path.clone()),
            Source::Upload { bytes, .. } => {
                let mut hasher = DefaultHasher::new();
                bytes.hash(&mut hasher);
                SourceId::Content(hasher.finish())
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            Source::Path(path) => path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("???")
                .to_string(),
            Source::Upload { name, .. } => name.clone(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Upload { name, bytes } => write!(f, "upload '{}' ({} bytes)", name, bytes.len()),
        }
    }
}

pub(crate) fn read_error(path: &Path, e: io::Error) -> InventoryError {
    InventoryError::SourceRead {
        origin: path.display().to_string(),
        reason: match e.kind() {
            ErrorKind::NotFound => "file not found".to_string(),
            ErrorKind::PermissionDenied => "permission denied".to_string(),
            _ => e.to_string(),
        },
    }
}

/// Expands `~` and environment variables in a path typed by the user.
pub fn expand_path(input: &str) -> Result<PathBuf, InventoryError> {
    let expanded = shellexpand::full(input.trim()).map_err(|e| InventoryError::SourceRead {
        origin: input.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Loaded tables of one session, keyed by source identity.
///
/// Tables are immutable after load and handed out as `Arc`, so a table can be
/// shared read-only while every session keeps its own store.
#[derive(Default)]
pub struct SourceCache {
    tables: HashMap<SourceId, Arc<InventoryTable>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, source: &Source) -> Result<Arc<InventoryTable>, InventoryError> {
        let id = source.id();
        if let Some(table) = self.tables.get(&id) {
            debug!("Cache hit for {source}");
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(inventory::load(source)?);
        info!("Cached {} records from {source}", table.len());
        self.tables.insert(id, Arc::clone(&table));
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::sample_workbook;

    fn upload(bytes: Vec<u8>) -> Source {
        Source::Upload {
            name: "test.xlsx".to_string(),
            bytes: bytes.into(),
        }
    }

    #[test]
    fn same_content_shares_one_table() {
        let mut cache = SourceCache::new();
        let bytes = sample_workbook();
        let first = cache.get_or_load(&upload(bytes.clone())).unwrap();
        let second = cache.get_or_load(&upload(bytes)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn path_and_content_ids_differ() {
        let path = Source::Path(PathBuf::from("a.xlsx"));
        assert_eq!(path.id(), SourceId::Path(PathBuf::from("a.xlsx")));
        assert!(matches!(upload(vec![1, 2, 3]).id(), SourceId::Content(_)));
        assert_ne!(upload(vec![1, 2, 3]).id(), upload(vec![1, 2, 4]).id());
    }

    #[test]
    fn failed_load_is_not_cached() {
        let mut cache = SourceCache::new();
        let err = cache.get_or_load(&upload(b"not a spreadsheet".to_vec()));
        assert!(matches!(err, Err(InventoryError::SourceRead { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_upload_file_is_a_source_error() {
        let err = Source::upload_from_path(Path::new("/definitely/not/here.xlsx")).unwrap_err();
        assert!(err.is_source_error());
    }

    #[test]
    fn upload_reads_file_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("清單.xlsx");
        fs::write(&path, sample_workbook()).unwrap();

        let source = Source::upload_from_path(&path).unwrap();
        assert_eq!(source.name(), "清單.xlsx");
        let table = inventory::load(&source).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn expand_path_trims_input() {
        assert_eq!(expand_path("  data/x.xlsx ").unwrap(), PathBuf::from("data/x.xlsx"));
    }
}
