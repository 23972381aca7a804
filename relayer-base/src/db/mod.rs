use std::path::PathBuf;
use std::{io, path::Path, sync::Arc};

use rocksdb::{
    Direction, IteratorMode, Options, Transaction, TransactionDB, TransactionDBOptions,
};
use tracing::info;

pub use relayer_db::*;
pub use storage_types::*;

/// Job queue, seen sequences and in-progress markers
mod relayer_db;
/// Records persisted by the relayer
mod storage_types;

/// Database test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[derive(Debug, Clone)]
/// A KV store with transactional check-and-set
pub struct DB(Arc<TransactionDB>);

impl From<TransactionDB> for DB {
    fn from(rocks: TransactionDB) -> Self {
        Self(Arc::new(rocks))
    }
}

/// DB Error type
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// Rocks DB Error
    #[error("{0}")]
    RockError(#[from] rocksdb::Error),
    #[error("Failed to open {path}, canonicalized as {canonicalized}: {source}")]
    /// Error opening the database
    OpeningError {
        /// Rocksdb error during opening
        #[source]
        source: rocksdb::Error,
        /// Raw database path provided
        path: PathBuf,
        /// Parsed path used
        canonicalized: PathBuf,
    },
    /// Could not parse the provided database path string
    #[error("Invalid database path supplied {1:?}; {0}")]
    InvalidDbPath(#[source] io::Error, String),
    /// A stored record could not be read back
    #[error("Corrupt record under `{key}`: {source}")]
    CorruptRecord {
        /// Printable form of the key
        key: String,
        /// Decoding failure
        #[source]
        source: serde_json::Error,
    },
}

impl DbError {
    /// Whether the error is lock contention between two transactions, which
    /// callers resolve by trying again later.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            DbError::RockError(e) if matches!(
                e.kind(),
                rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::TryAgain
            )
        )
    }
}

type Result<T> = std::result::Result<T, DbError>;

impl DB {
    /// Opens db at `db_path` and creates if missing
    #[tracing::instrument(err)]
    pub fn from_path(db_path: &Path) -> Result<DB> {
        let path = {
            let mut path = db_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .canonicalize()
                .map_err(|e| DbError::InvalidDbPath(e, db_path.to_string_lossy().into()))?;
            if let Some(file_name) = db_path.file_name() {
                path.push(file_name);
            }
            path
        };

        if path.is_dir() {
            info!(path=%path.to_string_lossy(), "Opening existing db")
        } else {
            info!(path=%path.to_string_lossy(), "Creating db")
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);

        TransactionDB::open(&opts, &TransactionDBOptions::default(), &path)
            .map_err(|e| DbError::OpeningError {
                source: e,
                path: db_path.into(),
                canonicalized: path,
            })
            .map(Into::into)
    }

    /// Store a value in the DB
    pub fn store(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.0.put(key, value)?)
    }

    /// Retrieve a value from the DB
    pub fn retrieve(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.0.get(key)?)
    }

    /// Remove a value from the DB
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        Ok(self.0.delete(key)?)
    }

    /// Begin a pessimistic transaction. Keys read with `get_for_update` stay
    /// locked until the transaction commits or is dropped.
    pub fn transaction(&self) -> Transaction<'_, TransactionDB> {
        self.0.transaction()
    }

    /// Entries whose key starts with `prefix`, in ascending key order.
    pub fn prefix_iterator<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>)>> + 'a {
        self.0
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(prefix),
                Err(_) => true,
            })
            .map(|item| item.map_err(DbError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::run_test_db;

    #[tokio::test]
    async fn prefix_iteration_stops_at_prefix_end() {
        run_test_db(|db| async move {
            db.store(b"a_1", b"x").unwrap();
            db.store(b"b_1", b"y").unwrap();
            db.store(b"b_2", b"z").unwrap();
            db.store(b"c_1", b"w").unwrap();

            let keys: Vec<_> = db
                .prefix_iterator(b"b_")
                .map(|item| item.unwrap().0.to_vec())
                .collect();
            assert_eq!(keys, vec![b"b_1".to_vec(), b"b_2".to_vec()]);
        })
        .await;
    }
}
