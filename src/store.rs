//! JSON document store for owner summaries, metrics bundles and client lists.
//!
//! Each collection lives in one pretty-printed JSON document mapping
//! owner-id to that owner's entry, rewritten in full on every save:
//!
//! - `users.json`: `{ owner: { processed_at, total_users, mean_income } }`
//! - `metrics.json`: `{ owner: MetricsBundle }`
//! - `clients.json`: `{ owner: { clients, total, user_id } }`
//!
//! ## Commit protocol
//!
//! A save is one [`CommitRecord`]. Writers take an in-process mutex and an
//! exclusive advisory lock on `store.lock`, so saves from separate processes
//! sharing a data directory are serialised too. Under the lock the three
//! documents are loaded (a malformed document aborts before anything is
//! written), the record is written to `pending-commit.json`, each document
//! is replaced via write-temp/sync/rename, and the journal is removed.
//! A journal left behind by an interrupted save is replayed by
//! [`DocumentStore::open`] and by the next commit, before anything else is
//! written, so the three collections converge.

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

use crate::{
    error::{IncomeError, IncomeResult},
    metrics::MetricsBundle,
    normalize::NormalizedTable,
    query::{self, ClientPage, ClientQuery},
};

pub const USERS_COLLECTION: &str = "users";
pub const METRICS_COLLECTION: &str = "metrics";
pub const CLIENTS_COLLECTION: &str = "clients";
const JOURNAL_FILE: &str = "pending-commit.json";
const JOURNAL_NAME: &str = "commit journal";
const LOCK_FILE: &str = "store.lock";
const LOCK_NAME: &str = "store lock";

pub type UsersDocument = BTreeMap<String, OwnerSummary>;
pub type MetricsDocument = BTreeMap<String, MetricsBundle>;
pub type ClientsDocument = BTreeMap<String, ClientCollection>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_users: usize,
    #[serde(default)]
    pub mean_income: f64,
}

/// One stored client row. Only `id` is guaranteed; other fields are absent
/// when the upload lacked the column or left the cell empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    pub age: Option<f64>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub salary_avg6to12m: Option<f64>,
    pub credit_turnover_avg: Option<f64>,
    pub payments12m: Option<f64>,
    pub credit_limit_total: Option<f64>,
    pub dt: Option<String>,
    pub predicted_income: Option<f64>,
}

impl ClientRecord {
    pub fn from_row(table: &NormalizedTable, row: usize, estimate: f64) -> Self {
        let text = |name: &str| {
            table
                .column(name)
                .and_then(|column| column.present(row))
                .map(|cell| cell.label())
        };
        let number = |name: &str| {
            table
                .column(name)
                .and_then(|column| column.present(row))
                .and_then(|cell| cell.as_f64())
        };
        Self {
            id: text("id").unwrap_or_else(|| format!("client_{row}")),
            age: number("age"),
            gender: text("gender"),
            city: text("city"),
            salary_avg6to12m: number("salary_6to12m_avg"),
            credit_turnover_avg: number("turn_cur_cr_avg_act_v2"),
            payments12m: number("dp_ils_paymentssum_avg_12m"),
            credit_limit_total: number("hdb_bki_total_max_limit"),
            dt: text("dt"),
            predicted_income: estimate.is_finite().then_some(estimate),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCollection {
    pub clients: Vec<ClientRecord>,
    pub total: usize,
    pub user_id: String,
}

/// The unit of a save: every entry written for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub owner_id: String,
    pub user: OwnerSummary,
    pub metrics: MetricsBundle,
    pub clients: ClientCollection,
}

impl CommitRecord {
    pub fn build(
        owner_id: &str,
        table: &NormalizedTable,
        estimates: &[f64],
        metrics: MetricsBundle,
    ) -> IncomeResult<Self> {
        if table.row_count() != estimates.len() {
            return Err(IncomeError::ShapeMismatch {
                rows: table.row_count(),
                estimates: estimates.len(),
            });
        }
        let clients = estimates
            .iter()
            .enumerate()
            .map(|(row, estimate)| ClientRecord::from_row(table, row, *estimate))
            .collect::<Vec<_>>();
        let mean_income = if estimates.is_empty() {
            0.0
        } else {
            estimates.iter().sum::<f64>() / estimates.len() as f64
        };
        Ok(Self {
            owner_id: owner_id.to_string(),
            user: OwnerSummary {
                processed_at: Some(Utc::now()),
                total_users: table.row_count(),
                mean_income,
            },
            metrics,
            clients: ClientCollection {
                total: clients.len(),
                clients,
                user_id: owner_id.to_string(),
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    commit_lock: Mutex<()>,
}

impl DocumentStore {
    /// Creates the data directory if needed and completes any save that was
    /// interrupted after its journal was written.
    pub fn open(config: StoreConfig) -> IncomeResult<Self> {
        fs::create_dir_all(&config.root).map_err(|err| {
            IncomeError::persistence(
                "data directory",
                format!("creating {:?}: {err}", config.root),
            )
        })?;
        let store = Self {
            root: config.root,
            commit_lock: Mutex::new(()),
        };
        store.recover()?;
        Ok(store)
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    pub fn save_owner_data(
        &self,
        owner_id: &str,
        table: &NormalizedTable,
        estimates: &[f64],
        metrics: MetricsBundle,
    ) -> IncomeResult<OwnerSummary> {
        let record = CommitRecord::build(owner_id, table, estimates, metrics)?;
        self.commit(&record)?;
        info!(
            "Saved metrics for owner '{}' with {} client(s)",
            owner_id, record.clients.total
        );
        Ok(record.user)
    }

    /// Applies `record` to all three collections as one logical save.
    ///
    /// A journal left by an earlier failed save is replayed first, so its
    /// owner is never stranded half-written.
    pub fn commit(&self, record: &CommitRecord) -> IncomeResult<()> {
        self.with_exclusive_lock(|| {
            self.replay_journal()?;
            let documents = self.load_documents()?;
            self.write_document(JOURNAL_NAME, &self.journal_path(), record)?;
            self.apply(documents, record)?;
            self.clear_journal()
        })
    }

    fn recover(&self) -> IncomeResult<()> {
        if !self.journal_path().exists() {
            return Ok(());
        }
        self.with_exclusive_lock(|| self.replay_journal())
    }

    /// Runs `action` holding both the in-process commit mutex and an
    /// advisory lock on `store.lock`, which serialises writers across
    /// processes sharing the data directory.
    fn with_exclusive_lock<T>(&self, action: impl FnOnce() -> IncomeResult<T>) -> IncomeResult<T> {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| {
                error!("Opening store lock {path:?} failed: {err}");
                IncomeError::persistence(LOCK_NAME, err.to_string())
            })?;
        let mut lock = RwLock::new(file);
        let _held = lock.write().map_err(|err| {
            error!("Locking {path:?} failed: {err}");
            IncomeError::persistence(LOCK_NAME, err.to_string())
        })?;
        action()
    }

    /// Completes the save recorded in the journal, if any. Callers hold the
    /// exclusive lock.
    fn replay_journal(&self) -> IncomeResult<()> {
        let journal = self.journal_path();
        let Some(record) = read_document::<CommitRecord>(JOURNAL_NAME, &journal)? else {
            return Ok(());
        };
        warn!(
            "Replaying interrupted save for owner '{}' from {:?}",
            record.owner_id, journal
        );
        let documents = self.load_documents()?;
        self.apply(documents, &record)?;
        self.clear_journal()
    }

    fn load_documents(&self) -> IncomeResult<(UsersDocument, MetricsDocument, ClientsDocument)> {
        Ok((
            self.load_collection(USERS_COLLECTION)?,
            self.load_collection(METRICS_COLLECTION)?,
            self.load_collection(CLIENTS_COLLECTION)?,
        ))
    }

    fn apply(
        &self,
        (mut users, mut metrics, mut clients): (UsersDocument, MetricsDocument, ClientsDocument),
        record: &CommitRecord,
    ) -> IncomeResult<()> {
        let owner = record.owner_id.clone();
        users.insert(owner.clone(), record.user.clone());
        metrics.insert(owner.clone(), record.metrics.clone());
        clients.insert(owner, record.clients.clone());

        self.write_document(USERS_COLLECTION, &self.collection_path(USERS_COLLECTION), &users)?;
        self.write_document(
            METRICS_COLLECTION,
            &self.collection_path(METRICS_COLLECTION),
            &metrics,
        )?;
        self.write_document(
            CLIENTS_COLLECTION,
            &self.collection_path(CLIENTS_COLLECTION),
            &clients,
        )
    }

    fn clear_journal(&self) -> IncomeResult<()> {
        fs::remove_file(self.journal_path()).map_err(|err| {
            error!("Failed to remove commit journal: {err}");
            IncomeError::persistence(JOURNAL_NAME, err.to_string())
        })
    }

    fn load_collection<T>(&self, collection: &str) -> IncomeResult<BTreeMap<String, T>>
    where
        T: DeserializeOwned,
    {
        Ok(read_document(collection, &self.collection_path(collection))?.unwrap_or_default())
    }

    fn write_document<T: Serialize>(
        &self,
        collection: &str,
        path: &Path,
        value: &T,
    ) -> IncomeResult<()> {
        let payload = serde_json::to_vec_pretty(value).map_err(|err| {
            error!("Serializing '{collection}' failed: {err}");
            IncomeError::persistence(collection, err.to_string())
        })?;
        write_atomic(path, &payload).map_err(|err| {
            error!("Writing '{collection}' to {path:?} failed: {err}");
            IncomeError::persistence(collection, err.to_string())
        })?;
        debug!("Wrote '{collection}' ({} bytes) to {path:?}", payload.len());
        Ok(())
    }

    /// The full owner index; empty when nothing has been saved yet.
    pub fn list_owners(&self) -> IncomeResult<UsersDocument> {
        self.load_collection(USERS_COLLECTION)
    }

    pub fn get_metrics(&self, owner_id: &str) -> IncomeResult<Option<MetricsBundle>> {
        let mut metrics: MetricsDocument = self.load_collection(METRICS_COLLECTION)?;
        Ok(metrics.remove(owner_id))
    }

    pub fn get_clients(
        &self,
        owner_id: &str,
        query: &ClientQuery,
    ) -> IncomeResult<Option<ClientPage>> {
        let mut clients: ClientsDocument = self.load_collection(CLIENTS_COLLECTION)?;
        Ok(clients
            .remove(owner_id)
            .map(|entry| query::paginate(owner_id, &entry.clients, query)))
    }
}

fn read_document<T: DeserializeOwned>(collection: &str, path: &Path) -> IncomeResult<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            error!("Reading '{collection}' from {path:?} failed: {err}");
            return Err(IncomeError::persistence(collection, err.to_string()));
        }
    };
    serde_json::from_str(&text).map(Some).map_err(|err| {
        error!("Document for '{collection}' at {path:?} is malformed: {err}");
        IncomeError::persistence(collection, format!("malformed document: {err}"))
    })
}

/// Replaces `path` with `contents` via a uniquely named, synced sibling temp
/// file and a rename, so readers see either the old or the new document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    sync_parent_dir(path)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
