use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::errors::ApiError;
use crate::posts::{create_post, toggle_like, NewPost};
use crate::users::{create_user, find_by_username, NewUser};

/// Pending writes of one transaction. `None` deletes the key.
pub type WriteBatch = BTreeMap<String, Option<String>>;

/// String-keyed store of JSON documents.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Applies every write of the batch or none of them.
    fn apply(&self, batch: WriteBatch) -> anyhow::Result<()>;
}

/// In-memory store, optionally mirrored to a JSON snapshot file that is
/// rewritten on every committed batch.
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, String>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// Opens a snapshot-backed store, loading the file if it exists.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt snapshot {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            data: RwLock::new(data),
            snapshot: Some(path),
        })
    }

    fn persist(path: &Path, data: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(data)?)
            .with_context(|| format!("Failed to write snapshot {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace snapshot {}", path.display()))?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_writes(data: &mut BTreeMap<String, String>, batch: WriteBatch) {
    for (key, value) in batch {
        match value {
            Some(v) => {
                data.insert(key, v);
            }
            None => {
                data.remove(&key);
            }
        }
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn apply(&self, batch: WriteBatch) -> anyhow::Result<()> {
        let mut data = self.data.write();
        match &self.snapshot {
            Some(path) => {
                // Only swap in the new state once the snapshot is on disk.
                let mut next = data.clone();
                apply_writes(&mut next, batch);
                Self::persist(path, &next)?;
                *data = next;
            }
            None => apply_writes(&mut data, batch),
        }
        Ok(())
    }
}

/// Typed access to the store. Every mutation runs inside
/// [`Db::transaction`], which holds the writer lock from first read to
/// commit.
pub struct Db {
    kv: Arc<dyn KvStore>,
    writer: Mutex<()>,
}

impl Db {
    pub fn new(kv: impl KvStore + 'static) -> Self {
        Self {
            kv: Arc::new(kv),
            writer: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        read_json(self.kv.get(key)?, key)
    }

    pub fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.kv.keys_with_prefix(prefix)
    }

    /// Runs `f` with exclusive write access and commits its writes as one
    /// batch. Nothing is written when `f` fails.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&mut Tx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let _guard = self.writer.lock();
        let mut tx = Tx {
            kv: self.kv.as_ref(),
            writes: WriteBatch::new(),
        };
        let value = f(&mut tx)?;
        if !tx.writes.is_empty() {
            self.kv.apply(tx.writes)?;
        }
        Ok(value)
    }
}

fn read_json<T: DeserializeOwned>(raw: Option<String>, key: &str) -> anyhow::Result<Option<T>> {
    match raw {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .with_context(|| format!("Corrupt document at {}", key)),
        None => Ok(None),
    }
}

/// A transaction in progress. Reads see the transaction's own writes.
pub struct Tx<'a> {
    kv: &'a dyn KvStore,
    writes: WriteBatch,
}

impl Tx<'_> {
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let raw = match self.writes.get(key) {
            Some(pending) => pending.clone(),
            None => self.kv.get(key)?,
        };
        read_json(raw, key)
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        self.writes
            .insert(key.to_string(), Some(serde_json::to_string(value)?));
        Ok(())
    }

    pub fn delete(&mut self, key: &str) {
        self.writes.insert(key.to_string(), None);
    }

    pub fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(match self.writes.get(key) {
            Some(pending) => pending.is_some(),
            None => self.kv.get(key)?.is_some(),
        })
    }

    pub fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .kv
            .keys_with_prefix(prefix)?
            .into_iter()
            .filter(|k| !matches!(self.writes.get(k), Some(None)))
            .collect();
        for (key, value) in &self.writes {
            if value.is_some() && key.starts_with(prefix) && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Allocates the next id of a sequence. Ids start at 1 and are never
    /// reused.
    pub fn next_id(&mut self, seq_key: &str) -> anyhow::Result<u64> {
        let next = self.get_json::<u64>(seq_key)?.unwrap_or(0) + 1;
        self.set_json(seq_key, &next)?;
        Ok(next)
    }
}

/// Numeric suffixes of `prefix:{id}` keys, ascending.
pub fn ids_from_keys(keys: &[String], prefix: &str) -> Vec<u64> {
    let mut ids: Vec<u64> = keys
        .iter()
        .filter_map(|k| k.strip_prefix(prefix))
        .filter_map(|id| id.parse().ok())
        .collect();
    ids.sort_unstable();
    ids
}

struct DemoUser {
    username: &'static str,
    display_name: &'static str,
    posts: &'static [&'static str],
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "test",
        display_name: "Test User",
        posts: &["This is my first post on Chirp!"],
    },
    DemoUser {
        username: "alice",
        display_name: "Alice",
        posts: &[
            "Welcome to my feed! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
    },
    DemoUser {
        username: "bob",
        display_name: "Bob",
        posts: &["Hey everyone! Just joined, looking forward to connecting with you all."],
    },
];

/// Creates the demo accounts (password equal to the username) with a few
/// posts, and has `test` like bob's first post. Accounts that already
/// exist are left alone.
pub fn seed_demo_data(db: &Db) -> Result<(), ApiError> {
    let mut bob_post = None;

    for demo in DEMO_USERS {
        if find_by_username(db, demo.username)?.is_some() {
            continue;
        }
        let user = create_user(
            db,
            NewUser {
                username: demo.username.to_string(),
                email: format!("{}@example.com", demo.username),
                display_name: demo.display_name.to_string(),
                password: demo.username.to_string(),
            },
        )?;

        for content in demo.posts {
            let post = create_post(
                db,
                user.id,
                NewPost {
                    content: content.to_string(),
                    geo: None,
                    repost_of: None,
                },
            )?;
            if demo.username == "bob" && bob_post.is_none() {
                bob_post = Some(post.id);
            }
        }
        tracing::info!("Seeded demo user {}", user);
    }

    if let (Some(post_id), Some(tester)) = (bob_post, find_by_username(db, "test")?) {
        toggle_like(db, tester.id, post_id)?;
    }

    Ok(())
}
