use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Account, Amount, Hash32};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What survives a restart for a session that has not settled yet.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Hex-encoded user secret.
    pub user_secret: String,
    /// House commitment captured when the session committed.
    pub house_commitment: Option<Hash32>,
    /// Wagers recorded so far, in play order.
    pub moves: Vec<Amount>,
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user_secret", &"<redacted>")
            .field("house_commitment", &self.house_commitment)
            .field("moves", &self.moves)
            .finish()
    }
}

/// Storage keys for one account's record, namespaced by game and the
/// lower-cased account address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub seed: String,
    pub house_commit: String,
    pub moves: String,
}

impl SessionKeys {
    pub fn new(game: &str, account: &Account) -> Self {
        // Account's Display is already lower-case.
        Self {
            seed: format!("{}-commit-seed:{}", game, account),
            house_commit: format!("{}-session-house-commit:{}", game, account),
            moves: format!("{}-session-moves:{}", game, account),
        }
    }
}

/// Per-account recovery records. Never a source of truth once a session settles.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, account: &Account, record: &SessionRecord) -> Result<()>;

    async fn get(&self, account: &Account) -> Result<Option<SessionRecord>>;

    async fn remove(&self, account: &Account) -> Result<()>;
}

fn encode_moves(moves: &[Amount]) -> Result<String> {
    Ok(serde_json::to_string(moves)?)
}

fn decode_record(
    seed: Option<String>,
    house_commit: Option<String>,
    moves: Option<String>,
) -> Result<Option<SessionRecord>> {
    let Some(user_secret) = seed else {
        return Ok(None);
    };

    let house_commitment = house_commit
        .map(|value| value.parse::<Hash32>())
        .transpose()?;

    let moves = match moves {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };

    Ok(Some(SessionRecord {
        user_secret,
        house_commitment,
        moves,
    }))
}

pub struct SqliteSessionStore {
    storage: Arc<Storage>,
    game: String,
}

impl SqliteSessionStore {
    pub fn new(storage: Arc<Storage>, game: impl Into<String>) -> Self {
        Self {
            storage,
            game: game.into(),
        }
    }

    fn keys(&self, account: &Account) -> SessionKeys {
        SessionKeys::new(&self.game, account)
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn put(&self, account: &Account, record: &SessionRecord) -> Result<()> {
        let keys = self.keys(account);
        let moves = encode_moves(&record.moves)?;
        let now = Utc::now().timestamp();

        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO session_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![keys.seed, record.user_secret, now],
        )?;

        match &record.house_commitment {
            Some(commitment) => {
                tx.execute(
                    "INSERT OR REPLACE INTO session_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    params![keys.house_commit, commitment.to_hex(), now],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM session_kv WHERE key = ?1",
                    params![keys.house_commit],
                )?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO session_kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![keys.moves, moves, now],
        )?;

        tx.commit()?;

        tracing::debug!(
            "Saved session record for {} ({} moves)",
            account,
            record.moves.len()
        );
        Ok(())
    }

    async fn get(&self, account: &Account) -> Result<Option<SessionRecord>> {
        let keys = self.keys(account);
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare("SELECT value FROM session_kv WHERE key = ?1")?;
        let mut read = |key: &str| -> Result<Option<String>> {
            Ok(stmt
                .query_row(params![key], |row| row.get::<_, String>(0))
                .optional()?)
        };

        let seed = read(&keys.seed)?;
        let house_commit = read(&keys.house_commit)?;
        let moves = read(&keys.moves)?;

        decode_record(seed, house_commit, moves)
    }

    async fn remove(&self, account: &Account) -> Result<()> {
        let keys = self.keys(account);
        let conn = self.storage.get_connection().await;

        conn.execute(
            "DELETE FROM session_kv WHERE key IN (?1, ?2, ?3)",
            params![keys.seed, keys.house_commit, keys.moves],
        )?;

        tracing::debug!("Removed session record for {}", account);
        Ok(())
    }
}

/// In-process store with the same key layout, for tests and ephemeral runs.
pub struct MemorySessionStore {
    game: String,
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new(game: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Raw key/value contents.
    pub fn entries(&self) -> HashMap<String, String> {
        self.entries.lock().clone()
    }

    fn keys(&self, account: &Account) -> SessionKeys {
        SessionKeys::new(&self.game, account)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, account: &Account, record: &SessionRecord) -> Result<()> {
        let keys = self.keys(account);
        let moves = encode_moves(&record.moves)?;

        let mut entries = self.entries.lock();
        entries.insert(keys.seed, record.user_secret.clone());
        match &record.house_commitment {
            Some(commitment) => {
                entries.insert(keys.house_commit, commitment.to_hex());
            }
            None => {
                entries.remove(&keys.house_commit);
            }
        }
        entries.insert(keys.moves, moves);
        Ok(())
    }

    async fn get(&self, account: &Account) -> Result<Option<SessionRecord>> {
        let keys = self.keys(account);
        let (seed, house_commit, moves) = {
            let entries = self.entries.lock();
            (
                entries.get(&keys.seed).cloned(),
                entries.get(&keys.house_commit).cloned(),
                entries.get(&keys.moves).cloned(),
            )
        };
        decode_record(seed, house_commit, moves)
    }

    async fn remove(&self, account: &Account) -> Result<()> {
        let keys = self.keys(account);
        let mut entries = self.entries.lock();
        entries.remove(&keys.seed);
        entries.remove(&keys.house_commit);
        entries.remove(&keys.moves);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn alice() -> Account {
        "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa".parse().unwrap()
    }

    fn bob() -> Account {
        "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".parse().unwrap()
    }

    fn record() -> SessionRecord {
        SessionRecord {
            user_secret: format!("0x{}", "11".repeat(32)),
            house_commitment: Some(Hash32::new([9u8; 32])),
            moves: vec![Amount::from_units(10), Amount::from_units(20)],
        }
    }

    #[test]
    fn test_keys_are_lower_cased_and_namespaced() {
        let keys = SessionKeys::new("crash", &alice());
        assert_eq!(
            keys.seed,
            "crash-commit-seed:0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(
            keys.house_commit,
            "crash-session-house-commit:0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
    }

    #[tokio::test]
    async fn test_sqlite_put_get_remove() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&dir.path().join("fairhouse.db")).await.unwrap());
        let store = SqliteSessionStore::new(storage, "crash");

        assert!(store.get(&alice()).await.unwrap().is_none());

        store.put(&alice(), &record()).await.unwrap();
        assert_eq!(store.get(&alice()).await.unwrap(), Some(record()));
        assert!(store.get(&bob()).await.unwrap().is_none());

        store.remove(&alice()).await.unwrap();
        assert!(store.get(&alice()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fairhouse.db");
        {
            let storage = Arc::new(Storage::new(&path).await.unwrap());
            SqliteSessionStore::new(storage, "crash")
                .put(&alice(), &record())
                .await
                .unwrap();
        }

        let storage = Arc::new(Storage::new(&path).await.unwrap());
        let store = SqliteSessionStore::new(storage.clone(), "crash");
        assert_eq!(store.get(&alice()).await.unwrap(), Some(record()));

        // Other games do not see the record.
        let mines = SqliteSessionStore::new(storage, "mines");
        assert!(mines.get(&alice()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_matches_key_layout() {
        let store = MemorySessionStore::new("crash");
        let mut without_commit = record();
        without_commit.house_commitment = None;

        store.put(&alice(), &record()).await.unwrap();
        store.put(&alice(), &without_commit).await.unwrap();

        let entries = store.entries();
        assert!(entries.contains_key(&SessionKeys::new("crash", &alice()).seed));
        assert!(!entries.contains_key(&SessionKeys::new("crash", &alice()).house_commit));
        assert_eq!(store.get(&alice()).await.unwrap(), Some(without_commit));

        store.remove(&alice()).await.unwrap();
        assert!(store.entries().is_empty());
    }
}
