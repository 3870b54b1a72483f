use crate::error::Result;
use crate::storage::Storage;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON snapshots of a locally simulated house ledger, keyed by house id.
pub struct HouseStateStore<'a> {
    storage: &'a Storage,
}

impl<'a> HouseStateStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save<T: Serialize>(&self, house_id: &str, state: &T) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO house_state (id, state, updated_at) VALUES (?1, ?2, ?3)",
            params![house_id, json, Utc::now().timestamp()],
        )?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, house_id: &str) -> Result<Option<T>> {
        let conn = self.storage.get_connection().await;

        let json: Option<String> = conn
            .query_row(
                "SELECT state FROM house_state WHERE id = ?1",
                params![house_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let storage = Storage::in_memory().await.unwrap();
        let store = HouseStateStore::new(&storage);

        assert_eq!(store.load::<Counter>("house").await.unwrap(), None);

        store.save("house", &Counter { value: 3 }).await.unwrap();
        store.save("house", &Counter { value: 4 }).await.unwrap();
        assert_eq!(
            store.load::<Counter>("house").await.unwrap(),
            Some(Counter { value: 4 })
        );
    }
}
