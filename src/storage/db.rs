use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::{
    error::Result,
    storage::{models::Listing, ListingStore, Versioned},
};

/// Local store: one JSON document per row plus a version counter for
/// compare-and-swap.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            body TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_listings_created ON listings(created_at)",
        [],
    )?;

    Ok(())
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn insert(&self, listing: &Listing) -> Result<String> {
        let body = serde_json::to_string(listing)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO listings (version, created_at, body) VALUES (1, ?1, ?2)",
            params![listing.created_at, body],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Versioned<Listing>>> {
        let Ok(row_id) = id.parse::<i64>() else {
            return Ok(None);
        };

        let conn = self.conn.lock().await;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT version, body FROM listings WHERE id = ?1",
                [row_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((version, body)) => Ok(Some(Versioned {
                version: version.to_string(),
                value: serde_json::from_str(&body)?,
            })),
            None => Ok(None),
        }
    }

    async fn replace(&self, id: &str, version: &str, listing: &Listing) -> Result<bool> {
        let (Ok(row_id), Ok(version)) = (id.parse::<i64>(), version.parse::<i64>()) else {
            return Ok(false);
        };
        let body = serde_json::to_string(listing)?;

        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE listings SET body = ?1, version = version + 1
             WHERE id = ?2 AND version = ?3",
            params![body, row_id, version],
        )?;
        Ok(changed == 1)
    }

    async fn all(&self) -> Result<Vec<(String, Listing)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, body FROM listings ORDER BY id")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut listings = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            match serde_json::from_str(&body) {
                Ok(listing) => listings.push((id.to_string(), listing)),
                Err(e) => tracing::warn!("Skipping unreadable listing {}: {}", id, e),
            }
        }
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{update_listing, ListingStatus};
    use std::collections::BTreeMap;

    fn listing(item: &str, qty: u32) -> Listing {
        Listing {
            user_id: 9,
            user_name: "Sister Wong".to_string(),
            user_username: None,
            item: item.to_string(),
            qty,
            qty_display: qty.to_string(),
            size: "N/A".to_string(),
            expiry: "N/A".to_string(),
            location: "OT store".to_string(),
            photo_id: None,
            created_at: 1_760_000_000,
            status: ListingStatus::Available,
            remaining: qty,
            channel_message_id: None,
            claims: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_fetch_replace() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert(&listing("Syringes", 20)).await.unwrap();

        let first = store.fetch(&id).await.unwrap().unwrap();
        assert_eq!(first.value.item, "Syringes");

        let mut changed = first.value.clone();
        changed.channel_message_id = Some(55);
        assert!(store.replace(&id, &first.version, &changed).await.unwrap());

        // the version moved on, so a stale writer loses
        assert!(!store.replace(&id, &first.version, &first.value).await.unwrap());
        let now = store.fetch(&id).await.unwrap().unwrap();
        assert_eq!(now.value.channel_message_id, Some(55));
        assert_ne!(now.version, first.version);
    }

    #[tokio::test]
    async fn test_fetch_unknown_ids() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.fetch("42").await.unwrap().is_none());
        assert!(store.fetch("-Nabc$").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_in_insertion_order() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert(&listing("Masks", 1)).await.unwrap();
        store.insert(&listing("Gowns", 2)).await.unwrap();

        let all = store.all().await.unwrap();
        let items: Vec<_> = all.iter().map(|(_, l)| l.item.as_str()).collect();
        assert_eq!(items, vec!["Masks", "Gowns"]);
    }

    #[tokio::test]
    async fn test_update_listing_against_sqlite() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.insert(&listing("Catheters", 3)).await.unwrap();

        let (updated, _) = update_listing(&store, &id, 3, |l| {
            l.remaining -= 3;
            l.status = ListingStatus::Claimed;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(updated.remaining, 0);

        let stored = store.fetch(&id).await.unwrap().unwrap().value;
        assert_eq!(stored.status, ListingStatus::Claimed);
    }

    #[tokio::test]
    async fn test_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.db");
        let path = path.to_str().unwrap();

        let id = {
            let store = SqliteStore::new(path).unwrap();
            store.insert(&listing("Bandages", 8)).await.unwrap()
        };

        let reopened = SqliteStore::new(path).unwrap();
        let fetched = reopened.fetch(&id).await.unwrap().unwrap();
        assert_eq!(fetched.value.item, "Bandages");
    }
}
