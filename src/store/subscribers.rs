use std::collections::BTreeSet;

use anyhow::{Context, Result};

use super::SubscriberStore;

impl SubscriberStore {
    /// Add a recipient. Returns `false` if it was already subscribed.
    pub async fn add(&self, recipient_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO subscribers (recipient_id) VALUES (?1)",
                rusqlite::params![recipient_id],
            )
            .context("Failed to add subscriber")?;
        Ok(inserted > 0)
    }

    /// Remove a recipient. Returns `false` if it was not subscribed.
    pub async fn remove(&self, recipient_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM subscribers WHERE recipient_id = ?1",
                rusqlite::params![recipient_id],
            )
            .context("Failed to remove subscriber")?;
        Ok(deleted > 0)
    }

    pub async fn contains(&self, recipient_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM subscribers WHERE recipient_id = ?1)",
                rusqlite::params![recipient_id],
                |row| row.get(0),
            )
            .context("Failed to check subscriber")?;
        Ok(exists)
    }

    /// Snapshot of every current recipient.
    pub async fn list(&self) -> Result<BTreeSet<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT recipient_id FROM subscribers")?;
        let recipients = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<BTreeSet<i64>>>()
            .context("Failed to list subscribers")?;
        Ok(recipients)
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT count(*) FROM subscribers", [], |row| row.get(0))
            .context("Failed to count subscribers")?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = SubscriberStore::open_in_memory().unwrap();
        assert!(store.add(1).await.unwrap());
        assert!(!store.add(1).await.unwrap());

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.list().await.unwrap(), BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let store = SubscriberStore::open_in_memory().unwrap();
        assert!(!store.remove(2).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contains_follows_add_and_remove() {
        let store = SubscriberStore::open_in_memory().unwrap();
        store.add(10).await.unwrap();
        store.add(-1001).await.unwrap();
        assert!(store.contains(10).await.unwrap());
        assert!(store.contains(-1001).await.unwrap());

        assert!(store.remove(10).await.unwrap());
        assert!(!store.contains(10).await.unwrap());
        assert_eq!(store.list().await.unwrap(), BTreeSet::from([-1001]));
    }

    #[tokio::test]
    async fn test_subscribers_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscribers.db");

        {
            let store = SubscriberStore::open(&path).unwrap();
            store.add(42).await.unwrap();
            store.add(43).await.unwrap();
            store.remove(43).await.unwrap();
        }

        let reopened = SubscriberStore::open(&path).unwrap();
        assert_eq!(reopened.list().await.unwrap(), BTreeSet::from([42]));
    }
}
