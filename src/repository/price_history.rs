//! Append-only price history.

use std::path::{Path, PathBuf};

use rusqlite::params;

use super::{Result, to_option};
use crate::models::{Availability, PriceEntry};

/// SQLite-backed price history. Rows are never updated or deleted;
/// the latest row per product drives scheduling.
pub struct PriceHistoryRepository {
    db_path: PathBuf,
}

impl PriceHistoryRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id TEXT NOT NULL,
                price REAL NOT NULL,
                uvp REAL,
                currency TEXT NOT NULL,
                seller TEXT,
                site_status TEXT,
                availability TEXT NOT NULL DEFAULT 'unknown',
                fetched_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_price_history_product
                ON price_history(product_id, fetched_at);
        "#,
        )?;
        Ok(())
    }

    /// Append one observation and return its row id.
    pub fn append(&self, entry: &PriceEntry) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO price_history (product_id, price, uvp, currency, seller,
                 site_status, availability, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.product_id,
                entry.price,
                entry.uvp,
                entry.currency,
                entry.seller,
                entry.site_status,
                entry.availability.as_str(),
                entry.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent observation for a product, if any.
    pub fn latest_for(&self, product_id: &str) -> Result<Option<PriceEntry>> {
        let conn = self.connect()?;
        to_option(conn.query_row(
            "SELECT product_id, price, uvp, currency, seller, site_status,
                    availability, fetched_at
             FROM price_history
             WHERE product_id = ?1
             ORDER BY fetched_at DESC, id DESC
             LIMIT 1",
            params![product_id],
            row_to_entry,
        ))
    }

    /// Full history for a product, oldest first.
    pub fn history_for(&self, product_id: &str) -> Result<Vec<PriceEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT product_id, price, uvp, currency, seller, site_status,
                    availability, fetched_at
             FROM price_history
             WHERE product_id = ?1
             ORDER BY fetched_at ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![product_id], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<PriceEntry> {
    let availability: String = row.get(6)?;
    Ok(PriceEntry {
        product_id: row.get(0)?,
        price: row.get(1)?,
        uvp: row.get(2)?,
        currency: row.get(3)?,
        seller: row.get(4)?,
        site_status: row.get(5)?,
        availability: Availability::from_str(&availability).unwrap_or(Availability::Unknown),
        fetched_at: super::parse_datetime(&row.get::<_, String>(7)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn repo() -> (tempfile::TempDir, PriceHistoryRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = PriceHistoryRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_append_and_latest() {
        let (_dir, repo) = repo();

        let mut first = PriceEntry::new("a".into(), 19.99, "EUR".into());
        first.fetched_at = Utc::now() - Duration::seconds(120);
        repo.append(&first).unwrap();

        let mut second = PriceEntry::new("a".into(), 17.49, "EUR".into());
        second.seller = Some("MegaShop".into());
        second.availability = Availability::InStock;
        repo.append(&second).unwrap();

        let latest = repo.latest_for("a").unwrap().unwrap();
        assert_eq!(latest.price, 17.49);
        assert_eq!(latest.seller.as_deref(), Some("MegaShop"));
        assert_eq!(latest.availability, Availability::InStock);

        assert!(repo.latest_for("missing").unwrap().is_none());
    }

    #[test]
    fn test_history_ordered_oldest_first() {
        let (_dir, repo) = repo();

        for (offset, price) in [(300, 10.0), (200, 11.0), (100, 12.0)] {
            let mut entry = PriceEntry::new("a".into(), price, "EUR".into());
            entry.fetched_at = Utc::now() - Duration::seconds(offset);
            repo.append(&entry).unwrap();
        }
        repo.append(&PriceEntry::new("b".into(), 5.0, "EUR".into()))
            .unwrap();

        let history = repo.history_for("a").unwrap();
        let prices: Vec<_> = history.iter().map(|e| e.price).collect();
        assert_eq!(prices, vec![10.0, 11.0, 12.0]);
    }
}
