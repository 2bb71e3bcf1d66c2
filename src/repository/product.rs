//! Product storage and due-work scheduling.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;
use tracing::debug;

use super::{Result, to_option};
use crate::models::{Product, UrlStatus};

/// SQLite-backed product table.
pub struct ProductRepository {
    db_path: PathBuf,
}

impl ProductRepository {
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
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                name TEXT,
                price REAL,
                uvp REAL,
                image_url TEXT,
                site TEXT,
                site_status TEXT,
                url_status TEXT NOT NULL DEFAULT 'unchecked',
                consecutive_failed_scrapes INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_products_url_status ON products(url_status);
            CREATE INDEX IF NOT EXISTS idx_products_site ON products(site);

            -- find_due joins price_history, so its schema must exist even
            -- when no PriceHistoryRepository has been constructed yet
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

    /// Insert or fully replace a product row.
    pub fn save(&self, product: &Product) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO products (product_id, url, name, price, uvp, image_url,
                 site, site_status, url_status, consecutive_failed_scrapes,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(product_id) DO UPDATE SET
                 url = excluded.url,
                 name = excluded.name,
                 price = excluded.price,
                 uvp = excluded.uvp,
                 image_url = excluded.image_url,
                 site = excluded.site,
                 site_status = excluded.site_status,
                 url_status = excluded.url_status,
                 consecutive_failed_scrapes = excluded.consecutive_failed_scrapes,
                 updated_at = excluded.updated_at",
            params![
                product.product_id,
                product.url,
                product.name,
                product.price,
                product.uvp,
                product.image_url,
                product.site,
                product.site_status,
                product.url_status.as_str(),
                product.consecutive_failed_scrapes,
                product.created_at.to_rfc3339(),
                product.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, product_id: &str) -> Result<Option<Product>> {
        let conn = self.connect()?;
        to_option(conn.query_row(
            &format!(
                "SELECT {} FROM products WHERE product_id = ?1",
                PRODUCT_COLUMNS
            ),
            params![product_id],
            row_to_product,
        ))
    }

    pub fn get_by_url(&self, url: &str) -> Result<Option<Product>> {
        let conn = self.connect()?;
        to_option(conn.query_row(
            &format!("SELECT {} FROM products WHERE url = ?1", PRODUCT_COLUMNS),
            params![url],
            row_to_product,
        ))
    }

    /// Products due for a scrape: any url_status except `invalid` (a
    /// fetch failure is worth retrying on the next pass, a dead page is
    /// not) and either never scraped or last scraped before the interval
    /// cutoff. Ordered by product id for a deterministic batch.
    pub fn find_due(
        &self,
        min_interval_secs: u64,
        site: Option<&str>,
        site_status: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Product>> {
        let cutoff = super::staleness_cutoff(min_interval_secs);
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM products p
             LEFT JOIN (
                 SELECT product_id, MAX(fetched_at) AS last_fetched
                 FROM price_history GROUP BY product_id
             ) h ON h.product_id = p.product_id
             WHERE p.url_status != 'invalid'
               AND (h.last_fetched IS NULL OR h.last_fetched < ?1)
               AND (?2 IS NULL OR p.site = ?2)
               AND (?3 IS NULL OR p.site_status = ?3)
             ORDER BY p.product_id ASC
             LIMIT ?4",
            prefixed_columns("p")
        ))?;

        let limit: i64 = limit.map(i64::from).unwrap_or(-1);
        let products = stmt
            .query_map(params![cutoff, site, site_status, limit], row_to_product)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(due = products.len(), "due products selected");
        Ok(products)
    }

    /// Update the health classification and failure counter after a scrape.
    pub fn set_url_status(
        &self,
        product_id: &str,
        status: UrlStatus,
        consecutive_failed_scrapes: u32,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE products
             SET url_status = ?1, consecutive_failed_scrapes = ?2, updated_at = ?3
             WHERE product_id = ?4",
            params![
                status.as_str(),
                consecutive_failed_scrapes,
                Utc::now().to_rfc3339(),
                product_id
            ],
        )?;
        Ok(())
    }

    /// Apply scraped fields to a product. Name and image are only
    /// overwritten when the new scrape produced them.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_scrape(
        &self,
        product_id: &str,
        name: Option<&str>,
        price: Option<f64>,
        uvp: Option<f64>,
        image_url: Option<&str>,
        site_status: Option<&str>,
        status: UrlStatus,
        consecutive_failed_scrapes: u32,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE products
             SET name = COALESCE(?1, name),
                 price = ?2,
                 uvp = ?3,
                 image_url = COALESCE(?4, image_url),
                 site_status = ?5,
                 url_status = ?6,
                 consecutive_failed_scrapes = ?7,
                 updated_at = ?8
             WHERE product_id = ?9",
            params![
                name,
                price,
                uvp,
                image_url,
                site_status,
                status.as_str(),
                consecutive_failed_scrapes,
                Utc::now().to_rfc3339(),
                product_id
            ],
        )?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Product>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM products ORDER BY product_id",
            PRODUCT_COLUMNS
        ))?;
        let products = stmt
            .query_map([], row_to_product)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn count(&self) -> Result<u32> {
        let conn = self.connect()?;
        conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

const PRODUCT_COLUMNS: &str = "product_id, url, name, price, uvp, image_url, site, site_status, \
     url_status, consecutive_failed_scrapes, created_at, updated_at";

fn prefixed_columns(prefix: &str) -> String {
    PRODUCT_COLUMNS
        .split(", ")
        .map(|col| format!("{prefix}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    let status: String = row.get(8)?;
    Ok(Product {
        product_id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        uvp: row.get(4)?,
        image_url: row.get(5)?,
        site: row.get(6)?,
        site_status: row.get(7)?,
        url_status: UrlStatus::from_str(&status).unwrap_or(UrlStatus::Unchecked),
        consecutive_failed_scrapes: row.get(9)?,
        created_at: super::parse_datetime(&row.get::<_, String>(10)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(11)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, PriceEntry};
    use crate::repository::price_history::PriceHistoryRepository;
    use chrono::Duration;

    fn repo() -> (tempfile::TempDir, ProductRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = ProductRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    fn product(id: &str) -> Product {
        Product::new(id.into(), format!("https://shop.example.com/p/{id}"))
    }

    #[test]
    fn test_save_and_get() {
        let (_dir, repo) = repo();

        repo.save(&product("199529-60")).unwrap();
        let found = repo.get("199529-60").unwrap().unwrap();
        assert_eq!(found.product_id, "199529-60");
        assert_eq!(found.url_status, UrlStatus::Unchecked);
        assert!(repo.get("missing").unwrap().is_none());

        let by_url = repo
            .get_by_url("https://shop.example.com/p/199529-60")
            .unwrap();
        assert!(by_url.is_some());
    }

    #[test]
    fn test_save_upserts() {
        let (_dir, repo) = repo();

        let mut p = product("a");
        repo.save(&p).unwrap();
        p.name = Some("Widget".into());
        p.price = Some(19.99);
        repo.save(&p).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let found = repo.get("a").unwrap().unwrap();
        assert_eq!(found.name.as_deref(), Some("Widget"));
        assert_eq!(found.price, Some(19.99));
    }

    #[test]
    fn test_find_due_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.db");
        let repo = ProductRepository::new(&db).unwrap();
        let history = PriceHistoryRepository::new(&db).unwrap();

        repo.save(&product("never-scraped")).unwrap();
        repo.save(&product("stale")).unwrap();
        repo.save(&product("fresh")).unwrap();

        let mut old = PriceEntry::new("stale".into(), 9.99, "EUR".into());
        old.fetched_at = Utc::now() - Duration::seconds(7200);
        history.append(&old).unwrap();

        let mut recent = PriceEntry::new("fresh".into(), 9.99, "EUR".into());
        recent.fetched_at = Utc::now() - Duration::seconds(60);
        recent.availability = Availability::InStock;
        history.append(&recent).unwrap();

        let due = repo.find_due(3600, None, None, None).unwrap();
        let ids: Vec<_> = due.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["never-scraped", "stale"]);
    }

    #[test]
    fn test_find_due_skips_only_invalid() {
        let (_dir, repo) = repo();

        repo.save(&product("ok")).unwrap();
        repo.save(&product("gone")).unwrap();
        repo.set_url_status("gone", UrlStatus::Invalid, 0).unwrap();

        let due = repo.find_due(3600, None, None, None).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].product_id, "ok");
    }

    #[test]
    fn test_find_due_retries_error_status() {
        let (_dir, repo) = repo();

        repo.save(&product("flaky")).unwrap();
        repo.set_url_status("flaky", UrlStatus::Error, 1).unwrap();

        // A total fetch failure must not drop the target from scheduling
        let due = repo.find_due(3600, None, None, None).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].product_id, "flaky");
    }

    #[test]
    fn test_find_due_filters_and_limit() {
        let (_dir, repo) = repo();

        let mut a = product("a");
        a.site = Some("shopa".into());
        let mut b = product("b");
        b.site = Some("shopb".into());
        let mut c = product("c");
        c.site = Some("shopb".into());
        for p in [&a, &b, &c] {
            repo.save(p).unwrap();
        }

        let due = repo.find_due(3600, Some("shopb"), None, None).unwrap();
        assert_eq!(due.len(), 2);

        let due = repo.find_due(3600, None, None, Some(1)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].product_id, "a");
    }

    #[test]
    fn test_apply_scrape_keeps_name_when_absent() {
        let (_dir, repo) = repo();

        let mut p = product("a");
        p.name = Some("Widget".into());
        repo.save(&p).unwrap();

        repo.apply_scrape(
            "a",
            None,
            Some(24.99),
            None,
            None,
            Some("in stock"),
            UrlStatus::Valid,
            0,
        )
        .unwrap();

        let found = repo.get("a").unwrap().unwrap();
        assert_eq!(found.name.as_deref(), Some("Widget"));
        assert_eq!(found.price, Some(24.99));
        assert_eq!(found.url_status, UrlStatus::Valid);
    }
}
