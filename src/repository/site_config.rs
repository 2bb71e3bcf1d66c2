//! Per-site selector configuration storage.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;

use super::{Result, to_option};
use crate::models::{SelectorDialect, SiteConfig};

/// SQLite-backed site config table, keyed by hostname.
pub struct SiteConfigRepository {
    db_path: PathBuf,
}

impl SiteConfigRepository {
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
            CREATE TABLE IF NOT EXISTS site_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hostname TEXT NOT NULL UNIQUE,
                dialect TEXT NOT NULL DEFAULT 'css',
                price_selector TEXT,
                uvp_selector TEXT,
                seller_selector TEXT,
                availability_selector TEXT,
                name_selector TEXT,
                image_selector TEXT,
                currency TEXT NOT NULL DEFAULT 'EUR',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// Insert or update the config for a hostname.
    pub fn save(&self, config: &SiteConfig) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO site_configs (hostname, dialect, price_selector, uvp_selector,
                 seller_selector, availability_selector, name_selector, image_selector,
                 currency, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(hostname) DO UPDATE SET
                 dialect = excluded.dialect,
                 price_selector = excluded.price_selector,
                 uvp_selector = excluded.uvp_selector,
                 seller_selector = excluded.seller_selector,
                 availability_selector = excluded.availability_selector,
                 name_selector = excluded.name_selector,
                 image_selector = excluded.image_selector,
                 currency = excluded.currency,
                 updated_at = ?12",
            params![
                config.hostname,
                config.dialect.as_str(),
                config.price_selector,
                config.uvp_selector,
                config.seller_selector,
                config.availability_selector,
                config.name_selector,
                config.image_selector,
                config.currency,
                config.created_at.to_rfc3339(),
                config.updated_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_by_hostname(&self, hostname: &str) -> Result<Option<SiteConfig>> {
        let conn = self.connect()?;
        to_option(conn.query_row(
            &format!(
                "SELECT {} FROM site_configs WHERE hostname = ?1",
                SITE_COLUMNS
            ),
            params![hostname],
            row_to_config,
        ))
    }

    pub fn all(&self) -> Result<Vec<SiteConfig>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM site_configs ORDER BY hostname",
            SITE_COLUMNS
        ))?;
        let configs = stmt
            .query_map([], row_to_config)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(configs)
    }
}

const SITE_COLUMNS: &str = "hostname, dialect, price_selector, uvp_selector, seller_selector, \
     availability_selector, name_selector, image_selector, currency, created_at, updated_at";

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<SiteConfig> {
    let dialect: String = row.get(1)?;
    Ok(SiteConfig {
        hostname: row.get(0)?,
        dialect: SelectorDialect::from_str(&dialect).unwrap_or_default(),
        price_selector: row.get(2)?,
        uvp_selector: row.get(3)?,
        seller_selector: row.get(4)?,
        availability_selector: row.get(5)?,
        name_selector: row.get(6)?,
        image_selector: row.get(7)?,
        currency: row.get(8)?,
        created_at: super::parse_datetime(&row.get::<_, String>(9)?),
        updated_at: super::parse_datetime(&row.get::<_, String>(10)?),
    })
}
