//! Data models for pricewatch.

mod lock;
mod price;
mod product;
mod run;
mod site;

pub use lock::{ItemLock, ProcessLock};
pub use price::{Availability, PriceEntry};
pub use product::{Product, UrlStatus};
pub use run::{RunStatistics, RunStatus, ScraperRun};
pub use site::{SelectorDialect, SiteConfig};
