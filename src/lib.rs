//! Pricewatch - retail price tracking with coordinated parallel scraping.
//!
//! Periodically fetches product pages from retail sites, extracts price and
//! availability data, and records a price history. Multiple worker processes
//! can run concurrently against the same database; coordination happens
//! through persisted process and item locks.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod scrapers;
pub mod services;
pub mod utils;
