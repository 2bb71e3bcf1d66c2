//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::Settings;
use crate::models::{Product, RunStatus, SelectorDialect, SiteConfig};
use crate::repository::{
    ItemLockRepository, PriceHistoryRepository, ProcessLockRepository, ProductRepository,
    RunRepository, SiteConfigRepository,
};
use crate::services::{self, BatchDecision, Scraper};

#[derive(Parser)]
#[command(name = "pricewatch")]
#[command(about = "Retail price tracking with coordinated parallel scraping")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Scrape a single URL without touching the schedule
    Url {
        /// Product page URL
        url: String,
    },

    /// Manage tracked products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },

    /// Run a scrape batch over due products
    Batch {
        /// Maximum number of items to scrape
        #[arg(short, long)]
        limit: Option<u32>,
        /// Only scrape products of this site
        #[arg(long)]
        site: Option<String>,
        /// Only scrape products with this raw availability text
        #[arg(long)]
        site_status: Option<String>,
        /// Show a progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Show recent batch runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Show aggregate run statistics
    Stats,

    /// Inspect and manage locks
    Locks {
        #[command(subcommand)]
        command: LockCommands,
    },

    /// Manage per-site selector configuration
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Track a new product
    Add {
        /// External product identifier
        product_id: String,
        /// Product page URL
        url: String,
        /// Site label for batch filtering
        #[arg(long)]
        site: Option<String>,
    },

    /// Show a product and its latest price
    Show {
        product_id: String,
    },

    /// Scrape one product now
    Scrape {
        product_id: String,
    },

    /// List all tracked products
    List,
}

#[derive(Subcommand)]
enum LockCommands {
    /// List held locks
    List,

    /// Reclaim stale item locks
    Sweep,

    /// Force-release all process locks (use when a host died mid-batch)
    ForceRelease,
}

#[derive(Subcommand)]
enum SiteCommands {
    /// Create or update a site configuration
    Set {
        /// Site hostname, e.g. shop.example.com
        hostname: String,
        /// Selector dialect: css or simple
        #[arg(long, default_value = "css")]
        dialect: String,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        uvp: Option<String>,
        #[arg(long)]
        seller: Option<String>,
        #[arg(long)]
        availability: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        image: Option<String>,
        #[arg(long, default_value = "EUR")]
        currency: String,
    },

    /// List configured sites
    List,
}

/// Parse arguments and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Url { url } => cmd_scrape_url(settings, &url).await,
        Commands::Product { command } => match command {
            ProductCommands::Add {
                product_id,
                url,
                site,
            } => cmd_product_add(&settings, &product_id, &url, site),
            ProductCommands::Show { product_id } => cmd_product_show(&settings, &product_id),
            ProductCommands::Scrape { product_id } => {
                cmd_product_scrape(settings, &product_id).await
            }
            ProductCommands::List => cmd_product_list(&settings),
        },
        Commands::Batch {
            limit,
            site,
            site_status,
            progress,
        } => cmd_batch(settings, limit, site.as_deref(), site_status.as_deref(), progress).await,
        Commands::Runs { limit } => cmd_runs(&settings, limit),
        Commands::Stats => cmd_stats(&settings),
        Commands::Locks { command } => match command {
            LockCommands::List => cmd_locks_list(&settings),
            LockCommands::Sweep => cmd_locks_sweep(&settings),
            LockCommands::ForceRelease => cmd_locks_force_release(&settings),
        },
        Commands::Site { command } => match command {
            SiteCommands::Set {
                hostname,
                dialect,
                price,
                uvp,
                seller,
                availability,
                name,
                image,
                currency,
            } => cmd_site_set(
                &settings,
                &hostname,
                &dialect,
                price,
                uvp,
                seller,
                availability,
                name,
                image,
                currency,
            ),
            SiteCommands::List => cmd_site_list(&settings),
        },
    }
}

fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let db = &settings.database_path;
    ProductRepository::new(db)?;
    PriceHistoryRepository::new(db)?;
    SiteConfigRepository::new(db)?;
    ItemLockRepository::new(db)?;
    ProcessLockRepository::new(db)?;
    RunRepository::new(db)?;

    println!(
        "{} Initialized pricewatch database at {}",
        style("✓").green(),
        db.display()
    );
    Ok(())
}

async fn cmd_scrape_url(settings: Settings, url: &str) -> anyhow::Result<()> {
    let mut scraper = Scraper::new(settings)?;
    let outcome = scraper.scrape_url(url).await?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_product_add(
    settings: &Settings,
    product_id: &str,
    url: &str,
    site: Option<String>,
) -> anyhow::Result<()> {
    let products = ProductRepository::new(&settings.database_path)?;
    if products.get(product_id)?.is_some() {
        println!(
            "{} Product {} already tracked",
            style("!").yellow(),
            product_id
        );
        return Ok(());
    }

    let product = Product::with_site(product_id.to_string(), url.to_string(), site);
    products.save(&product)?;
    println!("{} Tracking product {}", style("✓").green(), product_id);
    Ok(())
}

fn cmd_product_show(settings: &Settings, product_id: &str) -> anyhow::Result<()> {
    let products = ProductRepository::new(&settings.database_path)?;
    let history = PriceHistoryRepository::new(&settings.database_path)?;

    let Some(product) = products.get(product_id)? else {
        println!("{} Unknown product: {}", style("✗").red(), product_id);
        return Ok(());
    };

    println!("Product:     {}", product.product_id);
    println!("URL:         {}", product.url);
    println!("Name:        {}", product.name.as_deref().unwrap_or("-"));
    println!("Site:        {}", product.site.as_deref().unwrap_or("-"));
    println!("URL status:  {}", product.url_status.as_str());
    println!("Failures:    {}", product.consecutive_failed_scrapes);

    match history.latest_for(product_id)? {
        Some(entry) => {
            println!(
                "Last price:  {:.2} {} ({}, seen {})",
                entry.price,
                entry.currency,
                entry.availability.as_str(),
                entry.fetched_at.format("%Y-%m-%d %H:%M")
            );
        }
        None => println!("Last price:  never scraped"),
    }
    Ok(())
}

async fn cmd_product_scrape(settings: Settings, product_id: &str) -> anyhow::Result<()> {
    let mut scraper = Scraper::new(settings)?;
    let outcome = scraper.scrape_by_product_id(product_id).await?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_product_list(settings: &Settings) -> anyhow::Result<()> {
    let products = ProductRepository::new(&settings.database_path)?;
    let all = products.all()?;
    if all.is_empty() {
        println!("No products tracked.");
        return Ok(());
    }

    for product in &all {
        let price = product
            .price
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<20} {:<9} {:>10}  {}",
            product.product_id,
            product.url_status.as_str(),
            price,
            product.name.as_deref().unwrap_or("")
        );
    }
    println!("\n{} products", all.len());
    Ok(())
}

async fn cmd_batch(
    settings: Settings,
    limit: Option<u32>,
    site: Option<&str>,
    site_status: Option<&str>,
    progress: bool,
) -> anyhow::Result<()> {
    match services::run_batch(settings, limit, site, site_status, progress).await? {
        BatchDecision::Ran(run) => {
            println!(
                "{} Completed! Total: {}, processed: {}, failed: {}",
                style("✓").green(),
                run.items_total,
                run.items_processed,
                run.items_failed
            );
            if run.bot_challenges > 0 {
                println!(
                    "  Bot challenges: {}, bypassed: {}",
                    run.bot_challenges, run.successful_bypasses
                );
            }
        }
        BatchDecision::AtCapacity { active, max } => {
            println!(
                "{} {} of {} workers already running, not starting",
                style("!").yellow(),
                active,
                max
            );
        }
        BatchDecision::NoWork => {
            println!("{} Nothing due, exiting", style("✓").green());
        }
    }
    Ok(())
}

fn cmd_runs(settings: &Settings, limit: u32) -> anyhow::Result<()> {
    let runs = RunRepository::new(&settings.database_path)?;
    let recent = runs.recent(limit)?;
    if recent.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for run in &recent {
        let status = match run.status {
            RunStatus::Completed => style(run.status.as_str()).green(),
            RunStatus::Failed => style(run.status.as_str()).red(),
            RunStatus::Running => style(run.status.as_str()).yellow(),
        };
        let duration = run
            .duration_secs
            .map(|d| format!("{d}s"))
            .unwrap_or_else(|| "-".into());
        println!(
            "#{:<5} {:<9} {}  {:>5}  ok {:>4}  failed {:>4}  pid {}@{}",
            run.id,
            status,
            run.started_at.format("%Y-%m-%d %H:%M"),
            duration,
            run.items_processed,
            run.items_failed,
            run.process_id,
            run.hostname
        );
        if let Some(ref message) = run.error_message {
            println!("       {}", style(message).red());
        }
    }
    Ok(())
}

fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let runs = RunRepository::new(&settings.database_path)?;
    let stats = runs.statistics()?;

    println!("Runs:             {}", stats.total_runs);
    println!("  completed:      {}", stats.completed_runs);
    println!("  failed:         {}", stats.failed_runs);
    println!("Items processed:  {}", stats.total_items_processed);
    println!("Items failed:     {}", stats.total_items_failed);
    println!("Bot challenges:   {}", stats.total_bot_challenges);
    println!("Bypasses:         {}", stats.total_successful_bypasses);
    if let Some(avg) = stats.avg_duration_secs {
        println!("Avg duration:     {avg:.0}s");
    }
    Ok(())
}

fn cmd_locks_list(settings: &Settings) -> anyhow::Result<()> {
    let process_locks = ProcessLockRepository::new(&settings.database_path)?;
    let item_locks = ItemLockRepository::new(&settings.database_path)?;

    let processes = process_locks.all()?;
    println!("Process locks: {}", processes.len());
    for lock in &processes {
        println!(
            "  pid {}@{} since {}",
            lock.process_id,
            lock.hostname,
            lock.acquired_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let items = item_locks.all()?;
    println!("Item locks: {}", items.len());
    for lock in &items {
        println!(
            "  {} held by pid {} (run #{}) since {}",
            lock.product_id,
            lock.process_id,
            lock.run_id,
            lock.locked_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_locks_sweep(settings: &Settings) -> anyhow::Result<()> {
    let item_locks = ItemLockRepository::new(&settings.database_path)?;
    let process_locks = ProcessLockRepository::new(&settings.database_path)?;

    let items = item_locks.sweep_stale(settings.item_lock_timeout_secs)?;
    let processes = process_locks.reclaim_dead()?;
    println!(
        "{} Reclaimed {} item locks and {} process locks",
        style("✓").green(),
        items,
        processes
    );
    Ok(())
}

fn cmd_locks_force_release(settings: &Settings) -> anyhow::Result<()> {
    let process_locks = ProcessLockRepository::new(&settings.database_path)?;
    let count = process_locks.force_release_all()?;
    println!("{} Released {} process locks", style("✓").green(), count);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_site_set(
    settings: &Settings,
    hostname: &str,
    dialect: &str,
    price: Option<String>,
    uvp: Option<String>,
    seller: Option<String>,
    availability: Option<String>,
    name: Option<String>,
    image: Option<String>,
    currency: String,
) -> anyhow::Result<()> {
    let Some(dialect) = SelectorDialect::from_str(dialect) else {
        anyhow::bail!("unknown selector dialect: {dialect} (use css or simple)");
    };

    let sites = SiteConfigRepository::new(&settings.database_path)?;
    let mut config = sites
        .find_by_hostname(hostname)?
        .unwrap_or_else(|| SiteConfig::new(hostname.to_string()));

    config.dialect = dialect;
    config.price_selector = price;
    config.uvp_selector = uvp;
    config.seller_selector = seller;
    config.availability_selector = availability;
    config.name_selector = name;
    config.image_selector = image;
    config.currency = currency;
    sites.save(&config)?;

    println!("{} Saved site config for {}", style("✓").green(), hostname);
    Ok(())
}

fn cmd_site_list(settings: &Settings) -> anyhow::Result<()> {
    let sites = SiteConfigRepository::new(&settings.database_path)?;
    let all = sites.all()?;
    if all.is_empty() {
        println!("No sites configured.");
        return Ok(());
    }

    for config in &all {
        println!(
            "{:<30} {:<7} {:<4} price={} name={}",
            config.hostname,
            config.dialect.as_str(),
            config.currency,
            config.price_selector.as_deref().unwrap_or("-"),
            config.name_selector.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn print_outcome(outcome: &crate::services::ScrapeOutcome) {
    println!("Product:      {}", outcome.product_id);
    println!("URL status:   {}", outcome.status.as_str());
    match outcome.price {
        Some(price) => println!("Price:        {price:.2}"),
        None => println!("Price:        -"),
    }
    println!("Name:         {}", outcome.name.as_deref().unwrap_or("-"));
    println!("Availability: {}", outcome.availability.as_str());
    if let Some(tier) = outcome.tier {
        println!("Fetched via:  {}", tier.as_str());
    }
    if outcome.challenged {
        println!("{} Bot challenge encountered", style("!").yellow());
    }
}
