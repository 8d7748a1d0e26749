mod onboarding;
mod session;
mod vendors;


use clap::{Args, Parser, Subcommand};
use gazloc_cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use gazloc_core::{AppConfig, Position};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gazloc")]
#[command(about = "Find nearby gas bottle vendors, search them, and quote orders")]
struct Cli {
    /// Keep vendors in memory only; the on-disk cache is neither read nor written
    #[arg(long, global = true)]
    no_cache: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List vendors, nearest first when a position is given
    Vendors {
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        at: PositionArgs,
        /// Maximum number of vendors to show
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one vendor in full
    Show {
        /// Vendor id
        id: String,
        #[command(flatten)]
        at: PositionArgs,
    },
    /// Price an order from one vendor
    Quote {
        /// Vendor id
        id: String,
        /// Gas brand (e.g., ORIX)
        #[arg(long)]
        brand: String,
        /// Bottle type key or label (e.g., large)
        #[arg(long = "type")]
        bottle_type: String,
        /// Number of bottles
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        /// Print the quote as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        at: PositionArgs,
    },
    /// Print the vendor list again on every change until Ctrl-C
    Watch {
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        at: PositionArgs,
    },
    /// Show or change the onboarding flag
    Onboarding {
        /// Mark onboarding as done
        #[arg(long, conflicts_with = "reset")]
        complete: bool,
        /// Clear the onboarding flag
        #[arg(long)]
        reset: bool,
    },
}

/// Search and filter flags shared by `vendors` and `watch`.
#[derive(Debug, Clone, Default, Args)]
struct ViewArgs {
    /// Fuzzy search over name, location and brands
    #[arg(long, short)]
    query: Option<String>,
    /// Brand to select; repeat for several
    #[arg(long)]
    brand: Vec<String>,
    /// Bottle type to select; repeat for several
    #[arg(long = "type")]
    bottle_type: Vec<String>,
    /// Ignore the catalogue's default filter and list every vendor
    #[arg(long, conflicts_with_all = ["brand", "bottle_type"])]
    all: bool,
}

/// Fixed customer position in decimal degrees.
#[derive(Debug, Clone, Copy, Default, Args)]
struct PositionArgs {
    /// Latitude (e.g., 6.37)
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,
    /// Longitude (e.g., 2.39)
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
}

impl PositionArgs {
    fn position(self) -> anyhow::Result<Option<Position>> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Position::new(lat, lon)
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("invalid position {lat},{lon}")),
            _ => Ok(None),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = gazloc_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboarding { complete, reset } => {
            if cli.no_cache {
                anyhow::bail!("the onboarding flag lives in the on-disk cache; drop --no-cache");
            }
            let store = FileCacheStore::new(&config.cache_dir);
            onboarding::run_onboarding(&store, complete, reset).await
        }
        command if cli.no_cache => dispatch(command, &config, MemoryCacheStore::new()).await,
        command => dispatch(command, &config, FileCacheStore::new(&config.cache_dir)).await,
    }
}

async fn dispatch<S: CacheStore>(
    command: Commands,
    config: &AppConfig,
    store: S,
) -> anyhow::Result<()> {
    match command {
        Commands::Vendors { view, at, limit } => {
            let catalog = gazloc_core::load_catalog(&config.catalog_path)?;
            let session = session::open(config, store, at.position()?).await?;
            let result = vendors::run_vendors(&session, &catalog, &view, limit).await;
            session.close().await;
            result
        }
        Commands::Show { id, at } => {
            let catalog = gazloc_core::load_catalog(&config.catalog_path)?;
            let session = session::open(config, store, at.position()?).await?;
            let result = vendors::run_show(&session, &catalog, &id).await;
            session.close().await;
            result
        }
        Commands::Quote {
            id,
            brand,
            bottle_type,
            quantity,
            json,
            at,
        } => {
            let catalog = gazloc_core::load_catalog(&config.catalog_path)?;
            let position = at.position()?;
            let session = session::open(config, store, position).await?;
            let order = vendors::OrderArgs {
                id: &id,
                brand: &brand,
                bottle_type: &bottle_type,
                quantity,
                json,
            };
            let result = vendors::run_quote(&session, &catalog, &order).await;
            session.close().await;
            result
        }
        Commands::Watch { view, at } => {
            let catalog = gazloc_core::load_catalog(&config.catalog_path)?;
            let session = session::open(config, store, at.position()?).await?;
            vendors::run_watch(session, &catalog, &view).await
        }
        Commands::Onboarding { .. } => anyhow::bail!("onboarding does not open the directory"),
    }
}
