use clap::Parser;
use std::sync::Arc;
use tracing::info;

use gymshop_api::{config::Config, logging, observability, server, state::AppState};
use gymshop_core::auth::{TokenAuthority, TOKEN_SECRET_ENV};
use gymshop_core::storage::{InMemoryStorage, Storage};

#[cfg(feature = "db")]
use gymshop_core::storage::{database::DatabaseManager, DatabaseStorage};

#[derive(Parser)]
#[command(name = "gymshop-api")]
#[command(about = "REST API server for the GymShop storefront")]
#[command(version = "0.1.0")]
struct Cli {
    /// Port to run the server on (overrides config.toml)
    #[arg(short, long)]
    port: Option<u16>,

    /// Use in-memory storage instead of the database (data will not persist)
    #[arg(long)]
    in_memory: bool,
}

async fn create_storage(use_database: bool) -> anyhow::Result<Arc<dyn Storage>> {
    if use_database {
        #[cfg(feature = "db")]
        {
            info!("Initializing database storage...");
            let db_manager = DatabaseManager::new().await?;
            db_manager.run_migrations().await?;
            let storage = Arc::new(DatabaseStorage::new(db_manager));
            info!("Database storage initialized successfully");
            Ok(storage)
        }
        #[cfg(not(feature = "db"))]
        {
            anyhow::bail!("Database feature not enabled. Rebuild with --features db");
        }
    } else {
        info!("Using in-memory storage");
        Ok(Arc::new(InMemoryStorage::new()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging and metrics
    logging::init_logging();
    observability::init().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to initialize metrics: {}", e);
    });

    let config = Config::load()?;
    let port = cli.port.unwrap_or(config.server.port);

    let secret = std::env::var(TOKEN_SECRET_ENV)
        .map_err(|_| anyhow::anyhow!("{TOKEN_SECRET_ENV} environment variable not set"))?;
    let tokens = Arc::new(TokenAuthority::new(
        &secret,
        config.server.token_ttl_seconds,
    )?);

    let storage = create_storage(!cli.in_memory).await?;
    let state = Arc::new(AppState::new(storage, tokens));

    // Bootstrap admin account from the environment, if configured
    if let (Ok(email), Ok(password)) = (
        std::env::var("GYMSHOP_ADMIN_EMAIL"),
        std::env::var("GYMSHOP_ADMIN_PASSWORD"),
    ) {
        state.users.ensure_admin(&email, &password).await?;
    }

    println!("🏋️ Starting GymShop API server on port {}...", port);
    if cli.in_memory {
        println!("🧠 Using in-memory storage (data will not persist)");
    } else {
        println!("💾 Using database storage");
    }

    server::start_server(state, port).await
}
