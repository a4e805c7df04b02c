use clap::Parser;
use std::sync::Arc;

use storefront::{
    auth::{JwtConfig, JwtManager, OAuthConfig, OAuthManager, StrategyRegistry, UserDatabase},
    cart::{CartDatabase, CartService},
    db::{Database, StoreError},
    logging::setup_logging,
    servers::{WebConfig, WebServer},
};

#[derive(Parser, Debug)]
#[command(name = "storefront", version, about)]
struct Config {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP port
    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,

    /// Path to the SQLite database
    #[arg(long, default_value = "data/storefront.db")]
    db_path: String,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write rotated log files to this directory
    #[arg(long)]
    log_dir: Option<String>,

    /// Account that receives the admin role when it registers
    #[arg(long)]
    admin_email: Option<String>,
}

#[tokio::main]
async fn main() -> storefront::Result<()> {
    let config = Config::parse();

    let _logger = setup_logging(&config.log_level, config.log_dir.as_deref())?;

    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::open(&config.db_path).map_err(StoreError::from)?;
    let users = UserDatabase::new(db.clone())?;
    let carts = CartService::new(CartDatabase::new(db)?, users.clone());
    log::info!("📦 Database ready at {}", config.db_path);

    let oauth = OAuthManager::new(OAuthConfig::from_env());
    if oauth.is_configured() {
        log::info!("🔐 GitHub sign-in enabled");
    } else {
        log::info!("ℹ️ GitHub sign-in disabled (GITHUB_CLIENT_ID / GITHUB_CLIENT_SECRET unset)");
    }

    let registry = StrategyRegistry::new(users, JwtManager::new(JwtConfig::from_env()), oauth)
        .with_admin_email(config.admin_email);

    let web_config = WebConfig {
        port: config.port,
        host: config.host,
    };
    WebServer::new(web_config, Arc::new(registry), carts)
        .start()
        .await
}
