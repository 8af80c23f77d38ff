use actix_web::HttpServer;
use anyhow::Context;
use chrono::Utc;
use mongodb::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use identity_server::app::{build_app, AppState};
use identity_server::config::{AppConfig, StoreDriver};
use identity_server::db::{InMemoryTokenStore, InMemoryUserStore, MongoDbContext, TokenStore, UserStore};
use identity_server::middleware::install_panic_hook;
use identity_server::services::EmailService;

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(300);
const BUCKET_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::var("CONFIG_PATH") {
        Ok(path) => AppConfig::load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from '{}'", path)),
        Err(_) => AppConfig::from_env().context("Failed to load configuration from environment"),
    }
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<(Arc<dyn UserStore>, Arc<dyn TokenStore>)> {
    match config.store.driver {
        StoreDriver::Memory => {
            log::warn!("Using in-memory stores; data is lost on restart");
            Ok((
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemoryTokenStore::new()),
            ))
        }
        StoreDriver::Mongodb => {
            log::info!("Connecting to MongoDB at {}...", config.store.mongodb_uri);
            let client = Client::with_uri_str(&config.store.mongodb_uri)
                .await
                .context("Failed to connect to MongoDB")?;
            let db_context = MongoDbContext::new(client, &config.store.database_name);

            log::info!("Initializing database indexes...");
            db_context
                .init_indexes()
                .await
                .context("Failed to initialize database indexes")?;

            Ok((Arc::new(db_context.users()), Arc::new(db_context.tokens())))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (for development)
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("server/.env").ok();
    }

    let config = load_config()?;

    let default_filter = if config.is_production() { "info" } else { "debug" };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_filter));
    install_panic_hook();

    log::info!("Starting identity server ({})...", config.env);

    let (users, tokens) = open_stores(&config).await?;
    let email = EmailService::from_config(&config.mail);
    let state = AppState::new(&config, users, tokens.clone(), email)?;

    // Spawn background cleanup tasks
    tokio::spawn(async move {
        let mut interval = time::interval(TOKEN_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match tokens.purge_expired(Utc::now()).await {
                Ok(removed) if removed > 0 => {
                    log::info!("Background cleanup: removed {} expired tokens", removed)
                }
                Ok(_) => {}
                Err(err) => log::error!("Background cleanup of expired tokens failed: {}", err),
            }
        }
    });

    let rate_limiter = state.rate_limiter.clone();
    let idle_ttl = config.rate_limit.idle_ttl();
    tokio::spawn(async move {
        let mut interval = time::interval(BUCKET_EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            let removed = rate_limiter.evict_idle(idle_ttl);
            if removed > 0 {
                log::debug!("Background cleanup: evicted {} idle rate limit buckets", removed);
            }
        }
    });

    let host = config.server.host.clone();
    let port = config.server.port;
    log::info!("Starting HTTP server at {}:{}...", host, port);

    HttpServer::new(move || build_app(state.clone()))
        .bind((host, port))?
        .run()
        .await?;

    Ok(())
}
