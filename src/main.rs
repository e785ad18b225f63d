// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use pollroom::authority::{Authority, AuthorityConfig};
use pollroom::config::Config;
use pollroom::db::PgStore;
use pollroom::routes;
use pollroom::store::{MemoryStore, Store};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok(); // Load environment variables from .env file
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    // Pick the store: Postgres when configured, in-memory otherwise
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url)
                .await
                .expect("Failed to connect to the database");
            info!("using the Postgres store");
            Arc::new(pg)
        }
        None => {
            info!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::default())
        }
    };

    let authority = Authority::spawn(
        store,
        AuthorityConfig {
            chat_capacity: config.chat_capacity,
            feed_capacity: config.feed_capacity,
            admin: config.admin_actor.clone(),
        },
    )
    .await
    .expect("Failed to load persisted state");

    let app = routes::create_routes(authority);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");
    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await
        .expect("server error");
}
