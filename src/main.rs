//! Turnstile application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Seed the admin account, if configured
//! 4. Build the API router
//! 5. Apply body limit, CORS and security headers
//! 6. Start Axum server

use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use turnstile::{
    auth::middleware::AppState,
    config::{AdminSeed, Config},
    directory::{Argon2Hasher, CredentialHasher, DirectoryError, MemoryDirectory, NewUser, UserDirectory},
    middleware::security_headers,
    routes,
    storage::{RedisStore, SharedStore},
};
use zeroize::Zeroizing;

async fn seed_admin(directory: &MemoryDirectory, seed: &AdminSeed) -> Result<(), DirectoryError> {
    let password = Zeroizing::new(seed.password.clone());
    let password_hash = Argon2Hasher::default().hash(&password)?;

    match directory
        .insert(NewUser {
            name: seed.name.clone(),
            email: seed.email.clone(),
            matric_no: seed.matric_no,
            password_hash,
            is_admin: true,
        })
        .await
    {
        Ok(user) => {
            tracing::info!(action = "admin_seeded", user_id = %user.id, "Admin account configured");
            Ok(())
        }
        Err(DirectoryError::Conflict(_)) => {
            tracing::info!("Admin account already present");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting turnstile on {}", config.bind_addr);

    let redis_client = redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    let store: SharedStore = Arc::new(
        RedisStore::connect(&redis_client, config.store_timeout())
            .await
            .expect("Failed to connect to Redis"),
    );

    let directory = MemoryDirectory::new();
    if let Some(seed) = &config.admin {
        seed_admin(&directory, seed)
            .await
            .expect("Failed to seed admin account");
    }

    let bind_addr = config.bind_addr;
    let max_body_bytes = config.max_body_bytes;
    let state = AppState::new(
        config,
        store,
        Arc::new(directory.clone()),
        Arc::new(directory),
    );

    // No allowed origins: cross-origin preflights are rejected.
    let cors = CorsLayer::new();

    let app = routes::api_router(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
