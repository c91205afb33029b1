//! Main entry point for the storefront auth server.
//!
//! Loads configuration, opens the database, builds the [`AuthService`] and
//! serves the `/auth` routes.

use anyhow::{Context, Result};
use axum::{Extension, Router, response::Json, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use storefront_auth::api::common::ApiResponse;
use storefront_auth::auth::auth_router;
use storefront_auth::config::Config;
use storefront_auth::database::Database;
use storefront_auth::repositories::AccountRepository;
use storefront_auth::services::AuthService;
use storefront_auth::services::mailer::{LogMailer, Mailer, SmtpMailer};
use storefront_auth::utils::SystemClock;
use tracing::info;
use tracing_subscriber::fmt::init;

#[tokio::main]
async fn main() -> Result<()> {
    init();

    let config = Config::from_env()?;
    let db = Database::new(&config).await?;
    let store = Arc::new(AccountRepository::new(db.pool().clone()));

    let mailer: Arc<dyn Mailer> = if config.mail.smtp_host.is_some() {
        Arc::new(SmtpMailer::new(config.mail.clone())?)
    } else {
        info!("SMTP_HOST not set, one-time links will be logged instead of mailed");
        Arc::new(LogMailer::new(config.mail.base_url.clone()))
    };

    let auth = Arc::new(AuthService::new(
        config.auth.clone(),
        store,
        mailer,
        Arc::new(SystemClock),
    )?);

    let app = Router::new()
        .route("/", get(root_handler))
        .nest("/auth", auth_router())
        .layer(Extension(auth));

    let bind_address = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;

    info!("Starting storefront auth server on port {}", config.server_port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    db.close().await;
    Ok(())
}

async fn root_handler() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(
        serde_json::json!({
            "service": "Storefront Auth",
            "version": env!("CARGO_PKG_VERSION")
        }),
        "Welcome to the Storefront auth API",
    ))
}
