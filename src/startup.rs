use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::clock::{Clock, SystemClock};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    get_current_user, health_check, login, logout, logout_all, payment_notification, refresh,
    register,
};
use crate::store::{
    InMemoryRefreshTokenStore, InMemoryUserStore, PgRefreshTokenStore, PgUserStore,
    RefreshTokenStore, UserStore,
};
use crate::webhook::WebhookSignatureVerifier;

const MAX_JSON_PAYLOAD: usize = 16 * 1024;

/// Everything the HTTP layer shares across workers
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub webhook: WebhookSignatureVerifier,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let auth = AuthService::from_settings(settings, users, refresh_tokens, clock)?;
        Ok(Self {
            auth: Arc::new(auth),
            webhook: WebhookSignatureVerifier::new(settings.webhook.server_key.clone()),
        })
    }

    /// Build state backed by process-local stores
    pub fn in_memory(settings: &Settings) -> Result<Self, AppError> {
        Self::new(
            settings,
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Connect to Postgres, apply migrations and build state on top
    pub async fn postgres(settings: &Settings) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.database.max_connections)
            .connect(&settings.database.connection_string())
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;

        tracing::info!("Database connection pool created and migrated");

        Self::new(
            settings,
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgRefreshTokenStore::new(pool)),
            Arc::new(SystemClock),
        )
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let auth = web::Data::from(state.auth);
    let webhook = web::Data::new(state.webhook);
    let issuer = auth.access_tokens().clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(auth.clone())
            .app_data(webhook.clone())
            .app_data(web::JsonConfig::default().limit(MAX_JSON_PAYLOAD))

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .route("/webhooks/payment", web::post().to(payment_notification))

            // Protected routes (require an access token)
            .service(
                web::resource("/auth/me")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route(web::get().to(get_current_user)),
            )
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/logout-all", web::post().to(logout_all)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
