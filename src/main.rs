use grace_blog::{
    AppState,
    auth::{IdentityState, SupabaseAuthClient},
    config::{AppConfig, Env},
    create_router,
    repository::{DirectoryState, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, the database pool and the auth client, then serves
/// the router.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast in production)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise development defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grace_blog=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database (Supabase Postgres). One pool backs both the CRUD repository and the
    //    Principal Directory.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = Arc::new(PostgresRepository::new(pool));
    let repo = postgres.clone() as RepositoryState;
    let directory = postgres as DirectoryState;

    // 4. Identity provider (Supabase Auth). Its HTTP client shares the guard's timeout.
    let identity = Arc::new(
        SupabaseAuthClient::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            &config.jwt_secret,
            config.auth_timeout,
        )
        .expect("FATAL: Failed to build the Supabase Auth client."),
    ) as IdentityState;

    let bind_addr = config.bind_addr.clone();

    let app_state = AppState {
        repo,
        directory,
        identity,
        config,
    };

    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
    }
}
