use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use session_auth::auth::{PgRefreshTokenStore, SessionManager};
use session_auth::configuration::get_configuration;
use session_auth::principal::PgPrincipalDirectory;
use session_auth::startup::run;
use session_auth::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, msg: &str) -> std::io::Error {
    std::io::Error::new(kind, msg.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry();

    tracing::info!("Starting application");

    // 설정 로드
    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let environment = configuration.application.environment;
    let token_settings = configuration.jwt.resolve(environment).map_err(|e| {
        tracing::error!(environment = ?environment, "Invalid token settings: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Token configuration error")
    })?;
    tracing::info!(
        access_token_expiry = token_settings.access_token_expiry,
        refresh_token_expiry = token_settings.refresh_token_expiry,
        "Token settings resolved"
    );

    // 데이터베이스 연결 풀 생성
    let timeout = configuration.database.timeout();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(timeout)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        startup_error(std::io::ErrorKind::Other, "Database migration error")
    })?;

    tracing::info!("Database ready");

    let sessions = SessionManager::new(
        &token_settings,
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        Arc::new(PgPrincipalDirectory::new(pool)),
        timeout,
    )
    .map_err(|e| {
        tracing::error!("Failed to prepare credential hasher: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Credential hasher error")
    })?;

    // 서버 주소 설정
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions)?.await
}
