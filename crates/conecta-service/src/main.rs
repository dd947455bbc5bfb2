use clap::{Parser, ValueEnum};
use conecta_core::{Commerce, NotificationStorageConfig};
use conecta_service::{build_router, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "conectad", version, about = "R4 Conecta gateway REST service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
    /// Base URL of the R4 platform the gateway dispatches to.
    #[arg(long, env = "R4_BANCO_URL")]
    bank_base_url: String,
    /// Outbound request timeout in seconds.
    #[arg(long, default_value_t = 30, env = "R4_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: u64,
    /// Commerce id registered with the platform.
    #[arg(long, env = "R4_MERCHANT_ID")]
    commerce_id: String,
    /// Shared HMAC secret for the commerce.
    #[arg(long, env = "R4_SECRET_KEY")]
    commerce_secret: String,
    /// Static token the platform presents on inbound lookups.
    #[arg(long, env = "R4_NOTIFICATION_TOKEN")]
    notification_token: String,
    /// Notification persistence backend. `auto` picks postgres when a
    /// database url is configured.
    #[arg(long, value_enum, default_value_t = StorageMode::Auto, env = "CONECTA_STORAGE")]
    storage: StorageMode,
    /// PostgreSQL url for the notification store.
    #[arg(long, env = "CONECTA_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "CONECTA_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
}

fn resolve_storage(cli: &Cli) -> anyhow::Result<NotificationStorageConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.storage {
        StorageMode::Memory => NotificationStorageConfig::Memory,
        StorageMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("storage=postgres requires --database-url or DATABASE_URL")
            })?;
            NotificationStorageConfig::postgres(database_url, cli.pg_max_connections)
        }
        StorageMode::Auto => {
            if let Some(database_url) = resolved_url {
                NotificationStorageConfig::postgres(database_url, cli.pg_max_connections)
            } else {
                NotificationStorageConfig::Memory
            }
        }
    };

    Ok(storage)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "conecta_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let storage = resolve_storage(&cli)?;
    let config = ServiceConfig {
        bank_base_url: cli.bank_base_url.clone(),
        request_timeout: Duration::from_secs(cli.request_timeout_secs),
        storage,
        commerces: vec![Commerce::new(
            cli.commerce_id.clone(),
            cli.commerce_secret.clone(),
            cli.notification_token.clone(),
        )],
    };

    let state = ServiceState::bootstrap(config).await?;
    info!(
        backend = state.ledger.backend_label(),
        commerce = %cli.commerce_id,
        "gateway state ready"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("conecta-service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
