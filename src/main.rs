use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use bridge_core::audit::{AuditSink, TracingAuditSink};
use bridge_core::repositories::mysql::{connect, run_migrations, MySqlAuditSink, MySqlHisStore};
use bridge_core::{BridgeConfig, BridgeService};

/// Main entry point for the LIS bridge
///
/// Starts the REST server that relays HIS orders to the LIS and receives LIS result
/// callbacks.
///
/// # Environment Variables
/// - `HIS_DATABASE_URL`: HIS MySQL database (required)
/// - `AUDIT_DATABASE_URL`: database holding `api_logs` (optional, audit goes to logs otherwise)
/// - `DB_MAX_CONNECTIONS`: pool size per database (default: 10)
/// - `API_KEY`: expected `x-api-key` value (optional, authentication is disabled otherwise)
/// - `BRIDGE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `LIS_*` and `BRIDGE_*`: see `BridgeConfig::from_lookup`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lis_bridge_run=info".parse()?)
                .add_directive("bridge_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(BridgeConfig::from_lookup(|k| std::env::var(k).ok())?);
    let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
        .unwrap_or_else(|_| "10".into())
        .parse()?;

    let his_url = std::env::var("HIS_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("HIS_DATABASE_URL is not set"))?;
    let his = Arc::new(MySqlHisStore::new(connect(&his_url, max_connections).await?));

    let audit: Arc<dyn AuditSink> = match std::env::var("AUDIT_DATABASE_URL") {
        Ok(url) => {
            let pool = connect(&url, max_connections).await?;
            run_migrations(&pool).await?;
            Arc::new(MySqlAuditSink::new(pool))
        }
        Err(_) => {
            tracing::warn!("AUDIT_DATABASE_URL not set, audit entries go to the log only");
            Arc::new(TracingAuditSink)
        }
    };

    let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        tracing::warn!("API_KEY not set, requests are not authenticated");
    }

    let service = BridgeService::new(config, his.clone(), his, audit)?;
    let app = router(AppState::new(Arc::new(service), api_key));

    let rest_addr: SocketAddr = std::env::var("BRIDGE_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;
    tracing::info!("++ Starting LIS bridge REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
