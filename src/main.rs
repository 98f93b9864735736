use medtrack::{Config, Db};
use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %redact(&cfg.database_url),
        max_connections = cfg.max_connections,
        loglevel = %cfg.loglevel
    );

    let db = match Db::connect(&cfg).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "database initialization failed");
            return Err(e.into());
        }
    };

    info!(backend = db.backend().name(), "storage initialized");
    db.close().await;
    Ok(())
}

/// Hide the password part of a database url before logging it.
fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => database_url.to_string(),
    }
}
