use devit::{AppState, Config, Database, routes};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    info!(database_url = config.database_url.as_str(), "Starting DevIT API");

    let db = Database::new(&config.database_url).await?;
    let bind_address = config.bind_address.clone();
    let app = routes().with_state(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = bind_address.as_str(), "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
