use navigator_service::{NavigatorConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match NavigatorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = create_app(&config);
    let listener = TcpListener::bind(config.bind_address()).await?;
    let addr = listener.local_addr()?;

    info!("Oncology Navigator Service starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Trial matching endpoint: POST http://{}/trial-match", addr);
    info!("Regimen guide endpoint: POST http://{}/regimen-guide", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
