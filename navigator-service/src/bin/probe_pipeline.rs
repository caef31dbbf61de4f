use anyhow::{Context, bail};
use navigator_service::{Navigator, NavigatorConfig, PipelineKind, PipelineRequest, envelope};
use stage_flow::ServiceClient;
use std::env;
use tracing::info;

/// Runs one pipeline against the configured live services and prints the envelope.
///
/// Usage: probe_pipeline <trial-match|regimen-guide> <text>
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = env::args().skip(1);
    let (Some(kind), Some(text)) = (args.next(), args.next()) else {
        bail!("usage: probe_pipeline <trial-match|regimen-guide> <text>");
    };
    let kind: PipelineKind = kind.parse()?;

    let config = NavigatorConfig::from_env().context("loading configuration")?;
    let navigator = Navigator::from_config(&config, &ServiceClient::new());

    info!(pipeline = %kind, "running probe");
    let request = PipelineRequest::new(kind, text);
    let payload = envelope::build(navigator.run(&request).await, &request);

    println!("status: {}", payload.status);
    if let Some(degraded) = payload.degraded {
        println!("degraded: {degraded}");
    }
    println!("{}", serde_json::to_string_pretty(&payload.body)?);
    Ok(())
}
