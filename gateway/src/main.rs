use std::sync::Arc;

use args::Args;
use clap::Parser;
use protocol::{GatewayServer, models::ModelInfo, server::router as build_router};

mod args;
mod auth;
mod observability;
mod router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = config::Config::load(&args.config)?;

    telemetry::init(&args.log_filter, config.telemetry.log_format);

    let listen_address =
        config.server.listen_address.unwrap_or_else(|| std::net::SocketAddr::from(([127, 0, 0, 1], 8000)));

    let models = config
        .llm
        .providers
        .keys()
        .map(|name| ModelInfo { id: name.clone(), created: 0, owned_by: name.clone() })
        .collect();

    let egress_router = Arc::new(router::ConfigRouter::new(config.llm.providers.clone()));
    let auth_broker = Arc::new(auth::ConfigAuthBroker::new(config.llm.providers.clone()));

    let server = Arc::new(GatewayServer::new(
        egress_router,
        auth_broker,
        Arc::new(observability::LogUsageSink),
        Arc::new(observability::LogLogger),
        models,
    ));

    let protocols = &config.llm.protocols;
    let app = build_router(
        server,
        protocols.chat.enabled.then_some(protocols.chat.path.as_str()),
        protocols.messages.enabled.then_some(protocols.messages.path.as_str()),
        protocols.gemini.enabled.then_some(protocols.gemini.path.as_str()),
        protocols.responses.enabled.then_some(protocols.responses.path.as_str()),
    );

    log::info!("listening on {listen_address}");
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    axum::serve(listener, app).await?;

    fastrace::flush();

    Ok(())
}
