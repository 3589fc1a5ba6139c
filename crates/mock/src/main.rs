use std::sync::Arc;

use anyhow::Context;

use nova_mock::{MockState, build_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nova_observability::init();

    let addr = std::env::var("NOVA_MOCK_ADDR").unwrap_or_else(|_| {
        tracing::info!("NOVA_MOCK_ADDR not set; using 127.0.0.1:3000");
        "127.0.0.1:3000".to_string()
    });

    let app = build_app(Arc::new(MockState::new()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("mock backend listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("mock server stopped")?;
    Ok(())
}
