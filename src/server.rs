//! Keep-alive HTTP endpoint so the hosting platform sees a listening port.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;

pub const ALIVE_MESSAGE: &str = "CGH Sustainability Bot is running!";

async fn root() -> &'static str {
    ALIVE_MESSAGE
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
}

pub async fn serve(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener).await
}

pub async fn serve_on(listener: TcpListener) -> Result<()> {
    info!("Keep-alive server listening on {}", listener.local_addr()?);
    axum::serve(listener, router()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_on(listener));
        addr
    }

    #[tokio::test]
    async fn test_root_reports_alive() {
        let addr = spawn_server().await;
        let body = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, ALIVE_MESSAGE);
    }

    #[tokio::test]
    async fn test_healthz_is_json() {
        let addr = spawn_server().await;
        let response = reqwest::get(format!("http://{}/healthz", addr)).await.unwrap();
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let addr = spawn_server().await;
        let response = reqwest::get(format!("http://{}/nope", addr)).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}
