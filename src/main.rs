//! LMS API Server
//!
//! Starts the REST server for the course platform.
//! - Storage: Sled KV, one tree per entity, explicit handle in router state
//! - Auth: bcrypt + JWT bearer tokens
//! - Payments: HTTP gateway client (two-call charge flow)
//! - Notifications: background task queue, drained by a spawned worker
//!
//! Usage:
//!   cargo run --bin load_data   # seed sample data
//!   cargo run --bin lms_api     # start server
//!   # Then query via curl or lms-cli (see README)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lms_api::payments::HttpGateway;
use lms_api::rest::create_router;
use lms_api::storage::Storage;
use lms_api::tasks::{run_worker, TaskQueue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let data_dir = std::env::var("LMS_DATA_DIR").unwrap_or_else(|_| "lms_data".to_string());
    let addr: SocketAddr = std::env::var("LMS_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let gateway_url = std::env::var("PAYMENT_GATEWAY_URL")
        .unwrap_or_else(|_| "http://localhost:9000".to_string());

    info!("🚀 LMS API starting on {}", addr);
    info!("storage: Sled at {} | gateway: {}", data_dir, gateway_url);

    let storage = Storage::open(&data_dir)?;
    let gateway = Arc::new(HttpGateway::new(gateway_url));

    // Notification worker runs for the life of the process; handlers only
    // ever submit, never wait.
    let (tasks, task_rx) = TaskQueue::new();
    tokio::spawn(run_worker(task_rx));

    let app = create_router(storage, gateway, tasks);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
