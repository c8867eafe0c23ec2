//! Embed a worker in another program.
//!
//! Registers a small counter application next to the built-in demos, serves
//! it on an ephemeral port, and stops after ten seconds or on Ctrl-C.
//!
//! ```text
//! cargo run --example embedded_worker
//! curl -i http://127.0.0.1:<port>/anything
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::info;
use microworker::{AppError, AppRegistry, Body, Chunks, RequestContext, StartResponse, Worker, WorkerConfig};

static HITS: AtomicUsize = AtomicUsize::new(0);

fn counter(context: RequestContext, start_response: StartResponse) -> Result<Box<dyn Body>, AppError> {
    let hits = HITS.fetch_add(1, Ordering::SeqCst) + 1;
    let body = format!("{} {} is request #{hits}\n", context.method(), context.path());
    start_response.start(
        "200 OK",
        [
            ("Content-Type", "text/plain".to_string()),
            ("Content-Length", body.len().to_string()),
        ],
    )?;
    Ok(Box::new(Chunks::once(body)))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let mut registry = AppRegistry::with_demos();
    registry.register("embedded:counter", counter);
    info!("Known applications: {}", registry.paths().join(", "));

    let config = WorkerConfig {
        server_name: "embedded.local".to_string(),
        max_connections: 16,
        request_timeout: Duration::from_secs(5),
        ..WorkerConfig::default()
    };
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let worker = Worker::new(listener, registry.resolve("embedded:counter")?, config)?.with_signal_handling();
    info!("Try: curl -i http://{}/hello", worker.local_addr()?);

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        shutdown.shutdown();
    });

    let reason = worker.run().await?;
    info!("Stopped: {reason}; served {} requests", HITS.load(Ordering::SeqCst));
    Ok(())
}
