mod calc;
mod config;
mod dashboard;
mod db;
mod engine;
mod feed;
mod ipc;
mod model;
mod remote;
mod validate;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(filter: &str) {
    // stdout carries the IPC stream, so logs go to stderr.
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("rosterd=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::load()?;
    init_logging(&config.log_filter);

    let state = Arc::new(ipc::AppState::new(config));
    match ipc::autoconnect(&state) {
        Ok(Some(label)) => info!(source = %label, "record source ready"),
        Ok(None) => info!("no record source configured, waiting for workspace.select or session.connect"),
        Err(e) => warn!(error = %e, "configured record source could not be opened"),
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = tx.send(resp.to_string());
                continue;
            }
        };

        // Each request runs on its own task so a scope change can land while a
        // fan-out is still in flight.
        let state = state.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let method = req.method.clone();
            let resp = ipc::handle_request(&state, req).await;
            let line = serde_json::to_string(&resp)
                .unwrap_or_else(|_| "{\"ok\":false}".to_string());
            if tx.send(line).is_err() {
                warn!(method = %method, "response dropped, writer closed");
            }
        });
    }

    drop(tx);
    // In-flight requests hold sender clones; the writer drains until they finish.
    let _ = writer.await;
    Ok(())
}
