use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use xenstore_client::Client;

use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_event, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(client: &Client, path: &str, token: &str, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_signal_handler(running.clone())?;

    let mut watch = client
        .watch(path, token)
        .map_err(|err| client_error("watch failed", err))?;
    info!(path, token, "watching; interrupt to stop");

    while running.load(Ordering::SeqCst) {
        match watch.recv_timeout(POLL_INTERVAL) {
            Ok(Some(event)) => print_event(&event, format),
            Ok(None) => {}
            Err(err) => return Err(client_error("watch failed", err)),
        }
    }

    info!(path, token, "removing watch");
    client
        .unwatch(path, token)
        .map_err(|err| client_error("unwatch failed", err))?;
    Ok(SUCCESS)
}

fn install_signal_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(FAILURE, format!("signal handler setup failed: {err}")))
}
