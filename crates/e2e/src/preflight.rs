//! Site preflight - wait until the base URL answers before running anything

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::session::HttpClient;
use crate::spec::HttpMethod;

/// Poll `url` until it answers with a non-5xx status or `timeout` passes
pub async fn wait_for_reachable(
    http: &dyn HttpClient,
    url: &str,
    timeout: Duration,
) -> E2eResult<()> {
    let start = Instant::now();
    let mut attempts = 0;
    let no_headers = BTreeMap::new();
    let mut last_error = String::from("no attempt made");

    while start.elapsed() < timeout {
        attempts += 1;

        match http.request(HttpMethod::Get, url, &no_headers, None).await {
            Ok(resp) if resp.status < 500 => {
                info!("Site is reachable at {} ({})", url, resp.status);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Preflight returned {}", resp.status);
                last_error = format!("status {}", resp.status);
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to answer...", url);
                }
                last_error = e.to_string();
            }
        }

        sleep(Duration::from_millis(250)).await;
    }

    Err(E2eError::Setup(format!(
        "{} unreachable after {} attempt(s): {}",
        url, attempts, last_error
    )))
}
