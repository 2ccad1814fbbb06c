//! Runtime profiling under `/_packet/pprof/`.
//!
//! CPU profiles are sampled with `pprof` and served in the protobuf format
//! read by `go tool pprof` and compatible viewers.

use crate::error::BootError;
use axum::extract::Query;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::get;
use pprof::protos::Message;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub const PREFIX: &str = "/_packet/pprof";

/// Sampling frequency in Hz
const FREQUENCY: i32 = 100;

const DEFAULT_SECONDS: u64 = 30;
const MAX_SECONDS: u64 = 300;

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(&format!("{}/", PREFIX), get(index))
        .route(&format!("{}/cmdline", PREFIX), get(cmdline))
        .route(&format!("{}/profile", PREFIX), get(profile))
}

async fn index() -> &'static str {
    "profiles:\n\
     cmdline  command line of the running process\n\
     profile  CPU profile, ?seconds=N (default 30)\n"
}

/// Command line, arguments separated by NUL.
async fn cmdline() -> String {
    std::env::args().collect::<Vec<_>>().join("\0")
}

#[derive(Debug, Deserialize)]
pub struct ProfileParams {
    seconds: Option<u64>,
}

impl ProfileParams {
    fn duration(&self) -> Result<Duration, BootError> {
        match self.seconds.unwrap_or(DEFAULT_SECONDS) {
            0 => Err(BootError::Malformed("profile duration must be at least one second".to_string())),
            s if s > MAX_SECONDS => Err(BootError::Malformed(format!(
                "profile duration {}s exceeds {}s",
                s, MAX_SECONDS
            ))),
            s => Ok(Duration::from_secs(s)),
        }
    }
}

/// Sample the process for `duration` and encode the result.
///
/// Only one profiler may run per process; a concurrent request fails.
pub fn cpu_profile(duration: Duration) -> Result<Vec<u8>, BootError> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(FREQUENCY)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()?;
    std::thread::sleep(duration);
    let profile = guard.report().build()?.pprof()?;

    let mut body = Vec::new();
    profile
        .encode(&mut body)
        .map_err(|e| BootError::Render(format!("failed to encode profile: {}", e)))?;
    Ok(body)
}

async fn profile(Query(params): Query<ProfileParams>) -> Result<Response, BootError> {
    let duration = params.duration()?;
    info!("Collecting CPU profile for {:?}", duration);

    let body = tokio::task::spawn_blocking(move || cpu_profile(duration))
        .await
        .map_err(std::io::Error::from)??;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"profile\""),
        ],
        body,
    )
        .into_response())
}
