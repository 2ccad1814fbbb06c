//! HTTP front.
//!
//! Every handler resolves a fresh [`Job`] from the client address and hands
//! the decision to the installers or the event forwarder. Nothing is stored
//! locally.
//!
//! | Path | |
//! |---|---|
//! | `/<name>.ipxe` | boot script, gated by `allow_pxe` |
//! | `/phone-home` | install progress, always 200 unless malformed |
//! | `/problem`, `/hardware-components` | gated by an active workflow |
//! | `/events` | user events for the machine's instance |
//! | installer config paths | kickstart / ignition |
//! | `/healthcheck`, `/metrics` | |
//! | `/_packet/pprof/` | cmdline, CPU profile |

use crate::client_addr::{ClientAddr, TrustedProxies};
use crate::error::BootError;
use crate::events::{EventForwarder, PhoneHome};
use crate::installers::Installers;
use crate::job::{Job, Resolver};
use crate::metrics::Metrics;
use crate::profiling;
use axum::body::Bytes;
use axum::extract::{FromRef, MatchedPath, State};
use axum::http::{HeaderMap, Request, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

/// Build revision reported by `/healthcheck`
pub const GIT_REV: &str = match option_env!("GIT_REV") {
    Some(rev) => rev,
    None => "unknown",
};

/// Shared state of the HTTP front
#[derive(Debug, Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub installers: Arc<Installers>,
    pub forwarder: Arc<EventForwarder>,
    pub metrics: Arc<Metrics>,
    pub proxies: Arc<TrustedProxies>,
    pub started: Instant,
    pub started_at: DateTime<Utc>,
}

impl FromRef<AppState> for Arc<TrustedProxies> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.proxies)
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/phone-home", post(phone_home))
        .route("/problem", get(problem).post(problem))
        .route("/hardware-components", get(hardware_components).post(hardware_components))
        .route("/events", post(events))
        .route("/healthcheck", get(healthcheck))
        .route("/_packet/healthcheck", get(healthcheck))
        .route("/metrics", get(metrics))
        .merge(profiling::router());

    for config in state.installers.configs() {
        router = router.route(config.path(), get(installer_config));
    }

    router.fallback(job_file).with_state(state).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<axum::body::Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map_or(request.uri().path(), MatchedPath::as_str);
                    tracing::info_span!(
                        "http-request",
                        method = %request.method(),
                        uri = %request.uri(),
                        matched_path = matched_path,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        ),
    )
}

/// Resolve the job for `ip`, logging why when there is none.
async fn resolve(state: &AppState, ip: IpAddr) -> Result<Job, BootError> {
    state.resolver.resolve(ip).await.inspect_err(|e| match e {
        BootError::NotFound(_) => info!(client = %ip, error = %e, "no job found for client address"),
        _ => error!(client = %ip, error = %e, "failed to resolve job for client address"),
    })
}

/// Machines that run workflows may only report while one is active.
async fn require_active_workflow(state: &AppState, job: &Job) -> Result<(), BootError> {
    if !job.can_workflow() {
        return Ok(());
    }
    match state.resolver.has_active_workflow(job).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            info!(hardware_id = %job.hardware_id(), "no active workflows");
            Err(BootError::NotFound(format!("no active workflow for hardware {}", job.hardware_id())))
        }
        Err(e) => {
            info!(hardware_id = %job.hardware_id(), error = %e, "failed to get workflows");
            Err(BootError::NotFound(format!(
                "no workflow information for hardware {}",
                job.hardware_id()
            )))
        }
    }
}

async fn job_file(State(state): State<AppState>, ClientAddr(ip): ClientAddr, uri: Uri) -> Result<Response, BootError> {
    let _job = state.metrics.track("http", "file");
    let job = resolve(&state, ip).await?;

    if !job.allow_pxe() {
        info!(
            client = %ip,
            hardware_id = %job.hardware_id(),
            "the hardware data for this machine does not allow it to pxe"
        );
        return Err(BootError::NotFound(format!("hardware {} may not pxe", job.hardware_id())));
    }

    let file = uri.path().trim_start_matches('/');
    let script = match file.strip_suffix(".ipxe") {
        Some(name) => state.installers.boot_script(&job, name).inspect_err(|e| {
            error!(hardware_id = %job.hardware_id(), installer = %job.installer(), error = %e, "failed to render boot script");
        })?,
        None => None,
    };

    match script {
        Some(bytes) => {
            info!(client = %ip, hardware_id = %job.hardware_id(), installer = %job.installer(), file = %file, "serving boot script");
            Ok(([(header::CONTENT_TYPE, "text/plain")], bytes).into_response())
        }
        None => {
            info!(client = %ip, file = %file, "file not found");
            Err(BootError::NotFound(format!("no file {:?}", file)))
        }
    }
}

async fn installer_config(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    uri: Uri,
) -> Result<Response, BootError> {
    let config = state
        .installers
        .config_for_path(uri.path())
        .ok_or_else(|| BootError::NotFound(format!("no installer config at {}", uri.path())))?;
    let _job = state.metrics.track("http", config.name());
    let job = resolve(&state, ip).await?;

    let mut document = String::new();
    config.render(&job, &mut document).inspect_err(|e| {
        error!(hardware_id = %job.hardware_id(), config = config.name(), error = %e, "failed to render installer config");
    })?;
    info!(client = %ip, hardware_id = %job.hardware_id(), config = config.name(), "serving installer config");
    Ok(([(header::CONTENT_TYPE, config.content_type())], document).into_response())
}

async fn phone_home(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, BootError> {
    let _job = state.metrics.track("http", "phone-home");
    let Ok(job) = resolve(&state, ip).await else {
        return Ok(StatusCode::OK);
    };

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let event = PhoneHome::parse(content_type, &body).inspect_err(|e| {
        warn!(client = %ip, hardware_id = %job.hardware_id(), error = %e, "malformed phone-home");
    })?;

    if let Err(e) = state.forwarder.phone_home(&job, &event).await {
        error!(hardware_id = %job.hardware_id(), error = %e, "failed to relay phone-home");
    }
    Ok(StatusCode::OK)
}

async fn problem(State(state): State<AppState>, ClientAddr(ip): ClientAddr, body: Bytes) -> Result<StatusCode, BootError> {
    let _job = state.metrics.track("http", "problem");
    let job = resolve(&state, ip).await?;
    require_active_workflow(&state, &job).await?;

    state.forwarder.problem(&job, &body).await.inspect_err(|e| match e {
        BootError::Malformed(_) => warn!(hardware_id = %job.hardware_id(), error = %e, "malformed problem report"),
        _ => error!(hardware_id = %job.hardware_id(), error = %e, "failed to relay problem report"),
    })?;
    Ok(StatusCode::OK)
}

async fn hardware_components(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    body: Bytes,
) -> Result<Json<serde_json::Value>, BootError> {
    let _job = state.metrics.track("http", "hardware-components");
    let job = resolve(&state, ip).await?;
    require_active_workflow(&state, &job).await?;

    let reply = state.forwarder.hardware_components(&job, &body).await.inspect_err(|e| match e {
        BootError::Malformed(_) => warn!(hardware_id = %job.hardware_id(), error = %e, "malformed hardware components"),
        _ => error!(hardware_id = %job.hardware_id(), error = %e, "failed to relay hardware components"),
    })?;
    Ok(Json(reply))
}

async fn events(State(state): State<AppState>, ClientAddr(ip): ClientAddr, body: Bytes) -> Response {
    let _job = state.metrics.track("http", "events");
    let Ok(job) = resolve(&state, ip).await else {
        return StatusCode::OK.into_response();
    };
    let Some(instance_id) = job.instance_id() else {
        info!(client = %ip, hardware_id = %job.hardware_id(), "no instance for client address, dropping event");
        return StatusCode::OK.into_response();
    };

    match state.forwarder.user_event(instance_id, &body).await {
        Ok(id) => {
            info!(instance_id = %instance_id, event_id = %id, "relayed user event");
            StatusCode::OK.into_response()
        }
        Err(e @ BootError::Malformed(_)) => {
            warn!(client = %ip, error = %e, "malformed user event");
            e.into_response()
        }
        Err(e) => {
            error!(instance_id = %instance_id, error = %e, "failed to post user event");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthcheck(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "git_rev": GIT_REV,
        "uptime": state.started.elapsed().as_secs_f64(),
        "started_at": state.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<Response, BootError> {
    let text = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response())
}
