use crate::web::api::{self, SharedSession};
use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub fn build_router(session: SharedSession) -> Router {
    Router::new()
        .route("/api/status", get(api::get_status))
        .route("/api/overlays", get(api::get_overlays))
        .route("/api/overlays/:frame", get(api::get_overlays_for_frame))
        .route("/api/playback/:command", post(api::playback_command))
        .route("/api/seek", post(api::seek))
        .route("/api/step", post(api::step))
        .route("/api/frame", post(api::go_to_frame))
        .route("/api/viewport/:surface", put(api::viewport_changed))
        .route("/api/views/:view/detach", post(api::detach_view))
        .route("/api/views/:view/reattach", post(api::reattach_view))
        .route("/api/views/:view/mute", put(api::set_muted))
        .route("/api/views/:view/clear-fault", post(api::clear_fault))
        .route("/api/surfaces/:surface/visibility", put(api::set_visibility))
        .route("/api/reverse", get(api::reverse_point))
        .route("/api/hit/:surface", get(api::hit_test))
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

/// One refresh pass. Returns false once the session can no longer be locked.
fn refresh(session: &SharedSession) -> bool {
    let Ok(mut session) = session.lock() else {
        return false;
    };
    let report = session.tick(Instant::now());
    for failure in &report.failures {
        warn!("Drift correction failed: {}", failure);
    }
    true
}

/// Drive the session's refresh loop every `period`.
pub fn spawn_refresh_loop(session: SharedSession, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if !refresh(&session) {
                error!("Session lock poisoned, stopping refresh loop");
                break;
            }
        }
    })
}

pub async fn run_server(
    host: IpAddr,
    port: u16,
    session: SharedSession,
    tick: Duration,
) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port.wrapping_add(1);
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    };

    let refresh_loop = spawn_refresh_loop(session.clone(), tick);
    let app = build_router(session);

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Pitchview server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    let served = axum::serve(tokio_listener, app).await;
    refresh_loop.abort();
    served?;

    Ok(())
}
