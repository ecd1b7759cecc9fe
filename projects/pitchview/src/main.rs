mod cli;

use anyhow::{Context, Result};
use cli::{Args, Command, ReverseArgs, ServeArgs};
use pitchview::overlay::annotations::AnnotationIndex;
use pitchview::overlay::types::{Size, ViewKind};
use pitchview::session::{PlayerSession, SessionConfig};
use pitchview::video::clock::FpsPolicy;
use pitchview::tracking::{calibration, export};
use pitchview::video::clocked::ClockedEngine;
use pitchview::video::synchronizer::SyncConfig;
use pitchview::web::server::run_server;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse_args();

    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Reverse(reverse_args) => reverse(reverse_args),
    }
}

/// What the video files told us, if anything.
#[derive(Default)]
struct Probed {
    fps: Option<f64>,
    duration_ms: Option<u64>,
    natives: HashMap<ViewKind, Size>,
}

#[cfg(feature = "opencv")]
fn probe_videos(args: &ServeArgs) -> Result<Probed> {
    use pitchview::video::probe::probe;

    let mut probed = Probed::default();
    let videos = [
        (ViewKind::Topdown, &args.topdown_video),
        (ViewKind::Left, &args.left_video),
        (ViewKind::Right, &args.right_video),
    ];
    for (view, path) in videos {
        let Some(path) = path else { continue };
        let info = probe(path).with_context(|| format!("Failed to probe {}", path.display()))?;
        if info.native.is_known() {
            probed.natives.insert(view, info.native);
        }
        if view == ViewKind::Topdown {
            probed.fps = info.fps;
            probed.duration_ms = info.duration_ms;
        }
    }
    Ok(probed)
}

#[cfg(not(feature = "opencv"))]
fn probe_videos(args: &ServeArgs) -> Result<Probed> {
    if args.topdown_video.is_some() || args.left_video.is_some() || args.right_video.is_some() {
        warn!("Built without the `opencv` feature; video files are not probed");
    }
    Ok(Probed::default())
}

/// Duration covering every annotated frame at the rate `policy` will pick for it.
fn duration_from_annotations(index: &AnnotationIndex, policy: &FpsPolicy) -> Option<u64> {
    index
        .last_frame()
        .map(|last| policy.duration_for_frames(last + 1))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let index = AnnotationIndex::load(&args.annotations).with_context(|| {
        format!(
            "Failed to load annotations from {}",
            args.annotations.display()
        )
    })?;
    let probed = probe_videos(&args)?;

    let fps_policy = args.fps_policy(probed.fps);
    let duration_ms = args
        .duration_ms
        .or(probed.duration_ms)
        .or_else(|| duration_from_annotations(&index, &fps_policy))
        .unwrap_or(0);
    if args.duration_ms.is_none() && probed.duration_ms.is_none() {
        warn!(
            "No clip duration given, using {} ms derived from the annotations",
            duration_ms
        );
    }

    let config = SessionConfig {
        fps_policy,
        slot_capacity: args.max_overlays,
        sync: SyncConfig {
            drift_threshold_ms: args.drift_threshold_ms,
            drift_interval: Duration::from_millis(args.drift_interval_ms),
        },
        fallback_duration_ms: Some(duration_ms),
    };
    let mut session = PlayerSession::new(Arc::new(index), config)?;

    for view in ViewKind::ALL {
        let mut engine = ClockedEngine::new(view.as_str(), duration_ms);
        if view != ViewKind::Topdown {
            engine = engine.with_rate(args.follower_rate);
        }
        if let Some(native) = probed.natives.get(&view) {
            engine = engine.with_native_size(*native);
        }
        session.add_engine(view, Box::new(engine), view == ViewKind::Topdown)?;
    }

    if let Some(dir) = &args.calibration_dir {
        let mapper = calibration::load_mapper(dir)
            .with_context(|| format!("Failed to load calibration from {}", dir.display()))?;
        session = session.with_reverse_mapper(mapper);
    }

    info!(
        "Session ready: {} frames at {} fps",
        session.total_frames(),
        session.fps()
    );

    run_server(
        args.host,
        args.port,
        Arc::new(Mutex::new(session)),
        Duration::from_millis(args.tick_ms.max(1)),
    )
    .await
}

fn reverse(args: ReverseArgs) -> Result<()> {
    let index = AnnotationIndex::load(&args.annotations).with_context(|| {
        format!(
            "Failed to load annotations from {}",
            args.annotations.display()
        )
    })?;
    let mapper = calibration::load_mapper(&args.calibration_dir).with_context(|| {
        format!(
            "Failed to load calibration from {}",
            args.calibration_dir.display()
        )
    })?;
    let summary = export::export_to_path(&index, &mapper, &args.output)?;
    info!("Reverse export finished: {} rows", summary.rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitchview::video::clock::{DurationHeuristic, FrameClock};

    #[test]
    fn test_derived_duration_covers_every_annotated_frame() {
        let index = AnnotationIndex::from_json_str(
            r#"{"frames": [{"fr": 899, "obj": []}, {"fr": 3, "obj": []}]}"#,
        )
        .unwrap();
        let policies = [
            FpsPolicy::DurationHeuristic(DurationHeuristic::default()),
            FpsPolicy::Fixed { fps: 25.0 },
            FpsPolicy::Metadata {
                probed: None,
                fallback: DurationHeuristic::default(),
            },
        ];
        for policy in policies {
            let duration_ms = duration_from_annotations(&index, &policy).unwrap();
            let mut clock = FrameClock::new(policy).unwrap();
            clock.set_duration(duration_ms).unwrap();
            assert_eq!(clock.total_frames(), 900, "{policy:?}");
        }
    }
}
