use clap::{Parser, Subcommand};
use pitchview::video::clock::{DurationHeuristic, FpsPolicy};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the synchronized player headless and expose it over HTTP
    Serve(ServeArgs),
    /// Map every annotated top-down position back to field coordinates (CSV)
    Reverse(ReverseArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to; the next free port is used when taken
    #[arg(long, default_value_t = 12207)]
    pub port: u16,

    /// Annotation JSON file
    #[arg(long, env = "PITCHVIEW_ANNOTATIONS")]
    pub annotations: PathBuf,

    /// Directory holding the two homography matrix files
    #[arg(long, env = "PITCHVIEW_CALIBRATION_DIR")]
    pub calibration_dir: Option<PathBuf>,

    /// Fixed frame rate; overrides metadata and the duration heuristic
    #[arg(long)]
    pub fps: Option<f64>,

    /// Clip length; derived from the last annotated frame when omitted
    #[arg(long, env = "PITCHVIEW_DURATION_MS")]
    pub duration_ms: Option<u64>,

    /// Clips shorter than this are assumed to be `short-fps`
    #[arg(long, default_value_t = 10_000)]
    pub short_clip_ms: u64,

    #[arg(long, default_value_t = 30.0)]
    pub short_fps: f64,

    #[arg(long, default_value_t = 60.0)]
    pub long_fps: f64,

    /// Overlay slots per surface
    #[arg(long, default_value_t = 30)]
    pub max_overlays: usize,

    #[arg(long, default_value_t = 50)]
    pub drift_threshold_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub drift_interval_ms: u64,

    /// Refresh period of the frame/overlay loop
    #[arg(long, default_value_t = 100)]
    pub tick_ms: u64,

    /// Playback rate of the follower engines relative to the primary
    #[arg(long, default_value_t = 1.0)]
    pub follower_rate: f64,

    /// Top-down video, probed for fps, size and duration (needs the `opencv` feature)
    #[arg(long)]
    pub topdown_video: Option<PathBuf>,

    #[arg(long)]
    pub left_video: Option<PathBuf>,

    #[arg(long)]
    pub right_video: Option<PathBuf>,
}

impl ServeArgs {
    pub fn heuristic(&self) -> DurationHeuristic {
        DurationHeuristic {
            short_clip_ms: self.short_clip_ms,
            short_fps: self.short_fps,
            long_fps: self.long_fps,
        }
    }

    /// `--fps` wins, then a probed rate, then the duration heuristic.
    pub fn fps_policy(&self, probed_fps: Option<f64>) -> FpsPolicy {
        match (self.fps, probed_fps) {
            (Some(fps), _) => FpsPolicy::Fixed { fps },
            (None, Some(_)) => FpsPolicy::Metadata {
                probed: probed_fps,
                fallback: self.heuristic(),
            },
            (None, None) => FpsPolicy::DurationHeuristic(self.heuristic()),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ReverseArgs {
    /// Annotation JSON file
    #[arg(long, env = "PITCHVIEW_ANNOTATIONS")]
    pub annotations: PathBuf,

    /// Directory holding the two homography matrix files
    #[arg(long, env = "PITCHVIEW_CALIBRATION_DIR")]
    pub calibration_dir: PathBuf,

    /// Output CSV
    #[arg(long, short, default_value = "reversed.csv")]
    pub output: PathBuf,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let args = Args::try_parse_from(["pitchview", "serve", "--annotations", "a.json"]).unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.max_overlays, 30);
        assert_eq!(serve.drift_threshold_ms, 50);
        assert_eq!(serve.drift_interval_ms, 500);
        assert_eq!(serve.tick_ms, 100);
        assert_eq!(
            serve.fps_policy(None),
            FpsPolicy::DurationHeuristic(DurationHeuristic::default())
        );
    }

    #[test]
    fn test_fps_policy_precedence() {
        let args = Args::try_parse_from([
            "pitchview",
            "serve",
            "--annotations",
            "a.json",
            "--fps",
            "25",
        ])
        .unwrap();
        let Command::Serve(serve) = args.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.fps_policy(Some(50.0)), FpsPolicy::Fixed { fps: 25.0 });
    }
}
