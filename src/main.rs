//! Replays JSON-lines pose requests through the analytics core.
//!
//! Usage: fallwatch [requests.jsonl] [--config fallwatch.toml]
//!
//! One request per line:
//! `{"camera_id": "cam", "track_id": 1, "keypoints": [...34], "bbox": [x, y, w, h], "use_encoded": false}`
//! One `AnalysisResult` is printed per request. Logs go to stderr.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fallwatch::config::Config;
use fallwatch::{AnalysisResult, Analytics, FallResult};

const CONFIG_PATH: &str = "fallwatch.toml";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default = "default_camera_id")]
    camera_id: String,
    #[serde(default)]
    track_id: i64,
    keypoints: Vec<f32>,
    /// 空ならポーズ解析のみ
    #[serde(default)]
    bbox: Vec<f32>,
    #[serde(default)]
    use_encoded: bool,
}

fn default_camera_id() -> String { "default".to_string() }

struct Args {
    input: Option<String>,
    config: String,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut config = CONFIG_PATH.to_string();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config = path,
                None => bail!("--config needs a path"),
            },
            _ if input.is_none() => input = Some(arg),
            other => bail!("unexpected argument: {}", other),
        }
    }
    Ok(Args { input, config })
}

fn process(analytics: &Analytics, req: &Request) -> AnalysisResult {
    if req.bbox.is_empty() {
        let pose_result = analytics.analyze_pose_for(&req.camera_id, req.track_id, &req.keypoints, req.use_encoded);
        return AnalysisResult {
            pose_result,
            fall_result: FallResult::empty(),
        };
    }
    analytics.analyze_and_detect(&req.camera_id, req.track_id, &req.keypoints, &req.bbox, req.use_encoded)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    let args = parse_args()?;
    let config = Config::load_or_default(&args.config);
    tracing::info!(
        version = env!("GIT_VERSION"),
        window = config.history.window,
        fps = config.history.fps,
        motion_velocity = config.fall.motion_velocity,
        "fallwatch replay"
    );

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path).with_context(|| format!("opening {}", path))?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let analytics = Analytics::new(config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (mut handled, mut skipped, mut alerts) = (0usize, 0usize, 0usize);

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let req: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed request");
                skipped += 1;
                continue;
            }
        };

        let result = process(&analytics, &req);
        if result.fall_result.primary_alert {
            alerts += 1;
        }
        serde_json::to_writer(&mut out, &result)?;
        writeln!(out)?;
        handled += 1;
    }
    out.flush()?;

    tracing::info!(handled, skipped, alerts, tracks = analytics.track_count(), "replay finished");
    Ok(())
}
