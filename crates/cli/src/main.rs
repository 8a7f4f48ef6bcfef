use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use deepguard_core::analysis::domain::verdict::summarize;
use deepguard_core::messaging::domain::channel::Outbox;
use deepguard_core::messaging::domain::host_message::decode_host_message;
use deepguard_core::messaging::domain::messages::{ControlNotice, CoordinatorEvent};
use deepguard_core::runtime::system::{local_ports, System};
use deepguard_core::session::domain::capture_session::SessionState;
use deepguard_core::session::domain::target::TargetDescriptor;
use deepguard_core::session::infrastructure::coordinator::CoordinatorConfig;
use deepguard_core::shared::constants::{CLASSIFIER_MODEL_NAME, DETECTOR_MODEL_NAME};
use deepguard_core::shared::detection_result::DetectionResult;
use deepguard_core::shared::model_resolver::{ModelLocations, ProgressFn};
use deepguard_core::shared::settings::{QualityTier, ScoringMode, Settings};
use deepguard_core::tracking::domain::surface_source::SharedDocument;
use deepguard_core::tracking::domain::video_surface::{VideoSurface, Viewport};
use deepguard_core::tracking::infrastructure::tracker_worker::TrackerConfig;

/// Watches a live video source for manipulated faces.
#[derive(Parser)]
#[command(name = "deepguard")]
struct Cli {
    /// Video file, URL or capture device understood by ffmpeg.
    source: String,

    /// Frames analyzed per second (0.5-30). Defaults to the saved setting.
    #[arg(long)]
    rate: Option<f64>,

    /// Quality tier: low, balanced or high.
    #[arg(long)]
    quality: Option<QualityTier>,

    /// Scoring mode: model or fused.
    #[arg(long)]
    scoring: Option<ScoringMode>,

    /// Also alert on warning-level frames.
    #[arg(long)]
    warnings: bool,

    /// Stop after this many analyzed frames.
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Video surface box `x,y,width,height` in frame pixels; biases which face is analyzed.
    #[arg(long, value_delimiter = ',', num_args = 4)]
    region: Option<Vec<i32>>,

    /// Decode as fast as possible instead of at the source frame rate.
    #[arg(long)]
    no_realtime: bool,

    /// Directory searched for models before downloading.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Base URL models are downloaded from.
    #[arg(long)]
    model_url: Option<String>,

    /// Print one JSON object per frame and a JSON verdict.
    #[arg(long)]
    json: bool,

    /// Log per-stage pipeline timings.
    #[arg(long)]
    diagnostics: bool,

    /// Read host messages (JSON lines: regionFound, regionLost, targetClosed) from stdin.
    #[arg(long)]
    host_events: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = settings_for(&cli);
    let locations = model_locations(&cli)?;
    prefetch_models(&locations);

    let document = SharedDocument::new(Viewport::new(0, i32::MAX));
    if let Some(region) = cli.region.as_deref() {
        if let [x, y, w, h] = *region {
            document.set_surfaces(vec![VideoSurface::live(x, y, w, h)]);
        }
    }

    let system = System::launch(
        CoordinatorConfig::from_settings(settings),
        local_ports(locations, !cli.no_realtime, cli.diagnostics),
        Box::new(document.clone()),
        TrackerConfig::default(),
    )?;
    document.observe(system.tracker().outbox());
    let notices = system.coordinator().subscribe()?;
    system
        .coordinator()
        .start(TargetDescriptor::local(cli.source.clone()))?;

    if cli.host_events {
        forward_host_events(system.coordinator().outbox())?;
    }

    let results = watch(&cli, &notices);

    if let Err(e) = system.coordinator().stop() {
        log::warn!("Stop did not complete cleanly: {e}");
    }
    system.shutdown();
    report_verdict(&results, cli.json)?;
    Ok(())
}

fn settings_for(cli: &Cli) -> Settings {
    let mut settings = Settings::load();
    if let Some(rate) = cli.rate {
        settings.sampling_rate_hz = rate;
    }
    if let Some(quality) = cli.quality {
        settings.quality_tier = quality;
    }
    if let Some(scoring) = cli.scoring {
        settings.scoring_mode = scoring;
    }
    if cli.warnings {
        settings.warning_notifications_enabled = true;
    }
    settings
}

fn model_locations(cli: &Cli) -> Result<ModelLocations, Box<dyn std::error::Error>> {
    let mut locations = ModelLocations::from_env()?;
    if let Some(dir) = &cli.model_dir {
        locations = locations.with_bundled_dir(dir);
    }
    if let Some(url) = &cli.model_url {
        locations = locations.with_base_url(url.clone());
    }
    Ok(locations)
}

/// Downloads missing models up front so the processing context starts quickly.
/// A failure here is not fatal: the session reports frames without a face.
fn prefetch_models(locations: &ModelLocations) {
    for name in [DETECTOR_MODEL_NAME, CLASSIFIER_MODEL_NAME] {
        if locations.find_local(name).is_some() {
            continue;
        }
        let label = name.to_string();
        let progress: ProgressFn = Box::new(move |done, total| {
            if total > 0 {
                eprint!("\rDownloading {label}: {}%", done * 100 / total);
            }
        });
        match locations.resolve(name, Some(progress)) {
            Ok(path) => {
                eprintln!();
                log::info!("Model ready at {}", path.display());
            }
            Err(e) => log::warn!("{e}"),
        }
    }
}

/// Feeds stdin lines to the coordinator until stdin closes.
fn forward_host_events(outbox: Outbox<CoordinatorEvent>) -> std::io::Result<()> {
    thread::Builder::new()
        .name("host-events".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => outbox.notify(decode_host_message(&line)),
                    Err(e) => {
                        log::warn!("Host event stream closed: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

/// Collects results until the session ends or a limit is reached.
fn watch(
    cli: &Cli,
    notices: &crossbeam_channel::Receiver<ControlNotice>,
) -> Vec<DetectionResult> {
    let deadline = cli
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut results = Vec::new();
    // The subscription opens with the pre-start status.
    let mut was_active = false;
    loop {
        if cli.frames.is_some_and(|n| results.len() as u64 >= n) {
            break;
        }
        let wait = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) => left,
                None => break,
            },
            None => Duration::from_secs(1),
        };
        let notice = match notices.recv_timeout(wait) {
            Ok(notice) => notice,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };
        match notice {
            ControlNotice::Result {
                result,
                smoothed_confidence,
            } => {
                print_result(&result, smoothed_confidence, cli.json);
                results.push(result);
            }
            ControlNotice::Error(e) => eprintln!("{e}"),
            ControlNotice::StatusChanged(SessionState::Active) => was_active = true,
            ControlNotice::StatusChanged(SessionState::Idle) if was_active => break,
            ControlNotice::StatusChanged(_) | ControlNotice::Alert(_) => {}
            ControlNotice::ModelReady { backend } => log::info!("Inference backend: {backend}"),
        }
    }
    results
}

fn print_result(result: &DetectionResult, smoothed: f64, json: bool) {
    if json {
        match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("Could not serialize frame {}: {e}", result.frame_number),
        }
        return;
    }
    if result.face_detected {
        println!(
            "frame {:>5}  {:<7}  {:>5.1}%  smoothed {:>5.1}%  {:.0} ms",
            result.frame_number,
            result.threat_level.to_string(),
            result.raw_confidence * 100.0,
            smoothed * 100.0,
            result.inference_latency_ms
        );
    } else {
        println!("frame {:>5}  no face", result.frame_number);
    }
}

fn report_verdict(results: &[DetectionResult], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let verdict = summarize(results);
    if json {
        println!("{}", serde_json::to_string(&verdict)?);
        return Ok(());
    }
    match verdict {
        Some(v) => println!(
            "\nVerdict: {} ({:.1}% over {} of {} frames, peak {})",
            v.threat_level,
            v.mean_confidence * 100.0,
            v.face_frames,
            v.frames,
            v.peak_threat
        ),
        None => println!("\nVerdict: no face analyzed in {} frames", results.len()),
    }
    Ok(())
}
