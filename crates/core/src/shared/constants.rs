use std::time::Duration;

pub const DETECTOR_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const CLASSIFIER_MODEL_NAME: &str = "meso_inception4.onnx";

/// Environment variable holding the base URL models are downloaded from
/// when they are neither cached nor bundled.
pub const MODEL_BASE_URL_ENV: &str = "DEEPGUARD_MODEL_BASE_URL";

/// Square input resolution of the deepfake classifier.
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fraction of the face box added on each side before cropping.
pub const FACE_CROP_PADDING: f64 = 0.2;

/// Crops smaller than this (in either dimension) count as no detection.
pub const MIN_FACE_CROP: u32 = 10;

pub const SUSPICIOUS_THRESHOLD: f64 = 0.3;
pub const FAKE_THRESHOLD: f64 = 0.7;

/// Weight of the newest frame in the smoothed confidence.
pub const SMOOTHING_WEIGHT: f64 = 0.1;

/// Frames averaged by the rolling inference-latency window (~1 minute at 0.5 Hz).
pub const LATENCY_WINDOW_FRAMES: usize = 30;

/// Any edge moving further than this (in document pixels) is a region change.
pub const REGION_TOLERANCE_PX: i32 = 10;

/// Consecutive empty scans before a tracked surface is reported lost.
pub const LOSS_THRESHOLD_SCANS: usize = 3;

/// Offsets from tracker start at which initial discovery scans run.
pub const DISCOVERY_SCHEDULE_MS: &[u64] = &[300, 800, 1500, 3000, 6000, 10_000];

pub const MUTATION_DEBOUNCE: Duration = Duration::from_millis(500);
pub const PERIODIC_RESCAN: Duration = Duration::from_secs(3);

pub const BROADCAST_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long a session may stay in Starting before the pipeline is declared unreachable.
pub const START_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on any wait for a one-shot acknowledgment from a peer context.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Delays between attempts to provision the isolated processing context.
pub const PROVISION_RETRY_MS: &[u64] = &[100, 250];
