use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::automation::locator::{HeuristicPoint, DEFAULT_HEURISTIC_POINTS};
use crate::automation::verifier::VerificationMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    /// Browser origins allowed to call the API
    pub cors_origins: Vec<String>,
    pub bridge: BridgeConfig,
    pub history_db: PathBuf,
    /// Per-attempt evidence directories are created under this root
    pub evidence_dir: PathBuf,
    pub automation: AutomationConfig,
}

/// How to reach the bridge tool
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub adb_path: PathBuf,
    pub command_timeout: Duration,
    /// Hierarchy dumps are slow on busy screens
    pub dump_timeout: Duration,
}

/// Tunables of the send pipeline
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub verification_mode: VerificationMode,
    pub verify_attempts: u32,
    pub verify_wait: Duration,
    /// Extra tries for a failed device command in PreFlight, Composing and Locating
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Re-dumps when a snapshot yields no candidate at all
    pub locate_retries: u32,
    pub compose_settle: Duration,
    pub tap_settle: Duration,
    pub home_settle: Duration,
    pub excerpt_chars: usize,
    pub min_free_kb: u64,
    pub heuristic_points: Vec<HeuristicPoint>,
    pub messaging_packages: Vec<String>,
    pub failure_markers: Vec<String>,
    pub batch_delay: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = default_data_dir();
        let defaults = AutomationConfig::default();

        Self {
            port: env_parse("SMS_PORT", 8766),
            host: env::var("SMS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            cors_origins: env_list("SMS_CORS_ORIGINS").unwrap_or_else(default_cors_origins),
            bridge: BridgeConfig {
                adb_path: env::var("ADB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("adb")),
                command_timeout: env_millis("ADB_TIMEOUT_MS", 10_000),
                dump_timeout: env_millis("ADB_DUMP_TIMEOUT_MS", 20_000),
            },
            history_db: env::var("SMS_HISTORY_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("history.db")),
            evidence_dir: env::var("SMS_EVIDENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("evidence")),
            automation: AutomationConfig {
                verification_mode: env_parse("SMS_VERIFY_MODE", defaults.verification_mode),
                verify_attempts: env_parse("SMS_VERIFY_ATTEMPTS", defaults.verify_attempts).max(1),
                verify_wait: env_millis("SMS_VERIFY_WAIT_MS", 800),
                max_retries: env_parse("SMS_MAX_RETRIES", defaults.max_retries),
                retry_backoff: env_millis("SMS_RETRY_BACKOFF_MS", 500),
                locate_retries: env_parse("SMS_LOCATE_RETRIES", defaults.locate_retries),
                compose_settle: env_millis("SMS_COMPOSE_SETTLE_MS", 2_000),
                tap_settle: env_millis("SMS_TAP_SETTLE_MS", 600),
                home_settle: env_millis("SMS_HOME_SETTLE_MS", 800),
                excerpt_chars: env_parse("SMS_EXCERPT_CHARS", defaults.excerpt_chars).max(1),
                min_free_kb: env_parse("SMS_MIN_FREE_KB", defaults.min_free_kb),
                heuristic_points: match env::var("SMS_HEURISTIC_POINTS") {
                    Ok(raw) => parse_heuristic_points(&raw).unwrap_or_else(|| {
                        tracing::warn!("Ignoring malformed SMS_HEURISTIC_POINTS: {}", raw);
                        defaults.heuristic_points.clone()
                    }),
                    Err(_) => defaults.heuristic_points.clone(),
                },
                messaging_packages: env_list("SMS_MESSAGING_PACKAGES")
                    .unwrap_or_else(|| defaults.messaging_packages.clone()),
                failure_markers: env_list("SMS_FAILURE_MARKERS")
                    .unwrap_or_else(|| defaults.failure_markers.clone()),
                batch_delay: env_millis("SMS_BATCH_DELAY_MS", 3_000),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            port: 8766,
            host: "127.0.0.1".to_string(),
            cors_origins: default_cors_origins(),
            bridge: BridgeConfig::default(),
            history_db: data_dir.join("history.db"),
            evidence_dir: data_dir.join("evidence"),
            automation: AutomationConfig::default(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            command_timeout: Duration::from_millis(10_000),
            dump_timeout: Duration::from_millis(20_000),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            verification_mode: VerificationMode::Optimistic,
            verify_attempts: 3,
            verify_wait: Duration::from_millis(800),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            locate_retries: 1,
            compose_settle: Duration::from_millis(2_000),
            tap_settle: Duration::from_millis(600),
            home_settle: Duration::from_millis(800),
            excerpt_chars: 25,
            min_free_kb: 2_048,
            heuristic_points: DEFAULT_HEURISTIC_POINTS.to_vec(),
            messaging_packages: vec![
                "com.google.android.apps.messaging".to_string(),
                "com.android.mms".to_string(),
                "com.samsung.android.messaging".to_string(),
            ],
            failure_markers: ["failed", "error", "retry", "not sent", "couldn't send"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            batch_delay: Duration::from_millis(3_000),
        }
    }
}

impl AutomationConfig {
    /// Same policy with every wait removed
    pub fn without_waits(self) -> Self {
        Self {
            verify_wait: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            compose_settle: Duration::ZERO,
            tap_settle: Duration::ZERO,
            home_settle: Duration::ZERO,
            batch_delay: Duration::ZERO,
            ..self
        }
    }
}

/// Local CRM dev servers
fn default_cors_origins() -> Vec<String> {
    ["http://localhost:3000", "http://127.0.0.1:3000", "http://localhost:5173", "http://127.0.0.1:5173"]
        .iter()
        .map(|o| o.to_string())
        .collect()
}

/// `<data_dir>/sms-autopilot`, or a local directory when the platform has none
fn default_data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join("sms-autopilot"),
        None => {
            tracing::warn!("Could not find data directory, using ./.sms-autopilot");
            PathBuf::from(".sms-autopilot")
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Parse `x:y,x:y,...` screen ratios, each within `0.0..=1.0`
pub fn parse_heuristic_points(raw: &str) -> Option<Vec<HeuristicPoint>> {
    let points = raw
        .split(',')
        .map(|pair| {
            let (x, y) = pair.trim().split_once(':')?;
            let x: f64 = x.trim().parse().ok()?;
            let y: f64 = y.trim().parse().ok()?;
            let in_range = |r: f64| (0.0..=1.0).contains(&r);
            (in_range(x) && in_range(y)).then(|| HeuristicPoint::new(x, y))
        })
        .collect::<Option<Vec<_>>>()?;

    (!points.is_empty()).then_some(points)
}
