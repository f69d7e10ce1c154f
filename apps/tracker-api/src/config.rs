use std::time::Duration;

/// Tracker API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Dashboard origin allowed by CORS in addition to the built-in list.
    pub client_url: String,
    /// Silence after which a session is considered idle.
    pub heartbeat_interval: Duration,
    /// Additional silence, after going idle, before a session is closed.
    pub session_timeout: Duration,
    /// How long a responder's track survives after its last session ends.
    pub retention: Duration,
    /// Number of recent samples kept per responder for trail rendering.
    pub trail_capacity: usize,
    /// Per-viewer outbound queue size. The oldest message is dropped on overflow.
    pub send_queue_capacity: usize,
    /// Upper bound on a single WebSocket send.
    pub send_timeout: Duration,
    /// Period of the supervisor's idle/timeout/retention sweep. At least one second.
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4003,
            client_url: "http://localhost:5173".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            session_timeout: Duration::from_secs(60),
            retention: Duration::from_secs(300),
            trail_capacity: 50,
            send_queue_capacity: 256,
            send_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; malformed values fall back to the default
    /// with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let heartbeat_interval = secs_var("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval);

        Self {
            port: parsed_var("PORT", defaults.port),
            client_url: std::env::var("CLIENT_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.client_url),
            heartbeat_interval,
            // Defaults to twice the idle threshold.
            session_timeout: secs_var("SESSION_TIMEOUT_SECS", heartbeat_interval * 2),
            retention: secs_var("RETENTION_SECS", defaults.retention),
            trail_capacity: parsed_var("TRAIL_CAPACITY", defaults.trail_capacity).max(1),
            send_queue_capacity: parsed_var("SEND_QUEUE_CAPACITY", defaults.send_queue_capacity)
                .max(1),
            send_timeout: secs_var("SEND_TIMEOUT_SECS", defaults.send_timeout),
            sweep_interval: secs_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval)
                .max(Duration::from_secs(1)),
        }
    }

    /// Origins accepted by CORS: the dashboard plus the mobile shells.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![
            self.client_url.clone(),
            "http://localhost:5173".to_string(),
            "http://localhost".to_string(),
            "capacitor://localhost".to_string(),
        ];
        origins.dedup();
        origins
    }
}

fn parsed_var<T: std::str::FromStr + Copy + std::fmt::Debug>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, ?default, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    Duration::from_secs(parsed_var(name, default.as_secs()))
}
