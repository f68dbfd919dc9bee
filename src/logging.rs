//! Logging setup.
//!
//! Uses the `tracing` ecosystem. `RUST_LOG` always wins over the level
//! chosen here, so `RUST_LOG=mastodoff=debug,tower_http=debug` works as
//! expected.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Off,
}

impl LogLevel {
    /// Pick a level from the CLI flags. `quiet` wins over `verbose`.
    pub const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Error
        } else if verbose {
            Self::Debug
        } else {
            Self::Info
        }
    }

    const fn to_filter_string(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Off => "off",
        }
    }

    /// Default filter directives: our crate at `self`, HTTP tracing one step quieter.
    fn directives(self) -> String {
        let http = match self {
            Self::Debug => "info",
            Self::Info => "warn",
            other => other.to_filter_string(),
        };
        format!(
            "mastodoff={},tower_http={}",
            self.to_filter_string(),
            http
        )
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "off" | "none" | "quiet" => Ok(Self::Off),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean. Subsequent calls are ignored.
pub fn init_logging(level: LogLevel) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level.directives())
    };

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .ok();
}
