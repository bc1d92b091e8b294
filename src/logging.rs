//! Log output setup
//!
//! The container emits `tracing` events under the [`TARGET`] target:
//! registrations, registry build, scope creation and disposal, activations
//! and detected cycles at DEBUG; cache hits and intercepted calls at TRACE.
//! Applications that already install a subscriber need nothing from this
//! module. The helpers here install a `tracing-subscriber` formatter when
//! the `logging-json` or `logging-pretty` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use lifetime_di::logging;
//!
//! // JSON if logging-json is enabled, pretty otherwise
//! logging::init();
//!
//! // Custom configuration
//! logging::builder()
//!     .trace()
//!     .container_only()
//!     .compact()
//!     .with_thread_ids()
//!     .init();
//! ```

use tracing::Level;

/// Target used by every event the container emits.
pub const TARGET: &str = "lifetime_di";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(feature = "logging-json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Builder for the log subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    container_only: bool,
    directives: Vec<String>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::default(),
            container_only: false,
            directives: Vec::new(),
            from_env: false,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    /// Create a builder with default settings (DEBUG, all targets).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Log everything, including cache hits.
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Log scope lifecycle and activations.
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Log only INFO and above.
    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only show events from the container.
    pub fn container_only(mut self) -> Self {
        self.container_only = true;
        self
    }

    /// Add a raw filter directive such as `my_app=info`.
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Let `RUST_LOG` replace the configured filter when it is set.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    /// Include source file names.
    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    /// Include source line numbers.
    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Include thread ids (useful when scopes are shared across threads).
    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    /// Use JSON output.
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Use pretty output.
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use compact output.
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// The filter directives this builder would install.
    pub fn filter_directives(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        let base = if self.container_only {
            format!("{TARGET}={level}")
        } else {
            level
        };
        std::iter::once(base)
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the subscriber as the global default.
    ///
    /// Returns `false` if a global subscriber was already installed.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) -> bool {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = if self.from_env {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.filter_directives()))
        } else {
            EnvFilter::new(self.filter_directives())
        };

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_target(true);

        let registry = tracing_subscriber::registry().with(filter);
        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init().is_ok(),
            // JSON output needs the logging-json feature
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer).try_init().is_ok(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init().is_ok(),
            LogFormat::Compact => registry.with(layer.compact()).try_init().is_ok(),
        }
    }

    /// No subscriber is available without `logging-json` or `logging-pretty`.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) -> bool {
        false
    }
}

/// Create a new logging builder.
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install a DEBUG subscriber in the default format, honouring `RUST_LOG`.
pub fn init() -> bool {
    builder().from_env().init()
}

/// Install a subscriber that only shows container events.
pub fn init_container_only() -> bool {
    builder().container_only().init()
}
