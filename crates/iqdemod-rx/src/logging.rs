use anyhow::Context;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use tracing::{field::Visit, Subscriber};
use tracing_subscriber::{filter::FilterFn, Layer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const BANNER_TARGET: &str = "iqdemod_banner";

pub struct LoggingGuards {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub debug: bool,
    pub log_dir: Option<PathBuf>,
    pub log_file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_dir: None,
            log_file_prefix: "iqdemod".to_string(),
        }
    }
}

/// Installs the global subscriber. Everything goes to stderr (and optionally
/// a daily log file); stdout is left alone because it may carry audio.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<LoggingGuards> {
    let env_filter = if let Ok(v) = std::env::var("RUST_LOG") {
        EnvFilter::new(v)
    } else if cfg.debug {
        EnvFilter::new("info,iqdemod_rx=debug,iqdemod_core=debug")
    } else {
        EnvFilter::new("info")
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .with_filter(FilterFn::new(|meta| meta.target() != BANNER_TARGET));

    let (file_layer, file_guard) = match &cfg.log_dir {
        None => (None, None),
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, &cfg.log_file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(FilterFn::new(|meta| meta.target() != BANNER_TARGET));
            (Some(layer), Some(guard))
        }
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(BannerLayer)
        .with(stderr_layer);
    let installed = match file_layer {
        None => registry.try_init(),
        Some(layer) => registry.with(layer).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("init tracing: {e}"))?;

    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!(panic = %panic_info, "panic");
    }));

    Ok(LoggingGuards {
        _file_guard: file_guard,
    })
}

/// Prints the startup banner event as one plain stderr line instead of a
/// formatted log record.
struct BannerLayer;

impl<S: Subscriber> Layer<S> for BannerLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if event.metadata().target() != BANNER_TARGET {
            return;
        }
        let mut fields = BannerFields::default();
        event.record(&mut fields);

        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", fields.render());
    }
}

#[derive(Default)]
struct BannerFields(Vec<(&'static str, String)>);

impl BannerFields {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    fn render(&self) -> String {
        let mut line = format!(
            "iqdemod-rx v{} ({}/{}) {}",
            self.get("version").unwrap_or("unknown"),
            self.get("os").unwrap_or(std::env::consts::OS),
            self.get("arch").unwrap_or(std::env::consts::ARCH),
            self.get("timestamp").unwrap_or("unknown timestamp"),
        );
        if let Some(build) = self.get("build").map(str::trim).filter(|b| !b.is_empty()) {
            line.push_str(" build=");
            line.push_str(build);
        }
        line
    }
}

impl Visit for BannerFields {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name(), value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name(), format!("{value:?}")));
    }
}
