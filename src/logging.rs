use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::{debug, info, metadata::LevelFilter, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{prelude::*, EnvFilter};

fn do_init(stderr_level: Level, file_level: Option<(Level, PathBuf)>) {
    let mut message = String::from("Logging with: stderr");

    // Diagnostics stay off stdout, which only carries the readiness line.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(stderr_level.to_string())),
        );

    let registry = tracing_subscriber::registry().with(stderr_layer);

    let maybe_file_layer = if let Some((level, output_dir)) = file_level {
        message += &format!(", file (in dir {output_dir:?})");

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, output_dir, "serial-proxy.log");

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_filter(LevelFilter::from(level));
        Some(file_layer)
    } else {
        None
    };

    registry.with(maybe_file_layer).init();

    debug!(message);
}

/// Initialize tracing.
///
/// `RUST_LOG` takes precedence over the given stderr level.
/// Will only initialize once, so tests may call this.
pub async fn init(stderr_level: Level, file_logging: Option<(Level, PathBuf)>) {
    static TRACING_IS_INITIALIZED: RwLock<bool> = RwLock::const_new(false);

    let initialized = { *TRACING_IS_INITIALIZED.read().await };

    if !initialized {
        let mut initialized = TRACING_IS_INITIALIZED.write().await;

        // To avoid race condition between the `.read()` and the
        // `.write()`.
        if *initialized {
            return;
        }

        do_init(stderr_level, file_logging);

        *initialized = true;
    }

    info!("Logging initialized");
}
