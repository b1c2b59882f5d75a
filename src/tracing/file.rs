use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

use super::filter::DebugOnlyFilter;
use super::filter::ErrorOnlyFilter;
use super::filter::ErrorWarnFilter;
#[cfg(feature = "dev")]
use super::filter::InfoOnlyFilter;
use super::format::CurvekeeperFormat;
use crate::config::LoggingConfig;
use crate::err_with_loc;
use crate::Result;

// Writers flush on drop; the guards live as long as the process.
static GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

pub fn setup_tracing(
    engine_name: &str,
    logging: &LoggingConfig,
) -> Result<()> {
    let base_logs_dir = Path::new(logging.directory.as_deref().unwrap_or(".logs"));
    let logs_dirs = [base_logs_dir.to_path_buf(), base_logs_dir.join("debug"), base_logs_dir.join("error")];
    for dir in &logs_dirs {
        std::fs::create_dir_all(dir)
            .map_err(|e| err_with_loc!(format!("failed_to_create_logs_dir::{}::error::{}", dir.display(), e)))?;
    }

    let file_name = format!("{}.log", engine_name);
    let debug_appender = RollingFileAppender::new(Rotation::DAILY, base_logs_dir.join("debug"), &file_name);
    let error_appender = RollingFileAppender::new(Rotation::DAILY, base_logs_dir.join("error"), &file_name);
    let (non_blocking_debug, debug_guard) = tracing_appender::non_blocking(debug_appender);
    let (non_blocking_error, error_guard) = tracing_appender::non_blocking(error_appender);
    #[allow(unused_mut)]
    let mut guards = vec![debug_guard, error_guard];

    let format = CurvekeeperFormat {
        engine_name: engine_name.to_string(),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::Layer::default()
                .with_ansi(false)
                .event_format(format.clone())
                .with_writer(non_blocking_debug)
                .with_filter(DebugOnlyFilter),
        )
        .with(
            tracing_subscriber::fmt::Layer::default()
                .with_ansi(false)
                .event_format(format.clone())
                .with_writer(non_blocking_error)
                .with_filter(ErrorWarnFilter),
        )
        // terminal: errors always
        .with(
            tracing_subscriber::fmt::Layer::default()
                .with_ansi(true)
                .event_format(format.clone())
                .with_filter(ErrorOnlyFilter),
        );

    #[cfg(feature = "dev")]
    let subscriber = {
        let info_appender = RollingFileAppender::new(Rotation::DAILY, base_logs_dir, &file_name);
        let (non_blocking_info, info_guard) = tracing_appender::non_blocking(info_appender);
        guards.push(info_guard);
        subscriber
            .with(
                tracing_subscriber::fmt::Layer::default()
                    .with_ansi(true)
                    .event_format(format.clone())
                    .with_filter(InfoOnlyFilter),
            )
            .with(
                tracing_subscriber::fmt::Layer::default()
                    .with_ansi(false)
                    .event_format(format.clone())
                    .with_writer(non_blocking_info)
                    .with_filter(InfoOnlyFilter),
            )
    };

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => {
            let _ = GUARDS.set(guards);
            tracing::info!(
                "{}_logging_started::debug_logs::{}::error_logs::{}",
                engine_name,
                base_logs_dir.join("debug").join(&file_name).display(),
                base_logs_dir.join("error").join(&file_name).display()
            );
        },
        Err(e) => eprintln!("failed_to_set_tracing_subscriber::{}", e),
    }
    Ok(())
}
