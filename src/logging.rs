use std::any::Any;
use std::path::{Path, PathBuf};

pub const LOG_FILE_BASENAME: &str = "home-budget";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 10;
pub const LOG_ENV_VAR: &str = "HOME_BUDGET_LOG";

/// Where and how verbosely the file logger writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub spec: String,
    /// Mirror records to stdout, useful under `tauri dev`.
    pub echo_stdout: bool,
}

impl LogConfig {
    pub fn new(
        app_data_dir: &Path,
        home_budget_log: Option<String>,
        rust_log: Option<String>,
    ) -> Self {
        Self {
            directory: log_directory(app_data_dir),
            spec: resolve_log_spec(home_budget_log, rust_log),
            echo_stdout: cfg!(debug_assertions),
        }
    }

    pub fn from_env(app_data_dir: &Path) -> Self {
        Self::new(
            app_data_dir,
            std::env::var(LOG_ENV_VAR).ok(),
            std::env::var("RUST_LOG").ok(),
        )
    }
}

/// Log files live next to the preference stores, under `logs/`.
pub fn log_directory(app_data_dir: &Path) -> PathBuf {
    app_data_dir.join("logs")
}

/// Dependencies stay at WARN; this crate is more verbose in debug builds.
pub fn default_log_spec() -> &'static str {
    if cfg!(debug_assertions) {
        "warn,home_budget_lib=debug"
    } else {
        "warn,home_budget_lib=info"
    }
}

/// `HOME_BUDGET_LOG` wins over `RUST_LOG`; blank values count as unset.
pub fn resolve_log_spec(home_budget_log: Option<String>, rust_log: Option<String>) -> String {
    home_budget_log
        .filter(|value| !value.trim().is_empty())
        .or_else(|| rust_log.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default_log_spec().to_string())
}

/// Text of a panic payload, for payloads raised by `panic!` with a message.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(app_data_dir: &Path) -> Result<LogConfig, flexi_logger::FlexiLoggerError> {
    let config = LogConfig::from_env(app_data_dir);
    start_file_logger(&config)?;
    install_panic_hook();
    log::info!(
        "file logging started dir={} spec={} rotate_bytes={}",
        config.directory.display(),
        config.spec,
        LOG_ROTATE_SIZE_BYTES
    );
    Ok(config)
}

#[cfg(all(feature = "app", not(test)))]
fn start_file_logger(config: &LogConfig) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    std::fs::create_dir_all(&config.directory)?;
    let files = FileSpec::default()
        .directory(&config.directory)
        .basename(LOG_FILE_BASENAME)
        .suffix(LOG_FILE_SUFFIX);
    let echo = if config.echo_stdout {
        Duplicate::Info
    } else {
        Duplicate::None
    };

    Logger::try_with_str(&config.spec)?
        .log_to_file(files)
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stdout(echo)
        .start()?;
    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let thread = std::thread::current();
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "<unknown>".to_string());
        log::error!(
            "panic thread={} location={location} message={}",
            thread.name().unwrap_or("<unnamed>"),
            panic_message(info.payload())
        );
        previous(info);
    }));
}
