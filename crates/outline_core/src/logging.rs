//! Engine logging bootstrap.
//!
//! # Responsibility
//! - Start the rolling file logger once per process, at the level an
//!   [`EngineConfig`] names.
//! - Keep engine events metadata-only: counts, depths and revisions, never
//!   item text.
//!
//! # Invariants
//! - A repeated init with the same level and directory is a no-op.
//! - A repeated init with another level or directory fails and leaves the
//!   running logger untouched.
//! - Init reports failures as [`LoggingError`] and never panics.

use crate::config::EngineConfig;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, LogSpecification, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "outline";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Errors from logging setup.
#[derive(Debug)]
pub enum LoggingError {
    /// Level name is not one of trace, debug, info, warn or error.
    InvalidLevel(String),
    /// Directory is blank or relative.
    InvalidDir(String),
    /// Logging already runs with a different setting.
    AlreadyActive {
        setting: &'static str,
        active: String,
        requested: String,
    },
    /// Directory creation or backend start failed.
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDir(dir) => write!(f, "log directory must be absolute, got `{dir}`"),
            Self::AlreadyActive {
                setting,
                active,
                requested,
            } => write!(
                f,
                "logging already runs with {setting} `{active}`; cannot switch to `{requested}`"
            ),
            Self::Backend(message) => write!(f, "logging backend failed: {message}"),
        }
    }
}

impl Error for LoggingError {}

struct ActiveLogger {
    level: LevelFilter,
    dir: PathBuf,
    _handle: LoggerHandle,
}

impl ActiveLogger {
    fn accepts(&self, level: LevelFilter, dir: &Path) -> Result<(), LoggingError> {
        if self.dir != dir {
            return Err(LoggingError::AlreadyActive {
                setting: "directory",
                active: self.dir.display().to_string(),
                requested: dir.display().to_string(),
            });
        }
        if self.level != level {
            return Err(LoggingError::AlreadyActive {
                setting: "level",
                active: self.level.to_string(),
                requested: level.to_string(),
            });
        }
        Ok(())
    }
}

/// Starts logging at `config.log_level` under `log_dir`.
pub fn init_logging_with_config(
    config: &EngineConfig,
    log_dir: impl AsRef<Path>,
) -> Result<(), LoggingError> {
    init_logging(&config.log_level, log_dir)
}

/// Starts logging at `level` under the absolute directory `log_dir`.
///
/// # Errors
/// - `LoggingError::InvalidLevel` / `LoggingError::InvalidDir` for bad input.
/// - `LoggingError::AlreadyActive` when logging runs with other settings.
/// - `LoggingError::Backend` when the directory or the logger cannot start.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let level = parse_level(level)?;
    let dir = log_dir.as_ref();
    if !dir.is_absolute() {
        return Err(LoggingError::InvalidDir(dir.display().to_string()));
    }

    ACTIVE_LOGGER
        .get_or_try_init(|| start(level, dir))?
        .accepts(level, dir)
}

/// Level used when a config does not name one: `debug` in debug builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Parses a level name, case-insensitively; `warning` is read as `warn`.
pub(crate) fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    let name = level.trim();
    let name = if name.eq_ignore_ascii_case("warning") {
        "warn"
    } else {
        name
    };
    match name.parse::<LevelFilter>() {
        Ok(LevelFilter::Off) | Err(_) => Err(LoggingError::InvalidLevel(name.to_string())),
        Ok(filter) => Ok(filter),
    }
}

fn start(level: LevelFilter, dir: &Path) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(dir).map_err(|err| {
        LoggingError::Backend(format!("cannot create `{}`: {err}", dir.display()))
    })?;

    let handle = Logger::with(LogSpecification::builder().default(level).build())
        .log_to_file(FileSpec::default().directory(dir).basename(LOG_FILE_BASENAME))
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=logging_start module=logging status=ok version={} level={}",
        env!("CARGO_PKG_VERSION"),
        level
    );

    Ok(ActiveLogger {
        level,
        dir: dir.to_path_buf(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info.location().map_or_else(
                || "unknown".to_string(),
                |loc| format!("{}:{}", loc.file(), loc.line()),
            );
            error!(
                "event=panic module=logging status=error location={} payload={}",
                location,
                panic_summary(info.payload())
            );
            previous(info);
        }));
    });
}

/// Single-line, length-capped text of a panic payload.
fn panic_summary(payload: &(dyn Any + Send)) -> String {
    let text = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload");

    let mut summary: String = text
        .chars()
        .take(MAX_PANIC_PAYLOAD_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if text.chars().count() > MAX_PANIC_PAYLOAD_CHARS {
        summary.push_str("...");
    }
    summary
}
