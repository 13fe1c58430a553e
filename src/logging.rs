//! Logger setup for the terminal client.
//!
//! Log lines go to `<cache dir>/spleeter-studio/client.log` so they never
//! interleave with the progress bar on the terminal.

use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::{self, File};
use std::path::PathBuf;

/// Location of the log file, if the platform has a cache directory.
pub fn log_file_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("spleeter-studio").join("client.log"))
}

/// Install the file logger. Returns the path written to, or `None` when no
/// logger could be set up (logging is then silently disabled).
pub fn initialize(level: LevelFilter) -> Option<PathBuf> {
    let path = log_file_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    let file = File::create(&path).ok()?;
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Debug)
        .build();
    WriteLogger::init(level, config, file).ok()?;
    Some(path)
}

/// Terminal logger for tests. No-ops if a logger is already installed.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, TermLogger, TerminalMode};

    let _ = TermLogger::init(
        LevelFilter::Debug,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
