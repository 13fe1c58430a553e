// Runtime configuration. Everything is read once from the environment at
// startup and then handed to the client and controller by value.

use std::path::PathBuf;
use std::time::Duration;

/// Backend used when `SPLEETER_BACKEND_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// How long the progress bar stays at its final value before it resets.
pub const DEFAULT_PROGRESS_RESET: Duration = Duration::from_millis(800);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the separation service, without a trailing slash.
    pub backend_url: String,
    pub progress_reset_delay: Duration,
    pub download_dir: PathBuf,
    pub log_level: log::LevelFilter,
}

impl Config {
    /// Build the configuration from `SPLEETER_BACKEND_URL`,
    /// `SPLEETER_PROGRESS_RESET_MS`, `SPLEETER_DOWNLOAD_DIR` and
    /// `SPLEETER_LOG`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("SPLEETER_BACKEND_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.into());

        let progress_reset_delay = lookup("SPLEETER_PROGRESS_RESET_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROGRESS_RESET);

        let download_dir = lookup("SPLEETER_DOWNLOAD_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let log_level = lookup("SPLEETER_LOG")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(log::LevelFilter::Info);

        Config {
            backend_url: normalize_backend(&backend_url),
            progress_reset_delay,
            download_dir,
            log_level,
        }
    }

    /// Configuration pointing at `backend_url` with default timings.
    pub fn with_backend(backend_url: &str) -> Self {
        Config {
            backend_url: normalize_backend(backend_url),
            progress_reset_delay: DEFAULT_PROGRESS_RESET,
            download_dir: PathBuf::from("."),
            log_level: log::LevelFilter::Info,
        }
    }

    /// Turn a path returned by the service into an absolute URL.
    pub fn resolve(&self, relative: &str) -> String {
        format!("{}{}", self.backend_url, relative)
    }
}

fn normalize_backend(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(cfg.progress_reset_delay, DEFAULT_PROGRESS_RESET);
        assert_eq!(cfg.log_level, log::LevelFilter::Info);
    }

    #[test]
    fn reads_every_variable() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("SPLEETER_BACKEND_URL", "https://api.example.com/"),
            ("SPLEETER_PROGRESS_RESET_MS", "10"),
            ("SPLEETER_DOWNLOAD_DIR", "/tmp/stems"),
            ("SPLEETER_LOG", "debug"),
        ]));
        assert_eq!(cfg.backend_url, "https://api.example.com");
        assert_eq!(cfg.progress_reset_delay, Duration::from_millis(10));
        assert_eq!(cfg.download_dir, PathBuf::from("/tmp/stems"));
        assert_eq!(cfg.log_level, log::LevelFilter::Debug);
    }

    #[test]
    fn garbage_delay_falls_back_to_default() {
        let cfg = Config::from_lookup(lookup_from(&[("SPLEETER_PROGRESS_RESET_MS", "soon")]));
        assert_eq!(cfg.progress_reset_delay, DEFAULT_PROGRESS_RESET);
    }

    #[test]
    fn resolve_prefixes_backend() {
        let cfg = Config::with_backend("https://api.example.com");
        assert_eq!(
            cfg.resolve("/files/v1.mp3"),
            "https://api.example.com/files/v1.mp3"
        );
    }
}
