// API client module: a small blocking HTTP client that talks to the
// separation service. It uploads one audio file, reports how much of the
// body has been streamed and downloads the returned stems.

use crate::config::Config;
use crate::error::{Result, StudioError};
use log::{debug, info, warn};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Extensions the separation service accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg"];

/// Called with `(bytes_sent, total_bytes)` while an upload body streams.
/// It runs on whatever thread the transport reads the body from.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// An audio file picked by the user, ready to be uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: &'static str,
    pub size: u64,
}

impl SelectedFile {
    /// Stat `path` and derive its name and media type. The file is not
    /// opened until upload time.
    pub fn from_path(path: &Path) -> Result<Self> {
        let unreadable = |source| StudioError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::metadata(path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("audio")
            .to_string();
        Ok(SelectedFile {
            path: path.to_path_buf(),
            media_type: media_type_for(&file_name),
            file_name,
            size: meta.len(),
        })
    }

    /// Whether the service will accept this file's extension.
    pub fn is_supported(&self) -> bool {
        extension_of(&self.file_name)
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// File name without its extension, used to name downloaded stems.
    pub fn track_name(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("track")
            .to_string()
    }
}

/// Body returned by `POST /separate`. Both paths are relative to the
/// backend base URL.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SeparationResponse {
    pub vocals_url: String,
    pub music_url: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Error body the service sends alongside a failing status.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Anything able to run one separation request. The controller only talks
/// to this trait so it can be driven without a network in tests.
pub trait SeparationService {
    fn separate(&self, file: &SelectedFile, on_progress: ProgressFn)
        -> Result<SeparationResponse>;
}

/// Blocking client holding the reqwest client and the backend base URL.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create an ApiClient for the backend named in `config`. Only the
    /// connect phase has a timeout; a separation may take minutes.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| StudioError::SeparationRequestFailed(format!("HTTP client: {e}")))?;
        Ok(ApiClient {
            client,
            base_url: config.backend_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Download `url` into `dest`, calling `on_progress(done, total)` as
    /// bytes arrive. The body goes to `<dest>.part` first and is renamed
    /// once complete.
    pub fn download<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(u64, u64),
    {
        let failed = |e: &dyn std::fmt::Display| StudioError::DownloadFailed(format!("{url}: {e}"));

        let mut resp = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(&e))?;
        let total = resp.content_length().unwrap_or(0);
        on_progress(0, total);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| failed(&e))?;
        }
        let tmp = dest.with_extension("part");
        let mut file = File::create(&tmp).map_err(|e| failed(&e))?;
        let mut downloaded: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = resp.read(&mut buf).map_err(|e| failed(&e))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).map_err(|e| failed(&e))?;
            downloaded += n as u64;
            on_progress(downloaded, total);
        }
        file.flush().map_err(|e| failed(&e))?;
        drop(file);

        if dest.exists() {
            fs::remove_file(dest).ok();
        }
        fs::rename(&tmp, dest).map_err(|e| failed(&e))?;

        on_progress(downloaded, total.max(downloaded));
        info!("downloaded {} ({} bytes)", dest.display(), downloaded);
        Ok(dest.to_path_buf())
    }
}

impl SeparationService for ApiClient {
    /// Upload the file as multipart field `file` to `POST /separate`.
    /// Every failure is folded into `SeparationRequestFailed`.
    fn separate(
        &self,
        file: &SelectedFile,
        on_progress: ProgressFn,
    ) -> Result<SeparationResponse> {
        let url = format!("{}/separate", &self.base_url);
        let failed = StudioError::SeparationRequestFailed;

        let handle = File::open(&file.path).map_err(|source| StudioError::FileUnreadable {
            path: file.path.clone(),
            source,
        })?;
        let reader = ProgressReader::new(handle, file.size, on_progress);
        let part = multipart::Part::reader_with_length(reader, file.size)
            .file_name(file.file_name.clone())
            .mime_str(file.media_type)
            .map_err(|e| failed(format!("bad media type: {e}")))?;
        let form = multipart::Form::new().part("file", part);

        info!("POST {} ({}, {} bytes)", url, file.file_name, file.size);
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| failed(format!("request error: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let txt = res.text().unwrap_or_else(|_| "".into());
            let detail = serde_json::from_str::<ErrorBody>(&txt)
                .map(|b| match b.detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or(txt);
            warn!("separation rejected: {} - {}", status, detail);
            return Err(failed(format!("{status} - {detail}")));
        }

        let body: SeparationResponse = res
            .json()
            .map_err(|e| failed(format!("malformed response: {e}")))?;
        if body.vocals_url.is_empty() || body.music_url.is_empty() {
            return Err(failed("response is missing a stem path".into()));
        }
        debug!("separation response: {:?}", body);
        Ok(body)
    }
}

/// Reader wrapper that reports cumulative bytes read.
struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    on_progress: ProgressFn,
}

impl<R> ProgressReader<R> {
    fn new(inner: R, total: u64, on_progress: ProgressFn) -> Self {
        ProgressReader {
            inner,
            sent: 0,
            total,
            on_progress,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sent += n as u64;
        (self.on_progress)(self.sent, self.total);
        Ok(n)
    }
}

/// Media type sent with the upload, chosen from the file extension.
pub fn media_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Local file name for a downloaded stem: `<track>_<last url segment>`.
pub fn stem_file_name(track: &str, url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("stem.wav");
    format!("{track}_{last}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn media_types_follow_extension() {
        assert_eq!(media_type_for("song.mp3"), "audio/mpeg");
        assert_eq!(media_type_for("Song.FLAC"), "audio/flac");
        assert_eq!(media_type_for("take.m4a"), "audio/mp4");
        assert_eq!(media_type_for("notes.txt"), "application/octet-stream");
        assert_eq!(media_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn stem_file_name_uses_last_segment() {
        assert_eq!(
            stem_file_name("song", "http://h/download/abc/vocals.wav"),
            "song_vocals.wav"
        );
        assert_eq!(
            stem_file_name("song", "http://h/download/abc/accompaniment.wav?x=1"),
            "song_accompaniment.wav"
        );
    }

    #[test]
    fn progress_reader_reports_cumulative_bytes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let data = vec![7u8; 10];
        let mut reader =
            ProgressReader::new(&data[..], 10, Arc::new(move |sent: u64, total: u64| {
                sink.lock().unwrap().push((sent, total));
            }));
        let mut buf = [0u8; 4];
        while reader.read(&mut buf).unwrap() > 0 {}
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&(4, 10)));
        assert!(seen.contains(&(10, 10)));
    }

    #[test]
    fn selected_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Track One.MP3");
        fs::write(&path, b"abc").unwrap();
        let f = SelectedFile::from_path(&path).unwrap();
        assert_eq!(f.file_name, "Track One.MP3");
        assert_eq!(f.media_type, "audio/mpeg");
        assert_eq!(f.size, 3);
        assert!(f.is_supported());
        assert_eq!(f.track_name(), "Track One");
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SelectedFile::from_path(&dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, StudioError::FileUnreadable { .. }));
        let err = SelectedFile::from_path(dir.path()).unwrap_err();
        assert!(matches!(err, StudioError::FileUnreadable { .. }));
    }
}
