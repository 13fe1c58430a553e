// Upload controller: owns the selected file, the busy flag, the progress
// percentage and the two result URLs. Only the controller writes this
// state; renderers subscribe and receive a read-only `Snapshot` after
// every change.

use crate::api::{ProgressFn, SelectedFile, SeparationResponse, SeparationService};
use crate::config::Config;
use crate::error::{Result, StudioError};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

/// Progress shown as soon as a submission starts.
pub const PROGRESS_STARTED: u8 = 5;
/// Upper bound of the transfer band.
pub const PROGRESS_UPLOADED: u8 = 45;
/// The service answered and the stem URLs are being resolved.
pub const PROGRESS_RESPONDED: u8 = 50;
pub const PROGRESS_DONE: u8 = 100;

/// Where a file selection came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSource {
    /// A path chosen in a file dialog.
    Picker(PathBuf),
    /// Everything dropped onto the terminal. Only the first entry is used.
    Drop(Vec<PathBuf>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    FileReady,
    Uploading,
    Processing,
    Done,
}

/// Absolute URLs of the two stems from the last successful run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeparationResult {
    pub vocals_url: String,
    pub music_url: String,
    pub run_id: Option<String>,
    /// Name of the uploaded track without extension.
    pub track_name: String,
}

impl SeparationResult {
    pub fn is_empty(&self) -> bool {
        self.vocals_url.is_empty() && self.music_url.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub busy: bool,
    pub progress: u8,
    pub file_name: Option<String>,
    pub can_submit: bool,
    pub result: SeparationResult,
}

/// Map the fraction of the body sent so far into the 5..=45 band.
pub fn transfer_progress(fraction: f64) -> u8 {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    // 5 + round(fraction * 40), always within the transfer band.
    PROGRESS_STARTED + (fraction * f64::from(PROGRESS_UPLOADED - PROGRESS_STARTED)).round() as u8
}

type Listener = Box<dyn FnMut(&Snapshot)>;

#[derive(Default)]
struct State {
    selected: Option<SelectedFile>,
    busy: bool,
    progress: u8,
    phase: Phase,
    result: SeparationResult,
}

impl State {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            busy: self.busy,
            progress: self.progress,
            file_name: self.selected.as_ref().map(|f| f.file_name.clone()),
            can_submit: self.selected.is_some() && !self.busy,
            result: self.result.clone(),
        }
    }
}

/// State plus the listeners that have to hear about every change.
#[derive(Default)]
struct Store {
    state: State,
    listeners: Vec<Listener>,
}

impl Store {
    fn update(&mut self, f: impl FnOnce(&mut State)) {
        f(&mut self.state);
        let snap = self.state.snapshot();
        for listener in &mut self.listeners {
            listener(&snap);
        }
    }

    fn on_bytes_sent(&mut self, sent: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            sent as f64 / total as f64
        };
        let next = transfer_progress(fraction).max(self.state.progress);
        let finished = total == 0 || sent >= total;
        debug!("upload {}/{} bytes -> {}%", sent, total, next);
        self.update(|s| {
            s.progress = next;
            if finished {
                s.phase = Phase::Processing;
            }
        });
    }
}

enum Event {
    Sent(u64, u64),
    Finished(Result<SeparationResponse>),
}

/// Mediates between file selection and the separation service.
pub struct UploadController<S> {
    service: S,
    config: Config,
    store: Store,
}

impl<S: SeparationService + Sync> UploadController<S> {
    pub fn new(service: S, config: Config) -> Self {
        UploadController {
            service,
            config,
            store: Store::default(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a listener called with a fresh snapshot after each change.
    pub fn subscribe(&mut self, listener: impl FnMut(&Snapshot) + 'static) {
        self.store.listeners.push(Box::new(listener));
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.state.snapshot()
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.store.state.selected.as_ref()
    }

    pub fn result(&self) -> &SeparationResult {
        &self.store.state.result
    }

    /// Replace the selected file. A drop with no files is ignored and
    /// returns `Ok(None)`; a file that cannot be stat'ed leaves the current
    /// selection alone.
    pub fn select_file(&mut self, source: FileSource) -> Result<Option<&SelectedFile>> {
        let path = match source {
            FileSource::Picker(path) => path,
            FileSource::Drop(paths) => match paths.into_iter().next() {
                Some(path) => path,
                None => return Ok(None),
            },
        };
        let file = SelectedFile::from_path(&path)?;
        if !file.is_supported() {
            warn!("{} has an extension the service may reject", file.file_name);
        }
        info!("selected {} ({})", file.file_name, file.media_type);
        self.store.update(|s| {
            s.selected = Some(file);
            if !s.busy {
                s.phase = Phase::FileReady;
            }
        });
        Ok(self.store.state.selected.as_ref())
    }

    /// Upload the selected file and wait for the two stem URLs.
    ///
    /// On success the result is replaced as a whole. On failure the previous
    /// result is kept and `SeparationRequestFailed` is returned. In both cases
    /// `busy` is cleared right away and progress drops back to 0 after the
    /// configured reset delay, before this returns.
    pub fn submit(&mut self) -> Result<SeparationResult> {
        let file = match &self.store.state.selected {
            Some(file) => file.clone(),
            None => return Err(StudioError::NoFileSelected),
        };
        if self.store.state.busy {
            return Err(StudioError::SubmissionInFlight);
        }

        info!("submitting {}", file.file_name);
        self.store.update(|s| {
            s.busy = true;
            s.progress = PROGRESS_STARTED;
            s.phase = Phase::Uploading;
        });

        let outcome = self.run_request(&file);

        let outcome = match outcome {
            Ok(resp) => {
                self.store.update(|s| {
                    s.progress = PROGRESS_RESPONDED;
                    s.phase = Phase::Processing;
                });
                let result = SeparationResult {
                    vocals_url: self.config.resolve(&resp.vocals_url),
                    music_url: self.config.resolve(&resp.music_url),
                    run_id: resp.id,
                    track_name: file.track_name(),
                };
                info!("separation ready: {}", result.vocals_url);
                let done = result.clone();
                self.store.update(move |s| {
                    s.result = done;
                    s.progress = PROGRESS_DONE;
                    s.phase = Phase::Done;
                    s.busy = false;
                });
                Ok(result)
            }
            Err(err) => {
                warn!("separation of {} failed: {}", file.file_name, err);
                self.store.update(|s| {
                    s.busy = false;
                    s.phase = Phase::Idle;
                });
                Err(match err {
                    StudioError::SeparationRequestFailed(_) => err,
                    other => StudioError::SeparationRequestFailed(other.to_string()),
                })
            }
        };

        thread::sleep(self.config.progress_reset_delay);
        self.store.update(|s| {
            s.progress = 0;
            s.phase = Phase::Idle;
        });
        outcome
    }

    /// Run the request on a scoped worker thread and apply its progress
    /// events here, so the store is only ever touched by this thread.
    fn run_request(&mut self, file: &SelectedFile) -> Result<SeparationResponse> {
        let service = &self.service;
        let store = &mut self.store;
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            let progress_tx = tx.clone();
            let on_progress: ProgressFn = Arc::new(move |sent: u64, total: u64| {
                let _ = progress_tx.send(Event::Sent(sent, total));
            });
            scope.spawn(move || {
                let res = service.separate(file, on_progress);
                let _ = tx.send(Event::Finished(res));
            });

            while let Ok(event) = rx.recv() {
                match event {
                    Event::Sent(sent, total) => store.on_bytes_sent(sent, total),
                    Event::Finished(res) => return res,
                }
            }
            Err(StudioError::SeparationRequestFailed(
                "request worker stopped without an answer".into(),
            ))
        })
    }
}
