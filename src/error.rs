// Error types shared by the controller and the HTTP client. The UI turns
// each of these into a one-line notice and goes back to the menu; none of
// them ends the program.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    /// `submit` was called before any file was picked or dropped.
    #[error("No file selected")]
    NoFileSelected,

    #[error("A separation is already running")]
    SubmissionInFlight,

    /// Network failure, non-success status or a body without the two stem
    /// paths. All of them are reported the same way.
    #[error("Separation failed: {0}")]
    SeparationRequestFailed(String),

    #[error("Cannot read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Nothing to download yet")]
    NoResults,
}

pub type Result<T> = std::result::Result<T, StudioError>;
