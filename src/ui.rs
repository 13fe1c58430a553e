// UI layer: an interactive menu using `dialoguer`. The controller owns all
// state; this module only collects input, renders snapshots with
// `indicatif` and prints notices.

use crate::api::{stem_file_name, ApiClient, SUPPORTED_EXTENSIONS};
use crate::controller::{FileSource, Phase, SeparationResult, Snapshot, UploadController};
use crate::error::StudioError;
use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

/// Main interactive menu. Runs a select loop until the user chooses "Exit".
///
/// Note: `Select::interact()` is keyboard-driven: you can use arrow keys
/// and Enter to choose an option.
pub fn main_menu(mut controller: UploadController<ApiClient>) -> Result<()> {
    attach_progress_bar(&mut controller);
    println!(
        "{} backend {}",
        "Spleeter Studio".bold(),
        controller.service().base_url()
    );

    loop {
        let snapshot = controller.snapshot();
        let file_label = snapshot
            .file_name
            .clone()
            .unwrap_or_else(|| "no file".into());
        let items = vec![
            "Choose file".to_string(),
            "Drop file here (paste a path)".to_string(),
            format!("Separate [{}]", file_label),
            "Download stems".to_string(),
            "Exit".to_string(),
        ];
        let selection = Select::new().items(&items).default(0).interact()?;
        match selection {
            0 => {
                // Native file dialog; cancelling it changes nothing.
                let picked = rfd::FileDialog::new()
                    .add_filter("Audio", SUPPORTED_EXTENSIONS)
                    .pick_file();
                if let Some(path) = picked {
                    select(&mut controller, FileSource::Picker(path));
                }
            }
            1 => {
                // Dropping a file onto most terminals pastes its path.
                let text: String = Input::new()
                    .with_prompt("Drop an audio file")
                    .allow_empty(true)
                    .interact_text()?;
                select(&mut controller, FileSource::Drop(parse_drop(&text)));
            }
            2 => match controller.submit() {
                Ok(result) => print_result(&result),
                Err(e) => notice(&e),
            },
            3 => download_stems(&controller),
            4 => break,
            _ => {}
        }
    }
    Ok(())
}

/// Drive one progress bar from controller snapshots. The bar appears when a
/// submission starts and is cleared once progress is back to 0.
fn attach_progress_bar(controller: &mut UploadController<ApiClient>) {
    let slot: Rc<RefCell<Option<ProgressBar>>> = Rc::new(RefCell::new(None));
    controller.subscribe(move |snap: &Snapshot| {
        let mut slot = slot.borrow_mut();
        if snap.progress == 0 && !snap.busy {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
            return;
        }
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
                bar.set_style(style);
            }
            bar
        });
        bar.set_position(u64::from(snap.progress));
        bar.set_message(phase_label(snap.phase, snap.busy));
    });
}

fn phase_label(phase: Phase, busy: bool) -> &'static str {
    match (phase, busy) {
        (Phase::Uploading, _) => "Uploading...",
        (Phase::Processing, _) => "Separating...",
        (Phase::Done, _) => "Done",
        (_, true) => "Working...",
        (_, false) => "",
    }
}

fn select(controller: &mut UploadController<ApiClient>, source: FileSource) {
    match controller.select_file(source) {
        Ok(Some(file)) => {
            println!("Selected {}", file.file_name.as_str().bold());
            if !file.is_supported() {
                println!(
                    "{}",
                    format!(
                        "Heads up: the service only accepts {}",
                        SUPPORTED_EXTENSIONS.join(", ")
                    )
                    .yellow()
                );
            }
        }
        Ok(None) => {}
        Err(e) => notice(&e),
    }
}

fn print_result(result: &SeparationResult) {
    println!("{}", "Separation complete".green().bold());
    println!("  {} {}", "Vocals:".bold(), result.vocals_url);
    println!("  {} {}", "Music / Instrumental:".bold(), result.music_url);
}

fn notice(err: &StudioError) {
    let text = match err {
        StudioError::SeparationRequestFailed(_) => {
            "Separation failed. Check server logs.".to_string()
        }
        other => other.to_string(),
    };
    println!("{}", text.red());
}

/// Fetch both stems of the last successful run into the download dir.
fn download_stems(controller: &UploadController<ApiClient>) {
    let result = controller.result();
    if result.is_empty() {
        notice(&StudioError::NoResults);
        return;
    }
    let dir = controller.config().download_dir.clone();
    for url in [&result.vocals_url, &result.music_url] {
        let dest = dir.join(stem_file_name(&result.track_name, url));
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{bytes}/{total_bytes} {wide_msg}") {
            bar.set_style(style);
        }
        bar.set_message(dest.display().to_string());
        let outcome = controller.service().download(url, &dest, |done, total| {
            bar.set_length(total);
            bar.set_position(done);
        });
        bar.finish_and_clear();
        match outcome {
            Ok(path) => println!("Saved {}", path.display().to_string().green()),
            Err(e) => notice(&e),
        }
    }
}

/// Split pasted text into paths. Handles single or double quotes and
/// backslash-escaped spaces the way terminals emit dropped files.
pub fn parse_drop(text: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = text.trim().chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    paths.push(PathBuf::from(std::mem::take(&mut current)));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        paths.push(PathBuf::from(current));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_drop_has_no_paths() {
        assert!(parse_drop("").is_empty());
        assert!(parse_drop("   ").is_empty());
    }

    #[test]
    fn quoted_and_escaped_paths() {
        assert_eq!(
            parse_drop("'/music/My Song.mp3'"),
            vec![PathBuf::from("/music/My Song.mp3")]
        );
        assert_eq!(
            parse_drop(r"/music/My\ Song.mp3 /music/b.wav"),
            vec![
                PathBuf::from("/music/My Song.mp3"),
                PathBuf::from("/music/b.wav")
            ]
        );
        assert_eq!(
            parse_drop("\"C:\\Music\\a.flac\""),
            vec![PathBuf::from("C:\\Music\\a.flac")]
        );
    }
}
