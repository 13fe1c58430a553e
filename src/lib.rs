// Library root
// -----------
// This crate exposes a small library surface for the terminal client. The
// binary (`main.rs`) wires these modules into the interactive menu.
//
// Module responsibilities:
// - `api`: HTTP interactions with the separation service (upload with
//   progress, stem download) behind the `SeparationService` trait.
// - `controller`: the upload state machine (selected file, busy flag,
//   progress, result URLs) and its snapshot listeners.
// - `config`: environment-driven settings read once at startup.
// - `error`: the crate's error enum.
// - `logging`: file logger setup.
// - `ui`: terminal menu flows that delegate to the controller.
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod ui;
