// Library root
// -----------
// A small client for UT's Library Print System (the Pharos print API). The
// binary (`main.rs`) parses arguments and hands them to `ui::run`.
//
// Module responsibilities:
// - `api`: HTTP calls (logon, upload, job listing), the `Session` they share
//   and the wire encodings the server insists on.
// - `poll`: waiting for an uploaded job to finish and report its cost.
// - `options`: print settings and the `MetaData` JSON they become.
// - `config`: client settings and the preferences file.
// - `error`: typed failures, so callers can tell logon problems from
//   per-document ones.
// - `cli` / `ui`: argument parsing and the interactive terminal flow.
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod options;
pub mod poll;
pub mod ui;

pub use api::{Authentication, Credentials, Job, JobState, Logon, PrintClient, Session};
pub use config::{ClientConfig, Preferences};
pub use error::{ApiError, AuthError, PrintError, UploadError};
pub use options::PrintOptions;
