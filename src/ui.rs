// UI layer: prompts, status lines and the end-to-end run. Everything here is
// synchronous: log on, save the token for next time, upload each document in
// turn, wait for its cost, then close the client.

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{Authentication, Credentials, Logon, PrintClient, Session};
use crate::cli::Cli;
use crate::config::Preferences;
use crate::error::PrintError;
use crate::options::PrintOptions;
use crate::poll::{wait_for_completion, PollPolicy};

/// Where to add money when the balance runs out.
pub const TOP_UP_URL: &str = "https://utdirect.utexas.edu/bevobucks/addBucks.WBX";

/// Format dollars as `$1.23`.
pub fn money(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// A `message ... result` status line with a spinner while it's pending.
struct Status {
    bar: ProgressBar,
    message: String,
}

impl Status {
    fn start(message: impl Into<String>) -> Self {
        let message = message.into();
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{msg} {spinner}") {
            bar.set_style(style.tick_chars("|/-\\ "));
        }
        bar.set_message(format!("{} ...", message));
        bar.enable_steady_tick(Duration::from_millis(120));
        Status { bar, message }
    }

    fn finish(self, result: &str) {
        self.bar
            .finish_with_message(format!("{} ... {}", self.message, result));
    }
}

/// What happened to one document.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    /// Final cost, or `None` when we didn't wait for processing.
    pub result: Result<Option<f64>, PrintError>,
}

/// Summary of a run, used for the finance report and the exit status.
#[derive(Debug)]
pub struct RunReport {
    pub balance: f64,
    pub token: Option<String>,
    pub documents: Vec<DocumentOutcome>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.documents.iter().filter(|d| d.result.is_err()).count()
    }

    /// Total cost of the documents that finished processing.
    pub fn total_cost(&self) -> f64 {
        self.documents
            .iter()
            .filter_map(|d| d.result.as_ref().ok().copied().flatten())
            .sum()
    }

    fn all_costs_known(&self) -> bool {
        self.documents
            .iter()
            .all(|d| !matches!(d.result, Ok(None)))
    }
}

/// Run the whole CLI flow for parsed arguments.
pub fn run(cli: &Cli) -> Result<RunReport> {
    let prefs_path = cli.preferences_path();
    let prefs = Preferences::load_from(&prefs_path);
    let options = cli.print_options(&prefs);

    println!("Print settings:");
    println!("{}", options);

    let client = PrintClient::new(cli.client_config()).context("Failed to build HTTP client")?;
    let outcome = print_documents(&client, cli, &options, &prefs, &prefs_path);
    client.close();
    let report = outcome?;

    print_finances(&report);
    Ok(report)
}

/// Preferences to write once logged on: the session's token, plus the chosen
/// color and sides when the user asked to keep them.
pub fn updated_preferences(
    prefs: &Preferences,
    token: Option<&str>,
    options: &PrintOptions,
    save_defaults: bool,
) -> Preferences {
    let mut updated = Preferences {
        token: token.map(str::to_string),
        ..prefs.clone()
    };
    if save_defaults {
        updated.color = options.color;
        updated.sides = options.sides;
    }
    updated
}

/// Everything that needs the session. Returns an error only when logon
/// fails; per-document failures are collected in the report.
fn print_documents(
    client: &PrintClient,
    cli: &Cli,
    options: &PrintOptions,
    prefs: &Preferences,
    prefs_path: &Path,
) -> Result<RunReport> {
    let Logon { session, balance } = log_in(client, prefs.token.as_deref(), cli.user.as_deref())?;

    // Saved before any upload so an interrupted run keeps the fresh token.
    let updated = updated_preferences(prefs, session.token(), options, cli.save_defaults);
    if let Err(e) = updated.save_to(prefs_path) {
        warn!(error = %e, "Could not save preferences");
        eprintln!("Warning: {}", e);
    }

    let policy = PollPolicy::from(client.config());
    let documents = cli
        .documents
        .iter()
        .map(|path| {
            let result = print_document(client, &session, options, path, &policy, cli.no_wait);
            if let Err(e) = &result {
                eprintln!("  ! {}: {}", display_name(path), e);
            }
            DocumentOutcome {
                path: path.clone(),
                result,
            }
        })
        .collect();

    Ok(RunReport {
        balance,
        token: session.token().map(str::to_string),
        documents,
    })
}

/// Whether a failed saved-token logon should be retried with credentials.
/// Server refusals are; network failures are not.
pub fn falls_back_to_credentials(err: &PrintError) -> bool {
    matches!(err, PrintError::Auth(_))
}

/// Try the saved token first, then prompt for credentials.
fn log_in(client: &PrintClient, saved_token: Option<&str>, user: Option<&str>) -> Result<Logon> {
    if let Some(token) = saved_token {
        let status = Status::start("Logging in with saved token");
        match client.authenticate(Authentication::SavedToken(token)) {
            Ok(logon) => {
                status.finish("done");
                return Ok(logon);
            }
            Err(e) if falls_back_to_credentials(&e) => {
                status.finish("expired");
                debug!(error = %e, "Saved token not accepted");
            }
            Err(e) => {
                status.finish("failed");
                return Err(e).context("Could not reach the print service");
            }
        }
    }

    let credentials = prompt_credentials(user)?;
    let status = Status::start("Logging in");
    match client.authenticate(Authentication::Credentials(&credentials)) {
        Ok(logon) => {
            status.finish("done");
            Ok(logon)
        }
        Err(e) => {
            status.finish("failed");
            Err(e).context("Could not log in to the print service")
        }
    }
}

/// Ask for the EID (unless given) and password.
fn prompt_credentials(user: Option<&str>) -> Result<Credentials> {
    println!();
    let identifier = match user {
        Some(user) => user.to_string(),
        None => Input::<String>::new().with_prompt("EID").interact_text()?,
    };
    let secret = Password::new().with_prompt("Password").interact()?;
    println!();
    Ok(Credentials::new(identifier, secret))
}

fn print_document(
    client: &PrintClient,
    session: &Session,
    options: &PrintOptions,
    path: &Path,
    policy: &PollPolicy,
    no_wait: bool,
) -> Result<Option<f64>, PrintError> {
    let status = Status::start(format!("Uploading {}", display_name(path)));
    let job = match client.upload(session, options, path) {
        Ok(job) => {
            status.finish("done");
            job
        }
        Err(e) => {
            status.finish("failed");
            return Err(e);
        }
    };
    if no_wait {
        return Ok(None);
    }

    let status = Status::start("Processing");
    match wait_for_completion(client, session, &job.id, policy) {
        Ok(done) => {
            status.finish("done");
            Ok(Some(done.cost))
        }
        Err(e) => {
            status.finish("failed");
            Err(e)
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_finances(report: &RunReport) {
    println!("Finances:");
    println!("    Available balance: {}", money(report.balance));
    if !report.all_costs_known() {
        println!("    Cost to print:     not known yet (--no-wait)");
        return;
    }
    let cost = report.total_cost();
    println!("    Cost to print:     {}", money(cost));
    println!();
    if cost <= report.balance {
        println!("    Remaining balance: {}", money(report.balance - cost));
    } else {
        println!("  * Insufficient funds -- add Bevo Bucks at\n    {}", TOP_UP_URL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, AuthError};
    use crate::options::{ColorMode, Sides};

    #[test]
    fn money_rounds_to_cents() {
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1.25), "$1.25");
        assert_eq!(money(12.5), "$12.50");
        assert_eq!(money(3.456), "$3.46");
    }

    fn outcome(result: Result<Option<f64>, PrintError>) -> DocumentOutcome {
        DocumentOutcome {
            path: PathBuf::from("doc.pdf"),
            result,
        }
    }

    #[test]
    fn report_totals_skip_failures() {
        let report = RunReport {
            balance: 5.0,
            token: Some("abc".into()),
            documents: vec![
                outcome(Ok(Some(1.25))),
                outcome(Err(PrintError::JobFailed("x".into()))),
                outcome(Ok(Some(0.5))),
            ],
        };
        assert_eq!(report.failures(), 1);
        assert_eq!(report.total_cost(), 1.75);
        assert!(report.all_costs_known());
    }

    #[test]
    fn unknown_cost_when_not_waiting() {
        let report = RunReport {
            balance: 5.0,
            token: None,
            documents: vec![outcome(Ok(None))],
        };
        assert!(!report.all_costs_known());
        assert_eq!(report.failures(), 0);
    }

    #[test]
    fn fresh_token_replaces_saved_one() {
        let prefs = Preferences {
            color: ColorMode::Mono,
            sides: Sides::Duplex,
            token: Some("old".into()),
        };
        let options = PrintOptions::default();

        let updated = updated_preferences(&prefs, Some("new"), &options, false);
        assert_eq!(updated.token.as_deref(), Some("new"));
        assert_eq!(updated.color, ColorMode::Mono);
        assert_eq!(updated.sides, Sides::Duplex);

        let updated = updated_preferences(&prefs, Some("new"), &options, true);
        assert_eq!(updated.color, ColorMode::Full);
        assert_eq!(updated.sides, Sides::Simplex);
    }

    #[test]
    fn only_server_refusals_fall_back() {
        let refused = PrintError::from(AuthError::TokenRejected(ApiError::unknown(
            reqwest::StatusCode::UNAUTHORIZED,
        )));
        assert!(falls_back_to_credentials(&refused));
        assert!(falls_back_to_credentials(&PrintError::from(AuthError::BadResponse("no cookie".into()))));
        assert!(!falls_back_to_credentials(&PrintError::JobFailed("x".into())));
    }

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/home/bevo/thesis.pdf")), "thesis.pdf");
    }
}
