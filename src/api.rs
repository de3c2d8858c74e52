// API client module: a small blocking HTTP client for the Pharos print
// service. Each call sends one request, then hands the status and body to a
// pure `interpret_*` function so response handling can be tested offline.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{multipart, Client, Response};
use reqwest::header::COOKIE;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;
use crate::error::{ApiError, AuthError, PrintError, UploadError};
use crate::options::PrintOptions;
use crate::poll::JobSource;

/// Cookie holding the long-lived session token.
pub const TOKEN_COOKIE: &str = "PharosAPI.X-PHAROS-USER-TOKEN";
/// Cookie holding the path of the user's own endpoint.
pub const USER_URI_COOKIE: &str = "PharosAPI.X-PHAROS-USER-URI";
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const AUTH_HEADER: &str = "X-Authorization";
const AUTH_SCHEME: &str = "PHAROS-USER";
const LOGON_PATH: &str = "/logon";
const PRINTJOBS_PATH: &str = "/printjobs";

/// Characters `encodeURIComponent` leaves alone: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a string the way JavaScript's `encodeURIComponent` does.
/// The logon page encodes credentials this way before base64-encoding them
/// into the header, so we have to match it byte for byte.
pub fn encode_uri_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

/// Standard base64 of the UTF-8 bytes, no line wrapping.
pub fn encode_utf8_to_b64(s: &str) -> String {
    STANDARD.encode(s.as_bytes())
}

/// MIME type for the upload's file part.
pub fn guess_mime_type(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// EID and password. Only used to build the logon header; never stored.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Credentials {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// Value of the `X-Authorization` header.
    pub fn authorization(&self) -> String {
        let pair = format!(
            "{}:{}",
            encode_uri_component(&self.identifier),
            encode_uri_component(&self.secret)
        );
        format!("{} {}", AUTH_SCHEME, encode_utf8_to_b64(&pair))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// How to log on.
#[derive(Debug, Clone, Copy)]
pub enum Authentication<'a> {
    /// Resume with a token saved by an earlier run.
    SavedToken(&'a str),
    Credentials(&'a Credentials),
}

/// An authenticated session: everything the server handed back at logon
/// that later calls need. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user_uri: String,
    token: Option<String>,
    cookies: Vec<(String, String)>,
}

impl Session {
    /// Build a session from the cookies we sent plus those the server set.
    /// Server cookies replace sent ones with the same name; an empty value
    /// clears the cookie.
    pub fn from_cookies(
        base_url: &str,
        sent: Vec<(String, String)>,
        received: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, AuthError> {
        let mut cookies = sent;
        for (name, value) in received {
            if value.is_empty() {
                cookies.retain(|(n, _)| *n != name);
                continue;
            }
            match cookies.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => cookies.push((name, value)),
            }
        }

        let lookup = |wanted: &str| {
            cookies
                .iter()
                .find(|(n, v)| n == wanted && !v.is_empty())
                .map(|(_, v)| v.clone())
        };
        let user_path = lookup(USER_URI_COOKIE).ok_or_else(|| {
            AuthError::BadResponse(format!("logon did not set the {} cookie", USER_URI_COOKIE))
        })?;
        let token = lookup(TOKEN_COOKIE);

        Ok(Session {
            user_uri: format!("{}{}", base_url.trim_end_matches('/'), user_path),
            token,
            cookies,
        })
    }

    /// Absolute URL of the user's endpoint.
    pub fn user_uri(&self) -> &str {
        &self.user_uri
    }

    /// Token to save for the next run, if the server issued one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn printjobs_url(&self) -> String {
        format!("{}{}", self.user_uri, PRINTJOBS_PATH)
    }

    fn cookie_header(&self) -> String {
        cookie_header(&self.cookies)
    }
}

fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(n, v)| format!("{}={}", n, v))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A successful logon.
#[derive(Debug, Clone, PartialEq)]
pub struct Logon {
    pub session: Session,
    /// Printing balance in dollars.
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    /// Anything else the server reports, kept verbatim.
    Other(String),
}

impl From<&str> for JobState {
    fn from(s: &str) -> Self {
        match s {
            "Queued" | "Pending" => JobState::Queued,
            "Processing" => JobState::Processing,
            "Completed" => JobState::Completed,
            "Failed" => JobState::Failed,
            other => JobState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => f.write_str("Queued"),
            JobState::Processing => f.write_str("Processing"),
            JobState::Completed => f.write_str("Completed"),
            JobState::Failed => f.write_str("Failed"),
            JobState::Other(s) => f.write_str(s),
        }
    }
}

/// A print job as the server describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// The job's `Location`, unique per job.
    pub id: String,
    pub state: JobState,
    pub cost: f64,
}

// ----------------------------------------------------------------------------
// Response bodies
// ----------------------------------------------------------------------------

#[derive(Deserialize)]
struct LogonBody {
    #[serde(rename = "Balance")]
    balance: BalanceBody,
}

#[derive(Deserialize)]
struct BalanceBody {
    #[serde(rename = "Amount", deserialize_with = "amount")]
    amount: f64,
}

#[derive(Deserialize)]
struct JobBody {
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Activity")]
    activity: ActivityBody,
    #[serde(rename = "Cost", default, deserialize_with = "amount")]
    cost: f64,
}

#[derive(Deserialize)]
struct ActivityBody {
    #[serde(rename = "State")]
    state: String,
}

#[derive(Deserialize)]
struct JobListBody {
    #[serde(rename = "Items", default)]
    items: Vec<JobBody>,
}

impl From<JobBody> for Job {
    fn from(body: JobBody) -> Self {
        Job {
            id: body.location,
            state: JobState::from(body.activity.state.as_str()),
            cost: body.cost,
        }
    }
}

/// Money comes back either as a number or as a numeric string; null counts
/// as zero.
fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    match Option::<Amount>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Amount::Number(n)) => Ok(n),
        Some(Amount::Text(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid amount '{}'", s))),
    }
}

// ----------------------------------------------------------------------------
// Response interpretation
// ----------------------------------------------------------------------------

/// Which logon flavour produced a response; decides the error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogonMethod {
    SavedToken,
    Credentials,
}

/// Logon succeeds on 200 OK with a balance in the body.
pub fn interpret_logon(method: LogonMethod, status: StatusCode, body: &str) -> Result<f64, AuthError> {
    if status != StatusCode::OK {
        let err = ApiError::from_response(status, body);
        return Err(match method {
            LogonMethod::SavedToken => AuthError::TokenRejected(err),
            LogonMethod::Credentials => AuthError::CredentialsRejected(err),
        });
    }
    let parsed: LogonBody =
        serde_json::from_str(body).map_err(|e| AuthError::BadResponse(e.to_string()))?;
    Ok(parsed.balance.amount)
}

/// Upload succeeds on 201 Created; anything else is the server's error.
pub fn interpret_upload(status: StatusCode, body: &str) -> Result<Job, UploadError> {
    if status != StatusCode::CREATED {
        return Err(UploadError::Rejected(ApiError::from_response(status, body)));
    }
    let parsed: JobBody =
        serde_json::from_str(body).map_err(|e| UploadError::BadResponse(e.to_string()))?;
    Ok(Job {
        cost: 0.0,
        ..Job::from(parsed)
    })
}

pub fn interpret_job_listing(status: StatusCode, body: &str) -> Result<Vec<Job>, PrintError> {
    if status != StatusCode::OK {
        return Err(PrintError::JobListing(ApiError::from_response(status, body)));
    }
    let parsed: JobListBody =
        serde_json::from_str(body).map_err(|e| PrintError::BadResponse(e.to_string()))?;
    Ok(parsed.items.into_iter().map(Job::from).collect())
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Blocking client for one run of the CLI. Dropping it (or calling
/// [`PrintClient::close`]) releases pooled connections.
pub struct PrintClient {
    client: Client,
    config: ClientConfig,
}

impl PrintClient {
    pub fn new(config: ClientConfig) -> Result<Self, PrintError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(PrintClient { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn logon_url(&self) -> String {
        format!("{}{}", self.config.base_url, LOGON_PATH)
    }

    /// Log on with a saved token or with credentials.
    pub fn authenticate(&self, auth: Authentication<'_>) -> Result<Logon, PrintError> {
        match auth {
            Authentication::SavedToken(token) => self.resume(token),
            Authentication::Credentials(credentials) => self.logon(credentials),
        }
    }

    #[instrument(skip_all)]
    fn resume(&self, token: &str) -> Result<Logon, PrintError> {
        debug!("Resuming session with saved token");
        let sent = vec![(TOKEN_COOKIE.to_string(), token.to_string())];
        let res = self
            .client
            .get(self.logon_url())
            .header(COOKIE, cookie_header(&sent))
            .send()?;
        self.finish_logon(LogonMethod::SavedToken, sent, res)
    }

    #[instrument(skip_all, fields(identifier = %credentials.identifier))]
    fn logon(&self, credentials: &Credentials) -> Result<Logon, PrintError> {
        debug!("Logging on with credentials");
        let res = self
            .client
            .get(self.logon_url())
            .query(&[("KeepMeLoggedIn", "yes")])
            .header(AUTH_HEADER, credentials.authorization())
            .send()?;
        self.finish_logon(LogonMethod::Credentials, Vec::new(), res)
    }

    fn finish_logon(
        &self,
        method: LogonMethod,
        sent: Vec<(String, String)>,
        res: Response,
    ) -> Result<Logon, PrintError> {
        let received: Vec<(String, String)> = res
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let status = res.status();
        let body = res.text()?;

        let balance = interpret_logon(method, status, &body)?;
        let session = Session::from_cookies(&self.config.base_url, sent, received)?;
        info!(user_uri = %session.user_uri(), balance, "Logged on");
        Ok(Logon { session, balance })
    }

    /// Upload one document. Returns the job the server created for it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn upload(&self, session: &Session, options: &PrintOptions, path: &Path) -> Result<Job, PrintError> {
        let file_err = |source: std::io::Error| UploadError::File {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(file_err)?;
        // A known length lets the form go out with Content-Length instead of
        // chunked transfer encoding.
        let length = file.metadata().map_err(file_err)?.len();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        let mime = guess_mime_type(path);
        let metadata = options.metadata_json().map_err(UploadError::Metadata)?;
        debug!(%file_name, mime, length, %metadata, "Uploading document");

        let content = multipart::Part::reader_with_length(file, length)
            .file_name(file_name)
            .mime_str(mime)?;
        let form = multipart::Form::new()
            .text("MetaData", metadata)
            .part("content", content);

        let res = self
            .client
            .post(session.printjobs_url())
            .header(COOKIE, session.cookie_header())
            .multipart(form)
            .send()?;
        let status = res.status();
        let body = res.text()?;
        let job = interpret_upload(status, &body)?;
        info!(job = %job.id, state = %job.state, "Document uploaded");
        Ok(job)
    }

    /// Every job queued for the user.
    #[instrument(skip_all)]
    pub fn list_jobs(&self, session: &Session) -> Result<Vec<Job>, PrintError> {
        let res = self
            .client
            .get(session.printjobs_url())
            .header(COOKIE, session.cookie_header())
            .send()?;
        let status = res.status();
        let body = res.text()?;
        interpret_job_listing(status, &body)
    }

    /// Release the connection pool.
    pub fn close(self) {
        debug!("Closing print service client");
        drop(self.client);
    }
}

impl JobSource for PrintClient {
    fn list_jobs(&self, session: &Session) -> Result<Vec<Job>, PrintError> {
        PrintClient::list_jobs(self, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_component_encoding_matches_javascript() {
        let table = [
            ("bevo@utexas.edu", "bevo%40utexas.edu"),
            ("p@ss w0rd!", "p%40ss%20w0rd!"),
            ("a+b=c&d", "a%2Bb%3Dc%26d"),
            ("~()*!.'", "~()*!.'"),
            ("-_09AZaz", "-_09AZaz"),
            ("/?#[]", "%2F%3F%23%5B%5D"),
            (":", "%3A"),
            (",;$", "%2C%3B%24"),
            ("100%", "100%25"),
            ("é", "%C3%A9"),
            ("ü€😀", "%C3%BC%E2%82%AC%F0%9F%98%80"),
            ("", ""),
        ];
        for (input, expected) in table {
            assert_eq!(encode_uri_component(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn base64_of_ascii_and_utf8() {
        assert_eq!(encode_utf8_to_b64("abc:def"), "YWJjOmRlZg==");
        assert_eq!(encode_utf8_to_b64("héllo:wörld"), "aMOpbGxvOnfDtnJsZA==");
    }

    #[test]
    fn authorization_header_encodes_both_halves() {
        let credentials = Credentials::new("bevo@utexas.edu", "p@ss w0rd!");
        assert_eq!(
            credentials.authorization(),
            "PHAROS-USER YmV2byU0MHV0ZXhhcy5lZHU6cCU0MHNzJTIwdzByZCE="
        );
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let text = format!("{:?}", Credentials::new("bevo", "hunter2"));
        assert!(text.contains("bevo"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn mime_types() {
        assert_eq!(guess_mime_type(Path::new("thesis.pdf")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("/tmp/Makefile")), DEFAULT_MIME_TYPE);
        assert_eq!(guess_mime_type(Path::new("notes.zzunknown")), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn logon_success_reads_balance() {
        let body = r#"{"Balance":{"Amount":"12.50"},"Identifier":"bevo"}"#;
        assert_eq!(interpret_logon(LogonMethod::Credentials, StatusCode::OK, body).unwrap(), 12.5);
        let body = r#"{"Balance":{"Amount":3.25}}"#;
        assert_eq!(interpret_logon(LogonMethod::SavedToken, StatusCode::OK, body).unwrap(), 3.25);
    }

    #[test]
    fn logon_failure_carries_server_error() {
        let body = r#"{"Status":401,"UserMessage":"Your session has expired.","ErrorCode":"SESSION_EXPIRED","Request":"/PharosAPI/logon"}"#;
        match interpret_logon(LogonMethod::SavedToken, StatusCode::UNAUTHORIZED, body) {
            Err(AuthError::TokenRejected(e)) => {
                assert_eq!(e.status, 401);
                assert_eq!(e.user_message, "Your session has expired.");
                assert_eq!(e.error_code, serde_json::json!("SESSION_EXPIRED"));
            }
            other => panic!("unexpected {:?}", other),
        }

        match interpret_logon(LogonMethod::Credentials, StatusCode::UNAUTHORIZED, body) {
            Err(AuthError::CredentialsRejected(e)) => assert_eq!(e.status, 401),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn logon_ok_without_balance_is_bad_response() {
        let result = interpret_logon(LogonMethod::Credentials, StatusCode::OK, "{}");
        assert!(matches!(result, Err(AuthError::BadResponse(_))));
    }

    #[test]
    fn upload_created_yields_job() {
        let body = r#"{"Location":"/users/42/printjobs/7","Activity":{"State":"Processing"}}"#;
        let job = interpret_upload(StatusCode::CREATED, body).unwrap();
        assert_eq!(job.id, "/users/42/printjobs/7");
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.cost, 0.0);
    }

    #[test]
    fn upload_created_with_garbage_is_bad_response() {
        let result = interpret_upload(StatusCode::CREATED, "<html>oops</html>");
        assert!(matches!(result, Err(UploadError::BadResponse(_))));
        let result = interpret_upload(StatusCode::CREATED, "");
        assert!(matches!(result, Err(UploadError::BadResponse(_))));
    }

    #[test]
    fn upload_rejection_keeps_server_message() {
        let body = r#"{"Status":400,"UserMessage":"Unsupported document type.","ErrorCode":12,"Request":"/printjobs"}"#;
        match interpret_upload(StatusCode::BAD_REQUEST, body) {
            Err(UploadError::Rejected(e)) => assert_eq!(e.user_message, "Unsupported document type."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn job_listing_defaults_missing_cost() {
        let body = r#"{"Items":[
            {"Location":"A","Activity":{"State":"Processing"}},
            {"Location":"B","Activity":{"State":"Completed"},"Cost":1.25},
            {"Location":"C","Activity":{"State":"Completed"},"Cost":"0.40"},
            {"Location":"D","Activity":{"State":"Held"},"Cost":null}
        ]}"#;
        let jobs = interpret_job_listing(StatusCode::OK, body).unwrap();
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].cost, 0.0);
        assert_eq!(jobs[1].cost, 1.25);
        assert_eq!(jobs[2].cost, 0.4);
        assert_eq!(jobs[3].state, JobState::Other("Held".into()));
        assert_eq!(jobs[3].cost, 0.0);
    }

    #[test]
    fn job_listing_error() {
        let result = interpret_job_listing(StatusCode::INTERNAL_SERVER_ERROR, "");
        match result {
            Err(PrintError::JobListing(e)) => {
                assert_eq!(e.status, 500);
                assert_eq!(e.user_message, crate::error::UNKNOWN_ERROR);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn pair(n: &str, v: &str) -> (String, String) {
        (n.to_string(), v.to_string())
    }

    #[test]
    fn session_from_logon_cookies() {
        let session = Session::from_cookies(
            "https://print.example.edu/PharosAPI/",
            vec![pair(TOKEN_COOKIE, "old")],
            vec![pair(USER_URI_COOKIE, "/users/42"), pair(TOKEN_COOKIE, "new"), pair("ASP.NET_SessionId", "xyz")],
        )
        .unwrap();
        assert_eq!(session.user_uri(), "https://print.example.edu/PharosAPI/users/42");
        assert_eq!(session.printjobs_url(), "https://print.example.edu/PharosAPI/users/42/printjobs");
        assert_eq!(session.token(), Some("new"));
        assert_eq!(
            session.cookie_header(),
            "PharosAPI.X-PHAROS-USER-TOKEN=new; PharosAPI.X-PHAROS-USER-URI=/users/42; ASP.NET_SessionId=xyz"
        );
    }

    #[test]
    fn resumed_session_keeps_sent_token() {
        let session = Session::from_cookies(
            "https://print.example.edu/PharosAPI",
            vec![pair(TOKEN_COOKIE, "abc123")],
            vec![pair(USER_URI_COOKIE, "/users/42")],
        )
        .unwrap();
        assert_eq!(session.token(), Some("abc123"));
    }

    #[test]
    fn cleared_cookies_are_not_replayed() {
        let session = Session::from_cookies(
            "https://print.example.edu/PharosAPI",
            vec![pair(TOKEN_COOKIE, "stale"), pair("ASP.NET_SessionId", "abc")],
            vec![pair(USER_URI_COOKIE, "/users/42"), pair(TOKEN_COOKIE, ""), pair("Tracking", "")],
        )
        .unwrap();
        assert_eq!(session.token(), None);
        assert_eq!(
            session.cookie_header(),
            "ASP.NET_SessionId=abc; PharosAPI.X-PHAROS-USER-URI=/users/42"
        );
    }

    #[test]
    fn session_requires_user_uri() {
        let result = Session::from_cookies("https://print.example.edu/PharosAPI", Vec::new(), Vec::new());
        assert!(matches!(result, Err(AuthError::BadResponse(_))));
    }

    #[test]
    fn job_state_round_trips_through_display() {
        for s in ["Queued", "Processing", "Completed", "Failed", "Held"] {
            assert_eq!(JobState::from(s).to_string(), s);
        }
        assert_eq!(JobState::from("Pending"), JobState::Queued);
    }
}
