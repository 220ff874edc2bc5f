//! Test doubles shared by unit tests across the crate.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheError, CacheResult, CacheStore};
use crate::error::{AppError, Result};
use crate::http::{PortalRequest, PortalResponse, PortalSession, SessionProvider};
use crate::models::{Config, Credentials};

enum Step {
    Respond { status: u16, body: String },
    Delayed { delay: Duration, body: String },
    Fail(String),
}

/// Session that replays queued responses in the order requests are issued
/// and records every request it sees.
#[derive(Default)]
pub struct ScriptedSession {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<PortalRequest>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn push_body(&self, body: &str) {
        self.push_status(200, body);
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push(Step::Respond {
            status,
            body: body.to_string(),
        });
    }

    pub fn push_delayed(&self, delay: Duration, body: &str) {
        self.push(Step::Delayed {
            delay,
            body: body.to_string(),
        });
    }

    pub fn push_failure(&self, message: &str) {
        self.push(Step::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<PortalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortalSession for ScriptedSession {
    async fn perform(&self, request: PortalRequest) -> Result<PortalResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();

        let response = |status, body| PortalResponse {
            status,
            body,
            final_url: url.clone(),
            history: Vec::new(),
        };

        match step {
            Some(Step::Respond { status, body }) => Ok(response(status, body)),
            Some(Step::Delayed { delay, body }) => {
                tokio::time::sleep(delay).await;
                Ok(response(200, body))
            }
            Some(Step::Fail(message)) => Err(AppError::fetch(url.clone(), message)),
            None => Err(AppError::fetch(url.clone(), "no scripted response left")),
        }
    }
}

/// Provider handing out one shared scripted session.
pub struct ScriptedProvider {
    pub session: Arc<ScriptedSession>,
    created: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(session: Arc<ScriptedSession>) -> Self {
        Self {
            session,
            created: AtomicUsize::new(0),
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl SessionProvider for ScriptedProvider {
    fn create_session(&self, _credentials: &Credentials) -> Result<Arc<dyn PortalSession>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let session: Arc<dyn PortalSession> = self.session.clone();
        Ok(session)
    }
}

/// Store whose every operation fails.
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<u64> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

thread_local! {
    static CAPTURED: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Logger that records into a per-thread buffer, so parallel tests do not
/// see each other's records.
struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        CAPTURED.with(|buf| {
            buf.borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static CAPTURE_LOGGER: CaptureLogger = CaptureLogger;

/// Run `f` and return its result with the records it logged on this thread.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<(log::Level, String)>) {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if log::set_logger(&CAPTURE_LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });

    CAPTURED.with(|buf| buf.borrow_mut().clear());
    let out = f();
    let records = CAPTURED.with(|buf| buf.borrow_mut().drain(..).collect());
    (out, records)
}

/// Defaults with short branch timeouts and no postback delay.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.http.content_timeout_secs = 1;
    config.http.announcement_timeout_secs = 1;
    config.http.postback_delay_ms = 0;
    config
}

fn hidden_fields(viewstate: &str) -> String {
    format!(
        r#"<input type="hidden" name="__VIEWSTATE" value="{viewstate}" />
        <input type="hidden" name="__VIEWSTATEGENERATOR" value="5A7B3C2D" />
        <input type="hidden" name="__EVENTVALIDATION" value="ev-{viewstate}" />"#
    )
}

/// Attendance base page with a course dropdown and an absence summary of
/// `(name, level)` rows.
pub fn attendance_page(viewstate: &str, options: &[(&str, &str)], summary: &[(&str, &str)]) -> String {
    let options: String = options
        .iter()
        .map(|(value, label)| format!(r#"<option value="{value}">{label}</option>"#))
        .collect();
    let summary: String = summary
        .iter()
        .enumerate()
        .map(|(i, (name, level))| {
            format!("<tr><td>{i}</td><td>CODE{i}</td><td>{name}</td><td>{level}</td></tr>")
        })
        .collect();

    format!(
        r#"<html><body><form method="post">
        {hidden}
        <select name="ctl00$ctl00$ContentPlaceHolderright$ContentPlaceHoldercontent$DDL_Courses"
                id="ContentPlaceHolderright_ContentPlaceHoldercontent_DDL_Courses">{options}</select>
        <table id="DG_AbsenceReport">
            <tr><td>#</td><td>Code</td><td>Name</td><td>AbsenceLevel</td></tr>{summary}
        </table>
        </form></body></html>"#,
        hidden = hidden_fields(viewstate),
    )
}

/// Postback response for one course with `(number, status, session)` rows.
pub fn course_page(viewstate: &str, rows: &[(&str, &str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(n, status, session)| {
            format!("<tr><td>{n}</td><td>{status}</td><td>{session}</td></tr>")
        })
        .collect();

    format!(
        r#"<html><body><form method="post">
        {hidden}
        <table id="DG_StudentCourseAttendance">
            <tr><th>#</th><th>Status</th><th>Session</th></tr>{rows}
        </table>
        </form></body></html>"#,
        hidden = hidden_fields(viewstate),
    )
}
