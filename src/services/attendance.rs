// src/services/attendance.rs

//! Attendance page postback client.
//!
//! The attendance page shows one course at a time, chosen through a
//! server-side dropdown. Every course therefore costs one form postback, and
//! each postback has to echo the hidden tokens of the response before it.
//! Courses are processed strictly in dropdown order.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::form::FormState;
use crate::error::{AppError, Result};
use crate::http::{PortalRequest, PortalSession, fetch_target_page, send};
use crate::models::{
    AbsenceSummary, AttendanceReport, AttendanceSession, CourseAttendance, NO_WARNING_LEVEL,
};
use crate::utils::{element_text, normalize_whitespace};

/// Form field name of the course dropdown when the page omits it.
const DEFAULT_DROPDOWN_NAME: &str =
    "ctl00$ctl00$ContentPlaceHolderright$ContentPlaceHoldercontent$DDL_Courses";
const ALERT_TEXT_FIELD: &str =
    "ctl00$ctl00$ContentPlaceHolderright$ContentPlaceHoldercontent$H_AlertText";
const DIV_POSITION_FIELD: &str = "ctl00$ctl00$div_position";

/// Summary column positions used when the header row is not recognized.
const DEFAULT_CODE_COLUMN: usize = 1;
const DEFAULT_NAME_COLUMN: usize = 2;
const DEFAULT_LEVEL_COLUMN: usize = 3;

static COURSE_DROPDOWN: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("select#ContentPlaceHolderright_ContentPlaceHoldercontent_DDL_Courses")
        .expect("course dropdown selector")
});
static OPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("option").expect("option selector"));
static SUMMARY_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table#DG_AbsenceReport").expect("summary table selector"));
static COURSE_TABLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table#DG_StudentCourseAttendance").expect("course table selector")
});
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector"));
static HEADER_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("header cell selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("cell selector"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digits regex"));

/// One selectable course in the dropdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOption {
    pub value: String,
    pub label: String,
}

/// The course dropdown: its form field name and options in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDropdown {
    pub name: String,
    pub options: Vec<CourseOption>,
}

/// Everything read from the attendance page before any postback.
#[derive(Debug, Clone)]
pub struct AttendancePage {
    pub url: String,
    pub summary: AbsenceSummary,
    pub dropdown: CourseDropdown,
    pub form_state: FormState,
}

impl AttendancePage {
    /// Parse the base page. A missing dropdown or missing hidden fields
    /// make postbacks impossible and are reported as errors.
    pub fn parse(url: impl Into<String>, html: &str) -> Result<Self> {
        let document = Html::parse_document(html);
        let summary = parse_absence_summary(&document);
        let dropdown = parse_dropdown(&document)
            .ok_or_else(|| AppError::missing("course dropdown on attendance page"))?;
        let form_state = FormState::from_document(&document)
            .ok_or_else(|| AppError::missing("hidden form fields on attendance page"))?;

        Ok(Self {
            url: url.into(),
            summary,
            dropdown,
            form_state,
        })
    }
}

/// Read the course dropdown. Options without a value or label are skipped.
pub fn parse_dropdown(document: &Html) -> Option<CourseDropdown> {
    let select = document.select(&COURSE_DROPDOWN).next()?;
    let name = select
        .value()
        .attr("name")
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DROPDOWN_NAME)
        .to_string();

    let options = select
        .select(&OPTION)
        .filter_map(|option| {
            let value = option.value().attr("value").unwrap_or_default().trim();
            let label = option.text().collect::<String>().trim().to_string();
            if value.is_empty() || label.is_empty() {
                log::debug!("Skipping dropdown option value='{value}' label='{label}'");
                return None;
            }
            Some(CourseOption {
                value: value.to_string(),
                label,
            })
        })
        .collect();

    Some(CourseDropdown { name, options })
}

/// Parse the absence report table into `normalized course name -> level`.
pub fn parse_absence_summary(document: &Html) -> AbsenceSummary {
    let mut summary = AbsenceSummary::new();
    let Some(table) = document.select(&SUMMARY_TABLE).next() else {
        log::info!("Absence summary table not found");
        return summary;
    };

    let rows: Vec<_> = table.select(&ROW).collect();
    let Some((header, body)) = rows.split_first() else {
        log::info!("Absence summary table is empty");
        return summary;
    };

    let headers: Vec<String> = header
        .select(&HEADER_CELL)
        .map(|cell| element_text(&cell).replace(' ', "").to_lowercase())
        .collect();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let (code_col, name_col, level_col) =
        match (position("code"), position("name"), position("absencelevel")) {
            (Some(code), Some(name), Some(level)) => (code, name, level),
            _ => {
                log::warn!("Unrecognized absence summary headers {headers:?}; using default columns");
                (DEFAULT_CODE_COLUMN, DEFAULT_NAME_COLUMN, DEFAULT_LEVEL_COLUMN)
            }
        };
    let needed = code_col.max(name_col).max(level_col);

    for row in body {
        let cells: Vec<_> = row.select(&CELL).collect();
        if cells.len() <= needed {
            log::warn!("Skipping absence summary row with {} cells", cells.len());
            continue;
        }

        let level = absence_level(&element_text(&cells[level_col]));
        let name = element_text(&cells[name_col]);
        let code = element_text(&cells[code_col]);

        if !name.is_empty() {
            summary.insert(name, level);
        } else if !code.is_empty() {
            summary.insert(code, level);
        }
    }

    log::debug!("Parsed absence summary: {summary:?}");
    summary
}

/// `Level N` when the cell carries a number, otherwise no warning.
fn absence_level(text: &str) -> String {
    DIGITS
        .find(text)
        .map_or_else(|| NO_WARNING_LEVEL.to_string(), |m| format!("Level {}", m.as_str()))
}

/// Parse the per-session rows of the currently selected course.
///
/// Rows with fewer than three cells are skipped.
pub fn parse_course_sessions(document: &Html) -> Vec<AttendanceSession> {
    let Some(table) = document.select(&COURSE_TABLE).next() else {
        log::info!("Course attendance table not found");
        return Vec::new();
    };

    table
        .select(&ROW)
        .skip(1)
        .enumerate()
        .filter_map(|(index, row)| {
            let cells: Vec<ElementRef> = row.select(&CELL).collect();
            if cells.len() < 3 {
                log::warn!(
                    "Skipping attendance row {} with {} cells",
                    index + 1,
                    cells.len()
                );
                return None;
            }
            let non_empty = |text: String| (!text.is_empty()).then_some(text);
            Some(AttendanceSession {
                status: non_empty(element_text(&cells[1])),
                session_label: non_empty(element_text(&cells[2])),
            })
        })
        .collect()
}

/// Look up a dropdown label in the absence summary.
///
/// Tries the whole label, then the part before its first dash, then the
/// part after its first ` - `.
pub fn lookup_absence_level(summary: &AbsenceSummary, label: &str) -> String {
    let normalized = normalize_whitespace(label);
    let mut candidates = vec![normalized.clone()];
    if let Some((prefix, _)) = normalized.split_once('-') {
        candidates.push(prefix.trim().to_string());
    }
    if let Some((_, suffix)) = normalized.split_once(" - ") {
        candidates.push(suffix.trim().to_string());
    }

    candidates
        .iter()
        .filter(|candidate| !candidate.is_empty())
        .find_map(|candidate| summary.get(candidate))
        .cloned()
        .unwrap_or_else(|| NO_WARNING_LEVEL.to_string())
}

/// Form payload selecting `value` in the dropdown.
pub fn postback_form(state: &FormState, dropdown_name: &str, value: &str) -> Vec<(String, String)> {
    let mut form = vec![
        ("__EVENTTARGET".to_string(), dropdown_name.to_string()),
        ("__EVENTARGUMENT".to_string(), String::new()),
        ("__LASTFOCUS".to_string(), String::new()),
    ];
    form.extend(
        state
            .fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );
    form.push((ALERT_TEXT_FIELD.to_string(), String::new()));
    form.push((DIV_POSITION_FIELD.to_string(), "0".to_string()));
    form.push((dropdown_name.to_string(), value.to_string()));
    form
}

/// Parse a postback response into sessions and the tokens for the next one.
fn parse_postback(html: &str) -> (Vec<AttendanceSession>, Option<FormState>) {
    let document = Html::parse_document(html);
    (
        parse_course_sessions(&document),
        FormState::from_document(&document),
    )
}

/// Drives the per-course postbacks over one session.
pub struct PostbackClient<'a> {
    session: &'a dyn PortalSession,
    timeout: Duration,
    delay: Duration,
}

impl<'a> PostbackClient<'a> {
    pub fn new(session: &'a dyn PortalSession, timeout: Duration, delay: Duration) -> Self {
        Self {
            session,
            timeout,
            delay,
        }
    }

    /// Fetch the attendance page (following the token indirection) and read it.
    pub async fn load_page(&self, attendance_url: &str) -> Result<AttendancePage> {
        let (url, response) =
            fetch_target_page(self.session, attendance_url, self.timeout, "attendance page")
                .await?;
        AttendancePage::parse(url, &response.body)
    }

    /// Submit one course selection.
    ///
    /// Returns the outcome together with the state for the next submission:
    /// the tokens of this response, or `state` unchanged when the response
    /// carried none.
    pub async fn submit_course(
        &self,
        url: &str,
        state: FormState,
        dropdown_name: &str,
        option: &CourseOption,
    ) -> (Result<Vec<AttendanceSession>>, FormState) {
        let form = postback_form(&state, dropdown_name, &option.value);
        let context = format!("attendance postback for '{}'", option.label);
        let request = PortalRequest::post(url, form, self.timeout);

        match send(self.session, request, &context).await {
            Ok(response) => {
                let (sessions, fresh) = parse_postback(&response.body);
                if fresh.is_none() {
                    log::warn!("{context}: response has no hidden fields; reusing previous tokens");
                }
                (Ok(sessions), fresh.unwrap_or(state))
            }
            Err(e) => (Err(e), state),
        }
    }

    /// Post every course in dropdown order and associate absence levels.
    ///
    /// A failed course yields an empty session list; an authentication
    /// failure aborts the whole run.
    pub async fn collect(&self, page: AttendancePage) -> Result<AttendanceReport> {
        let AttendancePage {
            url,
            summary,
            dropdown,
            form_state,
        } = page;

        let mut report = AttendanceReport::new();
        let mut state = form_state;

        for option in &dropdown.options {
            log::debug!("Processing course '{}'", option.label);
            let absence_level = lookup_absence_level(&summary, &option.label);

            let (outcome, next_state) = self
                .submit_course(&url, state, &dropdown.name, option)
                .await;
            state = next_state;

            let entry = match outcome {
                Ok(sessions) => CourseAttendance {
                    absence_level,
                    sessions,
                },
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    log::error!("Attendance for '{}' failed: {}", option.label, e);
                    CourseAttendance::without_sessions(absence_level)
                }
            };
            report.insert(option.label.clone(), entry);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(report)
    }
}

/// Fetch the full attendance report for the session's user.
pub async fn fetch_attendance(
    session: &dyn PortalSession,
    attendance_url: &str,
    timeout: Duration,
    delay: Duration,
) -> Result<AttendanceReport> {
    let client = PostbackClient::new(session, timeout, delay);
    let page = client.load_page(attendance_url).await?;
    log::info!(
        "Attendance page has {} courses, {} summary rows",
        page.dropdown.options.len(),
        page.summary.len()
    );
    client.collect(page).await
}
