// src/services/schedule.rs

//! Schedule grid parsing.
//!
//! The group schedule page renders the same kind of cell in several
//! unrelated layouts. Each layout is handled by a [`CellStrategy`]; the
//! strategies are tried in a fixed order and the first one whose structure
//! is present produces the record. Parsing never fails: anything that
//! cannot be read is left as the `Unknown` sentinel.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::{
    CellRecord, DaySchedule, Period, SessionType, UNKNOWN, WeeklySchedule, Weekday,
};
use crate::utils::{element_text, normalize_whitespace, text_nodes};

/// Label the portal uses for rows it could not attribute to a day.
const UNKNOWN_DAY: &str = "Unknown Day";

static SCHEDULE_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table[id$='_XtblSched']").expect("schedule table selector"));
static SCHEDULE_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("tr[id^='ContentPlaceHolderright_ContentPlaceHoldercontent_Xrw']")
        .expect("schedule row selector")
});
static ANY_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("row selector"));
static LECTURE_SPAN: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[id^='ContentPlaceHolderright_ContentPlaceHoldercontent_Xlbl']")
        .expect("lecture span selector")
});
static SMALL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("small").expect("small selector"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("table selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("td selector"));

static FREE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bFree\b").expect("free marker regex"));
static TRAILING_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]\d+(?:\.\d+)?)$").expect("trailing location regex"));
static LOCATION_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]\d+(?:\.\d+)?$").expect("exact location regex"));
static LOCATION_ANYWHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]\d+(?:\.\d+)?\b").expect("location search regex"));
static TUT_OR_LAB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)tut|lab").expect("tut/lab regex"));
static LECTURE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\bLecture$").expect("lecture suffix regex"));

/// One structural layout of a schedule cell.
///
/// `extract` returns `None` when the layout is not present so the next
/// strategy can be tried.
trait CellStrategy: Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, cell: &Html) -> Option<CellRecord>;
}

static STRATEGIES: [&dyn CellStrategy; 4] = [&TaggedSpan, &SmallTag, &NestedTable, &VisibleText];

/// Parse the inner HTML of one grid cell.
pub fn extract_cell(cell_html: &str) -> CellRecord {
    let fragment = Html::parse_fragment(cell_html);
    let text = element_text(&fragment.root_element());

    if FREE_MARKER.is_match(&text) {
        return CellRecord::free();
    }

    for strategy in STRATEGIES {
        if let Some(record) = strategy.extract(&fragment) {
            log::debug!("Cell matched {} layout: {:?}", strategy.name(), record);
            if record.course_name == UNKNOWN {
                log::warn!("Cell parsed with unknown course name: '{text}'");
            }
            return record;
        }
    }

    log::debug!("Cell has no recognizable structure");
    CellRecord::unknown()
}

/// Lecture cells: a server-control span holding `<name> [<location>] Lecture`.
struct TaggedSpan;

impl CellStrategy for TaggedSpan {
    fn name(&self) -> &'static str {
        "tagged-span"
    }

    fn extract(&self, cell: &Html) -> Option<CellRecord> {
        let span = cell.select(&LECTURE_SPAN).next()?;
        let text = element_text(&span);
        let mut record = CellRecord {
            session_type: SessionType::Lecture,
            ..CellRecord::unknown()
        };

        let mut rest = LECTURE_SUFFIX.replace(&text, "").into_owned();
        if let Some(m) = TRAILING_LOCATION.captures(&rest).and_then(|caps| caps.get(1)) {
            record.location = m.as_str().to_string();
            let start = m.start();
            rest.truncate(start);
        }
        let name = LECTURE_SUFFIX.replace(rest.trim_end(), "");
        let name = name.trim();
        if !name.is_empty() {
            record.course_name = name.to_string();
        }
        Some(record)
    }
}

/// Tutorial and lab cells: text nodes around a `<small>` type label.
struct SmallTag;

impl CellStrategy for SmallTag {
    fn name(&self) -> &'static str {
        "small-tag"
    }

    fn extract(&self, cell: &Html) -> Option<CellRecord> {
        let small = cell.select(&SMALL).next()?;
        let container = small
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "div")
            .unwrap_or_else(|| cell.root_element());

        let mut record = CellRecord::unknown();
        let nodes = text_nodes(&container);
        let Some((first, rest)) = nodes.split_first() else {
            return Some(record);
        };
        record.course_name = normalize_whitespace(first);

        let label = element_text(&small);
        record.session_type = match SessionType::from_text(&label) {
            SessionType::Unknown => SessionType::from_text(&element_text(&container)),
            known => known,
        };

        record.location = rest
            .iter()
            .find_map(|node| {
                if LOCATION_EXACT.is_match(node) {
                    return Some(node.to_string());
                }
                if label.is_empty() || !node.contains(label.as_str()) {
                    return None;
                }
                let stripped = node.replace(label.as_str(), "");
                let stripped = stripped.trim();
                LOCATION_EXACT
                    .is_match(stripped)
                    .then(|| stripped.to_string())
            })
            .unwrap_or_else(|| UNKNOWN.to_string());
        Some(record)
    }
}

/// Cells rendered as a nested table.
///
/// The common shape has two rows (name, then type with an embedded
/// location). An older shape has one row of three cells: name, location,
/// type.
struct NestedTable;

impl NestedTable {
    fn tut_or_lab(text: &str) -> SessionType {
        let lower = text.to_lowercase();
        if lower.contains("tut") {
            SessionType::Tut
        } else if lower.contains("lab") {
            SessionType::Lab
        } else {
            SessionType::Unknown
        }
    }

    fn non_empty_or_unknown(text: String) -> String {
        if text.is_empty() { UNKNOWN.to_string() } else { text }
    }
}

impl CellStrategy for NestedTable {
    fn name(&self) -> &'static str {
        "nested-table"
    }

    fn extract(&self, cell: &Html) -> Option<CellRecord> {
        let table = cell.select(&TABLE).next()?;
        let rows: Vec<_> = table.select(&ANY_ROW).collect();
        let mut record = CellRecord::unknown();

        if rows.len() >= 2 {
            let full_text = element_text(&cell.root_element());
            record.course_name = Self::non_empty_or_unknown(element_text(&rows[0]));

            let mut type_text = element_text(&rows[1]);
            if let Some(m) = LOCATION_ANYWHERE.find(&full_text) {
                record.location = m.as_str().to_string();
                type_text = type_text.replace(m.as_str(), "");
            }
            record.session_type = Self::tut_or_lab(&type_text);
            return Some(record);
        }

        // Single row: name, location, then type with an optional group
        // number that belongs to the course name ("Lab 12").
        let cells: Vec<_> = table.select(&CELL).collect();
        if cells.len() >= 3 {
            let mut course_name = element_text(&cells[0]);
            let location = element_text(&cells[1]);
            if LOCATION_EXACT.is_match(&location) {
                record.location = location;
            }

            let type_text = element_text(&cells[2]);
            record.session_type = Self::tut_or_lab(&type_text);
            if record.session_type != SessionType::Unknown {
                let group = normalize_whitespace(&TUT_OR_LAB.replace_all(&type_text, ""));
                if !group.is_empty() {
                    course_name = normalize_whitespace(&format!("{course_name} {group}"));
                }
            }
            record.course_name = Self::non_empty_or_unknown(course_name);
            return Some(record);
        }

        None
    }
}

/// Last resort: the visible text is the course name.
struct VisibleText;

impl CellStrategy for VisibleText {
    fn name(&self) -> &'static str {
        "visible-text"
    }

    fn extract(&self, cell: &Html) -> Option<CellRecord> {
        let text = element_text(&cell.root_element());
        if !text.chars().any(char::is_alphanumeric) {
            return None;
        }

        let location = LOCATION_ANYWHERE
            .find(&text)
            .map_or_else(|| UNKNOWN.to_string(), |m| m.as_str().to_string());
        Some(CellRecord {
            session_type: SessionType::from_text(&text),
            course_name: text,
            location,
            free: false,
        })
    }
}

/// Parse the group schedule page into a weekly schedule.
///
/// Returns an empty schedule when no grid rows can be located.
pub fn parse_schedule(html: &str) -> WeeklySchedule {
    let document = Html::parse_document(html);
    let rows = locate_rows(&document);

    if rows.is_empty() {
        log::warn!("No schedule rows found");
        return WeeklySchedule::new();
    }

    let mut schedule = WeeklySchedule::new();
    for row in rows {
        let cells: Vec<_> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "td")
            .collect();
        let Some((day_cell, period_cells)) = cells.split_first() else {
            continue;
        };

        let label = element_text(day_cell);
        if label.is_empty() || label == UNKNOWN_DAY {
            log::debug!("Skipping row with day label '{label}'");
            continue;
        }
        let Some(day) = Weekday::from_label(&label) else {
            log::warn!("Dropping row with unrecognized day '{label}'");
            continue;
        };
        if period_cells.is_empty() {
            log::warn!("No period cells for day '{label}'");
            continue;
        }

        schedule.insert(day, parse_day(&label, period_cells));
    }

    if schedule.is_empty() {
        log::warn!("Schedule parsed but no valid days were extracted");
    }
    schedule
}

fn parse_day(label: &str, period_cells: &[ElementRef<'_>]) -> DaySchedule {
    let expected = Period::ALL.len();
    if period_cells.len() < expected {
        log::warn!(
            "Day '{}' has {} of {} period cells; filling the rest as Free",
            label,
            period_cells.len(),
            expected
        );
    } else if period_cells.len() > expected {
        log::warn!(
            "Day '{}' has {} period cells; using the first {}",
            label,
            period_cells.len(),
            expected
        );
    }

    Period::ALL
        .into_iter()
        .enumerate()
        .map(|(i, period)| {
            let record = period_cells
                .get(i)
                .map_or_else(CellRecord::free, |cell| extract_cell(&cell.inner_html()));
            (period, record)
        })
        .collect()
}

/// Rows of the schedule grid: by control id inside the grid table, then any
/// top-level row of that table, then control-id rows anywhere.
fn locate_rows(document: &Html) -> Vec<ElementRef<'_>> {
    if let Some(table) = document.select(&SCHEDULE_TABLE).next() {
        let rows: Vec<_> = table.select(&SCHEDULE_ROW).collect();
        if !rows.is_empty() {
            return rows;
        }
        log::debug!("Schedule table has no id-prefixed rows; using its own rows");
        return table
            .select(&ANY_ROW)
            .filter(|row| {
                row.ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|el| el.value().name() == "table")
                    .is_some_and(|owner| owner.id() == table.id())
            })
            .collect();
    }

    log::warn!("Schedule table not found; searching rows by id prefix");
    document.select(&SCHEDULE_ROW).collect()
}
