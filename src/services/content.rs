// src/services/content.rs

//! Course page parsing: weekly content blocks and the announcement panel.

use std::cmp::Reverse;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::http::{PortalRequest, PortalSession, send};
use crate::models::{ContentEntry, WeekItem};
use crate::utils::{element_text, resolve_url};

static WEEK_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".weeksdata").expect("week block selector"));
static WEEK_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.text-big").expect("week title selector"));
static WEEK_BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.p-3").expect("week body selector"));
static SECTION_HEADER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div > strong").expect("section header selector"));
static CARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".card.mb-4").expect("card selector"));
static CARD_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[id^='content']").expect("card title selector"));
static CARD_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h5, h6").expect("card heading selector"));
static DOWNLOAD_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a#download").expect("download link selector"));
static CONTENT_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.contentbtn").expect("content button selector"));

static ANNOUNCEMENT_PANELS: LazyLock<[Selector; 2]> = LazyLock::new(|| {
    [
        Selector::parse("div#ContentPlaceHolderright_ContentPlaceHoldercontent_desc")
            .expect("description panel selector"),
        Selector::parse("div#GeneralAnnouncements").expect("general announcements selector"),
    ]
});
static ANNOUNCEMENT_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3, h4").expect("announcement heading selector"));

static WEEK_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})|(\d{1,2}/\d{1,2}/\d{4})").expect("week date regex")
});

/// Parse the week blocks of a course page, newest week first.
///
/// Weeks whose name carries no date keep their page order after the dated ones.
pub fn parse_course_content(html: &str, cms_base: &Url) -> Vec<WeekItem> {
    let document = Html::parse_document(html);
    let mut weeks: Vec<WeekItem> = document
        .select(&WEEK_BLOCK)
        .filter_map(|block| parse_week(block, cms_base))
        .collect();

    if weeks.is_empty() {
        log::warn!("No week sections found on course page");
    }

    weeks.sort_by_key(|week| Reverse(week_date(&week.week_name)));
    weeks
}

fn parse_week(block: ElementRef<'_>, cms_base: &Url) -> Option<WeekItem> {
    let Some(title) = block.select(&WEEK_TITLE).next() else {
        log::warn!("Skipping week block without a title");
        return None;
    };

    let mut week = WeekItem {
        week_name: element_text(&title),
        announcement: String::new(),
        description: String::new(),
        contents: Vec::new(),
    };

    let Some(body) = block.select(&WEEK_BODY).next() else {
        return Some(week);
    };

    for header in body.select(&SECTION_HEADER) {
        let label = element_text(&header).to_lowercase();
        let Some(section) = header.parent().and_then(ElementRef::wrap) else {
            continue;
        };

        if label.contains("announcement") {
            if !is_hidden(&section) {
                week.announcement = section_paragraph(&section);
            }
        } else if label.contains("description") {
            week.description = section_paragraph(&section);
        } else if label.contains("content") {
            break;
        }
    }

    week.contents = body
        .select(&CARD)
        .filter_map(|card| parse_card(card, cms_base))
        .collect();
    Some(week)
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    element
        .value()
        .attr("style")
        .is_some_and(|style| style.replace(' ', "").contains("display:none"))
}

/// Text of the `p.m-2` that follows a section header, stopping at the next
/// section or content card.
fn section_paragraph(section: &ElementRef<'_>) -> String {
    for sibling in section.next_siblings().filter_map(ElementRef::wrap) {
        let element = sibling.value();
        if element.name() == "p" && element.classes().any(|class| class == "m-2") {
            return element_text(&sibling);
        }
        if element.name() == "div" {
            let starts_section = sibling
                .children()
                .filter_map(ElementRef::wrap)
                .any(|child| child.value().name() == "strong");
            if starts_section || sibling.select(&CARD).next().is_some() {
                break;
            }
        }
    }
    String::new()
}

fn parse_card(card: ElementRef<'_>, cms_base: &Url) -> Option<ContentEntry> {
    let title = card
        .select(&CARD_TITLE)
        .next()
        .or_else(|| card.select(&CARD_HEADING).next())
        .map(|el| element_text(&el));
    let Some(title) = title else {
        log::debug!("Skipping content card without a title");
        return None;
    };

    let download_url = [&*DOWNLOAD_LINK, &*CONTENT_BUTTON]
        .into_iter()
        .find_map(|selector| card.select(selector).next())
        .and_then(|link| link.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .map(|href| resolve_url(cms_base, href.trim()));

    Some(ContentEntry {
        title,
        download_url,
    })
}

fn week_date(name: &str) -> Option<NaiveDate> {
    let found = WEEK_DATE.find(name)?.as_str();
    let format = if found.contains('-') { "%Y-%m-%d" } else { "%d/%m/%Y" };
    NaiveDate::parse_from_str(found, format).ok()
}

/// Inner HTML of the course announcement panel, if the page has one.
pub fn parse_announcement(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let panel = ANNOUNCEMENT_PANELS
        .iter()
        .find_map(|selector| document.select(selector).next())
        .or_else(|| {
            document
                .select(&ANNOUNCEMENT_HEADING)
                .find(|heading| {
                    element_text(heading)
                        .to_lowercase()
                        .contains("general announcement")
                })
                .and_then(|heading| heading.parent().and_then(ElementRef::wrap))
        })?;

    Some(panel.inner_html().trim().to_string())
}

/// Fetch and parse the weekly content of a course page.
pub async fn fetch_course_content(
    session: &dyn PortalSession,
    course_url: &str,
    cms_base: &Url,
    timeout: Duration,
) -> Result<Vec<WeekItem>> {
    let response = send(
        session,
        PortalRequest::get(course_url, timeout),
        "course content",
    )
    .await?;
    let weeks = parse_course_content(&response.body, cms_base);
    log::info!("Parsed {} weeks from {}", weeks.len(), course_url);
    Ok(weeks)
}

/// Fetch the course announcement panel as raw HTML.
pub async fn fetch_course_announcement(
    session: &dyn PortalSession,
    course_url: &str,
    timeout: Duration,
) -> Result<String> {
    let response = send(
        session,
        PortalRequest::get(course_url, timeout),
        "course announcement",
    )
    .await?;
    parse_announcement(&response.body)
        .ok_or_else(|| AppError::missing(format!("announcement section on {course_url}")))
}
