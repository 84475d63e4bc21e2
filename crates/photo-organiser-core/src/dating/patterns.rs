//! Date patterns recognised in folder names and filenames.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::types::PartialDate;

/// A date found inside a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMatch {
    pub date: PartialDate,
    /// Byte offset where the date text starts
    pub start: usize,
    /// Byte offset just past the date text
    pub end: usize,
}

const MONTHS: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

// 2011-08-15, 2011_08_15, 2011.08.15
static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)((?:19|20)\d{2})[-_.](\d{1,2})[-_.](\d{1,2})(?:\D|$)").unwrap()
});

// 20110815, as in IMG_20110815_120000
static COMPACT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(\d{2})(\d{2})(?:\D|$)").unwrap());

// 15/08/2011, 15-08-2011, 15.08.2011 (day first)
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)(\d{1,2})[/.\-](\d{1,2})[/.\-]((?:19|20)\d{2})(?:\D|$)").unwrap()
});

// August 2011, Aug-2011, 15 August 2011, 3rd Aug 2011
static MONTH_NAME_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|[^a-z0-9])(?:(\d{{1,2}})(?:st|nd|rd|th)?[\s_.-]+)?({})[\s_.,-]*((?:19|20)\d{{2}})(?:\D|$)",
        MONTHS
    ))
    .unwrap()
});

// 2011-08, 2011_08
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})[-_.](\d{1,2})(?:\D|$)").unwrap());

// Holiday 2020
static BARE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").unwrap());

// IMG_1234, DSC01999, PXL_0042, P1000123
static CAMERA_COUNTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:img|dsc[fn]?|dscn|pxl|pict?|mvimg|photo|sam|gopr|dji|p)[_\- ]?\d+$")
        .unwrap()
});

/// Which shapes of date a matcher reports
#[derive(Debug, Clone, Copy)]
enum Shape {
    YearMonthDay,
    DayMonthYear,
    MonthName,
    YearMonth,
    Year,
}

fn matchers() -> [(&'static Lazy<Regex>, Shape); 6] {
    [
        (&ISO_DATE, Shape::YearMonthDay),
        (&COMPACT_DATE, Shape::YearMonthDay),
        (&DAY_MONTH_YEAR, Shape::DayMonthYear),
        (&MONTH_NAME_YEAR, Shape::MonthName),
        (&YEAR_MONTH, Shape::YearMonth),
        (&BARE_YEAR, Shape::Year),
    ]
}

/// Month number for an English month name or abbreviation
pub fn month_from_name(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn number<T: std::str::FromStr>(caps: &Captures, index: usize) -> Option<T> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

fn full_date(year: i32, month: u32, day: u32) -> Option<PartialDate> {
    NaiveDate::from_ymd_opt(year, month, day).map(PartialDate::full)
}

fn year_month(year: i32, month: u32) -> Option<PartialDate> {
    (1..=12)
        .contains(&month)
        .then(|| PartialDate::year_month(year, month))
}

/// Turn one regex hit into a validated date
fn interpret(caps: &Captures, shape: Shape) -> Option<PartialDate> {
    match shape {
        Shape::YearMonthDay => full_date(number(caps, 1)?, number(caps, 2)?, number(caps, 3)?),
        Shape::DayMonthYear => full_date(number(caps, 3)?, number(caps, 2)?, number(caps, 1)?),
        Shape::MonthName => {
            let month = month_from_name(caps.get(2)?.as_str())?;
            let year = number(caps, 3)?;
            match number::<u32>(caps, 1) {
                Some(day) => full_date(year, month, day),
                None => year_month(year, month),
            }
        }
        Shape::YearMonth => year_month(number(caps, 1)?, number(caps, 2)?),
        Shape::Year => Some(PartialDate::year(number(caps, 1)?)),
    }
}

/// Span covered by the capture groups, excluding the boundary characters
fn group_span(caps: &Captures) -> Option<(usize, usize)> {
    let groups: Vec<_> = caps.iter().skip(1).flatten().collect();
    let start = groups.iter().map(|m| m.start()).min()?;
    let end = groups.iter().map(|m| m.end()).max()?;
    Some((start, end))
}

/// Every valid date occurring in `text`, in no particular order
pub fn find_dates(text: &str) -> Vec<DateMatch> {
    let mut found = Vec::new();

    for (regex, shape) in matchers() {
        let mut pos = 0;
        // Resume at the end of the date itself, not the match: the trailing
        // boundary character may open the next date
        while let Some(caps) = regex.captures_at(text, pos) {
            let Some((start, end)) = group_span(&caps) else {
                break;
            };
            if let Some(date) = interpret(&caps, shape) {
                found.push(DateMatch { date, start, end });
            }
            pos = end;
        }
    }

    found
}

/// The most specific date in `text`; ties go to the earliest occurrence
pub fn best_date(text: &str) -> Option<PartialDate> {
    find_dates(text)
        .into_iter()
        .min_by(|a, b| {
            b.date
                .specificity()
                .cmp(&a.date.specificity())
                .then(a.start.cmp(&b.start))
        })
        .map(|m| m.date)
}

/// `text` with every recognised date removed
pub fn strip_dates(text: &str) -> String {
    let mut keep = vec![true; text.len()];
    for m in find_dates(text) {
        keep[m.start..m.end].iter_mut().for_each(|k| *k = false);
    }

    text.char_indices()
        .filter(|(i, _)| keep[*i])
        .map(|(_, c)| c)
        .collect()
}

/// Whether a name is nothing but a date (plus punctuation and digits)
pub fn is_date_only(text: &str) -> bool {
    !find_dates(text).is_empty() && !strip_dates(text).chars().any(char::is_alphabetic)
}

/// Whether a filename stem is a bare camera counter such as `IMG_2011`
pub fn is_camera_counter(stem: &str) -> bool {
    CAMERA_COUNTER.is_match(stem)
}
