/// RecordTable Date Helpers
///
/// Lenient timestamp parsing for imported text and calendar-week bucketing
/// for grouping. Dashes and slashes are interchangeable in both the input and
/// the format hint.

use crate::record::Record;
use crate::value::Value;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// Timestamp layout used when no hint is given to [`week_start_of`].
pub const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout of week keys produced by [`week_start_of`].
pub const DATE_FMT: &str = "%Y-%m-%d";

// Two-digit years are tried before four-digit ones: chrono's `%Y` would
// otherwise read "12/12/12" as the year 12.
const FORMATS: [&str; 4] = ["%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%Y/%m/%d %H:%M:%S"];

fn parse_with(text: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, fmt)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse `text` as a timestamp, trying `hint` first and then the common US
/// and ISO layouts. Returns `None` if nothing matches.
pub fn parse_timestamp(text: &str, hint: Option<&str>) -> Option<NaiveDateTime> {
    let text = text.trim().replace('-', "/");
    if text.is_empty() {
        return None;
    }
    let hint = hint.map(|h| h.replace('-', "/"));
    let parsed = hint
        .iter()
        .map(String::as_str)
        .chain(FORMATS)
        .find_map(|fmt| parse_with(&text, fmt));
    parsed
}

/// Midnight at the start of the week containing `ts`, weeks starting on
/// `first_day`.
pub fn week_start(ts: NaiveDateTime, first_day: Weekday) -> NaiveDateTime {
    let back = (ts.weekday().num_days_from_monday() + 7 - first_day.num_days_from_monday()) % 7;
    let day = ts.date() - Duration::days(i64::from(back));
    day.and_time(chrono::NaiveTime::MIN)
}

/// Group key function: the week start of a timestamp attribute as
/// `YYYY-MM-DD`, or `Null` when the attribute does not parse. Fractional
/// seconds are ignored.
pub fn week_start_of(attr: &str, first_day: Weekday) -> impl Fn(&Record) -> Value {
    let attr = attr.to_string();
    move |record: &Record| {
        let text = match record.value(&attr) {
            Value::Str(s) => s.as_str(),
            _ => return Value::Null,
        };
        let text = match text.rsplit_once('.') {
            Some((head, frac)) if !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()) => head,
            _ => text,
        };
        parse_timestamp(text, Some(TIME_FMT))
            .map(|ts| Value::Str(week_start(ts, first_day).format(DATE_FMT).to_string()))
            .unwrap_or(Value::Null)
    }
}
