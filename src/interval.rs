use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::datetime::local_datetime;
use crate::error::{EngineError, EngineResult};

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})(:(\d{2}))?$").expect("TIME_REGEX should compile - this is a bug")
});

/// 自由形式の日付として試すフォーマット。
const FREE_FORM_DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const FREE_FORM_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// 開始と終了を持つ時間区間。
///
/// `end > start`であることを`new`で保証する。長さは保持せず、常に両端から求める。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// 新しい`TimeInterval`を返す。
    ///
    /// 終了が開始より後でない場合は`NonPositiveDuration`を返す。
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> EngineResult<Self> {
        if end <= start {
            return Err(EngineError::NonPositiveDuration { start, end });
        }
        Ok(Self { start, end })
    }

    /// ISO-8601(RFC 3339)形式の開始・終了文字列から区間を作る。
    pub fn from_rfc3339(start: &str, end: &str) -> EngineResult<Self> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s.trim())
                .map(|datetime| datetime.to_utc())
                .map_err(|_| EngineError::InvalidDate(s.to_string()))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// 日付文字列と2つの時刻文字列から時間区間を作る。
///
/// 時刻はLocalタイムゾーンでの指定日の時刻として解釈し、秒以下は0とする。
///
/// # Arguments
///
/// * `date` - `YYYY-MM-DD`、`M/D/YYYY`、または自由形式の日付
/// * `start_time` - 開始時刻（`9`、`9:30`、`9:30 AM`など）
/// * `end_time` - 終了時刻
pub fn parse_interval(date: &str, start_time: &str, end_time: &str) -> EngineResult<TimeInterval> {
    let date = parse_date(date)?;
    let start = local_datetime(date, parse_time(start_time)?);
    let end = local_datetime(date, parse_time(end_time)?);

    TimeInterval::new(start.to_utc(), end.to_utc())
}

/// 日付をパースする。
///
/// `YYYY-MM-DD`、`M/D/YYYY`の順に試し、どちらでもなければ自由形式として解釈する。
pub fn parse_date(s: &str) -> EngineResult<NaiveDate> {
    let trimmed = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Ok(date);
    }

    parse_free_form_date(trimmed).ok_or_else(|| EngineError::InvalidDate(s.to_string()))
}

fn parse_free_form_date(s: &str) -> Option<NaiveDate> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Some(datetime.date_naive());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc2822(s) {
        return Some(datetime.date_naive());
    }
    FREE_FORM_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .or_else(|| {
            FREE_FORM_DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                .map(|datetime| datetime.date())
        })
}

/// 時刻をパースする。
///
/// 空白を取り除いた後、末尾の`AM`/`PM`（大文字小文字を問わない）を24時間表記に変換する。
pub fn parse_time(s: &str) -> EngineResult<NaiveTime> {
    let invalid = || EngineError::InvalidTime(s.to_string());

    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let (clock, meridiem) = if let Some(clock) = compact.strip_suffix("AM") {
        (clock, Some(Meridiem::Am))
    } else if let Some(clock) = compact.strip_suffix("PM") {
        (clock, Some(Meridiem::Pm))
    } else {
        (compact.as_str(), None)
    };

    let captures = TIME_REGEX.captures(clock).ok_or_else(invalid)?;
    let mut hour: u32 = captures[1].parse().map_err(|_| invalid())?;
    let minute: u32 = match captures.get(3) {
        Some(minute) => minute.as_str().parse().map_err(|_| invalid())?,
        None => 0,
    };

    match meridiem {
        Some(Meridiem::Am) if hour == 12 => hour = 0,
        Some(Meridiem::Pm) if hour < 12 => hour += 12,
        _ => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

enum Meridiem {
    Am,
    Pm,
}
