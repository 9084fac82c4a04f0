use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::datetime::midnight_in;
use crate::error::{EngineError, EngineResult};

/// 集計の単位。粒度の小さい順に並ぶ。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "daily")]
    Day,
    #[serde(rename = "weekly")]
    Week,
    #[serde(rename = "monthly")]
    Month,
    #[serde(rename = "yearly")]
    Year,
}

impl Timeframe {
    /// `goal_frequency`の目標がこの単位の表示に含まれるかを返す。
    ///
    /// 日次の目標は週・月・年の表示にも含まれ、月次の目標は日・週の表示には含まれない。
    pub fn includes(self, goal_frequency: Timeframe) -> bool {
        goal_frequency <= self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "daily",
            Self::Week => "weekly",
            Self::Month => "monthly",
            Self::Year => "yearly",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Day),
            "weekly" | "week" => Ok(Self::Week),
            "monthly" | "month" => Ok(Self::Month),
            "yearly" | "year" => Ok(Self::Year),
            _ => Err(EngineError::UnsupportedUnit(s.to_string())),
        }
    }
}

/// Localタイムゾーンの暦に揃えた集計期間。
///
/// `start`は期間初日の00:00:00、`end`は次の期間の開始の1ミリ秒前。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub unit: Timeframe,
}

impl Bucket {
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

/// `now`を含む集計期間を返す。
///
/// 週は月曜始まり（ISO週）、月は1日、年は1月1日始まりとする。
///
/// # Arguments
///
/// * `now` - 基準となる日時
/// * `unit` - 集計の単位
pub fn bucket_bounds(now: DateTime<Local>, unit: Timeframe) -> Bucket {
    let (first_day, next_first_day) = calendar_span(now.date_naive(), unit);
    let (start, end) = bounds_in(&Local, first_day, next_first_day);

    Bucket { start, end, unit }
}

/// `today`を含む期間の初日と、次の期間の初日を返す。
fn calendar_span(today: NaiveDate, unit: Timeframe) -> (NaiveDate, NaiveDate) {
    match unit {
        Timeframe::Day => (today, today + Duration::days(1)),
        Timeframe::Week => {
            let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(7))
        }
        Timeframe::Month => {
            let first = today.with_day(1).unwrap_or(today);
            (first, first_day_of_next_month(first))
        }
        Timeframe::Year => {
            let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
            let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
                .unwrap_or(first + Duration::days(365));
            (first, next)
        }
    }
}

// 夏時間の切り替え日を含む期間は24時間の倍数にならない
fn bounds_in<Tz: TimeZone>(
    tz: &Tz,
    first_day: NaiveDate,
    next_first_day: NaiveDate,
) -> (DateTime<Tz>, DateTime<Tz>) {
    (
        midnight_in(tz, first_day),
        midnight_in(tz, next_first_day) - Duration::milliseconds(1),
    )
}

fn first_day_of_next_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first + Duration::days(31))
}

/// 暦日が集計期間に含まれるかを返す。
///
/// 時刻ではなく日付同士で比較し、両端を含む。
pub fn in_bucket(date: NaiveDate, bucket: &Bucket) -> bool {
    bucket.start_date() <= date && date <= bucket.end_date()
}

/// 保存されている日付文字列を暦日に変換する。
///
/// 日付のみの値はそのまま、オフセット付きの日時は書き込まれたオフセットでの日付、
/// オフセットなしの日時は日付部分を使う。UTCの瞬間をLocalの境界と直接比較しない。
pub fn record_date(raw: &str) -> EngineResult<NaiveDate> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(datetime.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|datetime| datetime.date())
        .ok_or_else(|| EngineError::InvalidDate(raw.to_string()))
}
