use chrono::{Local, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::bucket::record_date;
use crate::error::EngineError;
use crate::interval::TimeInterval;

/// 1件のエントリーとして受け付ける最大の長さ（366日）。
pub const MAX_ENTRY_SECONDS: i64 = 366 * 24 * 60 * 60;

/// タイムエントリーの作成元。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntrySource {
    Manual,
    Clock,
}

impl EntrySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Clock => "clock",
        }
    }
}

impl From<&str> for EntrySource {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("clock") {
            Self::Clock
        } else {
            Self::Manual
        }
    }
}

/// JSONファイルに保存されている形のタイムエントリー。
///
/// 古いファイルでは`duration`が欠けていたり文字列だったりするため、値はそのまま保持し、
/// 検証は`TimeEntry`への変換時に行う。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTimeEntry {
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>,
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub source: String,
}

impl StoredTimeEntry {
    /// パース済みの区間から保存用のタイムエントリーを作る。
    ///
    /// 日付は開始時刻のLocalタイムゾーンでの暦日とし、長さも冗長に保存する。
    pub fn from_interval(
        user_id: &str,
        interval: &TimeInterval,
        billable: bool,
        case_id: Option<String>,
        description: String,
        source: EntrySource,
    ) -> Self {
        let date = interval.start.with_timezone(&Local).date_naive();
        Self {
            id: format!("{}-{}", user_id, interval.start.timestamp_millis()),
            user_id: user_id.to_string(),
            case_id,
            date: Some(date.format("%Y-%m-%d").to_string()),
            start: Some(interval.start.to_rfc3339()),
            end: Some(interval.end.to_rfc3339()),
            duration: Some(Value::from(interval.duration().num_seconds())),
            billable,
            description,
            status: "logged".to_string(),
            source: source.as_str().to_string(),
        }
    }
}

/// 検証済みのタイムエントリー。
#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntry {
    pub id: String,
    pub user_id: String,
    pub case_id: Option<String>,
    pub date: NaiveDate,
    /// 開始・終了が保存されていないエントリーは`None`。
    pub interval: Option<TimeInterval>,
    pub duration_seconds: i64,
    pub billable: bool,
    pub description: String,
    pub status: String,
    pub source: EntrySource,
}

impl TryFrom<&StoredTimeEntry> for TimeEntry {
    type Error = EngineError;

    /// 保存されたエントリーを検証する。
    ///
    /// 長さは開始・終了が揃っていればそこから求め直し、保存された`duration`は使わない。
    fn try_from(stored: &StoredTimeEntry) -> Result<Self, Self::Error> {
        let malformed = |reason: String| EngineError::MalformedRecord {
            id: stored.id.clone(),
            reason,
        };

        if stored.user_id.trim().is_empty() {
            return Err(malformed("missing userId".to_string()));
        }

        let raw_date = stored
            .date
            .as_deref()
            .filter(|date| !date.trim().is_empty())
            .or(stored.start.as_deref())
            .ok_or_else(|| malformed("missing date".to_string()))?;
        let date = record_date(raw_date).map_err(|e| malformed(e.to_string()))?;

        let interval = match (stored.start.as_deref(), stored.end.as_deref()) {
            (Some(start), Some(end)) => TimeInterval::from_rfc3339(start, end).ok(),
            _ => None,
        };
        let duration_seconds = match interval {
            Some(interval) => interval.duration().num_seconds(),
            None => stored_duration(stored.duration.as_ref()).map_err(malformed)?,
        };
        if duration_seconds > MAX_ENTRY_SECONDS {
            return Err(malformed(format!(
                "duration too long: {}s",
                duration_seconds
            )));
        }

        Ok(Self {
            id: stored.id.clone(),
            user_id: stored.user_id.clone(),
            case_id: stored.case_id.clone(),
            date,
            interval,
            duration_seconds,
            billable: stored.billable,
            description: stored.description.clone(),
            status: stored.status.clone(),
            source: EntrySource::from(stored.source.as_str()),
        })
    }
}

/// 保存された`duration`（秒）を読み取る。
fn stored_duration(value: Option<&Value>) -> Result<i64, String> {
    let seconds = match value {
        None | Some(Value::Null) => return Err("missing duration".to_string()),
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    }
    .filter(|seconds| seconds.is_finite())
    .ok_or_else(|| {
        format!(
            "non-numeric duration: {}",
            value.map(Value::to_string).unwrap_or_default()
        )
    })?
    .round();

    if seconds < 0.0 {
        return Err(format!("negative duration: {}", seconds));
    }
    // i64へ変換する前に範囲を確かめる。範囲外の`as`は飽和してしまう
    if seconds > MAX_ENTRY_SECONDS as f64 {
        return Err(format!("duration too long: {}", seconds));
    }
    Ok(seconds as i64)
}

/// 数値でも文字列でも受け付けるid。
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("invalid id: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rstest::rstest;
    use serde_json::{json, Value};

    use super::{EntrySource, StoredTimeEntry, TimeEntry};
    use crate::error::EngineError;
    use crate::interval::TimeInterval;

    fn stored(value: Value) -> StoredTimeEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deserialize_camel_case_record() {
        let entry = stored(json!({
            "id": 17,
            "userId": "Cole",
            "caseId": "case-9",
            "date": "2025-08-12",
            "duration": 3600,
            "billable": true,
            "description": "Drafting motion",
            "status": "submitted",
            "source": "manual"
        }));

        assert_eq!(entry.id, "17");
        assert_eq!(entry.user_id, "Cole");
        assert_eq!(entry.case_id.as_deref(), Some("case-9"));
        assert!(entry.billable);
    }

    #[test]
    fn test_timestamps_win_over_stale_duration() {
        let entry = stored(json!({
            "id": "a",
            "userId": "Cole",
            "date": "2025-08-12",
            "start": "2025-08-12T13:00:00Z",
            "end": "2025-08-12T15:00:00Z",
            "duration": 60
        }));

        let entry = TimeEntry::try_from(&entry).unwrap();

        assert_eq!(entry.duration_seconds, 7200);
        assert!(entry.interval.is_some());
    }

    #[rstest]
    #[case::integer(json!(14400), 14400)]
    #[case::float(json!(5400.4), 5400)]
    #[case::numeric_string(json!("7200"), 7200)]
    fn test_stored_duration_is_used_without_timestamps(
        #[case] duration: Value,
        #[case] expected: i64,
    ) {
        let entry = stored(json!({
            "id": "a",
            "userId": "Cole",
            "date": "2025-08-12",
            "duration": duration
        }));

        let entry = TimeEntry::try_from(&entry).unwrap();

        assert_eq!(entry.duration_seconds, expected);
        assert_eq!(entry.interval, None);
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 8, 12).unwrap());
    }

    #[test]
    fn test_date_falls_back_to_start() {
        let entry = stored(json!({
            "id": "a",
            "userId": "Cole",
            "start": "2025-08-12T13:00:00Z",
            "end": "2025-08-12T15:00:00Z"
        }));

        let entry = TimeEntry::try_from(&entry).unwrap();

        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2025, 8, 12).unwrap());
    }

    #[rstest]
    #[case::missing_user(json!({"id": "x", "date": "2025-08-12", "duration": 60}))]
    #[case::missing_date(json!({"id": "x", "userId": "Cole", "duration": 60}))]
    #[case::bad_date(json!({"id": "x", "userId": "Cole", "date": "yesterday", "duration": 60}))]
    #[case::missing_duration(json!({"id": "x", "userId": "Cole", "date": "2025-08-12"}))]
    #[case::non_numeric_duration(json!({"id": "x", "userId": "Cole", "date": "2025-08-12", "duration": "two hours"}))]
    #[case::negative_duration(json!({"id": "x", "userId": "Cole", "date": "2025-08-12", "duration": -5}))]
    #[case::huge_duration(json!({"id": "x", "userId": "Cole", "date": "2025-08-12", "duration": 1e17}))]
    #[case::huge_string_duration(json!({"id": "x", "userId": "Cole", "date": "2025-08-12", "duration": "1e300"}))]
    #[case::interval_longer_than_a_year(json!({
        "id": "x", "userId": "Cole", "date": "2025-08-12",
        "start": "2020-08-12T13:00:00Z", "end": "2025-08-12T13:00:00Z"
    }))]
    #[case::reversed_interval_without_duration(json!({
        "id": "x", "userId": "Cole", "date": "2025-08-12",
        "start": "2025-08-12T15:00:00Z", "end": "2025-08-12T13:00:00Z"
    }))]
    fn test_malformed_records(#[case] value: Value) {
        let result = TimeEntry::try_from(&stored(value));

        assert!(
            matches!(result, Err(EngineError::MalformedRecord { ref id, .. }) if id == "x"),
            "{:?}",
            result
        );
    }

    #[test]
    fn test_from_interval() {
        let start = Utc.with_ymd_and_hms(2025, 8, 12, 13, 0, 0).unwrap();
        let interval = TimeInterval::new(start, start + Duration::minutes(90)).unwrap();

        let entry = StoredTimeEntry::from_interval(
            "Cole",
            &interval,
            true,
            Some("case-1".to_string()),
            "Client call".to_string(),
            EntrySource::Clock,
        );

        assert_eq!(entry.id, format!("Cole-{}", start.timestamp_millis()));
        assert_eq!(entry.duration, Some(json!(5400)));
        assert_eq!(entry.source, "clock");

        let parsed = TimeEntry::try_from(&entry).unwrap();
        assert_eq!(parsed.interval, Some(interval));
        assert_eq!(parsed.source, EntrySource::Clock);
    }

    #[test]
    fn test_serialize_skips_missing_optionals() {
        let entry = StoredTimeEntry {
            id: "a".to_string(),
            user_id: "Cole".to_string(),
            date: Some("2025-08-12".to_string()),
            duration: Some(json!(60)),
            ..Default::default()
        };

        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["userId"], "Cole");
        assert!(value.get("caseId").is_none());
        assert!(value.get("start").is_none());
    }
}
