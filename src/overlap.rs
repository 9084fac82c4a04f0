use chrono::{Duration, NaiveDate};
use log::debug;

use crate::aggregate::{round_millis_to_hours, EntryFilter};
use crate::error::EngineResult;
use crate::interval::{parse_date, TimeInterval};
use crate::time_entry::TimeEntry;

/// 2つの区間が重なっている長さを返す。重ならない場合は0。
pub fn overlap(reference: &TimeInterval, candidate: &TimeInterval) -> Duration {
    let start = reference.start.max(candidate.start);
    let end = reference.end.min(candidate.end);
    (end - start).max(Duration::zero())
}

/// 在席時間など、タイムエントリーと突き合わせる基準の区間。
#[derive(Clone, Debug, PartialEq)]
pub struct OfficeSession {
    pub user_id: String,
    pub interval: TimeInterval,
    pub date: NaiveDate,
}

impl OfficeSession {
    /// 日付とISO-8601形式の開始・終了から`OfficeSession`を作る。
    ///
    /// # Arguments
    ///
    /// * `user_id` - 対象ユーザー
    /// * `date` - セッションの日付
    /// * `office_start` - 在席開始（例: `2025-08-12T12:30:00Z`）
    /// * `office_end` - 在席終了
    pub fn parse(
        user_id: &str,
        date: &str,
        office_start: &str,
        office_end: &str,
    ) -> EngineResult<Self> {
        Ok(Self {
            user_id: user_id.to_string(),
            interval: TimeInterval::from_rfc3339(office_start, office_end)?,
            date: parse_date(date)?,
        })
    }
}

/// 1件のエントリーと基準区間の重なり。
#[derive(Clone, Debug, PartialEq)]
pub struct EntryOverlap {
    pub entry: TimeEntry,
    pub overlap: Duration,
}

/// 基準区間に対する重なりの集計結果。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlapReport {
    /// 重なりが0より大きいエントリーのみ、入力順に並ぶ。
    pub per_entry: Vec<EntryOverlap>,
    /// フィルタを通過したエントリー数。重なりが0のものも含む。
    pub considered: usize,
    /// 小数秒の重なりを落とさないようミリ秒で合計する。
    pub total_overlap_millis: i64,
    pub total_overlap_hours: f64,
}

/// 基準区間と各エントリーの重なりを求める。
///
/// 記録された長さではなく、基準区間の内側にある部分だけを数える。
/// 開始・終了を持たないエントリーは重なりを求められないため0として扱う。
pub fn compute_overlap(
    reference: &TimeInterval,
    candidates: &[TimeEntry],
    filter: &EntryFilter,
) -> OverlapReport {
    let mut report = candidates
        .iter()
        .filter(|entry| filter.matches(entry))
        .fold(OverlapReport::default(), |mut report, entry| {
            report.considered += 1;
            let overlap = entry
                .interval
                .map(|interval| overlap(reference, &interval))
                .unwrap_or_else(Duration::zero);
            if overlap > Duration::zero() {
                report.total_overlap_millis = report
                    .total_overlap_millis
                    .saturating_add(overlap.num_milliseconds());
                report.per_entry.push(EntryOverlap {
                    entry: entry.clone(),
                    overlap,
                });
            }
            report
        });
    report.total_overlap_hours = round_millis_to_hours(report.total_overlap_millis);
    debug!(
        "Overlap of {} entries with {} - {}: {}ms",
        report.considered, reference.start, reference.end, report.total_overlap_millis
    );

    report
}

/// 在席セッションとそのユーザーのタイムエントリーを突き合わせる。
pub fn reconcile(
    session: &OfficeSession,
    entries: &[TimeEntry],
    billable_only: bool,
) -> OverlapReport {
    let filter = EntryFilter {
        user_id: Some(session.user_id.clone()),
        billable: billable_only.then_some(true),
    };
    compute_overlap(&session.interval, entries, &filter)
}
