use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::bucket::{in_bucket, Bucket};
use crate::time_entry::{StoredTimeEntry, TimeEntry};

/// エントリーを絞り込む条件。`None`の項目は絞り込まない。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub user_id: Option<String>,
    pub billable: Option<bool>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &TimeEntry) -> bool {
        let matches_user = self
            .user_id
            .as_ref()
            .map_or(true, |user_id| *user_id == entry.user_id);
        let matches_billable = self
            .billable
            .map_or(true, |billable| billable == entry.billable);
        matches_user && matches_billable
    }
}

/// 集計期間ごとの時間の集計結果。
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_hours: f64,
    pub billable_hours: f64,
    pub non_billable_hours: f64,
    /// 合計時間に占める請求可能時間の割合（%）。
    pub billable_rate: f64,
    pub entry_count: usize,
    /// 不正な形式のため集計しなかったレコード数。
    pub skipped_count: usize,
}

/// 丸める前の秒単位の合計。
#[derive(Clone, Copy, Debug, Default)]
struct Totals {
    billable_seconds: i64,
    non_billable_seconds: i64,
    entry_count: usize,
}

impl Totals {
    fn add(&mut self, entry: &TimeEntry) {
        if entry.billable {
            self.billable_seconds = self.billable_seconds.saturating_add(entry.duration_seconds);
        } else {
            self.non_billable_seconds = self
                .non_billable_seconds
                .saturating_add(entry.duration_seconds);
        }
        self.entry_count += 1;
    }

    fn into_summary(self, skipped_count: usize) -> Summary {
        let total_seconds = self
            .billable_seconds
            .saturating_add(self.non_billable_seconds);
        let billable_rate = if total_seconds > 0 {
            round2(self.billable_seconds as f64 * 100.0 / total_seconds as f64)
        } else {
            0.0
        };
        Summary {
            total_hours: round_hours(total_seconds),
            billable_hours: round_hours(self.billable_seconds),
            non_billable_hours: round_hours(self.non_billable_seconds),
            billable_rate,
            entry_count: self.entry_count,
            skipped_count,
        }
    }
}

/// 秒を時間に変換し、小数第2位に丸める。
///
/// 丸めは合計に対してのみ行い、エントリーごとには丸めない。
pub fn round_hours(seconds: i64) -> f64 {
    round_centi_hours(seconds, 3600)
}

/// ミリ秒を時間に変換し、小数第2位に丸める。
pub fn round_millis_to_hours(millis: i64) -> f64 {
    round_centi_hours(millis, 3_600_000)
}

// 整数のまま四捨五入して浮動小数点の誤差を避ける。溢れる場合だけf64で丸める
fn round_centi_hours(amount: i64, per_hour: i64) -> f64 {
    amount
        .checked_mul(100)
        .and_then(|centi| centi.checked_add(per_hour / 2))
        .map(|centi| centi.div_euclid(per_hour) as f64 / 100.0)
        .unwrap_or_else(|| round2(amount as f64 / per_hour as f64))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 保存されたレコードを検証し、正しいエントリーと読み飛ばした件数を返す。
///
/// 不正なレコードは集計全体を失敗させず、警告を出して件数だけ数える。
pub fn valid_entries(records: &[StoredTimeEntry]) -> (Vec<TimeEntry>, usize) {
    records
        .iter()
        .fold((Vec::new(), 0), |(mut entries, skipped), record| {
            match TimeEntry::try_from(record) {
                Ok(entry) => {
                    entries.push(entry);
                    (entries, skipped)
                }
                Err(e) => {
                    warn!("Skipping record: {}", e);
                    (entries, skipped + 1)
                }
            }
        })
}

/// 集計期間内のエントリーの時間を集計する。
///
/// # Arguments
///
/// * `records` - 保存されたタイムエントリー
/// * `bucket` - 集計期間
/// * `filter` - ユーザー、請求可否の絞り込み条件
pub fn aggregate(records: &[StoredTimeEntry], bucket: &Bucket, filter: &EntryFilter) -> Summary {
    let (entries, skipped) = valid_entries(records);

    entries
        .iter()
        .filter(|entry| filter.matches(entry) && in_bucket(entry.date, bucket))
        .fold(Totals::default(), |mut totals, entry| {
            totals.add(entry);
            totals
        })
        .into_summary(skipped)
}

/// ユーザーごとの集計結果。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserSummaries {
    pub by_user: BTreeMap<String, Summary>,
    pub skipped_count: usize,
}

/// 集計期間内のエントリーの時間をユーザーごとに集計する。
///
/// 読み飛ばした件数は各ユーザーではなく全体で1回だけ数える。
pub fn aggregate_by_user(
    records: &[StoredTimeEntry],
    bucket: &Bucket,
    filter: &EntryFilter,
) -> UserSummaries {
    let (entries, skipped) = valid_entries(records);

    let totals: BTreeMap<String, Totals> = entries
        .iter()
        .filter(|entry| filter.matches(entry) && in_bucket(entry.date, bucket))
        .fold(BTreeMap::new(), |mut acc, entry| {
            acc.entry(entry.user_id.clone())
                .or_default()
                .add(entry);
            acc
        });

    UserSummaries {
        by_user: totals
            .into_iter()
            .map(|(user_id, totals)| (user_id, totals.into_summary(0)))
            .collect(),
        skipped_count: skipped,
    }
}
