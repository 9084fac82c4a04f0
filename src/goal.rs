use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, EntryFilter};
use crate::bucket::{bucket_bounds, Timeframe};
use crate::time_entry::StoredTimeEntry;

/// 目標で追跡する値。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalMetric {
    BillableHours,
    TotalHours,
    Entries,
}

/// ユーザー（またはチーム全体）の目標。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    /// `None`の場合はチーム全体のエントリーを対象とする。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub title: String,
    pub frequency: Timeframe,
    pub metric: GoalMetric,
    pub target: f64,
}

/// 1つの目標の達成状況。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCompletion {
    pub goal_id: String,
    pub target: f64,
    pub current: f64,
    pub unit: Timeframe,
    pub completed: bool,
}

/// 達成済みの目標数と対象の目標数。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalCounts {
    pub completed: usize,
    pub total: usize,
    /// `"{completed}/{total}"`形式の表示用文字列。
    pub display: String,
}

impl GoalCounts {
    fn new(completed: usize, total: usize) -> Self {
        Self {
            completed,
            total,
            display: format!("{}/{}", completed, total),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GoalReport {
    pub completions: Vec<GoalCompletion>,
    pub counts: GoalCounts,
}

/// 目標の達成状況を求める。
///
/// 現在値は`now`を含む、目標自身の頻度の集計期間で測る。
pub fn goal_completion(
    goal: &Goal,
    records: &[StoredTimeEntry],
    now: DateTime<Local>,
) -> GoalCompletion {
    let bucket = bucket_bounds(now, goal.frequency);
    let filter = EntryFilter {
        user_id: goal.user_id.clone(),
        billable: None,
    };
    let summary = aggregate(records, &bucket, &filter);
    let current = match goal.metric {
        GoalMetric::BillableHours => summary.billable_hours,
        GoalMetric::TotalHours => summary.total_hours,
        GoalMetric::Entries => summary.entry_count as f64,
    };

    GoalCompletion {
        goal_id: goal.id.clone(),
        target: goal.target,
        current,
        unit: goal.frequency,
        completed: current >= goal.target,
    }
}

/// 表示単位`view`に含まれる目標の達成状況をまとめる。
///
/// 日次の目標はすべての表示に含まれ、週次は週以上、月次は月以上、年次は年のみに含まれる。
pub fn goal_counts(
    goals: &[Goal],
    records: &[StoredTimeEntry],
    view: Timeframe,
    now: DateTime<Local>,
) -> GoalReport {
    let completions: Vec<GoalCompletion> = goals
        .iter()
        .filter(|goal| view.includes(goal.frequency))
        .map(|goal| goal_completion(goal, records, now))
        .collect();
    let completed = completions.iter().filter(|c| c.completed).count();
    let counts = GoalCounts::new(completed, completions.len());

    GoalReport {
        completions,
        counts,
    }
}
