use chrono::{DateTime, Utc};
use thiserror::Error;

/// 時間計算エンジンが返すエラー。
///
/// 呼び出し側（コマンド層）でユーザー向けのメッセージに変換する。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("End {end} is not after start {start}")]
    NonPositiveDuration {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("Unsupported timeframe: {0}")]
    UnsupportedUnit(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
