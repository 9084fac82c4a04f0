use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use log::LevelFilter;

const DATA_DIR_ENV: &str = "BILLABLES_DATA_DIR";
const LOG_LEVEL_ENV: &str = "BILLABLES_LOG";
const APP_DIR_NAME: &str = "billables";

/// アプリケーションの設定。
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_level: LevelFilter,
}

impl Config {
    /// 環境変数から設定を読み込む。
    ///
    /// `BILLABLES_DATA_DIR`が設定されていない場合はOSのデータディレクトリ配下を使う。
    /// `BILLABLES_LOG`が設定されていない場合は`info`とする。
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::var(DATA_DIR_ENV).ok(), env::var(LOG_LEVEL_ENV).ok())
    }

    fn from_vars(data_dir: Option<String>, log_level: Option<String>) -> Result<Self> {
        let data_dir = match data_dir.filter(|dir| !dir.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("Failed to find the data directory, set BILLABLES_DATA_DIR")?
                .join(APP_DIR_NAME),
        };
        let log_level = match log_level {
            Some(level) => LevelFilter::from_str(level.trim())
                .map_err(|_| anyhow!("Invalid {}: {}", LOG_LEVEL_ENV, level))?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            data_dir,
            log_level,
        })
    }

    /// コマンドライン引数で設定を上書きする。
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, verbose: bool) -> Self {
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        if verbose {
            self.log_level = self.log_level.max(LevelFilter::Debug);
        }
        self
    }
}
