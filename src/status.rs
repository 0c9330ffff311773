//! 檢查結果的發佈端。
//!
//! 監控排程每完成一輪檢查便將 [`StatusEntry`] 發佈給所有 [`StatusSinkT`]。
//! [`StatusBoard`] 保存每個識別字串的最新結果，可在其他執行緒同時讀取。

use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// 發佈檢查結果時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Lock poisoned")]
    LockPoisoned,
}

type Result<T> = std::result::Result<T, StatusError>;

/// 單一來源最近一次成功檢查的結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub identifier: String,
    pub days_remaining: i64,
    pub expires_at: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}

/// 接收檢查結果的行為。
pub trait StatusSinkT: Send + Sync {
    fn publish(&self, entry: &StatusEntry) -> Result<()>;
}

/// 以識別字串為鍵保存最新結果的共享狀態。
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    entries: Arc<RwLock<BTreeMap<String, StatusEntry>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得所有來源的最新結果，依識別字串排序。
    pub fn snapshot(&self) -> Result<Vec<StatusEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StatusError::LockPoisoned)?
            .values()
            .cloned()
            .collect())
    }

    pub fn get(&self, identifier: &str) -> Result<Option<StatusEntry>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StatusError::LockPoisoned)?
            .get(identifier)
            .cloned())
    }
}

impl StatusSinkT for StatusBoard {
    fn publish(&self, entry: &StatusEntry) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| StatusError::LockPoisoned)?
            .insert(entry.identifier.clone(), entry.clone());
        Ok(())
    }
}

/// 每則結果輸出一行 `<identifier> <days>`。
#[derive(Debug)]
pub struct LineSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.out.into_inner().map_err(|_| StatusError::LockPoisoned)
    }
}

impl LineSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> StatusSinkT for LineSink<W> {
    fn publish(&self, entry: &StatusEntry) -> Result<()> {
        let mut out = self.out.lock().map_err(|_| StatusError::LockPoisoned)?;
        writeln!(out, "{} {}", entry.identifier, entry.days_remaining)?;
        out.flush()?;
        Ok(())
    }
}

/// 將所有最新結果以 JSON 陣列寫入檔案，供外部狀態頁面讀取。
///
/// 先寫入同目錄下的暫存檔再改名，讀取端不會看到寫到一半的內容。
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    board: StatusBoard,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>, board: StatusBoard) -> Self {
        Self {
            path: path.into(),
            board,
        }
    }

    fn write_snapshot(&self, entries: &[StatusEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, entries)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StatusSinkT for JsonFileSink {
    fn publish(&self, entry: &StatusEntry) -> Result<()> {
        self.board.publish(entry)?;
        self.write_snapshot(&self.board.snapshot()?)
    }
}
