use std::{fmt, path::PathBuf};

use thiserror::Error;

/// 建立或驗證憑證來源時可能發生的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("At least one of --file or --host is required")]
    Missing,
    #[error("Only one of --file or --host may be given")]
    Ambiguous,
    #[error("Certificate file path is empty")]
    EmptyPath,
    #[error("Hostname is empty")]
    EmptyHostname,
    #[error("Port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),
}

type Result<T> = std::result::Result<T, SourceError>;

/// HTTPS 預設連接埠。
pub const DEFAULT_PORT: u16 = 443;

/// 要檢查的憑證來源，只能是本地檔案或遠端主機其中之一。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// 本地 PEM 或 DER 格式的憑證檔案。
    File { path: PathBuf },
    /// 透過 TLS 交握取得憑證的遠端主機。
    Host { hostname: String, port: u16 },
}

impl CertificateSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn host(hostname: impl Into<String>, port: u16) -> Self {
        Self::Host {
            hostname: hostname.into(),
            port,
        }
    }

    /// 根據命令列的可選參數建立來源。
    ///
    /// `file` 與 `host` 必須恰好提供一個；`port` 只在指定主機時使用。
    ///
    /// # 回傳
    ///
    /// 成功時回傳已通過 [`CertificateSource::validate`] 的來源，否則回傳 `SourceError`。
    pub fn from_parts(
        file: Option<PathBuf>,
        host: Option<String>,
        port: Option<u16>,
    ) -> Result<Self> {
        let source = match (file, host) {
            (Some(path), None) => Self::File { path },
            (None, Some(hostname)) => Self::Host {
                hostname,
                port: port.unwrap_or(DEFAULT_PORT),
            },
            (Some(_), Some(_)) => return Err(SourceError::Ambiguous),
            (None, None) => return Err(SourceError::Missing),
        };
        source.validate()?;
        Ok(source)
    }

    /// 檢查來源的形狀是否合法，此方法不會進行任何 I/O。
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::File { path } if path.as_os_str().is_empty() => Err(SourceError::EmptyPath),
            Self::Host { hostname, .. } if hostname.trim().is_empty() => {
                Err(SourceError::EmptyHostname)
            }
            Self::Host { port: 0, .. } => Err(SourceError::InvalidPort(0)),
            _ => Ok(()),
        }
    }

    /// 用於輸出與通知的識別字串：檔案為其路徑，主機為 `hostname:port`。
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "{}", path.display()),
            Self::Host { hostname, port } => write!(f, "{}:{}", hostname, port),
        }
    }
}
