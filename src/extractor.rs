//! 從憑證來源取得到期時間。
//!
//! 檔案來源直接讀取 PEM/DER 內容；主機來源透過 [`HandshakeT`] 進行 TLS 交握取得葉憑證。
//! 兩種來源取得的到期時間都以相同方式正規化為 UTC。每次呼叫都重新讀取，不做快取。

use std::{fs, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
    certificate::{parse_not_after, Certificate, CertificateError},
    handshake::{HandshakeError, HandshakeT, TlsHandshake},
    source::{CertificateSource, SourceError},
};

/// 取得憑證到期時間時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 來源形狀不合法，尚未進行任何 I/O。
    #[error("Invalid certificate source: {0}")]
    InvalidSource(#[from] SourceError),
    /// 檔案無法讀取，或網路連線與交握失敗。
    #[error("Source {identifier} unavailable: {reason}")]
    SourceUnavailable { identifier: String, reason: String },
    /// 取得了資料但無法解析為憑證或到期時間。
    #[error("Malformed certificate from {identifier}: {reason}")]
    MalformedCertificate { identifier: String, reason: String },
}

impl ExtractError {
    fn unavailable(source: &CertificateSource, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            identifier: source.identifier(),
            reason: reason.to_string(),
        }
    }

    fn malformed(source: &CertificateSource, err: CertificateError) -> Self {
        Self::MalformedCertificate {
            identifier: source.identifier(),
            reason: err.to_string(),
        }
    }
}

type Result<T> = std::result::Result<T, ExtractError>;

/// 取得憑證到期時間的行為。
pub trait ExtractorT: Send + Sync {
    fn extract(&self, source: &CertificateSource) -> Result<DateTime<Utc>>;
}

/// 預設的到期時間擷取器。
pub struct Extractor {
    handshake: Box<dyn HandshakeT>,
}

impl Extractor {
    /// 建立使用 OpenSSL 交握與預設逾時的擷取器。
    pub fn new() -> Self {
        Self::with_handshake(TlsHandshake::default())
    }

    /// 建立交握逾時為 `timeout` 的擷取器。
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_handshake(TlsHandshake::new(timeout))
    }

    /// 使用指定的交握實作建立擷取器，例如測試用的 `MockHandshake`。
    pub fn with_handshake(handshake: impl HandshakeT + 'static) -> Self {
        Self {
            handshake: Box::new(handshake),
        }
    }

    fn from_file(&self, source: &CertificateSource, path: &Path) -> Result<DateTime<Utc>> {
        let bytes = fs::read(path).map_err(|e| ExtractError::unavailable(source, e))?;
        debug!("read {} bytes from {}", bytes.len(), path.display());

        Certificate::from_bytes(&bytes)
            .and_then(|cert| cert.not_after())
            .map_err(|e| ExtractError::malformed(source, e))
    }

    fn from_host(
        &self,
        source: &CertificateSource,
        hostname: &str,
        port: u16,
    ) -> Result<DateTime<Utc>> {
        let text = self
            .handshake
            .peer_not_after(hostname, port)
            .map_err(|e: HandshakeError| ExtractError::unavailable(source, e))?;
        debug!("{}:{} presented certificate valid until {}", hostname, port, text);

        parse_not_after(&text).map_err(|e| ExtractError::malformed(source, e))
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorT for Extractor {
    fn extract(&self, source: &CertificateSource) -> Result<DateTime<Utc>> {
        source.validate()?;

        match source {
            CertificateSource::File { path } => self.from_file(source, path),
            CertificateSource::Host { hostname, port } => self.from_host(source, hostname, *port),
        }
    }
}
