use chrono::{DateTime, NaiveDateTime, Utc};
use openssl::x509::X509;
use thiserror::Error;

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(#[from] openssl::error::ErrorStack),
    #[error("Failed to parse expiration time: {0}")]
    ExpirationTimeParseError(String),
}

/// 自定義結果型別，錯誤類型為 `CertificateError`
type Result<T> = std::result::Result<T, CertificateError>;

/// OpenSSL 以文字輸出 ASN.1 時間的格式，例如 `Dec 12 23:38:45 2022 GMT`。
const OPENSSL_TIME_FORMAT: &str = "%b %d %H:%M:%S%.f %Y GMT";

const PEM_ARMOR: &[u8] = b"-----BEGIN";

/// X.509 證書封裝結構，提供解析與到期時間讀取功能
pub struct Certificate {
    /// 內部使用的 X509 證書對象
    pub cert: X509,
}

impl Certificate {
    /// 根據傳入的 PEM 格式字串解析生成 X.509 證書，若格式錯誤將回傳對應錯誤。
    pub fn new(pem: &str) -> Result<Self> {
        let cert = X509::from_pem(pem.as_bytes())?;
        Ok(Certificate { cert })
    }

    /// 從檔案內容建立證書。
    ///
    /// 內容含有 PEM 標頭時以 PEM 解析，否則視為 DER 編碼。
    ///
    /// # 參數
    ///
    /// - `bytes`: 證書檔案的原始位元組
    ///
    /// # 回傳
    ///
    /// 回傳封裝了 X.509 證書的 `Certificate` 實例，或錯誤類型 `CertificateError`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let is_pem = bytes
            .windows(PEM_ARMOR.len())
            .any(|window| window == PEM_ARMOR);

        let cert = if is_pem {
            X509::from_pem(bytes)?
        } else {
            X509::from_der(bytes)?
        };
        Ok(Certificate { cert })
    }

    /// 取得證書 "not valid after" 欄位的原始文字。
    pub fn not_after_text(&self) -> String {
        self.cert.not_after().to_string()
    }

    /// 取得證書的到期時間，並正規化為 UTC。
    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        parse_not_after(&self.not_after_text())
    }
}

/// 將 OpenSSL 文字格式的時間解析為 UTC 時間。
///
/// 個位數日期在 OpenSSL 輸出中以空白補齊（`Jan  5 ...`），解析前會先壓縮多餘空白。
///
/// # 參數
///
/// - `text`: 例如 `Dec 12 23:38:45 2022 GMT` 的時間字串
///
/// # 回傳
///
/// 成功回傳 `DateTime<Utc>`，格式不符則回傳 `CertificateError::ExpirationTimeParseError`
pub fn parse_not_after(text: &str) -> Result<DateTime<Utc>> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, OPENSSL_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| CertificateError::ExpirationTimeParseError(format!("{}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const TEST_CERT: &str = include_str!("testdata/cert.pem");

    fn expected_not_after() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 12, 12, 23, 38, 45).unwrap()
    }

    #[test]
    fn test_not_after_from_pem() {
        let cert = Certificate::new(TEST_CERT).unwrap();
        assert_eq!(cert.not_after_text(), "Dec 12 23:38:45 2022 GMT");
        assert_eq!(cert.not_after().unwrap(), expected_not_after());
    }

    #[test]
    fn test_not_after_from_der() {
        let der = Certificate::new(TEST_CERT).unwrap().cert.to_der().unwrap();
        let cert = Certificate::from_bytes(&der).unwrap();
        assert_eq!(cert.not_after().unwrap(), expected_not_after());
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(matches!(
            Certificate::from_bytes(b"not a certificate"),
            Err(CertificateError::ParseError(_))
        ));
        assert!(matches!(
            Certificate::from_bytes(b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"),
            Err(CertificateError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_not_after_space_padded_day() {
        let parsed = parse_not_after("Jan  5 08:00:00 2030 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2030, 1, 5, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_not_after_invalid() {
        assert!(matches!(
            parse_not_after("2022-12-12T23:38:45Z"),
            Err(CertificateError::ExpirationTimeParseError(_))
        ));
    }
}
