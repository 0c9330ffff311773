use chrono::{DateTime, Utc};

use crate::{
    expiration::{days_to_expiration, ClockT},
    extractor::{ExtractError, ExtractorT},
    source::CertificateSource,
};

/// 無法完成檢查時的行程結束碼，與「已過期」的 1 區分。
pub const FAILURE_EXIT_CODE: u8 = 2;

/// 單次檢查的結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
}

impl CheckReport {
    pub fn is_expired(&self) -> bool {
        self.days_remaining < 0
    }

    /// 行程結束碼：已過期為 1，否則為 0。檢查失敗時使用 [`FAILURE_EXIT_CODE`]。
    pub fn exit_code(&self) -> u8 {
        if self.is_expired() {
            1
        } else {
            0
        }
    }
}

/// 對來源進行一次檢查。擷取失敗時直接回傳錯誤，不重試。
pub fn check_once(
    extractor: &dyn ExtractorT,
    source: &CertificateSource,
    clock: &dyn ClockT,
) -> Result<CheckReport, ExtractError> {
    let expires_at = extractor.extract(source)?;
    Ok(CheckReport {
        identifier: source.identifier(),
        expires_at,
        days_remaining: days_to_expiration(expires_at, clock),
    })
}
