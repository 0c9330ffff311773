//! # X.509 Certificate Expiration Checker
//!
//! 本庫計算 X.509 憑證距離到期還剩幾天，憑證可來自本地檔案或遠端主機的 TLS 交握，
//! 並提供單次檢查與持續監控兩種模式。
//!
//! - **extractor**: 從 [`source::CertificateSource`] 取得憑證的到期時間，檔案支援 PEM 與 DER，
//!   主機透過 [`handshake::TlsHandshake`] 取得葉憑證（不驗證憑證鏈）。
//! - **expiration**: 以向下取整的方式計算剩餘天數，負值代表已過期。
//! - **runner**: 單次檢查並對應到行程結束碼。
//! - **monitor**: 以固定間隔持續檢查，過期時透過 [`notifier::NotifierT`] 送出通知，
//!   可由 [`cancel::CancellationToken`] 隨時停止。
//! - **status**: 將每輪結果發佈給輸出、共享狀態或 JSON 檔案。
//!
//! ## 示例
//!
//! ```no_run
//! use certchecker::{
//!     expiration::SystemClock, extractor::Extractor, runner::check_once,
//!     source::CertificateSource,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = CertificateSource::host("example.com", 443);
//!     let report = check_once(&Extractor::new(), &source, &SystemClock)?;
//!     println!("{} expires in {} days", report.identifier, report.days_remaining);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod certificate;
pub mod expiration;
pub mod extractor;
pub mod handshake;
pub mod monitor;
pub mod notifier;
pub mod runner;
pub mod source;
pub mod status;
