//! 持續監控模式。
//!
//! [`Monitor::run`] 以固定間隔重複「擷取到期時間 → 計算剩餘天數」，直到取消為止：
//!
//! 1. 啟動時送出 `Started daemon.` 通知，第一輪檢查立即執行。
//! 2. 每輪開始時先排定下一輪時間（現在 + 間隔），再進行任何 I/O。
//! 3. 成功時更新狀態並發佈結果；剩餘天數為負時送出過期通知。
//! 4. 擷取失敗不會終止迴圈，下一輪照常執行。
//!
//! 迴圈只在 [`CancellationToken::wait_timeout`] 中等待，取消後不再執行尚未開始的檢查，
//! 也不送出最後通知。

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::{
    cancel::CancellationToken,
    expiration::{days_remaining, ClockT, SystemClock},
    extractor::{ExtractError, ExtractorT},
    notifier::{notify_best_effort, LogNotifier, NotifierT},
    source::CertificateSource,
    status::{StatusEntry, StatusSinkT},
};

/// 監控啟動時送出的通知內容。
pub const STARTED_MESSAGE: &str = "Started daemon.";

/// 持續監控的設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// 兩輪檢查開始時間的間隔。
    pub interval: Duration,
    /// 連續失敗達到此次數時送出一次失敗通知；`None` 表示只記錄日誌。
    pub failure_alert_threshold: Option<u32>,
}

impl MonitorConfig {
    /// 預設的檢查間隔。
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            failure_alert_threshold: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 設定連續失敗通知的門檻，0 視為停用。
    pub fn failure_alert_threshold(mut self, threshold: u32) -> Self {
        self.failure_alert_threshold = (threshold > 0).then_some(threshold);
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 監控執行期間的狀態。
#[derive(Debug, Clone)]
pub struct MonitorState {
    /// 被監控的來源。
    pub source: CertificateSource,
    /// 最近一次成功計算的剩餘天數。
    pub last_days: Option<i64>,
    /// 下一輪預定開始的時間。
    pub next_wake: Option<DateTime<Utc>>,
    /// 目前連續失敗的次數，成功後歸零。
    pub consecutive_failures: u32,
}

impl MonitorState {
    fn new(source: CertificateSource) -> Self {
        Self {
            source,
            last_days: None,
            next_wake: None,
            consecutive_failures: 0,
        }
    }
}

/// 單輪檢查的結果。
#[derive(Debug)]
pub enum CycleOutcome {
    Valid(i64),
    Expired(i64),
    Failed(ExtractError),
}

/// 持續監控單一憑證來源的排程器。
pub struct Monitor {
    config: MonitorConfig,
    extractor: Box<dyn ExtractorT>,
    notifier: Box<dyn NotifierT>,
    sinks: Vec<Box<dyn StatusSinkT>>,
    clock: Box<dyn ClockT>,
    state: MonitorState,
}

impl Monitor {
    pub fn builder(
        source: CertificateSource,
        extractor: impl ExtractorT + 'static,
    ) -> MonitorBuilder {
        MonitorBuilder::new(source, extractor)
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// 執行監控迴圈，直到 `token` 被取消才回傳。
    pub fn run(&mut self, token: &CancellationToken) {
        info!(
            "Monitoring {} every {:?}",
            self.state.source, self.config.interval
        );
        notify_best_effort(self.notifier.as_ref(), STARTED_MESSAGE);

        let mut next_tick = Instant::now();
        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            if token.wait_timeout(wait) {
                info!("Monitoring of {} cancelled", self.state.source);
                break;
            }

            next_tick = Instant::now() + self.config.interval;
            self.state.next_wake = TimeDelta::from_std(self.config.interval)
                .ok()
                .and_then(|interval| self.clock.now().checked_add_signed(interval));

            let outcome = self.run_cycle();
            debug!("cycle for {} finished: {:?}", self.state.source, outcome);
        }
    }

    /// 執行一輪檢查：擷取、計算、發佈結果並在需要時送出通知。
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let identifier = self.state.source.identifier();

        let expires_at = match self.extractor.extract(&self.state.source) {
            Ok(expires_at) => expires_at,
            Err(e) => return self.record_failure(&identifier, e),
        };

        let checked_at = self.clock.now();
        let days = days_remaining(expires_at, checked_at);
        self.state.last_days = Some(days);
        self.state.consecutive_failures = 0;

        let entry = StatusEntry {
            identifier: identifier.clone(),
            days_remaining: days,
            expires_at,
            checked_at,
        };
        for sink in &self.sinks {
            if let Err(e) = sink.publish(&entry) {
                warn!("Failed to publish status of {}: {}", identifier, e);
            }
        }

        if days < 0 {
            notify_best_effort(
                self.notifier.as_ref(),
                &format!("The {} certificate has expired!", identifier),
            );
            CycleOutcome::Expired(days)
        } else {
            CycleOutcome::Valid(days)
        }
    }

    fn record_failure(&mut self, identifier: &str, err: ExtractError) -> CycleOutcome {
        self.state.consecutive_failures += 1;
        warn!(
            "Checking {} failed ({} in a row): {}",
            identifier, self.state.consecutive_failures, err
        );

        if Some(self.state.consecutive_failures) == self.config.failure_alert_threshold {
            notify_best_effort(
                self.notifier.as_ref(),
                &format!(
                    "Checking {} failed {} times in a row: {}",
                    identifier, self.state.consecutive_failures, err
                ),
            );
        }
        CycleOutcome::Failed(err)
    }
}

/// 用於構建 [`Monitor`] 的構造器。
///
/// 預設使用 [`LogNotifier`]、系統時鐘、[`MonitorConfig::default`]，且不發佈結果。
pub struct MonitorBuilder {
    source: CertificateSource,
    config: MonitorConfig,
    extractor: Box<dyn ExtractorT>,
    notifier: Box<dyn NotifierT>,
    sinks: Vec<Box<dyn StatusSinkT>>,
    clock: Box<dyn ClockT>,
}

impl MonitorBuilder {
    pub fn new(source: CertificateSource, extractor: impl ExtractorT + 'static) -> Self {
        Self {
            source,
            config: MonitorConfig::default(),
            extractor: Box::new(extractor),
            notifier: Box::new(LogNotifier),
            sinks: Vec::new(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(mut self, notifier: impl NotifierT + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// 新增一個結果發佈端，可多次呼叫。
    pub fn sink(mut self, sink: impl StatusSinkT + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn clock(mut self, clock: impl ClockT + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn build(self) -> Monitor {
        Monitor {
            config: self.config,
            extractor: self.extractor,
            notifier: self.notifier,
            sinks: self.sinks,
            clock: self.clock,
            state: MonitorState::new(self.source),
        }
    }
}
