use std::{
    io,
    process::{Command, Stdio},
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::blocking::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use wait_timeout::ChildExt;

/// 傳送通知時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to run notify command: {0}")]
    Command(#[from] io::Error),
    #[error("Notify command exited with {0}")]
    CommandStatus(std::process::ExitStatus),
    #[error("Notify command did not finish within {0:?}")]
    CommandTimeout(Duration),
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Webhook returned status {status}: {body}")]
    WebhookStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Lock poisoned")]
    LockPoisoned,
}

type Result<T> = std::result::Result<T, NotifyError>;

/// 傳送人類可讀通知的行為。
pub trait NotifierT: Send + Sync {
    fn notify(&self, message: &str) -> Result<()>;
}

/// 送出通知並吞下錯誤；通知失敗只記錄警告，不影響呼叫者。
pub fn notify_best_effort(notifier: &dyn NotifierT, message: &str) {
    if let Err(e) = notifier.notify(message) {
        warn!("Failed to deliver notification {:?}: {}", message, e);
    }
}

/// 將通知寫入日誌。
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotifierT for LogNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        info!(target: "certchecker::notify", "{}", message);
        Ok(())
    }
}

/// 執行外部程式傳送通知，訊息作為最後一個參數，例如 `notify-send`。
///
/// 子行程的輸出會被丟棄；超過 `timeout` 仍未結束時會被終止。
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandNotifier {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// 從以空白分隔的命令列建立，例如 `"notify-send -u critical"`。
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl NotifierT for CommandNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        match child.wait_timeout(self.timeout)? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(NotifyError::CommandStatus(status)),
            None => {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill notify command {}: {}", self.program, e);
                }
                child.wait()?;
                Err(NotifyError::CommandTimeout(self.timeout))
            }
        }
    }
}

/// 以 HTTP POST 將通知送往 webhook，內容為 `{"text": ..., "source": "certchecker"}`。
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    const TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Self::TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl NotifierT for WebhookNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        let payload = json!({
            "source": env!("CARGO_PKG_NAME"),
            "text": message,
        });
        let response = self.client.post(&self.url).json(&payload).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::WebhookStatus {
                status,
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// 將同一則通知依序送往多個通道；任一通道失敗不影響其他通道，回傳第一個錯誤。
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn NotifierT>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl NotifierT + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl NotifierT for FanoutNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        let mut first_err = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(message) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// 模擬通知實作，記錄收到的訊息，通常用於測試。
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建立會記錄訊息但每次都回傳錯誤的模擬實作。
    pub fn failing() -> Self {
        Self {
            messages: Arc::default(),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl NotifierT for MockNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| NotifyError::LockPoisoned)?
            .push(message.to_owned());
        if self.fail {
            return Err(NotifyError::Command(io::Error::other(
                "mock notifier failure",
            )));
        }
        Ok(())
    }
}
