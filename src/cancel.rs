use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

/// 可跨執行緒共享的取消旗標。
///
/// 監控排程只在 [`CancellationToken::wait_timeout`] 中等待，取消會立即喚醒等待者。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定取消旗標並喚醒所有等待中的執行緒。
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        // 旗標只會由 false 變為 true，鎖中毒時仍可安全寫入
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 最多等待 `timeout`；在期間內被取消則提早回傳 `true`。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());

        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            cancelled = cvar
                .wait_timeout(cancelled, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_wait_times_out_when_not_cancelled() {
        let token = CancellationToken::new();
        let started = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_cancel_wakes_waiter_promptly() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(60)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_already_cancelled_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.wait_timeout(Duration::from_secs(60)));
    }
}
