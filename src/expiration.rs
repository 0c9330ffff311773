use chrono::{DateTime, TimeDelta, Utc};

/// 一天的秒數。
const SECONDS_PER_DAY: i64 = 86_400;

/// 提供「現在」時間的行為，讓到期計算可在測試中注入固定時間。
pub trait ClockT: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 讀取系統時間的時鐘。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockT for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 永遠回傳同一時間的時鐘，通常用於測試。
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl ClockT for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 計算從 `now` 到 `expires_at` 剩餘的整天數。
///
/// 以秒為單位向負無限大取整：不足一天回傳 0，已過期 12 天 6 小時回傳 -13 而非 -12。
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = expires_at - now;
    // num_seconds 向零截斷，負值帶有小數秒時需再減一秒。
    let mut seconds = delta.num_seconds();
    if delta < TimeDelta::seconds(seconds) {
        seconds -= 1;
    }
    seconds.div_euclid(SECONDS_PER_DAY)
}

/// 以指定時鐘的目前時間計算剩餘天數。
pub fn days_to_expiration(expires_at: DateTime<Utc>, clock: &dyn ClockT) -> i64 {
    days_remaining(expires_at, clock.now())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_less_than_a_day_is_zero() {
        for delta in [
            TimeDelta::seconds(1),
            TimeDelta::hours(1),
            TimeDelta::hours(12),
            TimeDelta::hours(24) - TimeDelta::seconds(1),
        ] {
            assert_eq!(days_remaining(now() + delta, now()), 0, "delta {}", delta);
        }
    }

    #[test]
    fn test_seven_days_one_hour() {
        let expires_at = now() + TimeDelta::days(7) + TimeDelta::hours(1);
        assert_eq!(days_remaining(expires_at, now()), 7);
    }

    #[test]
    fn test_past_expiration_floors() {
        let expires_at = now() - TimeDelta::days(12) - TimeDelta::hours(6);
        assert_eq!(days_remaining(expires_at, now()), -13);
        assert_eq!(days_remaining(now() - TimeDelta::seconds(1), now()), -1);
        assert_eq!(days_remaining(now() - TimeDelta::days(3), now()), -3);
    }

    #[test]
    fn test_sub_second_past_expiration_is_expired() {
        let expires_at = Utc.with_ymd_and_hms(2022, 12, 12, 23, 38, 45).unwrap();
        for delta in [
            TimeDelta::nanoseconds(1),
            TimeDelta::milliseconds(300),
            TimeDelta::seconds(1) + TimeDelta::milliseconds(500),
        ] {
            assert_eq!(days_remaining(expires_at, expires_at + delta), -1, "delta {}", delta);
        }
        assert_eq!(
            days_remaining(expires_at, expires_at - TimeDelta::milliseconds(300)),
            0
        );
        assert_eq!(
            days_remaining(
                expires_at,
                expires_at + TimeDelta::days(1) + TimeDelta::milliseconds(1)
            ),
            -2
        );
    }

    #[test]
    fn test_exact_boundaries() {
        assert_eq!(days_remaining(now(), now()), 0);
        assert_eq!(days_remaining(now() + TimeDelta::days(1), now()), 1);
    }

    #[test]
    fn test_days_to_expiration_uses_clock() {
        let clock = FixedClock(now());
        let expires_at = now() + TimeDelta::days(30);
        assert_eq!(days_to_expiration(expires_at, &clock), 30);
    }
}
