//! Per-recipient send limits.
//!
//! Fixed hourly and daily windows per recipient, kept in process memory.
//! A send first takes a [`Reservation`], which counts against both windows
//! under a single lock; if the provider then refuses the message the
//! reservation is released so failed sends do not consume quota.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(86_400);

/// Minimum time between sweeps of idle recipients.
const SWEEP_INTERVAL: Duration = HOUR;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitExceeded {
    #[error("Hourly limit ({0}) exceeded")]
    Hourly(u32),

    #[error("Daily limit ({0}) exceeded")]
    Daily(u32),
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { started: now, count: 0 }
    }

    /// Count within the window, or zero once it has elapsed.
    fn current(&self, now: Instant, length: Duration) -> u32 {
        if now.duration_since(self.started) >= length {
            0
        } else {
            self.count
        }
    }

    fn bump(&mut self, now: Instant, length: Duration) {
        if now.duration_since(self.started) >= length {
            *self = Self::new(now);
        }
        self.count += 1;
    }

    /// Undo a bump made at `at`, unless the window has since restarted.
    fn unbump(&mut self, at: Instant) {
        if self.started <= at {
            self.count = self.count.saturating_sub(1);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    hourly: Window,
    daily: Window,
}

impl Usage {
    fn new(now: Instant) -> Self {
        Self {
            hourly: Window::new(now),
            daily: Window::new(now),
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.hourly.current(now, HOUR) == 0 && self.daily.current(now, DAY) == 0
    }
}

struct UsageTable {
    entries: HashMap<String, Usage>,
    last_sweep: Instant,
}

impl UsageTable {
    /// Drop recipients with nothing counted in either window.
    fn sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, usage| !usage.is_idle(now));
        self.last_sweep = now;
        debug!(removed = before - self.entries.len(), "rate_limit_sweep");
    }
}

/// One counted send, to be released if the send does not go through.
#[derive(Debug)]
#[must_use = "release the reservation when the send fails"]
pub struct Reservation {
    recipient: String,
    at: Instant,
}

pub struct RateLimiter {
    per_hour: u32,
    per_day: u32,
    usage: Mutex<UsageTable>,
}

impl RateLimiter {
    /// A limit of zero disables that window.
    pub fn new(per_hour: u32, per_day: u32) -> Self {
        Self {
            per_hour,
            per_day,
            usage: Mutex::new(UsageTable {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Count a send against the recipient's windows, or refuse it.
    pub async fn reserve(&self, recipient: &str) -> Result<Reservation, RateLimitExceeded> {
        self.reserve_at(recipient, Instant::now()).await
    }

    /// Give back a reservation whose send failed.
    pub async fn release(&self, reservation: Reservation) {
        let mut usage = self.usage.lock().await;
        if let Some(entry) = usage.entries.get_mut(&reservation.recipient) {
            entry.hourly.unbump(reservation.at);
            entry.daily.unbump(reservation.at);
        }
    }

    async fn reserve_at(&self, recipient: &str, now: Instant) -> Result<Reservation, RateLimitExceeded> {
        let reservation = Reservation {
            recipient: recipient.to_string(),
            at: now,
        };
        if self.per_hour == 0 && self.per_day == 0 {
            return Ok(reservation);
        }

        let mut usage = self.usage.lock().await;
        usage.sweep(now);

        if let Some(entry) = usage.entries.get(recipient) {
            if self.per_hour > 0 && entry.hourly.current(now, HOUR) >= self.per_hour {
                warn!(limit = self.per_hour, "rate_limit_hourly_exceeded");
                return Err(RateLimitExceeded::Hourly(self.per_hour));
            }
            if self.per_day > 0 && entry.daily.current(now, DAY) >= self.per_day {
                warn!(limit = self.per_day, "rate_limit_daily_exceeded");
                return Err(RateLimitExceeded::Daily(self.per_day));
            }
        }

        let entry = usage
            .entries
            .entry(recipient.to_string())
            .or_insert_with(|| Usage::new(now));
        entry.hourly.bump(now, HOUR);
        entry.daily.bump(now, DAY);

        Ok(reservation)
    }

    /// Sends currently counted in the recipient's hourly window.
    #[cfg(test)]
    pub(crate) async fn hourly_count(&self, recipient: &str) -> u32 {
        let usage = self.usage.lock().await;
        usage
            .entries
            .get(recipient)
            .map(|u| u.hourly.current(Instant::now(), HOUR))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHONE: &str = "+15615551234";

    async fn entries(limiter: &RateLimiter) -> usize {
        limiter.usage.lock().await.entries.len()
    }

    #[tokio::test]
    async fn test_hourly_limit() {
        let limiter = RateLimiter::new(2, 30);
        let t0 = Instant::now();

        assert!(limiter.reserve_at(PHONE, t0).await.is_ok());
        assert!(limiter.reserve_at(PHONE, t0).await.is_ok());
        assert_eq!(
            limiter.reserve_at(PHONE, t0).await.unwrap_err(),
            RateLimitExceeded::Hourly(2)
        );

        // other recipients are unaffected
        assert!(limiter.reserve_at("+15550000000", t0).await.is_ok());

        // the window resets after an hour
        assert!(limiter.reserve_at(PHONE, t0 + HOUR).await.is_ok());
    }

    #[tokio::test]
    async fn test_daily_limit_survives_hourly_reset() {
        let limiter = RateLimiter::new(2, 3);
        let t0 = Instant::now();

        let _ = limiter.reserve_at(PHONE, t0).await.unwrap();
        let _ = limiter.reserve_at(PHONE, t0).await.unwrap();
        let t1 = t0 + HOUR;
        let _ = limiter.reserve_at(PHONE, t1).await.unwrap();

        assert_eq!(
            limiter.reserve_at(PHONE, t1).await.unwrap_err(),
            RateLimitExceeded::Daily(3)
        );
        assert!(limiter.reserve_at(PHONE, t0 + DAY).await.is_ok());
    }

    #[tokio::test]
    async fn test_refused_reservation_counts_nothing() {
        let limiter = RateLimiter::new(1, 30);
        let t0 = Instant::now();

        let _ = limiter.reserve_at(PHONE, t0).await.unwrap();
        for _ in 0..5 {
            assert!(limiter.reserve_at(PHONE, t0).await.is_err());
        }
        let usage = limiter.usage.lock().await;
        assert_eq!(usage.entries[PHONE].daily.count, 1);
    }

    #[tokio::test]
    async fn test_release_returns_quota() {
        let limiter = RateLimiter::new(1, 30);
        let t0 = Instant::now();

        let reservation = limiter.reserve_at(PHONE, t0).await.unwrap();
        assert!(limiter.reserve_at(PHONE, t0).await.is_err());

        limiter.release(reservation).await;
        assert!(limiter.reserve_at(PHONE, t0).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_after_window_restart_keeps_new_count() {
        let limiter = RateLimiter::new(1, 30);
        let t0 = Instant::now();

        let stale = limiter.reserve_at(PHONE, t0).await.unwrap();
        let _ = limiter.reserve_at(PHONE, t0 + HOUR).await.unwrap();

        // the stale reservation belongs to the previous hourly window
        limiter.release(stale).await;
        assert_eq!(
            limiter.reserve_at(PHONE, t0 + HOUR).await.unwrap_err(),
            RateLimitExceeded::Hourly(1)
        );
    }

    #[tokio::test]
    async fn test_concurrent_reservations_respect_limit() {
        let limiter = std::sync::Arc::new(RateLimiter::new(2, 30));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.reserve(PHONE).await.is_ok() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 2);
    }

    #[tokio::test]
    async fn test_idle_recipients_are_swept() {
        let limiter = RateLimiter::new(10, 30);
        let t0 = Instant::now();

        for i in 0..1000 {
            let _ = limiter.reserve_at(&format!("+1555{i:07}"), t0).await.unwrap();
        }
        assert_eq!(entries(&limiter).await, 1000);

        let _ = limiter.reserve_at(PHONE, t0 + DAY + HOUR).await.unwrap();
        assert_eq!(entries(&limiter).await, 1);
    }

    #[tokio::test]
    async fn test_active_recipients_survive_sweep() {
        let limiter = RateLimiter::new(10, 30);
        let t0 = Instant::now();

        let _ = limiter.reserve_at("+15550000001", t0).await.unwrap();
        let _ = limiter.reserve_at("+15550000002", t0 + HOUR).await.unwrap();

        // first recipient is idle a day later, second still has daily usage
        let _ = limiter.reserve_at(PHONE, t0 + DAY).await.unwrap();
        let usage = limiter.usage.lock().await;
        assert!(!usage.entries.contains_key("+15550000001"));
        assert!(usage.entries.contains_key("+15550000002"));
    }

    #[tokio::test]
    async fn test_zero_disables() {
        let limiter = RateLimiter::new(0, 0);
        let t0 = Instant::now();
        for _ in 0..100 {
            assert!(limiter.reserve_at(PHONE, t0).await.is_ok());
        }
        assert_eq!(entries(&limiter).await, 0);
    }

    #[test]
    fn test_message_format() {
        assert_eq!(RateLimitExceeded::Hourly(10).to_string(), "Hourly limit (10) exceeded");
    }
}
