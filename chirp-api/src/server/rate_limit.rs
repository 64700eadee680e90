use chirp_common::model::{Id, user::UserMarker};
use governor::{DefaultKeyedRateLimiter, Quota};
use std::{num::NonZeroU32, time::Duration};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_POSTS: NonZeroU32 = NonZeroU32::new(3).unwrap();
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
#[error("{max_posts} posts per {window:?} is not a usable rate limit")]
pub struct InvalidRateLimitError {
    max_posts: u32,
    window: Duration,
}

/// Per user post quota: a burst of `max_posts`, refilled evenly over `window`.
pub struct RateLimiter {
    posts: DefaultKeyedRateLimiter<Id<UserMarker>>,
}

impl RateLimiter {
    pub fn new(max_posts: u32, window: Duration) -> Result<Self, InvalidRateLimitError> {
        let invalid = || InvalidRateLimitError { max_posts, window };
        let burst = NonZeroU32::new(max_posts).ok_or_else(invalid)?;
        let quota = Quota::with_period(window / max_posts)
            .ok_or_else(invalid)?
            .allow_burst(burst);

        Ok(Self::with_quota(quota))
    }

    fn with_quota(quota: Quota) -> Self {
        Self {
            posts: governor::RateLimiter::keyed(quota),
        }
    }

    /// Takes one post from the quota of `user`. Returns whether there was one left.
    pub fn check(&self, user: Id<UserMarker>) -> bool {
        let allowed = self.posts.check_key(&user).is_ok();
        if !allowed {
            debug!(%user, "Rate limited");
        }
        allowed
    }

    /// Forgets users whose quota is full again.
    pub fn retain_recent(&self) {
        self.posts.retain_recent();
        self.posts.shrink_to_fit();
    }

    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.posts.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_quota(Quota::per_minute(DEFAULT_MAX_POSTS))
    }
}

#[cfg(test)]
mod tests {
    use crate::server::rate_limit::RateLimiter;
    use std::time::Duration;

    #[test]
    fn fourth_post_in_the_window_is_refused() {
        let limiter = RateLimiter::default();
        let user = 1.into();

        assert!(limiter.check(user));
        assert!(limiter.check(user));
        assert!(limiter.check(user));
        assert!(!limiter.check(user));
    }

    #[test]
    fn quota_refills_over_the_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100)).unwrap();
        let user = 1.into();

        assert!(limiter.check(user));
        assert!(limiter.check(user));
        assert!(!limiter.check(user));

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check(user));
    }

    #[test]
    fn users_are_limited_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60)).unwrap();

        assert!(limiter.check(1.into()));
        assert!(!limiter.check(1.into()));
        assert!(limiter.check(2.into()));
    }

    #[test]
    fn users_with_a_full_quota_are_forgotten() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20)).unwrap();
        assert!(limiter.check(1.into()));
        assert_eq!(limiter.tracked_users(), 1);

        std::thread::sleep(Duration::from_millis(50));
        limiter.retain_recent();
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn empty_quotas_are_rejected() {
        assert!(RateLimiter::new(0, Duration::from_secs(60)).is_err());
        assert!(RateLimiter::new(3, Duration::ZERO).is_err());
    }
}
