//! Quota arithmetic: time-based refills, consumption and warnings.
//!
//! Persistence is the repository's job; everything here is pure so the
//! rules can be exercised without a database.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::defaults::QUOTA_WARNING_THRESHOLD;
use crate::models::{Quota, QuotaDefaults, QuotaDetail, QuotaRemaining, QuotaResource, QuotaUpdate};

impl Quota {
    /// A fresh row granting `defaults`, stamped as refreshed at `now`.
    pub fn with_defaults(user_id: Uuid, defaults: QuotaDefaults, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            remaining_chat: defaults.chat,
            remaining_images: defaults.images,
            remaining_quizzes: defaults.quizzes,
            max_chat: defaults.chat,
            max_images: defaults.images,
            max_quizzes: defaults.quizzes,
            refresh_interval_hours: defaults.refresh_hours,
            last_refresh: Some(now),
        }
    }

    /// Effective refill interval; non-positive values fall back to `default_hours`.
    pub fn interval_hours(&self, default_hours: i32) -> i32 {
        if self.refresh_interval_hours > 0 {
            self.refresh_interval_hours
        } else {
            default_hours
        }
    }

    /// Whether a refill is due at `now`.
    pub fn refresh_due(&self, now: DateTime<Utc>, default_hours: i32) -> bool {
        match self.last_refresh {
            None => true,
            Some(last) => now - last >= Duration::hours(i64::from(self.interval_hours(default_hours))),
        }
    }

    /// Refill every counter to its max if due. Returns true when a refill happened.
    pub fn refresh_if_due(&mut self, now: DateTime<Utc>, default_hours: i32) -> bool {
        if !self.refresh_due(now, default_hours) {
            return false;
        }
        self.remaining_chat = self.max_chat;
        self.remaining_images = self.max_images;
        self.remaining_quizzes = self.max_quizzes;
        self.last_refresh = Some(now);
        true
    }

    pub fn remaining(&self, resource: QuotaResource) -> i32 {
        match resource {
            QuotaResource::Chat => self.remaining_chat,
            QuotaResource::Images => self.remaining_images,
            QuotaResource::Quizzes => self.remaining_quizzes,
        }
    }

    fn remaining_mut(&mut self, resource: QuotaResource) -> &mut i32 {
        match resource {
            QuotaResource::Chat => &mut self.remaining_chat,
            QuotaResource::Images => &mut self.remaining_images,
            QuotaResource::Quizzes => &mut self.remaining_quizzes,
        }
    }

    /// Subtract `count` from `resource` if enough remains.
    ///
    /// Leaves the row untouched and returns false otherwise.
    pub fn try_consume(&mut self, resource: QuotaResource, count: i32) -> bool {
        let slot = self.remaining_mut(resource);
        if *slot < count {
            return false;
        }
        *slot -= count;
        true
    }

    /// Apply a partial admin update.
    pub fn apply(&mut self, update: &QuotaUpdate) {
        if let Some(v) = update.max_chat {
            self.max_chat = v;
        }
        if let Some(v) = update.max_images {
            self.max_images = v;
        }
        if let Some(v) = update.max_quizzes {
            self.max_quizzes = v;
        }
        if let Some(v) = update.remaining_chat {
            self.remaining_chat = v;
        }
        if let Some(v) = update.remaining_images {
            self.remaining_images = v;
        }
        if let Some(v) = update.remaining_quizzes {
            self.remaining_quizzes = v;
        }
        if let Some(v) = update.refresh_interval_hours {
            self.refresh_interval_hours = v;
        }
    }

    pub fn to_remaining(&self) -> QuotaRemaining {
        QuotaRemaining {
            remaining_chat: self.remaining_chat,
            remaining_images: self.remaining_images,
            remaining_quizzes: self.remaining_quizzes,
        }
    }

    pub fn to_detail(&self) -> QuotaDetail {
        QuotaDetail {
            remaining_chat: self.remaining_chat,
            remaining_images: self.remaining_images,
            remaining_quizzes: self.remaining_quizzes,
            max_chat: self.max_chat,
            max_images: self.max_images,
            max_quizzes: self.max_quizzes,
            refresh_interval_hours: self.refresh_interval_hours,
        }
    }
}

impl QuotaRemaining {
    pub fn get(&self, resource: QuotaResource) -> i32 {
        match resource {
            QuotaResource::Chat => self.remaining_chat,
            QuotaResource::Images => self.remaining_images,
            QuotaResource::Quizzes => self.remaining_quizzes,
        }
    }
}

/// Low-quota warnings, one per resource at or below the threshold.
pub fn quota_warnings(remaining: &QuotaRemaining) -> Vec<String> {
    QuotaResource::ALL
        .iter()
        .filter_map(|r| {
            let n = remaining.get(*r);
            (n <= QUOTA_WARNING_THRESHOLD).then(|| format!("You have {} {} remaining.", n, r.plural()))
        })
        .collect()
}

/// Message returned when a metered request is refused.
pub fn exhausted_message(resource: QuotaResource) -> String {
    format!(
        "Quota exhausted for {}. Please wait for your quota to refresh.",
        resource
    )
}
