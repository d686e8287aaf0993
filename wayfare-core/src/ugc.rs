use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    /// pending -> approved | rejected. Both outcomes are final; re-applying
    /// the current status is a no-op.
    pub fn transition(self, next: ModerationStatus) -> CoreResult<ModerationStatus> {
        use ModerationStatus::*;
        match (self, next) {
            (a, b) if a == b => Ok(a),
            (Pending, Approved) | (Pending, Rejected) => Ok(next),
            (from, to) => Err(CoreError::InvariantViolation(format!(
                "moderation cannot move from {:?} to {:?}",
                from, to
            ))),
        }
    }

    pub fn is_public(&self) -> bool {
        *self == ModerationStatus::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatorTier {
    New,
    Regular,
    Trusted,
    Ambassador,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub ts: DateTime<Utc>,
}

impl GpsPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng) && self.accuracy >= 0.0
    }
}

/// A traveler's video of an activity at a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UgcContent {
    pub id: Uuid,
    pub user_id: String,
    pub activity_id: Option<Uuid>,
    pub destination_code: String,
    pub video_url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_seconds: u32,
    pub gps: Option<GpsPoint>,
    pub moderation_status: ModerationStatus,
    pub quality_score: u8,
    pub view_count: u64,
    pub booking_count: u64,
    pub is_verified: bool,
    pub creator_tier: CreatorTier,
}

impl UgcContent {
    pub fn moderate(&mut self, next: ModerationStatus) -> CoreResult<()> {
        self.moderation_status = self.moderation_status.transition(next)?;
        Ok(())
    }

    pub fn set_quality_score(&mut self, score: i32) {
        self.quality_score = score.clamp(0, 100) as u8;
    }

    /// Share of views that turned into bookings.
    pub fn conversion_rate(&self) -> f64 {
        if self.view_count == 0 {
            0.0
        } else {
            self.booking_count as f64 / self.view_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModerationStatus::*;

    fn content() -> UgcContent {
        UgcContent {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            activity_id: None,
            destination_code: "BCN".into(),
            video_url: "https://cdn.example.com/v/1.mp4".into(),
            title: "Sagrada Familia at dawn".into(),
            description: None,
            duration_seconds: 45,
            gps: None,
            moderation_status: Pending,
            quality_score: 0,
            view_count: 200,
            booking_count: 3,
            is_verified: false,
            creator_tier: CreatorTier::New,
        }
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert_eq!(Pending.transition(Approved).unwrap(), Approved);
        assert_eq!(Pending.transition(Rejected).unwrap(), Rejected);
        assert_eq!(Approved.transition(Approved).unwrap(), Approved);
        assert!(Approved.transition(Rejected).is_err());
        assert!(Rejected.transition(Approved).is_err());
        assert!(Rejected.transition(Pending).is_err());
        assert!(Approved.transition(Pending).is_err());
    }

    #[test]
    fn test_quality_score_clamped() {
        let mut c = content();
        c.set_quality_score(140);
        assert_eq!(c.quality_score, 100);
        c.set_quality_score(-3);
        assert_eq!(c.quality_score, 0);
        c.moderate(Rejected).unwrap();
        assert!(c.moderate(Approved).is_err());
        assert!((c.conversion_rate() - 0.015).abs() < 1e-9);
    }
}
