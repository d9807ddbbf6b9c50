//! Interaction events.
//!
//! The recorder that persists these lives outside the engine; the types here
//! fix the weight table and the sampling rule it applies before writing.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Impression,
    Click,
    Like,
    Comment,
    Share,
    Save,
    Hide,
    FollowAuthor,
}

impl EventType {
    /// Weight the affinity aggregates give this action.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Impression => 0.1,
            Self::Click => 1.0,
            Self::Like => 1.2,
            Self::Comment => 1.5,
            Self::Share => 1.8,
            Self::Save => 1.6,
            Self::Hide => -2.0,
            Self::FollowAuthor => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Click => "click",
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Share => "share",
            Self::Save => "save",
            Self::Hide => "hide",
            Self::FollowAuthor => "follow_author",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(Self::Impression),
            "click" => Ok(Self::Click),
            "like" => Ok(Self::Like),
            "comment" => Ok(Self::Comment),
            "share" => Ok(Self::Share),
            "save" => Ok(Self::Save),
            "hide" => Ok(Self::Hide),
            "follow_author" => Ok(Self::FollowAuthor),
            other => Err(AppError::Validation(format!("unknown event type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(ua) = user_agent else {
            return Self::Desktop;
        };
        let ua = ua.to_lowercase();

        if ["mobile", "android", "iphone"]
            .iter()
            .any(|marker| ua.contains(marker))
        {
            Self::Mobile
        } else if ua.contains("tablet") {
            Self::Tablet
        } else {
            Self::Desktop
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub event_type: EventType,
    pub weight: f64,
    pub surface: String,
    pub session_id: Option<String>,
    pub device_class: DeviceClass,
    pub occurred_at: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(
        user_id: Uuid,
        post_id: Uuid,
        event_type: EventType,
        surface: impl Into<String>,
        device_class: DeviceClass,
    ) -> Self {
        Self {
            user_id,
            post_id,
            event_type,
            weight: event_type.weight(),
            surface: surface.into(),
            session_id: None,
            device_class,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Keeps a fraction of impression events; every other event type passes.
#[derive(Debug, Clone, Copy)]
pub struct ImpressionSampler {
    rate: f64,
}

impl ImpressionSampler {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
        }
    }

    pub fn should_record<R: Rng + ?Sized>(&self, event_type: EventType, rng: &mut R) -> bool {
        if event_type != EventType::Impression {
            return true;
        }
        rng.gen::<f64>() < self.rate
    }
}
