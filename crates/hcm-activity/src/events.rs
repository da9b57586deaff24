//! 活动事件定义

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 活动事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityEventType {
    CaseCreated,
    CaseAssigned,
    CaseViewed,
    DocumentAttached,
    CaseCompleted,
    CaseCancelled,
}

impl ActivityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseCreated => "case_created",
            Self::CaseAssigned => "case_assigned",
            Self::CaseViewed => "case_viewed",
            Self::DocumentAttached => "document_attached",
            Self::CaseCompleted => "case_completed",
            Self::CaseCancelled => "case_cancelled",
        }
    }
}

impl TryFrom<&str> for ActivityEventType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "case_created" => Ok(Self::CaseCreated),
            "case_assigned" => Ok(Self::CaseAssigned),
            "case_viewed" => Ok(Self::CaseViewed),
            "document_attached" => Ok(Self::DocumentAttached),
            "case_completed" => Ok(Self::CaseCompleted),
            "case_cancelled" => Ok(Self::CaseCancelled),
            _ => Err(anyhow::anyhow!("Unknown event type: {}", value)),
        }
    }
}

/// 活动事件信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub event_type: ActivityEventType,
    pub user_id: Uuid,
    pub case_id: Uuid,
    pub hospital_id: Uuid,
    pub detail: serde_json::Value,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl ActivityEvent {
    pub fn new(
        event_type: ActivityEventType,
        user_id: Uuid,
        case_id: Uuid,
        hospital_id: Uuid,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            user_id,
            case_id,
            hospital_id,
            detail,
            occurred_at: chrono::Utc::now(),
        }
    }
}
