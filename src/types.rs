//! Row shapes for the backend tables this client reads. All durable data
//! lives in the backend; these are deserialization targets, nothing more.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `public.profiles` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Auth user UUID.
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub points: i64,
    pub avatar_url: Option<String>,
    /// Tag UID reported by the kiosk scanner, if one is bound.
    pub rfid_uid: Option<String>,
}

/// `public.rewards` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    #[serde(default)]
    pub stock: i64,
    pub active: bool,
    pub category_id: Option<i64>,
}

/// Fields accepted when creating a reward. New rewards always start active.
#[derive(Debug, Clone)]
pub struct NewReward {
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    pub stock: i64,
    pub category_id: Option<i64>,
}

/// `public.reward_claims` row, reduced to what the dashboard counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardClaim {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}
