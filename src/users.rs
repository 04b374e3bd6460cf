//! Profile administration: listing, role changes, RFID tag binding.

use serde_json::json;

use crate::client::SupabaseClient;
use crate::error::Result;
use crate::query::{self, SelectQuery};
use crate::types::Profile;

const PROFILE_COLUMNS: &str = "id,email,name,role,points,avatar_url,rfid_uid";

/// Leaderboard ordering: highest points first.
pub async fn list_users(client: &SupabaseClient) -> Result<Vec<Profile>> {
    SelectQuery::new("profiles")
        .columns(PROFILE_COLUMNS)
        .order("points", false)
        .limit(500)
        .fetch(client)
        .await
}

pub async fn set_user_role(client: &SupabaseClient, user_id: &str, role: &str) -> Result<()> {
    query::update_eq(client, "profiles", "id", user_id, &json!({ "role": role })).await
}

/// Binds (or clears) the RFID tag the kiosk scanner reports for a profile.
pub async fn set_user_rfid(
    client: &SupabaseClient,
    user_id: &str,
    rfid_uid: Option<&str>,
) -> Result<()> {
    query::update_eq(
        client,
        "profiles",
        "id",
        user_id,
        &json!({ "rfid_uid": rfid_uid }),
    )
    .await
}

/// Kiosk-side lookup: which profile owns a scanned tag.
pub async fn find_profile_by_rfid(
    client: &SupabaseClient,
    rfid_uid: &str,
) -> Result<Option<Profile>> {
    SelectQuery::new("profiles")
        .columns(PROFILE_COLUMNS)
        .eq("rfid_uid", rfid_uid)
        .fetch_optional(client)
        .await
}
