//! Point adjustments and claim statistics.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::client::SupabaseClient;
use crate::error::Result;
use crate::query;

/// Admin-only adjustment. The `admin_adjust_points` Postgres function writes
/// the transaction and the audit log entry in one go.
pub async fn admin_adjust_points(
    client: &SupabaseClient,
    target_user: &str,
    delta: i64,
    reason: &str,
) -> Result<Value> {
    query::rpc(
        client,
        "admin_adjust_points",
        json!({
            "target_user": target_user,
            "delta": delta,
            "reason": reason,
        }),
    )
    .await
}

/// Number of reward claims created within the last `days` days. Zero rows is
/// a count of zero, not a failure.
pub async fn recent_claims_count(client: &SupabaseClient, days: i64) -> Result<u64> {
    let since = (Utc::now() - Duration::days(days)).to_rfc3339();
    query::count_gte(client, "reward_claims", "created_at", &since).await
}
