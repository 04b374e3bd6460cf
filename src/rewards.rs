//! Reward catalog operations.
//!
//! Redemption goes through the `redeem_reward` Postgres function so stock
//! decrement and claim insert stay atomic server-side; this layer only
//! delegates.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SupabaseClient;
use crate::error::Result;
use crate::query::{self, SelectQuery};
use crate::types::{NewReward, Reward};

/// Full catalog, cheapest first.
pub async fn list_all_rewards(client: &SupabaseClient) -> Result<Vec<Reward>> {
    SelectQuery::new("rewards")
        .columns("id,name,description,cost,stock,active,category_id")
        .order("cost", true)
        .limit(500)
        .fetch(client)
        .await
}

pub async fn create_reward(client: &SupabaseClient, reward: &NewReward) -> Result<()> {
    let mut payload = json!({
        "name": reward.name,
        "description": reward.description,
        "cost": reward.cost,
        "stock": reward.stock,
        "active": true,
    });
    if let Some(category_id) = reward.category_id {
        payload["category_id"] = json!(category_id);
    }
    query::insert(client, "rewards", &payload).await
}

pub async fn toggle_reward_active(client: &SupabaseClient, id: i64, active: bool) -> Result<()> {
    query::update_eq(
        client,
        "rewards",
        "id",
        &id.to_string(),
        &json!({ "active": active }),
    )
    .await
}

/// Claims a reward for the signed-in user.
pub async fn redeem_reward(client: &SupabaseClient, reward_id: i64) -> Result<Value> {
    query::rpc(client, "redeem_reward", json!({ "reward_id": reward_id })).await
}

#[derive(Debug, Clone, Deserialize)]
struct StockRow {
    #[serde(default)]
    stock: i64,
}

/// Applies `delta` to the stored stock, clamped at zero, and returns the new
/// value. Read-then-write pair with no atomicity at this layer; the
/// redemption path never uses it.
pub async fn update_reward_stock(client: &SupabaseClient, id: i64, delta: i64) -> Result<i64> {
    let current = SelectQuery::new("rewards")
        .columns("stock")
        .eq("id", id)
        .fetch_optional::<StockRow>(client)
        .await?
        .map(|r| r.stock)
        .unwrap_or(0);
    let next = next_stock(current, delta);
    query::update_eq(
        client,
        "rewards",
        "id",
        &id.to_string(),
        &json!({ "stock": next }),
    )
    .await?;
    Ok(next)
}

fn next_stock(current: i64, delta: i64) -> i64 {
    (current + delta).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_never_goes_negative() {
        assert_eq!(next_stock(5, 3), 8);
        assert_eq!(next_stock(5, -3), 2);
        assert_eq!(next_stock(2, -10), 0);
        assert_eq!(next_stock(0, 0), 0);
    }
}
