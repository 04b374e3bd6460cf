//! Client for the Cereal rewards program backend.
//!
//! Resolves Supabase credentials from a prioritized source chain, builds one
//! memoized client per process, and exposes thin async wrappers over auth,
//! table selects, and remote procedures for the rewards, users, and points
//! feature areas. Business logic (stock decrement, point transactions) runs
//! server-side in Postgres functions; nothing here is more than one
//! delegated call thick.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod persistence;
pub mod points;
pub mod query;
pub mod rewards;
pub mod state;
pub mod types;
pub mod users;

pub use auth::{AuthSession, LandingPage, OAuthFlow, ADMIN_EMAIL};
pub use client::{ClientOptions, SupabaseClient};
pub use config::{ConfigResolver, ConfigSource, SourceOutcome, SupabaseConfig};
pub use error::{Error, Result};
pub use query::SelectQuery;
pub use state::AppState;
pub use types::{NewReward, Profile, Reward, RewardClaim};
