//! Backend REST collaborators

pub mod api;

pub use api::{ApiClient, ApiError, MatchHistoryEntry, UserProfile};
