//! REST client for the profile, game-init and match-history endpoints

use glam::Vec2;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::game::Placement;

/// Client for the game backend's REST API
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Whether calls carry a bearer token
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header("Content-Type", "application/json");

        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(ApiError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api { status: status.as_u16(), body });
        }

        response.json().await.map_err(ApiError::Parse)
    }

    /// `GET /profile/`: the signed-in player's identity
    pub async fn get_profile(&self) -> Result<UserProfile, ApiError> {
        self.send(self.request(Method::GET, "profile")).await
    }

    /// `POST /game/`: initial paddle and ball placement
    pub async fn init_game(&self) -> Result<Placement, ApiError> {
        let response: GameInitResponse = self
            .send(
                self.request(Method::POST, "game")
                    .json(&GameInitRequest { state: "init" }),
            )
            .await?;
        Ok(response.into())
    }

    /// `POST /match-history/`: record a finished match
    pub async fn store_match_history(&self, entry: &MatchHistoryEntry) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(self.request(Method::POST, "match-history").json(entry))
            .await?;
        Ok(())
    }
}

/// Signed-in user's profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Finished match as stored in match history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchHistoryEntry {
    pub player1_username: String,
    pub player2_username: String,
    pub score1: u32,
    pub score2: u32,
    /// Winner's identity, or `"draw"`
    pub result: String,
}

#[derive(Debug, Serialize)]
struct GameInitRequest {
    state: &'static str,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Point3 {
    x: f32,
    #[allow(dead_code)]
    #[serde(default)]
    y: f32,
    z: f32,
}

#[derive(Debug, Deserialize)]
struct GameInitResponse {
    #[serde(rename = "LeftPaddle")]
    left_paddle: Point3,
    #[serde(rename = "RightPaddle")]
    right_paddle: Point3,
    ball: Point3,
}

impl From<GameInitResponse> for Placement {
    /// Paddle depth comes from the court layout; only lateral offsets are taken
    fn from(response: GameInitResponse) -> Self {
        Placement {
            paddle1_x: response.left_paddle.x,
            paddle2_x: response.right_paddle.x,
            ball: Vec2::new(response.ball.x, response.ball.z),
        }
    }
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}
