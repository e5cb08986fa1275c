//! HTTP client for the remote score API
//!
//! The API has no "latest play" endpoint of its own; the probe works the way
//! the game client does: add the player as a friend (the response embeds the
//! friend's recent play), then delete the friendship again to free the slot.

use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;

use super::{FetchError, FetchedPlayer, RawPlay, ScoreFetcher};

/// Error code the API returns for a friend code it does not recognize
const CODE_FRIEND_NOT_FOUND: i64 = 401;

/// Client for the score service, cheap to clone (reqwest pools internally)
#[derive(Clone)]
pub struct ArcApiClient {
    client: Client,
    base_url: String,
    access_token: String,
    app_version: String,
    device_id: String,
}

impl ArcApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: format!(
                "{}/{}/{}",
                config.arcapi_url, config.arcapi_codename, config.arcapi_version
            ),
            access_token: config.arcapi_token.clone(),
            app_version: config.arcapi_app_version.clone(),
            device_id: config.arcapi_device_id.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post_form(&self, url: &str, form: &[(&str, String)]) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("AppVersion", &self.app_version)
            .header("DeviceId", &self.device_id)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .form(form)
    }

    /// One probe: friend-add, read the embedded record, best-effort friend-delete
    async fn probe(&self, player_code: &str) -> Result<FetchedPlayer, FetchError> {
        let add_url = self.endpoint("friend/me/add");
        let response = self
            .post_form(&add_url, &[("friend_code", player_code.to_string())])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Service(format!(
                "friend add returned status {}",
                response.status()
            )));
        }

        let body: AddFriendResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        if !body.success {
            return match body.error_code {
                Some(CODE_FRIEND_NOT_FOUND) => Err(FetchError::UnknownIdentifier),
                code => Err(FetchError::Service(format!(
                    "friend add rejected (error_code {code:?})"
                ))),
            };
        }

        let friend = body
            .value
            .and_then(|v| v.friends.into_iter().next())
            .ok_or_else(|| FetchError::Malformed("friend add returned no record".to_string()))?;

        // The friendship was only a probe vehicle; clean it up so the slot
        // stays free. Failure here does not invalidate the fetched record.
        let del_url = self.endpoint("friend/me/delete");
        if let Err(e) = self
            .post_form(&del_url, &[("friend_id", friend.user_id.to_string())])
            .send()
            .await
        {
            warn!(player_code, error = %e, "Friend cleanup failed after probe");
        }

        debug!(player_code, name = %friend.name, "Probed latest play");

        Ok(FetchedPlayer {
            name: friend.name,
            recent: friend.recent_score.into_iter().next(),
        })
    }
}

impl ScoreFetcher for ArcApiClient {
    fn fetch_latest_play(
        &self,
        player_code: &str,
    ) -> impl Future<Output = Result<FetchedPlayer, FetchError>> + Send {
        self.probe(player_code)
    }
}

/// Response envelope for the friend-add call
#[derive(Debug, Deserialize)]
struct AddFriendResponse {
    success: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    value: Option<AddFriendValue>,
}

#[derive(Debug, Deserialize)]
struct AddFriendValue {
    #[serde(default)]
    friends: Vec<FriendRecord>,
}

#[derive(Debug, Deserialize)]
struct FriendRecord {
    user_id: i64,
    name: String,
    #[serde(default)]
    recent_score: Vec<RawPlay>,
}
