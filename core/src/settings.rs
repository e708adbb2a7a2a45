use serde::{Deserialize, Serialize};

use crate::api::Community;
use crate::error::ValidationError;

const MIN_DELAY: f64 = 0.05;
const MAX_DELAY: f64 = 30.0;

/// Full backend settings, as posted to `/api/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Communities the backend may operate on.
    #[serde(default)]
    pub communities: Vec<Community>,
    /// Group to make active; defaults to the first community.
    #[serde(default)]
    pub active_group_id: Option<i64>,
    /// Delay between platform requests (s).
    pub request_delay: f64,
    /// Default broadcast text.
    pub promo_message: String,
}

impl ServerSettings {
    /// Clean up and check the settings before they are sent.
    ///
    /// Communities without a group id or without any token are dropped;
    /// a missing active group falls back to the first remaining community.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        self.communities.retain(|c| {
            c.group_id != 0 && !(c.user_token.trim().is_empty() && c.group_token.trim().is_empty())
        });
        if self.communities.is_empty() {
            return Err(ValidationError::NoCommunities);
        }
        if !(MIN_DELAY..=MAX_DELAY).contains(&self.request_delay) {
            return Err(ValidationError::DelayOutOfRange(self.request_delay));
        }
        if self.promo_message.trim().is_empty() {
            return Err(ValidationError::EmptyPromoMessage);
        }
        let active_known = self
            .active_group_id
            .map(|g| self.communities.iter().any(|c| c.group_id == g))
            .unwrap_or(false);
        if !active_known {
            self.active_group_id = Some(self.communities[0].group_id);
        }
        for c in &mut self.communities {
            c.user_token = c.user_token.trim().to_string();
            c.group_token = c.group_token.trim().to_string();
        }
        Ok(self)
    }
}
