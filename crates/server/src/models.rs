use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    pub sort: Option<String>,
    pub limit: Option<u32>,
    pub after: Option<String>,
    pub include_nsfw: Option<String>,
}

impl ListingParams {
    pub fn include_nsfw(&self) -> bool {
        matches!(self.include_nsfw.as_deref(), Some("1" | "true"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}
