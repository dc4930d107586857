use super::sync::{Page, SyncSource};
use super::CacheError;
use crate::web_api::{TokenKind, WebApiClient, WebApiError};
use serde_json::{json, Value};
use std::sync::Arc;

/// `SyncSource` over `users.conversations` (§4.3 "channels sync") scoped
/// to the bot's own membership, since `channels` only ever tracks
/// channels the bot currently belongs to.
pub struct ChannelsSyncSource {
    web_api: Arc<WebApiClient>,
}

impl ChannelsSyncSource {
    pub fn new(web_api: Arc<WebApiClient>) -> Self {
        Self { web_api }
    }
}

impl SyncSource for ChannelsSyncSource {
    fn fetch_page(&self, cursor: &str, page_limit: usize) -> Result<Page, CacheError> {
        let mut body = json!({
            "limit": page_limit,
            "types": "public_channel,private_channel",
        });
        if !cursor.is_empty() {
            body["cursor"] = json!(cursor);
        }
        match self.web_api.push("users.conversations", body, TokenKind::Bot) {
            Ok(response) => {
                let rows = response
                    .get("channels")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let next_cursor = response
                    .get("response_metadata")
                    .and_then(|meta| meta.get("next_cursor"))
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);
                Ok(Page::Rows { rows, next_cursor })
            }
            Err(WebApiError::RateLimited { retry_after }) => Ok(Page::RateLimited { retry_after }),
            Err(err) => Err(CacheError::WebApi(err)),
        }
    }
}
