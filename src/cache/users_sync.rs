use super::sync::{Page, SyncSource};
use super::CacheError;
use crate::web_api::{TokenKind, WebApiClient, WebApiError};
use serde_json::{json, Value};
use std::sync::Arc;

/// `SyncSource` over `users.list` (§4.3 "users sync"). One page per
/// `fetch_page` call; pagination state itself lives in the generic pager
/// in `sync.rs`.
pub struct UsersSyncSource {
    web_api: Arc<WebApiClient>,
}

impl UsersSyncSource {
    pub fn new(web_api: Arc<WebApiClient>) -> Self {
        Self { web_api }
    }
}

impl SyncSource for UsersSyncSource {
    fn fetch_page(&self, cursor: &str, page_limit: usize) -> Result<Page, CacheError> {
        let mut body = json!({ "limit": page_limit });
        if !cursor.is_empty() {
            body["cursor"] = json!(cursor);
        }
        match self.web_api.push("users.list", body, TokenKind::Bot) {
            Ok(response) => {
                let rows = response
                    .get("members")
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
