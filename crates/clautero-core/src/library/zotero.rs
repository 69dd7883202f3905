//! Zotero Web API v3 client.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;

use super::{LibraryClient, LibraryError, LibraryFuture};
use crate::{Attachment, Item, Tag, TagFilter};

const USER_AGENT: &str = concat!("clautero/", env!("CARGO_PKG_VERSION"));

pub struct ZoteroClient {
    client: reqwest::Client,
    base_url: String,
    user_id: u64,
}

impl ZoteroClient {
    pub fn new(base_url: &str, user_id: u64, api_key: &str) -> Result<Self, LibraryError> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| LibraryError::Rejected("API key is not a valid header value".into()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("Zotero-API-Version", HeaderValue::from_static("3"));
        headers.insert("Zotero-API-Key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
        })
    }

    fn items_url(&self) -> String {
        format!("{}/users/{}/items", self.base_url, self.user_id)
    }

    fn item_url(&self, key: &str) -> String {
        format!("{}/{}", self.items_url(), key)
    }
}

/// Map non-success statuses onto [`LibraryError`]. 404 and 412 only name an
/// item when the request addressed one (`key`).
fn check_status(
    resp: reqwest::Response,
    key: Option<&str>,
) -> Result<reqwest::Response, LibraryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match (status.as_u16(), key) {
        (404, Some(key)) => Err(LibraryError::NotFound(key.to_string())),
        (412, Some(key)) => Err(LibraryError::Conflict {
            key: key.to_string(),
        }),
        (code, _) => Err(LibraryError::Http {
            status: code,
            url: resp.url().to_string(),
        }),
    }
}

/// Zotero notes are HTML fragments.
fn note_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}

impl LibraryClient for ZoteroClient {
    fn list_by_tag_filter<'a>(
        &'a self,
        filter: &'a TagFilter,
        limit: usize,
    ) -> LibraryFuture<'a, Vec<Item>> {
        Box::pin(async move {
            let url = format!("{}/top", self.items_url());
            let limit = limit.to_string();
            let mut query = vec![("format", "json".to_string()), ("limit", limit)];
            query.extend(filter.query_params());

            let resp = self.client.get(&url).query(&query).send().await?;
            let items: Vec<Item> = check_status(resp, None)?.json().await?;
            tracing::debug!(count = items.len(), ?filter, "listed items");
            Ok(items)
        })
    }

    fn get_item<'a>(&'a self, key: &'a str) -> LibraryFuture<'a, Item> {
        Box::pin(async move {
            let resp = self.client.get(self.item_url(key)).send().await?;
            Ok(check_status(resp, Some(key))?.json().await?)
        })
    }

    fn get_children<'a>(&'a self, key: &'a str) -> LibraryFuture<'a, Vec<Attachment>> {
        Box::pin(async move {
            let url = format!("{}/children", self.item_url(key));
            let resp = self.client.get(&url).send().await?;
            let children: Vec<Item> = check_status(resp, Some(key))?.json().await?;
            Ok(children.into_iter().map(Attachment::from).collect())
        })
    }

    fn update_tags<'a>(&'a self, item: &'a Item) -> LibraryFuture<'a, ()> {
        Box::pin(async move {
            let resp = self
                .client
                .patch(self.item_url(&item.key))
                .header("If-Unmodified-Since-Version", item.version.to_string())
                .json(&json!({ "tags": item.data.tags }))
                .send()
                .await?;
            check_status(resp, Some(&item.key))?;
            Ok(())
        })
    }

    fn create_note<'a>(
        &'a self,
        parent_key: &'a str,
        text: &'a str,
        tags: &'a [String],
    ) -> LibraryFuture<'a, ()> {
        Box::pin(async move {
            let tags: Vec<Tag> = tags.iter().map(Tag::new).collect();
            let note = json!([{
                "itemType": "note",
                "parentItem": parent_key,
                "note": note_html(text),
                "tags": tags,
                "collections": [],
                "relations": {},
            }]);

            let resp = self
                .client
                .post(self.items_url())
                .json(&note)
                .send()
                .await?;
            let body: serde_json::Value = check_status(resp, Some(parent_key))?.json().await?;

            // Multi-object writes report per-object failures with a 200.
            if let Some(failed) = body["failed"].as_object()
                && let Some(first) = failed.values().next()
            {
                let message = first["message"].as_str().unwrap_or("unknown error");
                return Err(LibraryError::Rejected(format!(
                    "note for {}: {}",
                    parent_key, message
                )));
            }
            tracing::info!(item = parent_key, "created summary note");
            Ok(())
        })
    }
}
