//! Reference-manager access: listing items by tag, reading children,
//! mutating tag sets and creating notes.

pub mod zotero;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::{Attachment, Item, TagFilter};

pub use zotero::ZoteroClient;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    #[error("item {key} was modified concurrently (HTTP 412)")]
    Conflict { key: String },
    #[error("item {0} not found")]
    NotFound(String),
    #[error("write rejected: {0}")]
    Rejected(String),
}

pub type LibraryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LibraryError>> + Send + 'a>>;

/// A reference manager holding the items to summarize.
///
/// Every mutation is remote and immediately visible to later reads.
pub trait LibraryClient: Send + Sync {
    /// Top-level items matching `filter`, at most `limit` of them.
    fn list_by_tag_filter<'a>(
        &'a self,
        filter: &'a TagFilter,
        limit: usize,
    ) -> LibraryFuture<'a, Vec<Item>>;

    fn get_item<'a>(&'a self, key: &'a str) -> LibraryFuture<'a, Item>;

    fn get_children<'a>(&'a self, key: &'a str) -> LibraryFuture<'a, Vec<Attachment>>;

    /// Write `item.data.tags` back as the item's full tag set.
    fn update_tags<'a>(&'a self, item: &'a Item) -> LibraryFuture<'a, ()>;

    /// Create a child note under `parent_key`.
    fn create_note<'a>(
        &'a self,
        parent_key: &'a str,
        text: &'a str,
        tags: &'a [String],
    ) -> LibraryFuture<'a, ()>;

    /// Read-modify-write: add `tag` to the item unless it is already there.
    fn add_tag<'a>(&'a self, key: &'a str, tag: &'a str) -> LibraryFuture<'a, ()> {
        Box::pin(async move {
            let mut item = self.get_item(key).await?;
            if item.data.insert_tag(tag) {
                tracing::info!(item = key, tag, "adding tag");
                self.update_tags(&item).await?;
            }
            Ok(())
        })
    }

    /// Read-modify-write: drop every `tag` entry from the item.
    fn remove_tag<'a>(&'a self, key: &'a str, tag: &'a str) -> LibraryFuture<'a, ()> {
        Box::pin(async move {
            let mut item = self.get_item(key).await?;
            if item.data.remove_tag(tag) {
                tracing::info!(item = key, tag, "removing tag");
                self.update_tags(&item).await?;
            }
            Ok(())
        })
    }

    /// Read-modify-write of several tags in a single update.
    fn retag<'a>(
        &'a self,
        key: &'a str,
        remove: &'a [&'a str],
        add: &'a [&'a str],
    ) -> LibraryFuture<'a, ()> {
        Box::pin(async move {
            let mut item = self.get_item(key).await?;
            let mut changed = false;
            for tag in remove {
                changed |= item.data.remove_tag(tag);
            }
            for tag in add {
                changed |= item.data.insert_tag(tag);
            }
            if changed {
                tracing::info!(item = key, ?remove, ?add, "updating tags");
                self.update_tags(&item).await?;
            }
            Ok(())
        })
    }
}
