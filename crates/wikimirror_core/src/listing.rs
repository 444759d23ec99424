use std::collections::{BTreeMap, VecDeque};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::auth::Session;
use crate::client::ApiTransport;
use crate::error::{MirrorError, Result};
use crate::model::PageRef;

/// Largest `aplimit` MediaWiki grants to ordinary accounts.
pub const PAGE_LIMIT: usize = 500;

/// The `continue` object of an allpages response, replayed verbatim on the
/// next request. Its contents are never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    fields: Vec<(String, String)>,
}

impl ContinuationToken {
    fn from_value(value: BTreeMap<String, Value>) -> Option<Self> {
        let fields: Vec<(String, String)> = value
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(text) => (key, text),
                other => (key, other.to_string()),
            })
            .collect();
        if fields.is_empty() { None } else { Some(Self { fields }) }
    }
}

/// Lazily pages through `list=allpages`, one request per batch. Yields
/// each page exactly once; after the last batch, or after an error, it
/// yields nothing more.
pub struct PageListing<'a, T> {
    session: &'a Session<T>,
    namespace_id: Option<i32>,
    buffered: VecDeque<PageRef>,
    continuation: Option<ContinuationToken>,
    started: bool,
    finished: bool,
    batches: usize,
}

/// Enumerate every page, or only pages in `namespace_id` when given.
pub fn list_pages<T: ApiTransport>(
    session: &Session<T>,
    namespace_id: Option<i32>,
) -> PageListing<'_, T> {
    PageListing {
        session,
        namespace_id,
        buffered: VecDeque::new(),
        continuation: None,
        started: false,
        finished: false,
        batches: 0,
    }
}

impl<T: ApiTransport> PageListing<'_, T> {
    fn fetch_batch(&mut self) -> Result<()> {
        let response = {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "allpages".to_string()),
                ("aplimit", PAGE_LIMIT.to_string()),
            ];
            if let Some(namespace_id) = self.namespace_id {
                params.push(("apnamespace", namespace_id.to_string()));
            }
            if let Some(token) = &self.continuation {
                for (key, value) in &token.fields {
                    params.push((key.as_str(), value.clone()));
                }
            }
            self.session.transport().get(&params)?
        };
        let parsed: AllPagesResponse =
            serde_json::from_value(response).map_err(|source| MirrorError::Decode {
                what: "allpages",
                source,
            })?;

        self.batches += 1;
        debug!(
            batch = self.batches,
            pages = parsed.query.allpages.len(),
            more = parsed.continuation.is_some(),
            "fetched page list batch"
        );
        self.buffered
            .extend(parsed.query.allpages.into_iter().map(|item| PageRef {
                title: item.title,
                namespace_id: item.ns,
            }));
        self.continuation = parsed.continuation.and_then(ContinuationToken::from_value);
        Ok(())
    }
}

impl<T: ApiTransport> Iterator for PageListing<'_, T> {
    type Item = Result<PageRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(page) = self.buffered.pop_front() {
                return Some(Ok(page));
            }
            if self.finished || (self.started && self.continuation.is_none()) {
                self.finished = true;
                return None;
            }
            self.started = true;
            if let Err(error) = self.fetch_batch() {
                self.finished = true;
                return Some(Err(error));
            }
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AllPagesResponse {
    #[serde(default)]
    query: AllPagesPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct AllPagesPayload {
    #[serde(default)]
    allpages: Vec<AllPagesItem>,
}

#[derive(Debug, Deserialize)]
struct AllPagesItem {
    ns: i32,
    title: String,
}
