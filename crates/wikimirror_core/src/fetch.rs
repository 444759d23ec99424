use std::collections::BTreeMap;

use serde::Deserialize;

use crate::auth::Session;
use crate::client::ApiTransport;
use crate::error::{MirrorError, Result};
use crate::model::PageContent;

/// Anything that can produce the current content of a page by title.
pub trait ContentSource {
    fn fetch(&self, title: &str) -> Result<PageContent>;
}

impl<T: ApiTransport> ContentSource for Session<T> {
    fn fetch(&self, title: &str) -> Result<PageContent> {
        fetch_content(self, title)
    }
}

/// Latest revision body of `title`. A page without a revision (or without
/// a main slot) comes back with `body: None`; that is not an error.
pub fn fetch_content<T: ApiTransport>(session: &Session<T>, title: &str) -> Result<PageContent> {
    let response = session.transport().get(&[
        ("action", "query".to_string()),
        ("titles", title.to_string()),
        ("prop", "revisions".to_string()),
        ("rvprop", "content".to_string()),
        ("rvslots", "main".to_string()),
    ])?;
    let parsed: RevisionQueryResponse =
        serde_json::from_value(response).map_err(|source| MirrorError::Decode {
            what: "page content",
            source,
        })?;

    // One title in, one entry out. The entry is keyed by whatever the wiki
    // chose (a page id, or -1 for missing pages), never by the title.
    let body = parsed
        .query
        .pages
        .into_single()
        .and_then(|page| page.revisions.into_iter().next())
        .and_then(|revision| revision.slots)
        .and_then(|slots| slots.main)
        .and_then(|main| main.content);

    Ok(PageContent {
        title: title.to_string(),
        body,
    })
}

#[derive(Debug, Deserialize, Default)]
struct RevisionQueryResponse {
    #[serde(default)]
    query: RevisionQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct RevisionQueryPayload {
    #[serde(default)]
    pages: PageEntries,
}

/// formatversion=2 returns a list; formatversion=1 an object keyed by page id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageEntries {
    List(Vec<PageEntry>),
    Keyed(BTreeMap<String, PageEntry>),
}

impl Default for PageEntries {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl PageEntries {
    fn into_single(self) -> Option<PageEntry> {
        match self {
            Self::List(entries) => entries.into_iter().next(),
            Self::Keyed(entries) => entries.into_values().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    #[serde(default)]
    revisions: Vec<RevisionEntry>,
}

#[derive(Debug, Deserialize)]
struct RevisionEntry {
    slots: Option<RevisionSlots>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlots {
    main: Option<MainSlot>,
}

#[derive(Debug, Deserialize)]
struct MainSlot {
    #[serde(alias = "*")]
    content: Option<String>,
}
