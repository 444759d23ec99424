use serde::Serialize;

pub const NS_MAIN: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRef {
    pub title: String,
    pub namespace_id: i32,
}

/// The latest revision of one page. `body` is `None` when the page has no
/// retrievable revision, which is not the same as an empty page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Namespace {
    pub id: i32,
    pub display_name: String,
}

impl Namespace {
    /// Negative ids (Special, Media) are generated on the fly and cannot be exported.
    pub fn is_exportable(&self) -> bool {
        self.id >= 0
    }
}
