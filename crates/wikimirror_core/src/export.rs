use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::fetch::ContentSource;
use crate::filesystem::{
    Collision, PAGE_EXTENSION, PathClaims, WriteOutcome, ensure_dir, render_page_file,
    sanitize_filename, strip_namespace_prefix, write_page_file,
};
use crate::model::PageRef;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Pages whose file now holds the fetched content, unchanged ones included.
    pub written: usize,
    pub unchanged: usize,
    /// Pages with no retrievable revision.
    pub skipped: usize,
    pub failures: Vec<PageFailure>,
    pub collisions: Vec<Collision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub title: String,
    pub message: String,
}

impl ExportSummary {
    pub fn pages_seen(&self) -> usize {
        self.written + self.skipped + self.failures.len()
    }

    pub fn merge(&mut self, other: ExportSummary) {
        self.written += other.written;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.collisions.extend(other.collisions);
    }
}

/// Writes fetched pages under one output root. Keeps track of which title
/// owns which file for the whole run, across namespaces.
#[derive(Debug)]
pub struct Exporter {
    output_root: PathBuf,
    claims: PathClaims,
}

impl Exporter {
    pub fn new(output_root: impl Into<PathBuf>) -> Result<Self> {
        let output_root = output_root.into();
        ensure_dir(&output_root)?;
        Ok(Self {
            output_root,
            claims: PathClaims::default(),
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Fetch and write every page in enumeration order. With
    /// `namespace_display`, files go into that namespace's subdirectory and
    /// are named without the namespace prefix.
    ///
    /// A failed fetch or write is recorded and the next page is attempted.
    /// A failure of the listing itself, or a fetch rejected because the
    /// session is gone, aborts the export.
    pub fn export<I, C>(
        &mut self,
        pages: I,
        fetcher: &C,
        namespace_display: Option<&str>,
    ) -> Result<ExportSummary>
    where
        I: IntoIterator<Item = Result<PageRef>>,
        C: ContentSource + ?Sized,
    {
        let directory = match namespace_display {
            Some(display) => self.output_root.join(sanitize_filename(display)),
            None => self.output_root.clone(),
        };
        let mut directory_ready = namespace_display.is_none();
        let mut summary = ExportSummary::default();

        for (index, page) in pages.into_iter().enumerate() {
            let page = page?;
            info!(index = index + 1, title = %page.title, "exporting page");

            let content = match fetcher.fetch(&page.title) {
                Ok(content) => content,
                Err(error) if error.is_session_lost() => {
                    warn!(title = %page.title, %error, "wiki rejected the session; stopping export");
                    return Err(error);
                }
                Err(error) => {
                    warn!(title = %page.title, %error, "failed to fetch page");
                    summary.failures.push(PageFailure {
                        title: page.title,
                        message: error.to_string(),
                    });
                    continue;
                }
            };
            let Some(body) = content.body else {
                warn!(title = %page.title, "skipped (no content)");
                summary.skipped += 1;
                continue;
            };

            let file_title = match namespace_display {
                Some(_) => strip_namespace_prefix(&page.title, page.namespace_id),
                None => page.title.as_str(),
            };
            let preferred = directory.join(format!(
                "{}.{PAGE_EXTENSION}",
                sanitize_filename(file_title)
            ));
            let (path, collision) = self.claims.claim(preferred, &page.title);
            if let Some(collision) = collision {
                warn!(
                    title = %collision.title,
                    claimed_by = %collision.claimed_by,
                    path = %collision.path.display(),
                    written_to = %collision.written_to.display(),
                    "filename collision"
                );
                summary.collisions.push(collision);
            }

            let written = ensure_directory_once(&directory, &mut directory_ready)
                .and_then(|()| write_page_file(&path, &render_page_file(&page.title, &body)));
            match written {
                Ok(outcome) => {
                    summary.written += 1;
                    if outcome == WriteOutcome::Unchanged {
                        summary.unchanged += 1;
                    }
                    info!(file = %path.display(), ?outcome, "saved page");
                }
                Err(error) => {
                    warn!(title = %page.title, %error, "failed to write page");
                    summary.failures.push(PageFailure {
                        title: page.title,
                        message: error.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }
}

fn ensure_directory_once(directory: &Path, ready: &mut bool) -> Result<()> {
    if !*ready {
        ensure_dir(directory)?;
        *ready = true;
    }
    Ok(())
}

/// One-shot export into `output_root`. See [`Exporter::export`].
pub fn export<I, C>(
    pages: I,
    fetcher: &C,
    output_root: &Path,
    namespace_display: Option<&str>,
) -> Result<ExportSummary>
where
    I: IntoIterator<Item = Result<PageRef>>,
    C: ContentSource + ?Sized,
{
    Exporter::new(output_root)?.export(pages, fetcher, namespace_display)
}
