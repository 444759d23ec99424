use serde::Serialize;
use tracing::{info, warn};

use crate::auth::authenticate;
use crate::client::{ApiTransport, MediaWikiClient};
use crate::config::MirrorSettings;
use crate::error::Result;
use crate::export::{ExportSummary, Exporter};
use crate::listing::list_pages;
use crate::model::Namespace;
use crate::namespaces::list_namespaces;
use crate::vcs::{CommandRunner, SystemCommandRunner, VcsReport, sync_repository};

#[derive(Debug, Clone, Serialize)]
pub struct NamespaceReport {
    pub namespace: Namespace,
    pub summary: ExportSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    /// Empty in flat mode.
    pub namespaces: Vec<NamespaceReport>,
    pub total: ExportSummary,
    pub vcs: Option<VcsReport>,
    pub request_count: usize,
}

impl MirrorReport {
    pub fn namespace_mode(&self) -> bool {
        !self.namespaces.is_empty()
    }
}

/// One full mirror run against a real wiki, committing with the system `git`.
pub fn mirror(settings: &MirrorSettings) -> Result<MirrorReport> {
    let client = MediaWikiClient::new(&settings.api_url, settings.http.clone())?;
    run_mirror(settings, client, &SystemCommandRunner)
}

/// Log in, export every page (per namespace, or all into one directory),
/// then optionally commit the output directory.
///
/// Login failures and listing failures end the run with an error. Per-page
/// failures and git failures are only reported.
pub fn run_mirror<T, R>(settings: &MirrorSettings, transport: T, runner: &R) -> Result<MirrorReport>
where
    T: ApiTransport,
    R: CommandRunner + ?Sized,
{
    let session = authenticate(transport, &settings.credentials)?;
    let mut exporter = Exporter::new(&settings.output_dir)?;
    let mut namespaces = Vec::new();
    let mut total = ExportSummary::default();

    if settings.all_namespaces {
        for namespace in list_namespaces(session.transport())? {
            info!(id = namespace.id, name = %namespace.display_name, "exporting namespace");
            let pages = list_pages(&session, Some(namespace.id));
            let summary = exporter.export(pages, &session, Some(&namespace.display_name))?;
            if summary.pages_seen() == 0 {
                info!(name = %namespace.display_name, "no pages in namespace");
            }
            total.merge(summary.clone());
            namespaces.push(NamespaceReport { namespace, summary });
        }
    } else {
        let pages = list_pages(&session, None);
        total = exporter.export(pages, &session, None)?;
    }

    info!(
        user = %session.username(),
        written = total.written,
        unchanged = total.unchanged,
        skipped = total.skipped,
        failed = total.failures.len(),
        output_dir = %exporter.output_root().display(),
        "export complete"
    );
    if !total.collisions.is_empty() {
        warn!(count = total.collisions.len(), "titles collided on disk; later pages were renamed");
    }

    let vcs = settings
        .git
        .as_ref()
        .map(|git| sync_repository(runner, exporter.output_root(), &git.message));

    Ok(MirrorReport {
        namespaces,
        total,
        vcs,
        request_count: session.transport().request_count(),
    })
}
