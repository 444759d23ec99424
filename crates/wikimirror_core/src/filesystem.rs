use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{MirrorError, Result};
use crate::model::NS_MAIN;

pub const PAGE_EXTENSION: &str = "mediawiki";

const UNSAFE_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Map a wiki title to a filesystem-safe name by replacing each of
/// `/ \ : * ? " < > |` with `_`.
pub fn sanitize_filename(title: &str) -> String {
    title.replace(UNSAFE_FILENAME_CHARS, "_")
}

/// Drop the `Prefix:` part of a title outside the main namespace. Main
/// namespace titles may contain a colon that is not a prefix, so they are
/// returned untouched.
pub fn strip_namespace_prefix(title: &str, namespace_id: i32) -> &str {
    if namespace_id == NS_MAIN {
        return title;
    }
    title
        .split_once(':')
        .map(|(_, rest)| rest)
        .unwrap_or(title)
}

/// Rendered file contents: a provenance comment line followed by the raw body.
pub fn render_page_file(title: &str, body: &str) -> String {
    let mut output = String::with_capacity(title.len() + body.len() + 16);
    output.push_str("<!-- Page: ");
    output.push_str(title);
    output.push_str(" -->\n");
    output.push_str(body);
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Write `content` to `path`, replacing whatever is there. Existing files
/// whose bytes already match are left alone so their mtime stays stable.
pub fn write_page_file(path: &Path, content: &str) -> Result<WriteOutcome> {
    let outcome = match fs::read(path) {
        Ok(existing) if compute_hash(&existing) == compute_hash(content.as_bytes()) => {
            return Ok(WriteOutcome::Unchanged);
        }
        Ok(_) => WriteOutcome::Updated,
        Err(_) => WriteOutcome::Created,
    };
    fs::write(path, content).map_err(|source| MirrorError::io("failed to write", path, source))?;
    Ok(outcome)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|source| MirrorError::io("failed to create directory", path, source))
}

pub fn compute_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub path: PathBuf,
    pub claimed_by: String,
    pub title: String,
    pub written_to: PathBuf,
}

/// Tracks which title owns each output path within one run, so that two
/// titles mapping to the same file never overwrite each other. Paths are
/// compared case-insensitively: `Foo` and `FOO` are distinct titles but
/// share a file on case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct PathClaims {
    owners: HashMap<String, String>,
}

impl PathClaims {
    /// Returns the path `title` should be written to, plus the collision
    /// when `preferred` already belongs to a different title.
    pub fn claim(&mut self, preferred: PathBuf, title: &str) -> (PathBuf, Option<Collision>) {
        let claimed_by = match self.owners.get(&claim_key(&preferred)) {
            None => {
                self.owners.insert(claim_key(&preferred), title.to_string());
                return (preferred, None);
            }
            Some(owner) if owner == title => return (preferred, None),
            Some(owner) => owner.clone(),
        };

        let written_to = self.alternative_for(&preferred, title);
        self.owners.insert(claim_key(&written_to), title.to_string());
        let collision = Collision {
            path: preferred,
            claimed_by,
            title: title.to_string(),
            written_to: written_to.clone(),
        };
        (written_to, Some(collision))
    }

    /// `<stem>~<hash>.mediawiki`, or `<stem>~<hash>-N.mediawiki` when that
    /// name is itself owned by another title.
    fn alternative_for(&self, preferred: &Path, title: &str) -> PathBuf {
        let stem = preferred
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let hash = compute_hash(title.as_bytes());
        let base = format!("{stem}~{}", &hash[..8]);

        let mut candidate = preferred.with_file_name(format!("{base}.{PAGE_EXTENSION}"));
        let mut suffix = 2;
        while let Some(owner) = self.owners.get(&claim_key(&candidate)) {
            if owner == title {
                break;
            }
            candidate = preferred.with_file_name(format!("{base}-{suffix}.{PAGE_EXTENSION}"));
            suffix += 1;
        }
        candidate
    }
}

fn claim_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}
