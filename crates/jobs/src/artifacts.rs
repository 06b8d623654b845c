//! Artifact discovery for finished jobs.
//!
//! A job advertises where its outputs land through well-known metadata
//! keys (see [`refinery_core::metadata`]). Resolution checks each location
//! on disk and returns only what actually exists; missing locations are
//! skipped without error. Relative paths are taken relative to the job's
//! working directory.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use refinery_core::artifact::{artifact_id, download_url, Artifact, ArtifactKind};
use refinery_core::job::Job;
use refinery_core::metadata::{
    str_value, META_ARCHIVE_DIR, META_CONTRACT_PATH, META_OUTPUT_PATH, META_PROFILE_PATH,
};

/// An artifact together with the file backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub artifact: Artifact,
    pub path: PathBuf,
}

/// Scan the job's known output locations.
///
/// Order: primary output, archive entries (by file name), profile,
/// contract. A file reachable through two locations is listed once.
pub async fn resolve(job: &Job) -> Vec<ResolvedArtifact> {
    let mut found = Vec::new();

    if let Some(path) = location(job, META_OUTPUT_PATH) {
        found.extend(file_artifact(&job.id, ArtifactKind::Refined, &path).await);
    }
    if let Some(dir) = location(job, META_ARCHIVE_DIR) {
        found.extend(archive_entries(&job.id, &dir).await);
    }
    if let Some(path) = location(job, META_PROFILE_PATH) {
        found.extend(file_artifact(&job.id, ArtifactKind::Profile, &path).await);
    }
    if let Some(path) = location(job, META_CONTRACT_PATH) {
        found.extend(file_artifact(&job.id, ArtifactKind::Contract, &path).await);
    }

    let mut paths = HashSet::new();
    found.retain(|r| paths.insert(r.path.clone()));
    disambiguate_ids(&job.id, &mut found);
    found
}

/// Different files whose names sanitize to the same id get `-2`, `-3`, ...
/// appended in resolution order.
fn disambiguate_ids(job_id: &str, found: &mut [ResolvedArtifact]) {
    let mut ids = HashSet::new();
    for resolved in found.iter_mut() {
        let base = resolved.artifact.id.clone();
        let mut id = base.clone();
        let mut n = 2;
        while ids.contains(&id) {
            id = format!("{base}-{n}");
            n += 1;
        }
        if id != base {
            resolved.artifact.url = download_url(job_id, &id);
            resolved.artifact.id = id.clone();
        }
        ids.insert(id);
    }
}

/// Find a single artifact of the job by id.
pub async fn locate(job: &Job, id: &str) -> Option<ResolvedArtifact> {
    resolve(job)
        .await
        .into_iter()
        .find(|r| r.artifact.id == id)
}

fn location(job: &Job, key: &str) -> Option<PathBuf> {
    let raw = str_value(&job.metadata, key)?;
    let path = Path::new(raw);
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        Some(Path::new(&job.cwd).join(path))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn build(job_id: &str, kind: ArtifactKind, path: &Path, size: u64) -> ResolvedArtifact {
    let name = file_name(path);
    let id = artifact_id(kind, &name);
    ResolvedArtifact {
        artifact: Artifact {
            url: download_url(job_id, &id),
            id,
            name,
            kind,
            size,
        },
        path: path.to_path_buf(),
    }
}

async fn file_artifact(
    job_id: &str,
    kind: ArtifactKind,
    path: &Path,
) -> Option<ResolvedArtifact> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(build(job_id, kind, path, meta.len())),
        Ok(_) => None,
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(
                job_id,
                path = %path.display(),
                error = %e,
                "Skipping unreadable artifact location"
            );
            None
        }
    }
}

async fn archive_entries(job_id: &str, dir: &Path) -> Vec<ResolvedArtifact> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(
                job_id,
                path = %dir.display(),
                error = %e,
                "Skipping unreadable archive directory"
            );
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if let Some(artifact) = file_artifact(job_id, ArtifactKind::Archive, &path).await {
                    found.push(artifact);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Archive directory scan interrupted");
                break;
            }
        }
    }
    found.sort_by(|a, b| a.artifact.name.cmp(&b.artifact.name));
    found
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
