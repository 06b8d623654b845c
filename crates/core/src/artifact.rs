//! Downloadable outputs produced by a finished job.

use serde::{Deserialize, Serialize};

/// What an artifact represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Primary refined output of an import or refine run.
    Refined,
    /// An entry of the job's archive directory.
    Archive,
    /// Data profile written alongside the output.
    Profile,
    /// Emitted data contract.
    Contract,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refined => "refined",
            Self::Archive => "archive",
            Self::Profile => "profile",
            Self::Contract => "contract",
        }
    }
}

/// A file confirmed to exist on disk for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Stable within a job: `<kind>-<file name>`.
    pub id: String,
    /// File name shown to the operator.
    pub name: String,
    pub kind: ArtifactKind,
    /// Size in bytes at resolution time.
    pub size: u64,
    /// Relative URL the file can be downloaded from.
    pub url: String,
}

/// Build the artifact id for a file of the given kind.
///
/// Any character outside `[A-Za-z0-9._-]` is replaced with `_` so the id
/// can be used verbatim as a URL path segment.
pub fn artifact_id(kind: ArtifactKind, file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{safe}", kind.as_str())
}

/// Download locator for an artifact of a job.
pub fn download_url(job_id: &str, artifact_id: &str) -> String {
    format!("/api/v1/jobs/{job_id}/artifacts/{artifact_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_id_is_path_safe() {
        assert_eq!(
            artifact_id(ArtifactKind::Archive, "part 1/of?2.csv"),
            "archive-part_1_of_2.csv"
        );
        assert_eq!(artifact_id(ArtifactKind::Refined, "out.parquet"), "refined-out.parquet");
    }

    #[test]
    fn download_url_points_at_job_artifact() {
        assert_eq!(
            download_url("job-1", "contract-c.yaml"),
            "/api/v1/jobs/job-1/artifacts/contract-c.yaml"
        );
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_value(ArtifactKind::Profile).unwrap();
        assert_eq!(json, "profile");
    }
}
