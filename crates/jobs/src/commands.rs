//! Argument builders for the refinery CLI.
//!
//! Each builder reserves a job id, creates `<output_root>/<job_id>/`, and
//! returns the command line together with [`JobOptions`] that carry the id
//! and the output locations the artifact resolver will look at later.

use std::path::{Path, PathBuf};

use refinery_core::error::CoreError;
use refinery_core::job::{generate_job_id, JobOptions};
use refinery_core::metadata::{
    Metadata, META_ARCHIVE_DIR, META_CONTRACT_PATH, META_KIND, META_OUTPUT_PATH,
    META_PROFILE_PATH,
};
use refinery_core::types::JobId;
use serde::Deserialize;
use serde_json::Value;

use crate::config::JobsConfig;

/// Job kinds recorded under the `kind` metadata key.
pub const KIND_IMPORT: &str = "import";
pub const KIND_REFINE: &str = "refine";
pub const KIND_CONTRACT: &str = "contract";

const REFINED_FILE: &str = "refined.parquet";
const ARCHIVE_DIR: &str = "archive";
const PROFILE_FILE: &str = "profile.json";
const CONTRACT_FILE: &str = "contract.yaml";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Import a raw file: refine it, archive the original, and profile it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub input_path: String,
    /// Input format hint (`csv`, `json`, ...); detected by the CLI if absent.
    pub format: Option<String>,
    #[serde(default = "default_true")]
    pub profile: bool,
    pub label: Option<String>,
}

/// Re-run refinement over an existing input with an optional rules file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineRequest {
    pub input_path: String,
    pub rules_path: Option<String>,
    pub label: Option<String>,
}

/// Emit a data contract describing an input.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequest {
    pub input_path: String,
    pub contract_name: Option<String>,
    pub label: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A command line ready for [`JobRegistry::submit`](crate::JobRegistry::submit).
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub command: Vec<String>,
    pub options: JobOptions,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Turns refinery requests into CLI invocations.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    output_root: PathBuf,
}

impl CommandBuilder {
    /// A relative output root is anchored at the configured working
    /// directory so that recorded paths stay valid for the job.
    pub fn new(config: &JobsConfig) -> Self {
        let output_root = if config.output_root.is_absolute() {
            config.output_root.clone()
        } else {
            config.working_dir.join(&config.output_root)
        };
        Self {
            program: config.cli_program.clone(),
            output_root,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `refinery import <input> --output <dir>/refined.parquet
    /// --archive-dir <dir>/archive [--profile <dir>/profile.json]`
    pub async fn import(&self, req: ImportRequest) -> Result<PreparedJob, CoreError> {
        let input = require_input(&req.input_path)?;
        let (id, dir) = self.reserve().await?;

        let output = dir.join(REFINED_FILE);
        let archive = dir.join(ARCHIVE_DIR);
        let mut metadata = base_metadata(KIND_IMPORT);
        insert_path(&mut metadata, META_OUTPUT_PATH, &output);
        insert_path(&mut metadata, META_ARCHIVE_DIR, &archive);

        let mut args = vec![
            "import".to_string(),
            input.to_string(),
            "--output".to_string(),
            path_arg(&output),
            "--archive-dir".to_string(),
            path_arg(&archive),
        ];
        if let Some(format) = non_blank(req.format.as_deref()) {
            args.extend(["--format".to_string(), format.to_string()]);
        }
        if req.profile {
            let profile = dir.join(PROFILE_FILE);
            insert_path(&mut metadata, META_PROFILE_PATH, &profile);
            args.extend(["--profile".to_string(), path_arg(&profile)]);
        }

        let label = req.label.unwrap_or_else(|| format!("Import {input}"));
        Ok(self.prepare(id, args, label, metadata))
    }

    /// `refinery refine <input> --output <dir>/refined.parquet [--rules <file>]`
    pub async fn refine(&self, req: RefineRequest) -> Result<PreparedJob, CoreError> {
        let input = require_input(&req.input_path)?;
        let (id, dir) = self.reserve().await?;

        let output = dir.join(REFINED_FILE);
        let mut metadata = base_metadata(KIND_REFINE);
        insert_path(&mut metadata, META_OUTPUT_PATH, &output);

        let mut args = vec![
            "refine".to_string(),
            input.to_string(),
            "--output".to_string(),
            path_arg(&output),
        ];
        if let Some(rules) = non_blank(req.rules_path.as_deref()) {
            args.extend(["--rules".to_string(), rules.to_string()]);
        }

        let label = req.label.unwrap_or_else(|| format!("Refine {input}"));
        Ok(self.prepare(id, args, label, metadata))
    }

    /// `refinery emit-contract <input> --output <dir>/contract.yaml [--name <name>]`
    pub async fn contract(&self, req: ContractRequest) -> Result<PreparedJob, CoreError> {
        let input = require_input(&req.input_path)?;
        let (id, dir) = self.reserve().await?;

        let output = dir.join(CONTRACT_FILE);
        let mut metadata = base_metadata(KIND_CONTRACT);
        insert_path(&mut metadata, META_CONTRACT_PATH, &output);

        let mut args = vec![
            "emit-contract".to_string(),
            input.to_string(),
            "--output".to_string(),
            path_arg(&output),
        ];
        if let Some(name) = non_blank(req.contract_name.as_deref()) {
            args.extend(["--name".to_string(), name.to_string()]);
        }

        let label = req.label.unwrap_or_else(|| format!("Contract {input}"));
        Ok(self.prepare(id, args, label, metadata))
    }

    /// Pick a fresh id and create its output directory.
    async fn reserve(&self) -> Result<(JobId, PathBuf), CoreError> {
        let id = generate_job_id();
        let dir = self.output_root.join(&id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            CoreError::Internal(format!(
                "failed to create output directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok((id, dir))
    }

    fn prepare(
        &self,
        id: JobId,
        args: Vec<String>,
        label: String,
        metadata: Metadata,
    ) -> PreparedJob {
        let mut command = Vec::with_capacity(args.len() + 3);
        command.push(self.program.clone());
        command.extend(args);
        command.extend(["--job-id".to_string(), id.clone()]);
        PreparedJob {
            command,
            options: JobOptions {
                id: Some(id),
                label: Some(label),
                metadata,
                ..Default::default()
            },
        }
    }
}

fn require_input(raw: &str) -> Result<&str, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("inputPath is required".to_string()));
    }
    Ok(trimmed)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn base_metadata(kind: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(META_KIND.to_string(), Value::String(kind.to_string()));
    metadata
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn insert_path(metadata: &mut Metadata, key: &str, path: &Path) {
    metadata.insert(key.to_string(), Value::String(path_arg(path)));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
