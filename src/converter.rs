//! External converter for IFC → GLTF
//!
//! The conversion is delegated to Blender running headless with an IFC
//! importer add-on. Blender receives a fixed script; the source and target
//! paths travel as arguments after `--`, so no path is ever spliced into
//! script text.

use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File names used inside a task workspace
pub const SOURCE_FILE_NAME: &str = "model.ifc";
pub const TARGET_FILE_NAME: &str = "model.gltf";
pub const SIDECAR_EXTENSION: &str = "bin";
pub const SCRIPT_FILE_NAME: &str = "convert_ifc.py";

/// Blender script: enable the glTF exporter, start from an empty scene,
/// import the IFC project and export it as .gltf + .bin.
pub const BLENDER_SCRIPT: &str = r#"import sys

import addon_utils
import bpy

argv = sys.argv[sys.argv.index("--") + 1:]
if len(argv) != 2:
    raise SystemExit("usage: -- <source.ifc> <target.gltf>")
source_path, target_path = argv

addon_utils.enable("io_scene_gltf2", default_set=True, persistent=True)

bpy.ops.wm.read_homefile(use_empty=True)

bpy.ops.bim.load_project(filepath=source_path)

bpy.ops.export_scene.gltf(
    filepath=target_path,
    check_existing=False,
    export_format="GLTF_SEPARATE",
    use_selection=False,
)
"#;

/// Longest stderr excerpt carried in an error
const STDERR_EXCERPT_CHARS: usize = 4000;

/// Paths for one conversion attempt
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Directory owned by this attempt; scratch files go here
    pub workspace: PathBuf,
    pub source_file: PathBuf,
    pub target_file: PathBuf,
}

impl ConversionJob {
    /// Job with the standard file names inside `workspace`
    pub fn in_workspace(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            source_file: workspace.join(SOURCE_FILE_NAME),
            target_file: workspace.join(TARGET_FILE_NAME),
        }
    }

    /// Buffer file written next to the target by the separate-files export
    pub fn sidecar_file(&self) -> PathBuf {
        self.target_file.with_extension(SIDECAR_EXTENSION)
    }
}

/// Captured result of a converter run
#[derive(Debug, Clone, Default)]
pub struct ConversionOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// An out-of-process converter.
///
/// Implementations return `Ok` when the tool exited successfully. Whether the
/// target file actually exists is checked by the caller.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, job: &ConversionJob) -> Result<ConversionOutput>;
}

/// Converter configuration
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Blender executable, "blender" for PATH lookup
    pub blender_path: PathBuf,

    /// Extra arguments placed before `--python`
    pub extra_args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            blender_path: PathBuf::from("blender"),
            extra_args: Vec::new(),
        }
    }
}

/// Runs Blender in background mode
#[derive(Debug, Clone)]
pub struct BlenderConverter {
    config: ConverterConfig,
}

impl BlenderConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for one job
    pub fn args(&self, script: &Path, job: &ConversionJob) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec!["--background".into()];
        args.extend(self.config.extra_args.iter().map(Into::into));
        args.extend([
            "--python-exit-code".into(),
            "1".into(),
            "--python".into(),
            script.as_os_str().to_owned(),
            "--".into(),
            job.source_file.as_os_str().to_owned(),
            job.target_file.as_os_str().to_owned(),
        ]);
        args
    }
}

#[async_trait]
impl Converter for BlenderConverter {
    async fn convert(&self, job: &ConversionJob) -> Result<ConversionOutput> {
        let script = job.workspace.join(SCRIPT_FILE_NAME);
        tokio::fs::write(&script, BLENDER_SCRIPT).await?;

        info!(
            "Running Blender conversion: {} -> {}",
            job.source_file.display(),
            job.target_file.display()
        );

        let output = Command::new(&self.config.blender_path)
            .args(self.args(&script, job))
            .current_dir(&job.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConverterError::ConversionError {
                reason: format!(
                    "Failed to start {}: {}",
                    self.config.blender_path.display(),
                    e
                ),
                stderr: None,
                source: Some(Box::new(e.into())),
            })?;

        let result = ConversionOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("Blender output: {}", result.stdout);
        if !result.stderr.trim().is_empty() {
            warn!("Blender stderr: {}", result.stderr);
        }

        if !output.status.success() {
            let reason = match result.exit_code {
                Some(code) => format!("Blender exited with status {}", code),
                None => "Blender was terminated by a signal".to_string(),
            };
            return Err(ConverterError::ConversionError {
                reason,
                stderr: Some(tail(&result.stderr, STDERR_EXCERPT_CHARS).to_string()),
                source: None,
            });
        }

        Ok(result)
    }
}

/// Last `max_chars` characters of `text`
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}
