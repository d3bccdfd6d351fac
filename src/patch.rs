use crate::{
    error::LauncherError,
    fsutil,
    platform::{Platform, Target},
    vcdiff,
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info, warn};

pub const DATA_BLOB: &str = "data.win";
pub const EXECUTABLE: &str = "AM2R.exe";
pub const DEPENDENCY_LIB: &str = "D3DX9_43.dll";
pub const LINUX_DATA_BLOB: &str = "game.unx";
pub const MOBILE_DATA_BLOB: &str = "game.droid";

const XDELTA_TOOL: &str = "xdelta3";

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchEngine {
    pub strict: bool,
}

impl PatchEngine {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Rebuilds `destination` from `source` and `diff`. `source` and
    /// `destination` may name the same file.
    pub fn apply(&self, source: &Path, diff: &Path, destination: &Path) -> Result<()> {
        let delta = fs::read(diff).with_context(|| format!("read delta {diff:?}"))?;
        let (header, _) = vcdiff::read_header(&delta)
            .map_err(LauncherError::from)
            .with_context(|| format!("parse delta {diff:?}"))?;
        if !header.natively_decodable() {
            debug!(?diff, "delta needs external decoder");
            return apply_with_tool(source, diff, destination);
        }

        let source_bytes = fs::read(source).with_context(|| format!("read source {source:?}"))?;
        let output = vcdiff::decode(&source_bytes, &delta, self.strict)
            .map_err(LauncherError::from)
            .with_context(|| format!("apply {diff:?} to {source:?}"))?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).context("create patch output dir")?;
        }
        fs::write(destination, output).with_context(|| format!("write {destination:?}"))?;
        Ok(())
    }

    pub fn run_plan(&self, plan: &PatchPlan) -> Result<()> {
        for step in &plan.steps {
            info!(
                source = %step.source.display(),
                diff = %step.diff.display(),
                "applying patch"
            );
            self.apply(&step.source, &step.diff, &step.destination)?;
        }
        for path in &plan.discard {
            fsutil::remove_file_if_exists(path)?;
        }
        Ok(())
    }
}

fn apply_with_tool(source: &Path, diff: &Path, destination: &Path) -> Result<()> {
    let tool = fsutil::find_in_path(XDELTA_TOOL)
        .ok_or_else(|| LauncherError::ToolMissing(XDELTA_TOOL.to_string()))?;

    // xdelta3 cannot write over its own source.
    let same_file = source == destination;
    let output = if same_file {
        destination.with_extension("xdelta-out")
    } else {
        destination.to_path_buf()
    };

    let status = Command::new(tool)
        .arg("-f")
        .arg("-d")
        .arg("-s")
        .arg(source)
        .arg(diff)
        .arg(&output)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("launch xdelta3")?;
    if !status.success() {
        warn!(?status, ?diff, "xdelta3 reported failure");
    }
    if !output.exists() {
        return Err(LauncherError::StageOutputMissing {
            stage: "xdelta3",
            path: output,
        }
        .into());
    }
    if same_file {
        fs::rename(&output, destination).context("replace patched file")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchStep {
    pub source: PathBuf,
    pub diff: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    pub steps: Vec<PatchStep>,
    pub discard: Vec<PathBuf>,
}

pub fn plan_for(
    target: Target,
    uses_yyc: bool,
    game_dir: &Path,
    data_dir: &Path,
    runner: &str,
) -> PatchPlan {
    let step = |source: &str, diff: &str, destination: &str| PatchStep {
        source: game_dir.join(source),
        diff: data_dir.join(diff),
        destination: game_dir.join(destination),
    };

    match target {
        Target::Desktop(Platform::Windows) if uses_yyc => PatchPlan {
            steps: vec![step(DATA_BLOB, "AM2R.xdelta", EXECUTABLE)],
            discard: vec![game_dir.join(DATA_BLOB)],
        },
        Target::Desktop(Platform::Windows) => PatchPlan {
            steps: vec![
                step(DATA_BLOB, "data.xdelta", DATA_BLOB),
                step(EXECUTABLE, "AM2R.xdelta", EXECUTABLE),
            ],
            discard: Vec::new(),
        },
        Target::Desktop(Platform::Linux) => PatchPlan {
            steps: vec![
                step(DATA_BLOB, "game.xdelta", LINUX_DATA_BLOB),
                step(EXECUTABLE, "AM2R.xdelta", runner),
            ],
            discard: vec![
                game_dir.join(DATA_BLOB),
                game_dir.join(EXECUTABLE),
                game_dir.join(DEPENDENCY_LIB),
            ],
        },
        Target::Mobile => PatchPlan {
            steps: vec![PatchStep {
                source: game_dir.join(DATA_BLOB),
                diff: data_dir.join("droid.xdelta"),
                destination: game_dir.join(MOBILE_DATA_BLOB),
            }],
            discard: Vec::new(),
        },
    }
}
