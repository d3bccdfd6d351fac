use crate::{config::Layout, error::LauncherError, fsutil};
use anyhow::{Context, Result};
use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{info, warn};

const GIT: &str = "git";
const REMOTE_REF: &str = "refs/remotes/origin/master";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Updated,
    Stale,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncProgress {
    Stage(&'static str),
    Transfer(u8),
}

pub struct PatchRepositorySync {
    working_copy: PathBuf,
    descriptor: PathBuf,
    mirror: String,
}

impl PatchRepositorySync {
    pub fn new(layout: &Layout, mirror: impl Into<String>) -> Self {
        Self {
            working_copy: layout.patch_data(),
            descriptor: layout.canonical_descriptor(),
            mirror: mirror.into(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.working_copy.join(".git").is_dir() && self.descriptor.is_file()
    }

    pub fn ensure_synced(
        &self,
        progress: &mut dyn FnMut(SyncProgress),
        cancel: &AtomicBool,
    ) -> Result<SyncOutcome> {
        let git = fsutil::find_in_path(GIT)
            .ok_or_else(|| LauncherError::ToolMissing(GIT.to_string()))?;

        if self.is_synced() {
            self.pull(&git, progress, cancel)
        } else {
            self.clone_fresh(&git, progress, cancel)
        }
    }

    fn clone_fresh(
        &self,
        git: &Path,
        progress: &mut dyn FnMut(SyncProgress),
        cancel: &AtomicBool,
    ) -> Result<SyncOutcome> {
        fsutil::remove_dir_if_exists(&self.working_copy)?;
        if cancel.load(Ordering::Relaxed) {
            return Ok(SyncOutcome::Cancelled);
        }

        progress(SyncProgress::Stage("clone"));
        info!(mirror = %self.mirror, "cloning patch data");
        let mut child = Command::new(git)
            .arg("clone")
            .arg("--progress")
            .arg(&self.mirror)
            .arg(&self.working_copy)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("launch git clone")?;

        let mut tail = String::new();
        if let Some(stderr) = child.stderr.take() {
            tail = forward_progress(stderr, progress);
        }
        let status = child.wait().context("wait for git clone")?;

        if !status.success() || !self.is_synced() {
            warn!(?status, "git clone failed: {}", tail.trim());
            fsutil::remove_dir_if_exists(&self.working_copy)?;
            anyhow::bail!("Download of patch data failed: {}", tail.trim());
        }
        progress(SyncProgress::Transfer(100));
        Ok(SyncOutcome::Cloned)
    }

    fn pull(
        &self,
        git: &Path,
        progress: &mut dyn FnMut(SyncProgress),
        cancel: &AtomicBool,
    ) -> Result<SyncOutcome> {
        progress(SyncProgress::Stage("verify"));
        let resolved = self.git(git, &["rev-parse", "--verify", "--quiet", REMOTE_REF])?;
        if !resolved.status.success() {
            warn!("{}; deleting local copy", LauncherError::PatchDataCorrupted);
            fsutil::remove_dir_if_exists(&self.working_copy)?;
            return Err(LauncherError::RequiresFullResync.into());
        }

        if cancel.load(Ordering::Relaxed) {
            return Ok(SyncOutcome::Cancelled);
        }
        progress(SyncProgress::Stage("reset"));
        let reset = self.git(git, &["reset", "--hard", "origin/master"])?;
        if !reset.status.success() {
            warn!(
                "git reset failed: {}",
                String::from_utf8_lossy(&reset.stderr).trim()
            );
        }
        let remote = self.git(git, &["remote", "set-url", "origin", &self.mirror])?;
        if !remote.status.success() {
            warn!("could not point origin at {}", self.mirror);
        }

        if cancel.load(Ordering::Relaxed) {
            return Ok(SyncOutcome::Cancelled);
        }
        progress(SyncProgress::Stage("pull"));
        let pulled = self.git(
            git,
            &[
                "-c",
                "user.name=null",
                "-c",
                "user.email=null",
                "pull",
                "--no-rebase",
                "origin",
                "master",
            ],
        )?;
        if !pulled.status.success() {
            warn!(
                "Patch data update failed, using the existing copy: {}",
                String::from_utf8_lossy(&pulled.stderr).trim()
            );
            return Ok(SyncOutcome::Stale);
        }
        progress(SyncProgress::Transfer(100));
        Ok(SyncOutcome::Updated)
    }

    fn git(&self, git: &Path, args: &[&str]) -> Result<Output> {
        Command::new(git)
            .arg("--git-dir")
            .arg(self.working_copy.join(".git"))
            .arg("--work-tree")
            .arg(&self.working_copy)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("run git {}", args.join(" ")))
    }
}

/// Relays transfer percentages from git's carriage-return progress stream and
/// returns the last lines for error reporting.
fn forward_progress(mut stream: impl Read, progress: &mut dyn FnMut(SyncProgress)) -> String {
    let mut line = Vec::new();
    let mut tail: Vec<String> = Vec::new();
    let mut byte = [0u8; 1];
    let mut last = None;
    while let Ok(1) = stream.read(&mut byte) {
        if byte[0] != b'\r' && byte[0] != b'\n' {
            line.push(byte[0]);
            continue;
        }
        let text = String::from_utf8_lossy(&line).to_string();
        line.clear();
        if let Some(percent) = transfer_percent(&text) {
            if last != Some(percent) {
                last = Some(percent);
                progress(SyncProgress::Transfer(percent));
            }
        } else if !text.trim().is_empty() {
            tail.push(text);
            if tail.len() > 4 {
                tail.remove(0);
            }
        }
    }
    if !line.is_empty() {
        tail.push(String::from_utf8_lossy(&line).to_string());
    }
    tail.join("\n")
}

fn transfer_percent(line: &str) -> Option<u8> {
    let rest = line.trim().strip_prefix("remote: ").unwrap_or(line.trim());
    let rest = rest.strip_prefix("Receiving objects:")?;
    let digits = rest.trim_start().split('%').next()?;
    digits.trim().parse::<u8>().ok().filter(|value| *value <= 100)
}
