use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFault {
    NotAnArchive,
    SubfolderNesting,
    MissingOrInvalidExecutable,
    MissingOrInvalidDataBlob,
    MissingOrInvalidDependencyLib,
}

impl ArchiveFault {
    pub fn label(self) -> &'static str {
        match self {
            ArchiveFault::NotAnArchive => "not a readable zip archive",
            ArchiveFault::SubfolderNesting => "game files are inside a subfolder",
            ArchiveFault::MissingOrInvalidExecutable => "AM2R.exe missing or modified",
            ArchiveFault::MissingOrInvalidDataBlob => "data.win missing or modified",
            ArchiveFault::MissingOrInvalidDependencyLib => "D3DX9_43.dll missing or modified",
        }
    }
}

impl std::fmt::Display for ArchiveFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("patch data is corrupted")]
    PatchDataCorrupted,

    #[error("patch data was removed and must be downloaded again")]
    RequiresFullResync,

    #[error("invalid base archive: {0}")]
    InvalidBaseArchive(ArchiveFault),

    #[error("required tool not found: {0}")]
    ToolMissing(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("{stage} did not produce {path:?}")]
    StageOutputMissing { stage: &'static str, path: PathBuf },

    #[error("another {0} job is already running")]
    JobBusy(&'static str),

    #[error("delta decode failed: {0}")]
    Delta(#[from] DeltaError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("not a VCDIFF stream")]
    BadMagic,

    #[error("unexpected end of delta data")]
    Truncated,

    #[error("integer overflow in delta stream")]
    Overflow,

    #[error("target window of {0} bytes exceeds the decoder limit")]
    WindowTooLarge(usize),

    #[error("unsupported delta feature: {0}")]
    Unsupported(&'static str),

    #[error("invalid instruction at target offset {0}")]
    BadInstruction(usize),

    #[error("address {addr} out of range at target offset {at}")]
    BadAddress { addr: u64, at: usize },

    #[error("source segment out of range")]
    BadSourceSegment,

    #[error("window checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

pub fn find_launcher_error(err: &anyhow::Error) -> Option<&LauncherError> {
    err.downcast_ref::<LauncherError>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<LauncherError>()))
}
