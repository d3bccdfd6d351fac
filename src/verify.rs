use crate::{
    error::ArchiveFault,
    fsutil,
    patch::{DATA_BLOB, DEPENDENCY_LIB, EXECUTABLE},
};
use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct KnownHashes {
    pub executable: String,
    pub data_blob: String,
    pub dependency_lib: String,
}

impl Default for KnownHashes {
    fn default() -> Self {
        Self {
            executable: "15253f7a66d6ea3feef004ebbee9b438".to_string(),
            data_blob: "f2b84fe5ba64cb64e284be1066ca08ee".to_string(),
            dependency_lib: "86e39e9161c3d930d93822f1563c280d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(ArchiveFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    Unverified,
    Valid,
    Invalid(ArchiveFault),
}

impl From<Verdict> for ArchiveStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Valid => ArchiveStatus::Valid,
            Verdict::Invalid(fault) => ArchiveStatus::Invalid(fault),
        }
    }
}

pub struct IntegrityVerifier {
    hashes: KnownHashes,
    scratch_root: PathBuf,
}

impl IntegrityVerifier {
    pub fn new(hashes: KnownHashes) -> Self {
        Self {
            hashes,
            scratch_root: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn verify(&self, archive: &Path) -> Result<Verdict> {
        let scratch = self.scratch_dir(archive);
        fsutil::recreate_dir(&scratch)?;
        let verdict = self.verify_into(archive, &scratch);
        fsutil::remove_dir_if_exists(&scratch)?;
        let verdict = verdict?;
        debug!(?archive, ?verdict, "base archive checked");
        Ok(verdict)
    }

    fn scratch_dir(&self, archive: &Path) -> PathBuf {
        let hash = blake3::hash(archive.to_string_lossy().as_bytes());
        let hex = hash.to_hex();
        self.scratch_root
            .join(format!("am2rforge-verify-{}", &hex[..16]))
    }

    fn verify_into(&self, archive: &Path, scratch: &Path) -> Result<Verdict> {
        let file = File::open(archive).with_context(|| format!("open {archive:?}"))?;
        let mut zip = match zip::ZipArchive::new(file) {
            Ok(zip) => zip,
            Err(_) => return Ok(Verdict::Invalid(ArchiveFault::NotAnArchive)),
        };

        let exe_name = zip
            .file_names()
            .find(|name| name.contains(EXECUTABLE))
            .map(|name| name.to_string());
        let Some(exe_name) = exe_name else {
            return Ok(Verdict::Invalid(ArchiveFault::MissingOrInvalidExecutable));
        };
        if exe_name != EXECUTABLE {
            return Ok(Verdict::Invalid(ArchiveFault::SubfolderNesting));
        }

        let checks = [
            (
                EXECUTABLE,
                &self.hashes.executable,
                ArchiveFault::MissingOrInvalidExecutable,
            ),
            (
                DATA_BLOB,
                &self.hashes.data_blob,
                ArchiveFault::MissingOrInvalidDataBlob,
            ),
            (
                DEPENDENCY_LIB,
                &self.hashes.dependency_lib,
                ArchiveFault::MissingOrInvalidDependencyLib,
            ),
        ];
        for (member, expected, fault) in checks {
            let extracted = scratch.join(member);
            {
                let mut entry = match zip.by_name(member) {
                    Ok(entry) => entry,
                    Err(zip::result::ZipError::FileNotFound) => {
                        return Ok(Verdict::Invalid(fault))
                    }
                    Err(err) => return Err(err).with_context(|| format!("read {member}")),
                };
                let mut out = File::create(&extracted).context("create scratch member")?;
                io::copy(&mut entry, &mut out).with_context(|| format!("extract {member}"))?;
            }
            let actual = md5_file(&extracted)?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Ok(Verdict::Invalid(fault));
            }
        }

        Ok(Verdict::Valid)
    }
}

pub fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {path:?} for checksum"))?;
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verifies the archive at `path`; an invalid one is renamed aside so the
/// user can inspect it, and the base game counts as absent.
pub fn check_base_archive(verifier: &IntegrityVerifier, path: &Path) -> Result<ArchiveStatus> {
    if !path.is_file() {
        return Ok(ArchiveStatus::Unverified);
    }
    let verdict = verifier.verify(path)?;
    if let Verdict::Invalid(fault) = verdict {
        let moved = fsutil::rollover(path, None)?;
        info!(?moved, %fault, "invalid base archive set aside");
    }
    Ok(verdict.into())
}

pub fn import_base_archive(
    verifier: &IntegrityVerifier,
    candidate: &Path,
    destination: &Path,
) -> Result<ArchiveStatus> {
    if candidate != destination {
        if destination.exists() {
            fsutil::rollover(destination, None)?;
        }
        fs::copy(candidate, destination)
            .with_context(|| format!("copy {candidate:?} -> {destination:?}"))?;
    }
    check_base_archive(verifier, destination)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub const EXE: &[u8] = b"fake executable";
    pub const DATA: &[u8] = b"hello world";
    pub const DLL: &[u8] = b"fake dll";

    pub fn hashes() -> KnownHashes {
        let digest = |bytes: &[u8]| format!("{:x}", Md5::digest(bytes));
        KnownHashes {
            executable: digest(EXE),
            data_blob: digest(DATA),
            dependency_lib: digest(DLL),
        }
    }

    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, bytes) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    pub fn write_valid_base(path: &Path) {
        write_zip(
            path,
            &[
                (EXECUTABLE, EXE),
                (DATA_BLOB, DATA),
                (DEPENDENCY_LIB, DLL),
                ("lang/english.ini", b"[lang]"),
                ("mods/readme.txt", b"mods"),
            ],
        );
    }
}
