use anyhow::{Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::WalkDir;

pub fn extract_zip(path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("open zip {path:?}"))?;
    let mut archive = zip::ZipArchive::new(file).context("read zip")?;
    fs::create_dir_all(dest).context("create zip dest")?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).context("zip entry")?;
        let Some(out_path) = file.enclosed_name() else {
            continue;
        };

        let out_path = dest.join(out_path);
        if file.is_dir() {
            fs::create_dir_all(&out_path).context("create zip dir")?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).context("create zip dir")?;
        }

        let mut out_file = fs::File::create(&out_path).context("write zip entry")?;
        io::copy(&mut file, &mut out_file).context("extract zip entry")?;
    }

    Ok(())
}

pub fn extract_7z(path: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).context("create 7z dest")?;
    sevenz_rust::decompress_file(path, dest).with_context(|| format!("extract 7z archive {path:?}"))
}

pub fn copy_dir(source: &Path, dest: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.with_context(|| format!("walk {source:?}"))?;
        let rel = entry.path().strip_prefix(source).context("rel path")?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).context("create dir")?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).context("create file dir")?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {:?} -> {target:?}", entry.path()))?;
            preserve_mtime(entry.path(), &target);
            copied += 1;
        }
    }
    Ok(copied)
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(meta) = fs::metadata(source) else {
        return;
    };
    let Ok(modified) = meta.modified() else {
        return;
    };
    let Ok(duration) = modified.duration_since(UNIX_EPOCH) else {
        return;
    };
    let mtime = FileTime::from_unix_time(duration.as_secs() as i64, 0);
    let _ = set_file_mtime(dest, mtime);
}

pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        clear_readonly(path);
        fs::remove_dir_all(path).with_context(|| format!("remove {path:?}"))?;
    }
    Ok(())
}

pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {path:?}")),
    }
}

// Git object files are read-only on Windows and refuse plain deletion.
fn clear_readonly(path: &Path) {
    if !cfg!(windows) {
        return;
    }
    for entry in WalkDir::new(path).into_iter().filter_map(|entry| entry.ok()) {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(entry.path(), perms);
            }
        }
    }
}

pub fn recreate_dir(path: &Path) -> Result<()> {
    remove_dir_if_exists(path)?;
    fs::create_dir_all(path).with_context(|| format!("create {path:?}"))?;
    Ok(())
}

fn generation_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Renames `path` to `path.1`, shifting older generations up.
///
/// With `keep = Some(n)` the generation that would become `path.{n+1}` is
/// deleted; with `None` nothing is ever deleted.
pub fn rollover(path: &Path, keep: Option<usize>) -> Result<PathBuf> {
    let mut last = 1;
    while generation_path(path, last).exists() {
        if keep.is_some_and(|keep| last >= keep) {
            break;
        }
        last += 1;
    }

    if let Some(keep) = keep {
        if last >= keep {
            remove_file_if_exists(&generation_path(path, keep))?;
            last = keep;
        }
    }

    for generation in (1..last).rev() {
        let from = generation_path(path, generation);
        if from.exists() {
            fs::rename(&from, generation_path(path, generation + 1))
                .with_context(|| format!("roll over {from:?}"))?;
        }
    }

    let first = generation_path(path, 1);
    fs::rename(path, &first).with_context(|| format!("roll over {path:?}"))?;
    Ok(first)
}

pub fn lowercase_extension(dir: &Path, extension: &str) -> Result<usize> {
    let suffix = format!(".{}", extension.to_ascii_lowercase());
    let mut renamed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("read {dir:?}"))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.to_ascii_lowercase().ends_with(&suffix) {
            continue;
        }
        let lower = name.to_lowercase();
        if lower == name {
            continue;
        }
        let target = dir.join(&lower);
        if target.exists() {
            continue;
        }
        fs::rename(entry.path(), &target).with_context(|| format!("lowercase {name}"))?;
        renamed += 1;
    }
    Ok(renamed)
}

pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    let candidates: Vec<String> = if cfg!(windows) {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    };
    std::env::split_paths(&paths).find_map(|dir| {
        candidates
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
    })
}
