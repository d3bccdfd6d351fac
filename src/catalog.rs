use crate::{
    config::{Layout, NO_PROFILE},
    error::LauncherError,
    fsutil,
    platform::Platform,
    profile::{ProfileDescriptor, DESCRIPTOR_FILE},
};
use anyhow::{bail, Context, Result};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: Vec<ProfileDescriptor>,
    selected: Option<usize>,
}

impl ProfileCatalog {
    pub fn load(layout: &Layout, platform: Platform, persisted_index: &str) -> Result<Self> {
        let mut profiles = Vec::new();
        let mut seen = HashSet::new();

        let canonical = layout.canonical_descriptor();
        if canonical.is_file() {
            match ProfileDescriptor::read(&canonical) {
                Ok(mut profile) => {
                    profile.data_path = layout.patch_data_files();
                    if !profile.installable && !is_installed(layout, platform, &profile) {
                        info!(name = %profile.name, "archived base profile hidden");
                    } else if admit(&profile, &mut seen) {
                        profiles.push(profile);
                    }
                }
                Err(err) => warn!("Skipping base profile: {err:#}"),
            }
        }

        let mods = layout.mods();
        fs::create_dir_all(&mods).context("create mods dir")?;
        for entry in fs::read_dir(&mods).context("read mods dir")? {
            let entry = entry.context("mods entry")?;
            if !entry.file_type().context("mods entry type")?.is_dir() {
                continue;
            }
            let descriptor = entry.path().join(DESCRIPTOR_FILE);
            if !descriptor.is_file() {
                continue;
            }
            let mut profile = match ProfileDescriptor::read(&descriptor) {
                Ok(profile) => profile,
                Err(err) => {
                    warn!("Skipping mod {:?}: {err:#}", entry.file_name());
                    continue;
                }
            };
            profile.data_path = entry.path();

            if !profile.installable && !is_installed(layout, platform, &profile) {
                info!(name = %profile.name, "pruning archived mod that is not installed");
                delete_profile(layout, &profile)?;
                continue;
            }
            if admit(&profile, &mut seen) {
                profiles.push(profile);
            }
        }

        let selected = resolve_selection(persisted_index, profiles.len());
        Ok(Self { profiles, selected })
    }

    pub fn profiles(&self) -> &[ProfileDescriptor] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&ProfileDescriptor> {
        self.selected.and_then(|index| self.profiles.get(index))
    }

    pub fn get(&self, index: usize) -> Option<&ProfileDescriptor> {
        self.profiles.get(index)
    }

    pub fn find(&self, name: &str) -> Option<(usize, &ProfileDescriptor)> {
        self.profiles
            .iter()
            .enumerate()
            .find(|(_, profile)| profile.name == name)
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.profiles.len() {
            return Err(LauncherError::ProfileNotFound(index.to_string()).into());
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Drops the entry at `index` and deletes its files unless it is the
    /// synced base profile. The selection falls back to the first entry.
    pub fn prune(&mut self, layout: &Layout, index: usize) -> Result<ProfileDescriptor> {
        if index >= self.profiles.len() {
            return Err(LauncherError::ProfileNotFound(index.to_string()).into());
        }
        let profile = self.profiles.remove(index);
        if is_mod(layout, &profile) {
            delete_profile(layout, &profile)?;
        }
        self.selected = if self.profiles.is_empty() { None } else { Some(0) };
        Ok(profile)
    }
}

fn admit(profile: &ProfileDescriptor, seen: &mut HashSet<String>) -> bool {
    if profile.installable && !profile.data_path.is_dir() {
        warn!(name = %profile.name, path = ?profile.data_path, "profile payload missing");
        return false;
    }
    if !seen.insert(profile.name.clone()) {
        warn!(name = %profile.name, "duplicate profile name skipped");
        return false;
    }
    true
}

pub fn resolve_selection(persisted: &str, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let persisted = persisted.trim();
    if persisted.eq_ignore_ascii_case(NO_PROFILE) || persisted.eq_ignore_ascii_case("none") {
        return Some(0);
    }
    match persisted.parse::<usize>() {
        Ok(index) if index < count => Some(index),
        _ => Some(0),
    }
}

pub fn installed_runner(layout: &Layout, platform: Platform, profile: &ProfileDescriptor) -> PathBuf {
    layout.profile_dir(&profile.name).join(platform.runner_file())
}

pub fn is_installed(layout: &Layout, platform: Platform, profile: &ProfileDescriptor) -> bool {
    installed_runner(layout, platform, profile).is_file()
}

fn is_mod(layout: &Layout, profile: &ProfileDescriptor) -> bool {
    profile.data_path.parent() == Some(layout.mods().as_path())
}

/// Removes the mod payload, its source archive and the installed copy.
/// The synced base profile only loses its installed copy.
pub fn delete_profile(layout: &Layout, profile: &ProfileDescriptor) -> Result<()> {
    if is_mod(layout, profile) {
        fsutil::remove_dir_if_exists(&profile.data_path)?;
        let mut archive = profile.data_path.clone().into_os_string();
        archive.push(".zip");
        fsutil::remove_file_if_exists(Path::new(&archive))?;
    }
    fsutil::remove_dir_if_exists(&layout.profile_dir(&profile.name))?;
    info!(name = %profile.name, "profile deleted");
    Ok(())
}

pub fn import_mod_archive(layout: &Layout, archive: &Path) -> Result<String> {
    let mods = layout.mods();
    fs::create_dir_all(&mods).context("create mods dir")?;
    let staging = mods.join(".import");
    fsutil::recreate_dir(&staging)?;

    let result = stage_mod(archive, &staging).and_then(|root| {
        let profile = ProfileDescriptor::read(&root.join(DESCRIPTOR_FILE))?;
        let target = mods.join(&profile.name);
        if target.exists() || profile.name == ".import" {
            bail!("A mod named {} is already imported", profile.name);
        }
        fs::rename(&root, &target)
            .with_context(|| format!("move mod into {target:?}"))?;
        fs::copy(archive, mods.join(format!("{}.zip", profile.name)))
            .context("keep mod archive")?;
        Ok(profile.name)
    });

    fsutil::remove_dir_if_exists(&staging)?;
    let name = result?;
    info!(%name, "mod imported");
    Ok(name)
}

fn stage_mod(archive: &Path, staging: &Path) -> Result<PathBuf> {
    let is_7z = archive
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("7z"));
    if is_7z {
        fsutil::extract_7z(archive, staging)?;
    } else {
        fsutil::extract_zip(archive, staging)?;
    }

    if staging.join(DESCRIPTOR_FILE).is_file() {
        return Ok(staging.to_path_buf());
    }
    // Archives packed from the parent folder carry one extra level.
    let mut nested = Vec::new();
    for entry in fs::read_dir(staging).context("read staged mod")? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && entry.path().join(DESCRIPTOR_FILE).is_file() {
            nested.push(entry.path());
        }
    }
    match nested.as_slice() {
        [single] => Ok(single.clone()),
        _ => bail!("{archive:?} does not contain a {DESCRIPTOR_FILE}"),
    }
}
