use crate::{
    config::Layout,
    error::{ArchiveFault, LauncherError},
    fsutil,
    patch::{self, PatchEngine, DATA_BLOB, DEPENDENCY_LIB, EXECUTABLE},
    platform::{Platform, Target},
    profile::{ProfileDescriptor, DESCRIPTOR_FILE},
    verify::{IntegrityVerifier, Verdict},
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{info, warn};

const FILES_TO_COPY: &str = "files_to_copy";
const APPDIR: &str = "AM2R.AppDir";
const APPIMAGE_TOOL: &str = "appimagetool-x86_64.AppImage";
const APPIMAGE_BUILT: &str = "AM2R-x86_64.AppImage";
const DESKTOP_ENTRY: &str = "AM2R.desktop";
const WRAPPER: &str = "AM2RWrapper";

const MOBILE_LEFTOVERS: &[&str] = &[
    EXECUTABLE,
    DEPENDENCY_LIB,
    "explanations.txt",
    "modifiers.ini",
    "readme.txt",
    DATA_BLOB,
];
const MOBILE_LEFTOVER_DIRS: &[&str] = &["mods", "lang/headers"];

pub type Progress<'a> = &'a mut dyn FnMut(u8, &'static str);

pub struct PackagingPipeline<'a> {
    layout: &'a Layout,
    verifier: &'a IntegrityVerifier,
    engine: PatchEngine,
    java: Option<PathBuf>,
}

impl<'a> PackagingPipeline<'a> {
    pub fn new(layout: &'a Layout, verifier: &'a IntegrityVerifier, engine: PatchEngine) -> Self {
        Self {
            layout,
            verifier,
            engine,
            java: fsutil::find_in_path("java"),
        }
    }

    #[cfg(test)]
    pub fn with_java(mut self, java: Option<PathBuf>) -> Self {
        self.java = java;
        self
    }

    fn check_base(&self) -> Result<PathBuf> {
        let base = self.layout.base_archive();
        if !base.is_file() {
            return Err(LauncherError::InvalidBaseArchive(ArchiveFault::NotAnArchive).into());
        }
        match self.verifier.verify(&base)? {
            Verdict::Valid => Ok(base),
            Verdict::Invalid(fault) => Err(LauncherError::InvalidBaseArchive(fault).into()),
        }
    }

    pub fn install_desktop(
        &self,
        profile: &ProfileDescriptor,
        platform: Platform,
        hq_music: bool,
        progress: Progress<'_>,
    ) -> Result<PathBuf> {
        let base = self.check_base()?;
        // Desktop builds leave a mod's own soundtrack alone.
        let hq_music = hq_music && !profile.uses_custom_music;
        let result = match platform {
            Platform::Windows => self.install_windows(profile, &base, hq_music, progress),
            Platform::Linux => self.install_linux(profile, &base, hq_music, progress),
        };
        if result.is_err() {
            // A half-built profile would otherwise count as installed.
            let profile_dir = self.layout.profile_dir(&profile.name);
            if let Err(err) = fsutil::remove_dir_if_exists(&profile_dir) {
                warn!("could not clean up {profile_dir:?}: {err:#}");
            }
        }
        result
    }

    fn install_windows(
        &self,
        profile: &ProfileDescriptor,
        base: &Path,
        hq_music: bool,
        progress: Progress<'_>,
    ) -> Result<PathBuf> {
        let profile_dir = self.layout.profile_dir(&profile.name);
        fsutil::recreate_dir(&profile_dir)?;
        fsutil::extract_zip(base, &profile_dir)?;
        progress(33, "unpack");

        let plan = patch::plan_for(
            Target::Desktop(Platform::Windows),
            profile.uses_yyc,
            &profile_dir,
            &profile.data_path,
            EXECUTABLE,
        );
        self.engine.run_plan(&plan)?;
        progress(66, "patch");

        self.copy_overlays(profile, &profile_dir, hq_music)?;
        copy_descriptor(profile, &profile_dir)?;
        progress(100, "done");

        let runner = profile_dir.join(Platform::Windows.runner_file());
        info!(name = %profile.name, "desktop install finished");
        Ok(runner)
    }

    fn install_linux(
        &self,
        profile: &ProfileDescriptor,
        base: &Path,
        hq_music: bool,
        progress: Progress<'_>,
    ) -> Result<PathBuf> {
        let tool = self.layout.utilities().join(APPIMAGE_TOOL);
        if !tool.is_file() {
            return Err(LauncherError::ToolMissing(APPIMAGE_TOOL.to_string()).into());
        }
        let template = self.layout.appdir_template();
        let runner = runner_name(&template.join(DESKTOP_ENTRY))?;

        let profile_dir = self.layout.profile_dir(&profile.name);
        let assets = profile_dir.join("assets");
        fsutil::recreate_dir(&profile_dir)?;
        fsutil::extract_zip(base, &assets)?;
        progress(33, "unpack");

        let plan = patch::plan_for(
            Target::Desktop(Platform::Linux),
            profile.uses_yyc,
            &assets,
            &profile.data_path,
            &runner,
        );
        self.engine.run_plan(&plan)?;
        let staged_runner = profile_dir.join(&runner);
        fs::rename(assets.join(&runner), &staged_runner).context("move runner out of assets")?;
        fsutil::set_executable(&staged_runner)?;
        progress(44, "patch");

        self.copy_overlays(profile, &assets, hq_music)?;
        let renamed = fsutil::lowercase_extension(&assets, "ogg")?;
        if renamed > 0 {
            info!(renamed, "lowercased music file names");
        }

        let appdir = profile_dir.join(APPDIR);
        let bin = appdir.join("usr").join("bin");
        fsutil::copy_dir(&template, &appdir)?;
        fs::create_dir_all(&bin).context("create AppDir bin")?;
        fs::rename(&staged_runner, bin.join(&runner)).context("move runner into AppDir")?;
        fs::rename(&assets, bin.join("assets")).context("move assets into AppDir")?;
        progress(66, "appdir");

        fsutil::set_executable(&tool)?;
        let mut command = Command::new(&tool);
        command
            .arg("-n")
            .arg(APPDIR)
            .env("ARCH", "x86_64")
            .current_dir(&profile_dir);
        run_tool("appimagetool", &mut command)?;
        fsutil::remove_dir_if_exists(&appdir)?;

        let built = expect_output("appimagetool", profile_dir.join(APPIMAGE_BUILT))?;
        let appimage = profile_dir.join(Platform::Linux.runner_file());
        fs::rename(&built, &appimage).context("rename AppImage")?;
        copy_descriptor(profile, &profile_dir)?;
        progress(100, "done");

        info!(name = %profile.name, "AppImage install finished");
        Ok(appimage)
    }

    fn copy_overlays(&self, profile: &ProfileDescriptor, dest: &Path, hq_music: bool) -> Result<()> {
        let extra = profile.data_path.join(FILES_TO_COPY);
        if extra.is_dir() {
            fsutil::copy_dir(&extra, dest)?;
        }
        if hq_music {
            let music = self.layout.hq_music();
            if music.is_dir() {
                fsutil::copy_dir(&music, dest)?;
            } else {
                warn!(?music, "high quality music requested but not present");
            }
        }
        Ok(())
    }

    pub fn build_apk(
        &self,
        profile: &ProfileDescriptor,
        host: Platform,
        hq_music: bool,
        progress: Progress<'_>,
    ) -> Result<PathBuf> {
        let java = self
            .java
            .clone()
            .ok_or_else(|| LauncherError::ToolMissing("java".to_string()))?;
        let android = self.layout.utilities().join("android");
        let apktool = android.join("apktool.jar");
        let signer = android.join("uber-apk-signer.jar");
        for jar in [&apktool, &signer] {
            if !jar.is_file() {
                return Err(LauncherError::ToolMissing(jar.display().to_string()).into());
            }
        }
        let base = self.check_base()?;

        let temp = self.layout.temp();
        let result = self.build_apk_in(
            profile, host, hq_music, &java, &apktool, &signer, &base, &temp, progress,
        );
        fsutil::remove_dir_if_exists(&temp)?;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn build_apk_in(
        &self,
        profile: &ProfileDescriptor,
        host: Platform,
        hq_music: bool,
        java: &Path,
        apktool: &Path,
        signer: &Path,
        base: &Path,
        temp: &Path,
        progress: Progress<'_>,
    ) -> Result<PathBuf> {
        let android_data = profile.data_path.join("android");
        fsutil::recreate_dir(temp)?;
        progress(14, "prepare");

        let mut decode = Command::new(java);
        decode
            .arg("-jar")
            .arg(apktool)
            .arg("d")
            .arg("-f")
            .arg(android_data.join(format!("{WRAPPER}.apk")))
            .arg("-o")
            .arg(WRAPPER)
            .current_dir(temp);
        run_tool("apktool decode", &mut decode)?;
        let wrapper = temp.join(WRAPPER);
        let manifest = expect_output("apktool decode", wrapper.join("apktool.yml"))?;
        progress(28, "decode");

        let assets = wrapper.join("assets");
        fsutil::extract_zip(base, &assets)?;
        self.copy_overlays(profile, &assets, hq_music)?;
        let ini = first_ini(&android_data)?;
        let ini_name = ini.file_name().context("ini file name")?;
        fs::copy(&ini, assets.join(ini_name)).context("copy wrapper ini")?;
        progress(42, "assets");

        let plan = patch::plan_for(Target::Mobile, profile.uses_yyc, &assets, &profile.data_path, "");
        self.engine.run_plan(&plan)?;
        progress(56, "patch");

        remove_leftovers(&assets, host)?;
        let yml = fs::read_to_string(&manifest).context("read apktool.yml")?;
        fs::write(&manifest, keep_uncompressed(&yml, "ogg")).context("write apktool.yml")?;
        progress(70, "trim");

        let unsigned_name = format!("{}.apk", profile.name);
        let mut build = Command::new(java);
        build
            .arg("-jar")
            .arg(apktool)
            .arg("b")
            .arg(WRAPPER)
            .arg("-o")
            .arg(&unsigned_name)
            .current_dir(temp);
        run_tool("apktool build", &mut build)?;
        expect_output("apktool build", temp.join(&unsigned_name))?;
        progress(84, "build");

        let mut sign = Command::new(java);
        sign.arg("-jar")
            .arg(signer)
            .arg("-a")
            .arg(&unsigned_name)
            .current_dir(temp);
        run_tool("uber-apk-signer", &mut sign)?;
        let signed = expect_output(
            "uber-apk-signer",
            temp.join(format!("{}-aligned-debugSigned.apk", profile.name)),
        )?;
        let output = self.layout.apk_output(&profile.name);
        fs::copy(&signed, &output).with_context(|| format!("copy {output:?}"))?;
        progress(100, "done");

        info!(name = %profile.name, ?output, "APK built");
        Ok(output)
    }
}

/// Runs a packaging tool. A non-zero exit is only logged; the caller checks
/// for the artifact the step should have produced.
fn run_tool(stage: &'static str, command: &mut Command) -> Result<()> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("launch {stage}"))?;
    if !output.status.success() {
        warn!(
            status = ?output.status,
            "{stage} exited unsuccessfully: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn expect_output(stage: &'static str, path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(LauncherError::StageOutputMissing { stage, path }.into())
    }
}

fn copy_descriptor(profile: &ProfileDescriptor, profile_dir: &Path) -> Result<()> {
    let source = profile.data_path.join(DESCRIPTOR_FILE);
    let source = if source.is_file() {
        source
    } else {
        // The synced profile keeps its descriptor one level above the payload.
        profile
            .data_path
            .parent()
            .map(|parent| parent.join(DESCRIPTOR_FILE))
            .unwrap_or(source)
    };
    fs::copy(&source, profile_dir.join(DESCRIPTOR_FILE))
        .with_context(|| format!("copy {source:?}"))?;
    Ok(())
}

pub fn runner_name(desktop_entry: &Path) -> Result<String> {
    let raw = fs::read_to_string(desktop_entry)
        .with_context(|| format!("read {desktop_entry:?}"))?;
    raw.lines()
        .find_map(|line| line.trim().strip_prefix("Exec="))
        .and_then(|value| value.split_whitespace().next())
        .map(|value| value.to_string())
        .with_context(|| format!("no Exec= entry in {desktop_entry:?}"))
}

fn first_ini(dir: &Path) -> Result<PathBuf> {
    let mut inis = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {dir:?}"))? {
        let path = entry?.path();
        let is_ini = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ini"));
        if is_ini && path.is_file() {
            inis.push(path);
        }
    }
    inis.sort();
    inis.into_iter()
        .next()
        .with_context(|| format!("no .ini file in {dir:?}"))
}

fn remove_leftovers(assets: &Path, host: Platform) -> Result<()> {
    for name in MOBILE_LEFTOVERS {
        fsutil::remove_file_if_exists(&assets.join(name))?;
    }
    for dir in MOBILE_LEFTOVER_DIRS {
        fsutil::remove_dir_if_exists(&assets.join(dir))?;
    }
    if host == Platform::Linux {
        fsutil::remove_file_if_exists(&assets.join("icon.png"))?;
    }
    Ok(())
}

/// Adds `extension` under the `doNotCompress:` list of an apktool manifest.
pub fn keep_uncompressed(yml: &str, extension: &str) -> String {
    let entry = format!("- {extension}");
    let mut out = Vec::new();
    let mut in_list = false;
    let mut present = false;
    let mut insert_at = None;
    for line in yml.lines() {
        if line.trim_end() == "doNotCompress:" {
            in_list = true;
            out.push(line.to_string());
            insert_at = Some(out.len());
            continue;
        }
        if in_list {
            if line.trim_start().starts_with("- ") {
                present |= line.trim() == entry;
            } else {
                in_list = false;
            }
        }
        out.push(line.to_string());
    }
    match insert_at {
        Some(index) if !present => out.insert(index, entry),
        Some(_) => {}
        None => {
            out.push("doNotCompress:".to_string());
            out.push(entry);
        }
    }
    let mut joined = out.join("\n");
    if yml.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        profile::testing::descriptor_xml,
        vcdiff::testing::{delta, replace_with},
        verify::testing::{hashes, write_valid_base},
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: Layout,
        verifier: IntegrityVerifier,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("root"));
        fs::create_dir_all(&layout.root).unwrap();
        write_valid_base(&layout.base_archive());
        let verifier = IntegrityVerifier::new(hashes()).with_scratch_root(dir.path().join("scratch"));
        Fixture {
            _dir: dir,
            layout,
            verifier,
        }
    }

    fn profile(layout: &Layout, uses_yyc: bool) -> ProfileDescriptor {
        let data = layout.patch_data_files();
        fs::create_dir_all(data.join(FILES_TO_COPY)).unwrap();
        fs::write(data.join(FILES_TO_COPY).join("credits.txt"), b"thanks").unwrap();
        for (name, bytes) in [
            ("data.xdelta", &b"patched data"[..]),
            ("AM2R.xdelta", b"patched exe"),
            ("game.xdelta", b"patched unx"),
            ("droid.xdelta", b"patched droid"),
        ] {
            fs::write(data.join(name), delta(&[replace_with(bytes)])).unwrap();
        }
        fs::write(layout.canonical_descriptor(), descriptor_xml("Community Updates", true, true))
            .unwrap();
        let mut profile = ProfileDescriptor::read(&layout.canonical_descriptor()).unwrap();
        profile.uses_yyc = uses_yyc;
        profile.data_path = data;
        profile
    }

    #[test]
    fn windows_install_patches_and_copies_overlays() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        let music = fx.layout.hq_music();
        fs::create_dir_all(&music).unwrap();
        fs::write(music.join("musTitle.ogg"), b"hq").unwrap();

        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        let mut checkpoints = Vec::new();
        let runner = pipeline
            .install_desktop(&profile, Platform::Windows, true, &mut |percent, _| {
                checkpoints.push(percent)
            })
            .unwrap();

        let dir = fx.layout.profile_dir(&profile.name);
        assert_eq!(runner, dir.join("AM2R.exe"));
        assert_eq!(fs::read(dir.join("AM2R.exe")).unwrap(), b"patched exe");
        assert_eq!(fs::read(dir.join("data.win")).unwrap(), b"patched data");
        assert!(dir.join("credits.txt").exists());
        assert!(dir.join("musTitle.ogg").exists());
        assert!(dir.join(DESCRIPTOR_FILE).exists());
        assert_eq!(checkpoints, vec![33, 66, 100]);
    }

    #[test]
    fn custom_music_is_kept_on_desktop_only() {
        let fx = fixture();
        let mut profile = profile(&fx.layout, false);
        profile.uses_custom_music = true;
        let music = fx.layout.hq_music();
        fs::create_dir_all(&music).unwrap();
        fs::write(music.join("musTitle.ogg"), b"hq").unwrap();

        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        pipeline
            .install_desktop(&profile, Platform::Windows, true, &mut |_, _| {})
            .unwrap();
        assert!(!fx.layout.profile_dir(&profile.name).join("musTitle.ogg").exists());

        let assets = fx.layout.temp().join("assets");
        fs::create_dir_all(&assets).unwrap();
        pipeline.copy_overlays(&profile, &assets, true).unwrap();
        assert!(assets.join("musTitle.ogg").exists());
    }

    #[test]
    fn yyc_install_drops_data_blob() {
        let fx = fixture();
        let profile = profile(&fx.layout, true);
        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        pipeline
            .install_desktop(&profile, Platform::Windows, false, &mut |_, _| {})
            .unwrap();

        let dir = fx.layout.profile_dir(&profile.name);
        assert_eq!(fs::read(dir.join("AM2R.exe")).unwrap(), b"patched exe");
        assert!(!dir.join("data.win").exists());
    }

    #[test]
    fn reinstall_overwrites_previous_attempt() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        let dir = fx.layout.profile_dir(&profile.name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.txt"), b"old").unwrap();

        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        pipeline
            .install_desktop(&profile, Platform::Windows, false, &mut |_, _| {})
            .unwrap();
        assert!(!dir.join("stale.txt").exists());
    }

    #[test]
    fn failed_patch_leaves_no_installed_profile() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        fs::write(profile.data_path.join("AM2R.xdelta"), b"garbage").unwrap();

        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        assert!(pipeline
            .install_desktop(&profile, Platform::Windows, false, &mut |_, _| {})
            .is_err());
        assert!(!crate::catalog::is_installed(&fx.layout, Platform::Windows, &profile));
    }

    #[test]
    fn invalid_base_aborts_before_touching_profiles() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        fs::write(fx.layout.base_archive(), b"not a zip").unwrap();

        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        let err = pipeline
            .install_desktop(&profile, Platform::Windows, false, &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(
            crate::error::find_launcher_error(&err),
            Some(LauncherError::InvalidBaseArchive(ArchiveFault::NotAnArchive))
        ));
        assert!(!fx.layout.profiles().exists());
    }

    #[cfg(unix)]
    #[test]
    fn linux_install_assembles_appimage() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        let template = fx.layout.appdir_template();
        fs::create_dir_all(&template).unwrap();
        fs::write(
            template.join(DESKTOP_ENTRY),
            "[Desktop Entry]\nName=AM2R\nExec=runner %F\n",
        )
        .unwrap();
        fs::write(
            fx.layout.patch_data_files().join(FILES_TO_COPY).join("MusTitle.OGG"),
            b"music",
        )
        .unwrap();
        // Stand-in tool: records what it was handed, then emits the image.
        fs::create_dir_all(fx.layout.utilities()).unwrap();
        let tool = fx.layout.utilities().join(APPIMAGE_TOOL);
        fs::write(
            &tool,
            "#!/bin/sh\nls AM2R.AppDir/usr/bin > listing.txt\nls AM2R.AppDir/usr/bin/assets >> listing.txt\necho \"$ARCH\" >> listing.txt\ntouch AM2R-x86_64.AppImage\n",
        )
        .unwrap();

        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        let mut checkpoints = Vec::new();
        let appimage = pipeline
            .install_desktop(&profile, Platform::Linux, false, &mut |percent, _| {
                checkpoints.push(percent)
            })
            .unwrap();

        let dir = fx.layout.profile_dir(&profile.name);
        assert_eq!(appimage, dir.join("AM2R.AppImage"));
        assert!(appimage.exists());
        assert!(!dir.join(APPDIR).exists());
        assert!(dir.join(DESCRIPTOR_FILE).exists());
        let listing = fs::read_to_string(dir.join("listing.txt")).unwrap();
        assert!(listing.contains("runner"));
        assert!(listing.contains("game.unx"));
        assert!(listing.contains("mustitle.ogg"));
        assert!(!listing.contains("data.win"));
        assert!(!listing.contains("D3DX9_43.dll"));
        assert!(listing.contains("x86_64"));
        assert_eq!(checkpoints, vec![33, 44, 66, 100]);
    }

    #[test]
    fn missing_appimage_tool_is_reported_before_mutation() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default());
        let err = pipeline
            .install_desktop(&profile, Platform::Linux, false, &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(
            crate::error::find_launcher_error(&err),
            Some(LauncherError::ToolMissing(_))
        ));
        assert!(!fx.layout.profile_dir(&profile.name).exists());
    }

    #[test]
    fn missing_java_is_reported_before_scratch_exists() {
        let fx = fixture();
        let profile = profile(&fx.layout, false);
        let pipeline = PackagingPipeline::new(&fx.layout, &fx.verifier, PatchEngine::default())
            .with_java(None);
        let err = pipeline
            .build_apk(&profile, Platform::Linux, false, &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(
            crate::error::find_launcher_error(&err),
            Some(LauncherError::ToolMissing(name)) if name == "java"
        ));
        assert!(!fx.layout.temp().exists());
    }

    #[test]
    fn manifest_gains_ogg_once() {
        let yml = "version: 2.6.0\ndoNotCompress:\n- arsc\n- png\nisFrameworkApk: false\n";
        let once = keep_uncompressed(yml, "ogg");
        assert_eq!(
            once,
            "version: 2.6.0\ndoNotCompress:\n- ogg\n- arsc\n- png\nisFrameworkApk: false\n"
        );
        assert_eq!(keep_uncompressed(&once, "ogg"), once);
    }

    #[test]
    fn desktop_entry_exec_names_runner() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join(DESKTOP_ENTRY);
        fs::write(&entry, "[Desktop Entry]\nExec=AM2R_runner\n").unwrap();
        assert_eq!(runner_name(&entry).unwrap(), "AM2R_runner");
        fs::write(&entry, "[Desktop Entry]\n").unwrap();
        assert!(runner_name(&entry).is_err());
    }

    #[test]
    fn leftovers_are_trimmed_from_mobile_assets() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path();
        for name in MOBILE_LEFTOVERS.iter().chain(["icon.png", "game.droid"].iter()) {
            fs::write(assets.join(name), b"x").unwrap();
        }
        fs::create_dir_all(assets.join("lang/headers")).unwrap();
        fs::write(assets.join("lang/english.ini"), b"x").unwrap();
        fs::create_dir_all(assets.join("mods")).unwrap();

        remove_leftovers(assets, Platform::Windows).unwrap();
        assert!(assets.join("icon.png").exists());
        assert!(assets.join("game.droid").exists());
        assert!(assets.join("lang/english.ini").exists());
        assert!(!assets.join("lang/headers").exists());
        assert!(!assets.join("mods").exists());
        assert!(!assets.join(EXECUTABLE).exists());

        remove_leftovers(assets, Platform::Linux).unwrap();
        assert!(!assets.join("icon.png").exists());
    }
}
