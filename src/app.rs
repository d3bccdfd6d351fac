use crate::{
    catalog::{self, ProfileCatalog},
    config::{Layout, Settings},
    error::{find_launcher_error, LauncherError},
    launch::GameLauncher,
    package::PackagingPipeline,
    patch::PatchEngine,
    platform::Platform,
    profile::ProfileDescriptor,
    readiness::{
        self, Affordances, Evaluation, PackageBuildState, PlayState, Readiness, SelectedProfile,
        Snapshot,
    },
    sync::{PatchRepositorySync, SyncOutcome, SyncProgress},
    verify::{self, ArchiveStatus, IntegrityVerifier, KnownHashes},
};
use anyhow::{Context, Result};
use std::{
    collections::VecDeque,
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
    time::Duration,
};

const LOG_CAPACITY: usize = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

enum SyncMessage {
    Progress(SyncProgress),
    Completed(SyncOutcome),
    Failed { error: String, resync: bool },
}

enum InstallMessage {
    Progress { percent: u8, stage: &'static str },
    Completed { name: String, runner: PathBuf },
    Failed { name: String, error: String, invalid_base: bool },
}

enum PackageMessage {
    Progress { percent: u8, stage: &'static str },
    Completed { name: String, output: PathBuf },
    Failed { name: String, error: String, invalid_base: bool },
}

enum GameMessage {
    Exited { name: String, code: Option<i32> },
    Failed { name: String, error: String },
}

pub struct App {
    pub layout: Layout,
    pub settings: Settings,
    pub platform: Platform,
    pub status: String,
    hashes: KnownHashes,
    catalog: ProfileCatalog,
    base_status: ArchiveStatus,
    readiness: Readiness,
    logs: VecDeque<LogEntry>,
    log_seq: u64,
    sync_cancel: Option<Arc<AtomicBool>>,
    install_active: Option<String>,
    build_active: Option<String>,
    game_active: Option<String>,
    sync_tx: Sender<SyncMessage>,
    sync_rx: Receiver<SyncMessage>,
    install_tx: Sender<InstallMessage>,
    install_rx: Receiver<InstallMessage>,
    package_tx: Sender<PackageMessage>,
    package_rx: Receiver<PackageMessage>,
    game_tx: Sender<GameMessage>,
    game_rx: Receiver<GameMessage>,
}

impl App {
    pub fn open(layout: Layout, platform: Platform, hashes: KnownHashes) -> Result<Self> {
        fs::create_dir_all(&layout.root).context("create data root")?;
        let settings = Settings::load_or_create(&layout.root)?;
        let catalog = ProfileCatalog::load(&layout, platform, &settings.profile_index)?;

        let (sync_tx, sync_rx) = mpsc::channel();
        let (install_tx, install_rx) = mpsc::channel();
        let (package_tx, package_rx) = mpsc::channel();
        let (game_tx, game_rx) = mpsc::channel();

        let mut app = Self {
            layout,
            settings,
            platform,
            status: String::new(),
            hashes,
            catalog,
            base_status: ArchiveStatus::Unverified,
            readiness: placeholder_readiness(),
            logs: VecDeque::new(),
            log_seq: 0,
            sync_cancel: None,
            install_active: None,
            build_active: None,
            game_active: None,
            sync_tx,
            sync_rx,
            install_tx,
            install_rx,
            package_tx,
            package_rx,
            game_tx,
            game_rx,
        };
        app.check_base();
        app.refresh_readiness();
        Ok(app)
    }

    fn verifier(&self) -> IntegrityVerifier {
        IntegrityVerifier::new(self.hashes.clone()).with_scratch_root(self.layout.verify_scratch())
    }

    fn patch_sync(&self) -> PatchRepositorySync {
        PatchRepositorySync::new(&self.layout, self.settings.mirror_url())
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn base_status(&self) -> ArchiveStatus {
        self.base_status
    }

    pub fn is_installed(&self, index: usize) -> bool {
        self.catalog
            .get(index)
            .is_some_and(|profile| catalog::is_installed(&self.layout, self.platform, profile))
    }

    pub fn is_busy(&self) -> bool {
        self.sync_cancel.is_some()
            || self.install_active.is_some()
            || self.build_active.is_some()
            || self.game_active.is_some()
    }

    fn check_base(&mut self) {
        let verifier = self.verifier();
        match verify::check_base_archive(&verifier, &self.layout.base_archive()) {
            Ok(status) => {
                if let ArchiveStatus::Invalid(fault) = status {
                    self.log_warn(format!("Base archive rejected and set aside: {fault}"));
                }
                self.base_status = status;
            }
            Err(err) => {
                self.base_status = ArchiveStatus::Unverified;
                self.log_error(format!("Base archive check failed: {err:#}"));
            }
        }
    }

    pub fn reload_catalog(&mut self) {
        match ProfileCatalog::load(&self.layout, self.platform, &self.settings.profile_index) {
            Ok(catalog) => self.catalog = catalog,
            Err(err) => self.log_error(format!("Profile load failed: {err:#}")),
        }
        self.refresh_readiness();
    }

    fn snapshot(&self) -> Snapshot {
        let selected = self.catalog.selected_index().and_then(|index| {
            self.catalog.get(index).map(|profile| SelectedProfile {
                index,
                installed: catalog::is_installed(&self.layout, self.platform, profile),
                installable: profile.installable,
                supports_android: profile.supports_android,
            })
        });
        Snapshot {
            synced: self.patch_sync().is_synced(),
            syncing: self.sync_cancel.is_some(),
            base_valid: self.base_status == ArchiveStatus::Valid,
            installing: self.install_active.is_some(),
            playing: self.game_active.is_some(),
            building: self.build_active.is_some(),
            selected,
        }
    }

    pub fn refresh_readiness(&mut self) {
        loop {
            match readiness::evaluate(&self.snapshot()) {
                Evaluation::Ready(readiness) => {
                    self.readiness = readiness;
                    return;
                }
                Evaluation::Prune(index) => match self.catalog.prune(&self.layout, index) {
                    Ok(profile) => {
                        self.log_info(format!(
                            "Removed archived profile {} that was not installed",
                            profile.name
                        ));
                        self.persist_selection();
                    }
                    Err(err) => {
                        self.log_error(format!("Prune failed: {err:#}"));
                        self.readiness = placeholder_readiness();
                        return;
                    }
                },
            }
        }
    }

    fn persist_selection(&mut self) {
        self.settings.set_selection(self.catalog.selected_index());
        if let Err(err) = self.settings.save(&self.layout.root) {
            self.log_error(format!("Settings save failed: {err:#}"));
        }
    }

    pub fn select_profile(&mut self, index: usize) -> Result<()> {
        if !self.readiness.affordances.profile_select {
            anyhow::bail!(
                "Profile selection is unavailable while {}",
                self.readiness.play_state.label()
            );
        }
        self.catalog.select(index)?;
        self.persist_selection();
        if let Some(profile) = self.catalog.selected() {
            let name = profile.name.clone();
            self.log_info(format!("Selected profile {name}"));
        }
        self.refresh_readiness();
        Ok(())
    }

    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        self.settings.set_value(key, value)?;
        self.settings.save(&self.layout.root)?;
        self.log_info(format!("Setting {key} updated"));
        Ok(())
    }

    pub fn import_base(&mut self, candidate: &Path) -> Result<ArchiveStatus> {
        let verifier = self.verifier();
        let status =
            verify::import_base_archive(&verifier, candidate, &self.layout.base_archive())?;
        self.base_status = status;
        match status {
            ArchiveStatus::Valid => self.log_info("Base archive accepted".to_string()),
            ArchiveStatus::Invalid(fault) => {
                self.log_error(format!("Base archive rejected: {fault}"));
            }
            ArchiveStatus::Unverified => {}
        }
        self.refresh_readiness();
        Ok(status)
    }

    pub fn import_mod(&mut self, archive: &Path) -> Result<String> {
        let name = catalog::import_mod_archive(&self.layout, archive)?;
        self.log_info(format!("Imported mod {name}"));
        self.reload_catalog();
        Ok(name)
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<()> {
        let profile = self
            .catalog
            .find(name)
            .map(|(_, profile)| profile.clone())
            .ok_or_else(|| LauncherError::ProfileNotFound(name.to_string()))?;
        let in_use = [&self.install_active, &self.build_active, &self.game_active]
            .iter()
            .any(|active| active.as_deref() == Some(name));
        if in_use {
            return Err(LauncherError::JobBusy("profile").into());
        }
        catalog::delete_profile(&self.layout, &profile)?;
        self.log_info(format!("Deleted profile {name}"));
        self.reload_catalog();
        Ok(())
    }

    pub fn start_sync(&mut self) -> Result<()> {
        if self.sync_cancel.is_some() {
            return Err(LauncherError::JobBusy("sync").into());
        }
        if self.install_active.is_some() || self.build_active.is_some() {
            return Err(LauncherError::JobBusy("install").into());
        }
        let cancel = Arc::new(AtomicBool::new(false));
        self.sync_cancel = Some(cancel.clone());
        self.status = "Syncing patch data".to_string();
        self.log_info(format!("Sync started from {}", self.settings.mirror_url()));
        self.refresh_readiness();

        let tx = self.sync_tx.clone();
        let sync = self.patch_sync();
        thread::spawn(move || {
            let progress_tx = tx.clone();
            let mut progress = |event: SyncProgress| {
                let _ = progress_tx.send(SyncMessage::Progress(event));
            };
            let message = match run_job(|| sync.ensure_synced(&mut progress, &cancel)) {
                Ok(outcome) => SyncMessage::Completed(outcome),
                Err(err) => SyncMessage::Failed {
                    resync: matches!(
                        find_launcher_error(&err),
                        Some(LauncherError::RequiresFullResync)
                    ),
                    error: format!("{err:#}"),
                },
            };
            let _ = tx.send(message);
        });
        Ok(())
    }

    pub fn cancel_sync(&mut self) {
        if let Some(cancel) = &self.sync_cancel {
            cancel.store(true, Ordering::Relaxed);
            self.log_info("Sync will stop after the current stage".to_string());
        }
    }

    /// Runs whatever the current play state offers. While a sync is in
    /// flight this cancels it.
    pub fn primary_action(&mut self) -> Result<()> {
        match self.readiness.play_state {
            PlayState::Download if self.sync_cancel.is_some() => {
                self.cancel_sync();
                Ok(())
            }
            PlayState::Download => self.start_sync(),
            PlayState::SelectBase => {
                anyhow::bail!("Choose the 1.1 release zip first ('am2rforge base <zip>')")
            }
            PlayState::Install | PlayState::Play if !self.readiness.affordances.play => {
                Err(LauncherError::JobBusy("package build").into())
            }
            PlayState::Install => self.start_install(),
            PlayState::Play => self.start_game(None, None),
            PlayState::Installing => Err(LauncherError::JobBusy("install").into()),
            PlayState::Playing => Err(LauncherError::JobBusy("game").into()),
        }
    }

    fn job_profile(
        &self,
        other: &Option<String>,
        other_job: &'static str,
    ) -> Result<ProfileDescriptor> {
        let profile = self
            .catalog
            .selected()
            .cloned()
            .ok_or_else(|| LauncherError::ProfileNotFound("no profile selected".to_string()))?;
        if other.as_deref() == Some(profile.name.as_str()) {
            return Err(LauncherError::JobBusy(other_job).into());
        }
        Ok(profile)
    }

    pub fn start_install(&mut self) -> Result<()> {
        if self.install_active.is_some() {
            return Err(LauncherError::JobBusy("install").into());
        }
        if !matches!(self.readiness.play_state, PlayState::Install | PlayState::Play) {
            anyhow::bail!(
                "Install is unavailable while {}",
                self.readiness.play_state.label()
            );
        }
        if !self.readiness.affordances.play {
            return Err(LauncherError::JobBusy("package build").into());
        }
        let profile = self.job_profile(&self.build_active, "package build")?;
        if !profile.installable {
            anyhow::bail!("{} is archived and can no longer be installed", profile.name);
        }

        self.install_active = Some(profile.name.clone());
        self.status = format!("Installing {}", profile.name);
        self.log_info(format!("Install started for {}", profile.name));
        self.refresh_readiness();

        let tx = self.install_tx.clone();
        let layout = self.layout.clone();
        let verifier = self.verifier();
        let engine = PatchEngine::new(self.settings.strict_patching);
        let platform = self.platform;
        let hq_music = self.settings.hq_music_desktop;
        thread::spawn(move || {
            let pipeline = PackagingPipeline::new(&layout, &verifier, engine);
            let progress_tx = tx.clone();
            let mut progress = |percent: u8, stage: &'static str| {
                let _ = progress_tx.send(InstallMessage::Progress { percent, stage });
            };
            let name = profile.name.clone();
            let result =
                run_job(|| pipeline.install_desktop(&profile, platform, hq_music, &mut progress));
            let message = match result {
                Ok(runner) => InstallMessage::Completed { name, runner },
                Err(err) => InstallMessage::Failed {
                    name,
                    invalid_base: is_invalid_base(&err),
                    error: format!("{err:#}"),
                },
            };
            let _ = tx.send(message);
        });
        Ok(())
    }

    pub fn start_package_build(&mut self) -> Result<()> {
        if self.build_active.is_some() {
            return Err(LauncherError::JobBusy("package build").into());
        }
        if !self.readiness.affordances.build {
            anyhow::bail!("The selected profile cannot be packaged right now");
        }
        let profile = self.job_profile(&self.install_active, "install")?;

        self.build_active = Some(profile.name.clone());
        self.status = format!("Building APK for {}", profile.name);
        self.log_info(format!("APK build started for {}", profile.name));
        self.refresh_readiness();

        let tx = self.package_tx.clone();
        let layout = self.layout.clone();
        let verifier = self.verifier();
        let engine = PatchEngine::new(self.settings.strict_patching);
        let host = self.platform;
        let hq_music = self.settings.hq_music_mobile;
        thread::spawn(move || {
            let pipeline = PackagingPipeline::new(&layout, &verifier, engine);
            let progress_tx = tx.clone();
            let mut progress = |percent: u8, stage: &'static str| {
                let _ = progress_tx.send(PackageMessage::Progress { percent, stage });
            };
            let name = profile.name.clone();
            let result = run_job(|| pipeline.build_apk(&profile, host, hq_music, &mut progress));
            let message = match result {
                Ok(output) => PackageMessage::Completed { name, output },
                Err(err) => PackageMessage::Failed {
                    name,
                    invalid_base: is_invalid_base(&err),
                    error: format!("{err:#}"),
                },
            };
            let _ = tx.send(message);
        });
        Ok(())
    }

    pub fn start_game(&mut self, env_overrides: Option<&str>, capture_logs: Option<bool>) -> Result<()> {
        if self.game_active.is_some() {
            return Err(LauncherError::JobBusy("game").into());
        }
        if self.readiness.play_state != PlayState::Play || !self.readiness.affordances.play {
            anyhow::bail!(
                "Play is unavailable while {}",
                self.readiness.play_state.label()
            );
        }
        let profile = self
            .catalog
            .selected()
            .cloned()
            .ok_or_else(|| LauncherError::ProfileNotFound("no profile selected".to_string()))?;

        self.game_active = Some(profile.name.clone());
        self.status = format!("Playing {}", profile.name);
        self.refresh_readiness();

        let tx = self.game_tx.clone();
        let layout = self.layout.clone();
        let platform = self.platform;
        let env = env_overrides
            .map(|value| value.to_string())
            .unwrap_or_else(|| self.settings.custom_env.clone());
        let capture = capture_logs.unwrap_or(self.settings.capture_game_logs);
        thread::spawn(move || {
            let launcher = GameLauncher::new(&layout, platform);
            let name = profile.name.clone();
            let message = match run_job(|| launcher.launch(&profile, &env, capture)) {
                Ok(status) => GameMessage::Exited {
                    name,
                    code: status.code(),
                },
                Err(err) => GameMessage::Failed {
                    name,
                    error: format!("{err:#}"),
                },
            };
            let _ = tx.send(message);
        });
        Ok(())
    }

    pub fn tick(&mut self) {
        self.poll_sync();
        self.poll_installs();
        self.poll_packages();
        self.poll_games();
    }

    pub fn wait_for_jobs(&mut self, mut on_log: impl FnMut(&LogEntry)) {
        let mut seen = self.log_seq;
        loop {
            self.tick();
            for entry in self.logs.iter().filter(|entry| entry.seq > seen) {
                on_log(entry);
            }
            seen = self.log_seq;
            if !self.is_busy() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn poll_sync(&mut self) {
        loop {
            match self.sync_rx.try_recv() {
                Ok(message) => self.handle_sync_message(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn poll_installs(&mut self) {
        loop {
            match self.install_rx.try_recv() {
                Ok(message) => self.handle_install_message(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn poll_packages(&mut self) {
        loop {
            match self.package_rx.try_recv() {
                Ok(message) => self.handle_package_message(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn poll_games(&mut self) {
        loop {
            match self.game_rx.try_recv() {
                Ok(message) => self.handle_game_message(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle_sync_message(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::Progress(SyncProgress::Stage(stage)) => {
                self.status = format!("Syncing patch data ({stage})");
                self.log_info(format!("Sync: {stage}"));
            }
            SyncMessage::Progress(SyncProgress::Transfer(percent)) => {
                self.status = format!("Syncing patch data ({percent}%)");
                if percent % 25 == 0 {
                    self.log_info(format!("Sync: {percent}%"));
                }
            }
            SyncMessage::Completed(outcome) => {
                self.sync_cancel = None;
                match outcome {
                    SyncOutcome::Cloned => self.log_info("Patch data downloaded".to_string()),
                    SyncOutcome::Updated => self.log_info("Patch data updated".to_string()),
                    SyncOutcome::Stale => {
                        self.log_warn("Patch data could not be updated; using the local copy".to_string())
                    }
                    SyncOutcome::Cancelled => self.log_info("Sync cancelled".to_string()),
                }
                self.status = "Ready".to_string();
                self.reload_catalog();
            }
            SyncMessage::Failed { error, resync } => {
                self.sync_cancel = None;
                if resync {
                    self.status = "Patch data was corrupted and removed; sync again".to_string();
                    self.log_warn(format!("Sync: {error}"));
                } else {
                    self.status = format!("Sync failed: {error}");
                    self.log_error(format!("Sync failed: {error}"));
                }
                self.reload_catalog();
            }
        }
    }

    fn handle_install_message(&mut self, message: InstallMessage) {
        match message {
            InstallMessage::Progress { percent, stage } => {
                self.status = format!("Installing ({percent}%)");
                self.log_info(format!("Install: {percent}% {stage}"));
            }
            InstallMessage::Completed { name, runner } => {
                self.install_active = None;
                self.status = format!("Installed {name}");
                self.log_info(format!("Install complete: {name} ({})", runner.display()));
                self.refresh_readiness();
            }
            InstallMessage::Failed {
                name,
                error,
                invalid_base,
            } => {
                self.install_active = None;
                self.status = format!("Install failed: {error}");
                self.log_error(format!("Install of {name} failed: {error}"));
                if invalid_base {
                    self.check_base();
                }
                self.refresh_readiness();
            }
        }
    }

    fn handle_package_message(&mut self, message: PackageMessage) {
        match message {
            PackageMessage::Progress { percent, stage } => {
                self.status = format!("Building APK ({percent}%)");
                self.log_info(format!("APK: {percent}% {stage}"));
            }
            PackageMessage::Completed { name, output } => {
                self.build_active = None;
                self.status = format!("APK ready: {}", output.display());
                self.log_info(format!("APK build complete for {name}: {}", output.display()));
                self.refresh_readiness();
            }
            PackageMessage::Failed {
                name,
                error,
                invalid_base,
            } => {
                self.build_active = None;
                self.status = format!("APK build failed: {error}");
                self.log_error(format!("APK build for {name} failed: {error}"));
                if invalid_base {
                    self.check_base();
                }
                self.refresh_readiness();
            }
        }
    }

    fn handle_game_message(&mut self, message: GameMessage) {
        self.game_active = None;
        match message {
            GameMessage::Exited { name, code } => {
                self.status = "Ready".to_string();
                match code {
                    Some(0) => self.log_info(format!("{name} exited")),
                    Some(code) => self.log_warn(format!("{name} exited with code {code}")),
                    None => self.log_warn(format!("{name} was terminated")),
                }
            }
            GameMessage::Failed { name, error } => {
                self.status = format!("Launch failed: {error}");
                self.log_error(format!("Launching {name} failed: {error}"));
            }
        }
        self.refresh_readiness();
    }

    #[cfg(test)]
    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    pub fn log_info(&mut self, message: String) {
        tracing::info!("{message}");
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        tracing::error!("{message}");
        self.push_log(LogLevel::Error, message);
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        self.log_seq += 1;
        self.logs.push_back(LogEntry {
            seq: self.log_seq,
            level,
            message,
        });
        while self.logs.len() > LOG_CAPACITY {
            self.logs.pop_front();
        }
    }
}

/// Runs a worker body, turning a panic into an error so the job still reports back.
fn run_job<T>(job: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|reason| reason.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        Err(anyhow::anyhow!("worker panicked: {reason}"))
    })
}

fn is_invalid_base(err: &anyhow::Error) -> bool {
    matches!(
        find_launcher_error(err),
        Some(LauncherError::InvalidBaseArchive(_))
    )
}

fn placeholder_readiness() -> Readiness {
    Readiness {
        play_state: PlayState::Download,
        build_state: PackageBuildState::Idle,
        affordances: Affordances {
            play: false,
            abort_sync: false,
            build: false,
            profile_select: false,
            profile_settings: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        profile::testing::descriptor_xml,
        vcdiff::testing::{delta, replace_with},
        verify::testing::{hashes, write_valid_base},
    };

    fn fake_sync(layout: &Layout) {
        fs::create_dir_all(layout.patch_data().join(".git")).unwrap();
        let data = layout.patch_data_files();
        fs::create_dir_all(&data).unwrap();
        fs::write(
            layout.canonical_descriptor(),
            descriptor_xml("Community Updates", true, true),
        )
        .unwrap();
        fs::write(data.join("data.xdelta"), delta(&[replace_with(b"new data")])).unwrap();
        fs::write(data.join("AM2R.xdelta"), delta(&[replace_with(b"new exe")])).unwrap();
    }

    fn open(layout: &Layout) -> App {
        App::open(layout.clone(), Platform::Windows, hashes()).unwrap()
    }

    #[test]
    fn walks_from_download_to_play() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let mut app = open(&layout);
        assert_eq!(app.readiness().play_state, PlayState::Download);

        fake_sync(&layout);
        app.reload_catalog();
        assert_eq!(app.readiness().play_state, PlayState::SelectBase);

        let download = dir.path().join("download.zip");
        write_valid_base(&download);
        assert_eq!(app.import_base(&download).unwrap(), ArchiveStatus::Valid);
        assert_eq!(app.readiness().play_state, PlayState::Install);

        app.start_install().unwrap();
        assert_eq!(app.readiness().play_state, PlayState::Installing);
        assert!(matches!(
            app.start_install()
                .unwrap_err()
                .downcast_ref::<LauncherError>(),
            Some(LauncherError::JobBusy(_))
        ));
        let mut seen = Vec::new();
        app.wait_for_jobs(|entry| seen.push(entry.message.clone()));

        assert_eq!(app.readiness().play_state, PlayState::Play);
        assert!(seen.iter().any(|line| line.starts_with("Install complete")));
        let exe = layout.profile_dir("Community Updates").join("AM2R.exe");
        assert_eq!(fs::read(exe).unwrap(), b"new exe");
    }

    #[test]
    fn failed_install_resets_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        write_valid_base(&layout.base_archive());
        fs::write(layout.patch_data_files().join("AM2R.xdelta"), b"garbage").unwrap();

        let mut app = open(&layout);
        assert_eq!(app.readiness().play_state, PlayState::Install);
        app.start_install().unwrap();
        app.wait_for_jobs(|_| {});

        assert_eq!(app.readiness().play_state, PlayState::Install);
        assert!(app.status.starts_with("Install failed"));
        assert!(app
            .logs()
            .any(|entry| entry.level == LogLevel::Error));
    }

    #[test]
    fn oversized_delta_window_fails_the_install() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        write_valid_base(&layout.base_archive());
        let mut window = replace_with(b"new exe");
        window.target_len = 1 << 63;
        fs::write(layout.patch_data_files().join("AM2R.xdelta"), delta(&[window])).unwrap();

        let mut app = open(&layout);
        app.start_install().unwrap();
        app.wait_for_jobs(|_| {});

        assert!(!app.is_busy());
        assert_eq!(app.readiness().play_state, PlayState::Install);
        assert!(app.status.starts_with("Install failed"));
    }

    #[test]
    fn worker_panic_becomes_an_error() {
        let err = run_job(|| -> Result<()> { panic!("window exploded") }).unwrap_err();
        assert!(format!("{err}").contains("window exploded"));
        assert_eq!(run_job(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn base_rejected_during_install_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        write_valid_base(&layout.base_archive());

        let mut app = open(&layout);
        assert_eq!(app.readiness().play_state, PlayState::Install);
        fs::write(layout.base_archive(), b"junk").unwrap();
        app.start_install().unwrap();
        app.wait_for_jobs(|_| {});

        assert_eq!(app.readiness().play_state, PlayState::SelectBase);
        assert!(!layout.base_archive().exists());
        assert!(dir.path().join("AM2R_11.zip.1").exists());
    }

    #[test]
    fn install_waits_for_package_build() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        write_valid_base(&layout.base_archive());

        let mut app = open(&layout);
        app.build_active = Some("Community Updates".to_string());
        app.refresh_readiness();
        assert!(!app.readiness().affordances.play);

        let err = app.start_install().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::JobBusy(_))
        ));
        assert!(app.primary_action().is_err());
        assert!(app.install_active.is_none());
    }

    #[test]
    fn selection_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        write_valid_base(&layout.base_archive());
        let modded = layout.mods().join("Extra");
        fs::create_dir_all(&modded).unwrap();
        fs::write(modded.join("profile.xml"), descriptor_xml("Extra", true, false)).unwrap();

        let mut app = open(&layout);
        assert_eq!(app.catalog().selected_index(), Some(0));
        app.select_profile(1).unwrap();
        assert_eq!(app.settings.profile_index, "1");
        assert!(app.select_profile(7).is_err());

        let reopened = open(&layout);
        assert_eq!(reopened.catalog().selected_index(), Some(1));
    }

    #[test]
    fn invalid_base_is_set_aside_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        fs::write(layout.base_archive(), b"junk").unwrap();

        let app = open(&layout);
        assert_eq!(app.readiness().play_state, PlayState::SelectBase);
        assert!(dir.path().join("AM2R_11.zip.1").exists());
    }

    #[test]
    fn delete_refreshes_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fake_sync(&layout);
        let modded = layout.mods().join("Extra");
        fs::create_dir_all(&modded).unwrap();
        fs::write(modded.join("profile.xml"), descriptor_xml("Extra", true, false)).unwrap();

        let mut app = open(&layout);
        assert_eq!(app.catalog().len(), 2);
        app.delete_profile("Extra").unwrap();
        assert_eq!(app.catalog().len(), 1);
        assert!(!modded.exists());
        assert!(app.delete_profile("Extra").is_err());
    }
}
