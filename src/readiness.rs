//! Readiness of the main action, derived from a snapshot of catalog and job
//! state. Nothing here touches the filesystem.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayState {
    Download,
    SelectBase,
    Install,
    Installing,
    Play,
    Playing,
}

impl PlayState {
    pub fn label(self) -> &'static str {
        match self {
            PlayState::Download => "download",
            PlayState::SelectBase => "select base",
            PlayState::Install => "install",
            PlayState::Installing => "installing",
            PlayState::Play => "play",
            PlayState::Playing => "playing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageBuildState {
    Idle,
    Building,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedProfile {
    pub index: usize,
    pub installed: bool,
    pub installable: bool,
    pub supports_android: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub synced: bool,
    pub syncing: bool,
    pub base_valid: bool,
    pub installing: bool,
    pub playing: bool,
    pub building: bool,
    pub selected: Option<SelectedProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub play: bool,
    pub abort_sync: bool,
    pub build: bool,
    pub profile_select: bool,
    pub profile_settings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub play_state: PlayState,
    pub build_state: PackageBuildState,
    pub affordances: Affordances,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Ready(Readiness),
    /// The selected profile can neither be played nor installed; drop it and
    /// evaluate again.
    Prune(usize),
}

pub fn evaluate(snapshot: &Snapshot) -> Evaluation {
    let play_state = if snapshot.installing {
        PlayState::Installing
    } else if snapshot.playing {
        PlayState::Playing
    } else if snapshot.syncing || !snapshot.synced {
        PlayState::Download
    } else if !snapshot.base_valid {
        PlayState::SelectBase
    } else {
        match snapshot.selected {
            Some(selected) if selected.installed => PlayState::Play,
            Some(selected) if !selected.installable => return Evaluation::Prune(selected.index),
            _ => PlayState::Install,
        }
    };

    let build_state = if snapshot.building {
        PackageBuildState::Building
    } else {
        PackageBuildState::Idle
    };

    Evaluation::Ready(Readiness {
        play_state,
        build_state,
        affordances: affordances(snapshot, play_state),
    })
}

fn affordances(snapshot: &Snapshot, play_state: PlayState) -> Affordances {
    let building = snapshot.building;
    let syncing = snapshot.syncing;

    let play = match play_state {
        PlayState::Installing | PlayState::Playing => false,
        PlayState::Install => snapshot.selected.is_some(),
        _ => true,
    } && !building
        && !syncing;

    let build = matches!(play_state, PlayState::Install | PlayState::Play)
        && snapshot
            .selected
            .is_some_and(|selected| selected.supports_android && selected.installable)
        && !building;

    let profile_select = matches!(
        play_state,
        PlayState::SelectBase | PlayState::Install | PlayState::Play
    ) && !building
        && !syncing;

    let profile_settings = matches!(play_state, PlayState::Install | PlayState::Play) && !building;

    Affordances {
        play,
        abort_sync: syncing,
        build,
        profile_select,
        profile_settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(snapshot: &Snapshot) -> Readiness {
        match evaluate(snapshot) {
            Evaluation::Ready(readiness) => readiness,
            Evaluation::Prune(index) => panic!("unexpected prune of {index}"),
        }
    }

    fn mobile_profile(installed: bool) -> SelectedProfile {
        SelectedProfile {
            index: 0,
            installed,
            installable: true,
            supports_android: true,
        }
    }

    #[test]
    fn fresh_install_walks_download_install_play() {
        let mut snapshot = Snapshot::default();
        assert_eq!(ready(&snapshot).play_state, PlayState::Download);
        assert!(ready(&snapshot).affordances.play);

        snapshot.syncing = true;
        let syncing = ready(&snapshot);
        assert_eq!(syncing.play_state, PlayState::Download);
        assert!(!syncing.affordances.play);
        assert!(syncing.affordances.abort_sync);
        assert!(!syncing.affordances.profile_select);

        snapshot.syncing = false;
        snapshot.synced = true;
        snapshot.selected = Some(mobile_profile(false));
        assert_eq!(ready(&snapshot).play_state, PlayState::SelectBase);

        snapshot.base_valid = true;
        let install = ready(&snapshot);
        assert_eq!(install.play_state, PlayState::Install);
        assert!(install.affordances.play);
        assert!(install.affordances.build);

        snapshot.installing = true;
        let installing = ready(&snapshot);
        assert_eq!(installing.play_state, PlayState::Installing);
        assert!(!installing.affordances.play);
        assert!(!installing.affordances.profile_select);

        snapshot.installing = false;
        snapshot.selected = Some(mobile_profile(true));
        assert_eq!(ready(&snapshot).play_state, PlayState::Play);

        snapshot.playing = true;
        assert_eq!(ready(&snapshot).play_state, PlayState::Playing);
        assert!(!ready(&snapshot).affordances.play);
    }

    #[test]
    fn building_locks_build_and_selection() {
        for installed in [false, true] {
            let snapshot = Snapshot {
                synced: true,
                base_valid: true,
                building: true,
                selected: Some(mobile_profile(installed)),
                ..Snapshot::default()
            };
            let readiness = ready(&snapshot);
            assert_eq!(readiness.build_state, PackageBuildState::Building);
            assert!(!readiness.affordances.build);
            assert!(!readiness.affordances.profile_select);
            assert!(!readiness.affordances.profile_settings);
            assert!(!readiness.affordances.play);
        }
    }

    #[test]
    fn archived_selection_requests_prune() {
        let snapshot = Snapshot {
            synced: true,
            base_valid: true,
            selected: Some(SelectedProfile {
                index: 3,
                installed: false,
                installable: false,
                supports_android: false,
            }),
            ..Snapshot::default()
        };
        assert_eq!(evaluate(&snapshot), Evaluation::Prune(3));
    }

    #[test]
    fn install_without_selection_disables_play() {
        let snapshot = Snapshot {
            synced: true,
            base_valid: true,
            ..Snapshot::default()
        };
        let readiness = ready(&snapshot);
        assert_eq!(readiness.play_state, PlayState::Install);
        assert!(!readiness.affordances.play);
        assert!(!readiness.affordances.build);
    }

    #[test]
    fn build_needs_mobile_support() {
        let snapshot = Snapshot {
            synced: true,
            base_valid: true,
            selected: Some(SelectedProfile {
                supports_android: false,
                ..mobile_profile(true)
            }),
            ..Snapshot::default()
        };
        assert!(!ready(&snapshot).affordances.build);
    }
}
