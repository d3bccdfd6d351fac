use crate::{
    app::{log_level_label, App, LogEntry},
    config::{Layout, NO_PROFILE},
    platform::Platform,
    verify::{ArchiveStatus, KnownHashes},
};
use anyhow::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    root: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Status,
    Run,
    Profiles,
    Select(usize),
    Sync,
    Base(PathBuf),
    Install,
    Apk,
    Play { log: bool, env: Option<String> },
    Delete(String),
    Import(PathBuf),
    Set { key: String, value: String },
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args);
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("am2rforge v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let layout = Layout::resolve(global.root.as_deref())?;
            std::fs::create_dir_all(&layout.root)?;
            crate::init_logging(&layout.log_file());
            let mut app = App::open(layout, Platform::current(), KnownHashes::default())?;
            run_command(&mut app, command, global.format)
        }
    }
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut root = None;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        if let Some(value) = arg.strip_prefix("--root=") {
            root = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--root" {
            if let Some(value) = iter.next() {
                root = Some(PathBuf::from(value));
            }
            continue;
        }
        tokens.push(arg.to_string());
    }

    (GlobalOptions { format, root }, tokens)
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Status);
    };
    let arg = |index: usize, what: &str| -> Result<String> {
        tokens
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{head} requires {what}"))
    };
    let command = match head.as_str() {
        "-h" | "--help" | "help" => CliCommand::Help,
        "-V" | "--version" | "version" => CliCommand::Version,
        "status" => CliCommand::Status,
        "run" => CliCommand::Run,
        "profiles" => CliCommand::Profiles,
        "select" => {
            let raw = arg(1, "a profile index")?;
            let index = raw
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid profile index: {raw}"))?;
            CliCommand::Select(index)
        }
        "sync" => CliCommand::Sync,
        "base" => CliCommand::Base(PathBuf::from(arg(1, "a zip path")?)),
        "install" => CliCommand::Install,
        "apk" => CliCommand::Apk,
        "play" => {
            let mut log = false;
            let mut env = None;
            let mut rest = tokens[1..].iter();
            while let Some(token) = rest.next() {
                match token.as_str() {
                    "--log" => log = true,
                    "--env" => match rest.next() {
                        Some(value) => env = Some(value.clone()),
                        None => bail!("--env requires a value"),
                    },
                    other => bail!("Unknown play option: {other}"),
                }
            }
            CliCommand::Play { log, env }
        }
        "delete" => CliCommand::Delete(arg(1, "a profile name")?),
        "import" => CliCommand::Import(PathBuf::from(arg(1, "an archive path")?)),
        "set" => CliCommand::Set {
            key: arg(1, "a key")?,
            value: tokens.get(2).cloned().unwrap_or_default(),
        },
        other => bail!("Unknown command: {other} (see 'am2rforge help')"),
    };
    Ok(command)
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Status => print_status(app, format),
        CliCommand::Run => {
            app.primary_action()?;
            wait(app)
        }
        CliCommand::Profiles => list_profiles(app, format),
        CliCommand::Select(index) => {
            app.select_profile(index)?;
            print_status(app, format)
        }
        CliCommand::Sync => {
            app.start_sync()?;
            wait(app)
        }
        CliCommand::Base(path) => match app.import_base(&path)? {
            ArchiveStatus::Valid => {
                println!("Base archive accepted");
                Ok(())
            }
            ArchiveStatus::Invalid(fault) => bail!("Base archive rejected: {fault}"),
            ArchiveStatus::Unverified => bail!("Base archive not found: {}", path.display()),
        },
        CliCommand::Install => {
            app.start_install()?;
            wait(app)
        }
        CliCommand::Apk => {
            app.start_package_build()?;
            wait(app)
        }
        CliCommand::Play { log, env } => {
            app.start_game(env.as_deref(), log.then_some(true))?;
            wait(app)
        }
        CliCommand::Delete(name) => {
            app.delete_profile(&name)?;
            println!("Deleted {name}");
            Ok(())
        }
        CliCommand::Import(path) => {
            let name = app.import_mod(&path)?;
            println!("Imported {name}");
            Ok(())
        }
        CliCommand::Set { key, value } => {
            app.set_setting(&key, &value)?;
            println!("{key} updated");
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn wait(app: &mut App) -> Result<()> {
    app.wait_for_jobs(print_log_entry);
    println!("{}", app.status);
    if app.status.contains("failed") {
        bail!("{}", app.status);
    }
    Ok(())
}

fn print_log_entry(entry: &LogEntry) {
    println!("[{}] {}", log_level_label(entry.level), entry.message);
}

#[derive(Serialize)]
struct ProfileListItem {
    index: usize,
    name: String,
    version: String,
    author: String,
    installed: bool,
    installable: bool,
    supports_android: bool,
    selected: bool,
    notes: String,
}

fn list_profiles(app: &App, format: OutputFormat) -> Result<()> {
    let selected = app.catalog().selected_index();
    let items: Vec<ProfileListItem> = app
        .catalog()
        .profiles()
        .iter()
        .enumerate()
        .map(|(index, profile)| ProfileListItem {
            index,
            name: profile.name.clone(),
            version: profile.version.clone(),
            author: profile.author.clone(),
            installed: app.is_installed(index),
            installable: profile.installable,
            supports_android: profile.supports_android,
            selected: selected == Some(index),
            notes: profile.display_notes().to_string(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if app.catalog().is_empty() {
                println!("No profiles. Run 'am2rforge sync' first.");
            }
            for item in items {
                let marker = if item.selected { "*" } else { " " };
                let state = if item.installed { "installed" } else { "" };
                println!(
                    "{marker} {:>2} {} {} by {} {state}",
                    item.index, item.name, item.version, item.author
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    root: String,
    platform: String,
    play_state: String,
    building: bool,
    base_archive: String,
    selected: Option<String>,
    profile_index: String,
    play: bool,
    build: bool,
    profile_select: bool,
    profile_settings: bool,
}

fn print_status(app: &App, format: OutputFormat) -> Result<()> {
    let readiness = app.readiness();
    let base_archive = match app.base_status() {
        ArchiveStatus::Unverified => "missing".to_string(),
        ArchiveStatus::Valid => "valid".to_string(),
        ArchiveStatus::Invalid(fault) => format!("invalid ({fault})"),
    };
    let report = StatusReport {
        root: app.layout.root.display().to_string(),
        platform: app.platform.as_str().to_string(),
        play_state: readiness.play_state.label().to_string(),
        building: readiness.build_state == crate::readiness::PackageBuildState::Building,
        base_archive,
        selected: app.catalog().selected().map(|profile| profile.name.clone()),
        profile_index: app.settings.profile_index.clone(),
        play: readiness.affordances.play,
        build: readiness.affordances.build,
        profile_select: readiness.affordances.profile_select,
        profile_settings: readiness.affordances.profile_settings,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("Data root:    {} ({})", report.root, report.platform);
            println!("State:        {}", report.play_state);
            println!("Base archive: {}", report.base_archive);
            println!(
                "Profile:      {}",
                report.selected.as_deref().unwrap_or(NO_PROFILE)
            );
            let mut actions = Vec::new();
            if report.play {
                actions.push(report.play_state.as_str());
            }
            if report.build {
                actions.push("apk");
            }
            if report.profile_select {
                actions.push("select");
            }
            println!("Available:    {}", actions.join(", "));
        }
    }
    Ok(())
}

fn print_help() {
    println!("am2rforge v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  am2rforge status                 Show readiness and selection");
    println!("  am2rforge run                    Do the next step: sync, install or play");
    println!("  am2rforge profiles               List profiles");
    println!("  am2rforge select <index>         Select a profile");
    println!("  am2rforge sync                   Download or update patch data");
    println!("  am2rforge base <zip>             Use a 1.1 release zip as the base game");
    println!("  am2rforge install                Install the selected profile");
    println!("  am2rforge apk                    Build an Android package for the selected profile");
    println!("  am2rforge play [--log] [--env <vars>]");
    println!("                                   Run the selected profile");
    println!("  am2rforge delete <name>          Delete a profile and its installed files");
    println!("  am2rforge import <zip>           Import a mod archive");
    println!("  am2rforge set <key> <value>      Change a setting");
    println!();
    println!("Global options:");
    println!("  --format <json|text>             Output format for status and profiles");
    println!("  --root <dir>                     Data directory (default: AM2RFORGE_ROOT or the local data dir)");
    println!("  -h, --help                       Show help");
    println!("  -V, --version                    Show version");
    println!();
    println!("Settings:");
    println!("  mirror, custom_mirror, hq_music_desktop, hq_music_mobile,");
    println!("  capture_game_logs, custom_env, strict_patching");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn global_options_are_pulled_out() {
        let (global, rest) =
            parse_global_options(&tokens(&["--root", "/data", "profiles", "--format=json"]));
        assert_eq!(global.format, OutputFormat::Json);
        assert_eq!(global.root, Some(PathBuf::from("/data")));
        assert_eq!(rest, tokens(&["profiles"]));
    }

    #[test]
    fn parses_play_options() {
        assert_eq!(
            parse_command(&tokens(&["play", "--log", "--env", "A=1 B=\"x y\""])).unwrap(),
            CliCommand::Play {
                log: true,
                env: Some("A=1 B=\"x y\"".to_string())
            }
        );
        assert!(parse_command(&tokens(&["play", "--fast"])).is_err());
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(parse_command(&[]).unwrap(), CliCommand::Status);
        assert_eq!(
            parse_command(&tokens(&["select", "2"])).unwrap(),
            CliCommand::Select(2)
        );
        assert!(parse_command(&tokens(&["select", "two"])).is_err());
        assert!(parse_command(&tokens(&["base"])).is_err());
        assert_eq!(
            parse_command(&tokens(&["set", "custom_env"])).unwrap(),
            CliCommand::Set {
                key: "custom_env".to_string(),
                value: String::new()
            }
        );
        assert!(parse_command(&tokens(&["frobnicate"])).is_err());
    }
}
