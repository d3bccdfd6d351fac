use crate::{
    catalog,
    config::Layout,
    error::LauncherError,
    fsutil,
    platform::Platform,
    profile::ProfileDescriptor,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::mpsc,
    thread,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

const LOG_GENERATIONS: usize = 5;

/// Splits `NAME=value NAME2="spaced value"` into pairs.
///
/// Tokens without `=` or with an empty name are skipped. A quoted value
/// runs to the matching quote, or to the end of input if there is none;
/// anything glued to the closing quote is dropped up to the next space.
pub fn parse_env_overrides(input: &str) -> Vec<(String, String)> {
    enum State {
        Gap,
        Name,
        Skip,
        Value,
        Quoted,
    }

    let mut pairs = Vec::new();
    let mut state = State::Gap;
    let mut name = String::new();
    let mut value = String::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        state = match state {
            State::Gap if ch.is_whitespace() => State::Gap,
            State::Gap if ch == '=' => State::Skip,
            State::Gap => {
                name.push(ch);
                State::Name
            }
            State::Name if ch == '=' => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    State::Quoted
                } else {
                    State::Value
                }
            }
            State::Name if ch.is_whitespace() => {
                name.clear();
                State::Gap
            }
            State::Name => {
                name.push(ch);
                State::Name
            }
            State::Skip if ch.is_whitespace() => State::Gap,
            State::Skip => State::Skip,
            State::Value if ch.is_whitespace() => {
                pairs.push((std::mem::take(&mut name), std::mem::take(&mut value)));
                State::Gap
            }
            State::Value => {
                value.push(ch);
                State::Value
            }
            State::Quoted if ch == '"' => {
                pairs.push((std::mem::take(&mut name), std::mem::take(&mut value)));
                State::Skip
            }
            State::Quoted => {
                value.push(ch);
                State::Quoted
            }
        };
    }
    if matches!(state, State::Value | State::Quoted) {
        pairs.push((name, value));
    }
    pairs
}

pub struct GameLauncher<'a> {
    layout: &'a Layout,
    platform: Platform,
}

impl<'a> GameLauncher<'a> {
    pub fn new(layout: &'a Layout, platform: Platform) -> Self {
        Self { layout, platform }
    }

    pub fn launch(
        &self,
        profile: &ProfileDescriptor,
        env_overrides: &str,
        capture_logs: bool,
    ) -> Result<ExitStatus> {
        let runner = catalog::installed_runner(self.layout, self.platform, profile);
        if !runner.is_file() {
            return Err(LauncherError::ProfileNotFound(profile.name.clone()))
                .context("profile is not installed");
        }
        if self.platform == Platform::Linux {
            fsutil::set_executable(&runner)?;
        }
        let cwd = self.layout.profile_dir(&profile.name);
        let overrides = parse_env_overrides(env_overrides);
        info!(name = %profile.name, overrides = overrides.len(), "starting game");

        let mut command = Command::new(&runner);
        command
            .current_dir(&cwd)
            .envs(overrides)
            .stdin(Stdio::null());

        let status = if capture_logs {
            let (status, lines) = run_captured(&mut command)?;
            let log = self.write_game_log(profile, &lines)?;
            info!(?log, lines = lines.len(), "game log written");
            status
        } else {
            command
                .spawn()
                .with_context(|| format!("launch {runner:?}"))?
                .wait()
                .context("wait for game")?
        };

        if status.success() {
            info!(name = %profile.name, "game exited");
        } else {
            warn!(name = %profile.name, ?status, "game exited with failure");
        }
        Ok(status)
    }

    fn write_game_log(&self, profile: &ProfileDescriptor, lines: &[String]) -> Result<PathBuf> {
        let logs = profile.save_dir(self.platform).join("logs");
        write_log(&logs, &profile.name, lines, OffsetDateTime::now_utc())
    }
}

fn run_captured(command: &mut Command) -> Result<(ExitStatus, Vec<String>)> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("launch game")?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, tx.clone()));
    }
    drop(tx);

    let lines: Vec<String> = rx.iter().collect();
    for reader in readers {
        let _ = reader.join();
    }
    let status = child.wait().context("wait for game")?;
    Ok((status, lines))
}

fn forward_lines(
    stream: impl Read + Send + 'static,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

pub fn write_log(
    logs: &Path,
    name: &str,
    lines: &[String],
    generated_at: OffsetDateTime,
) -> Result<PathBuf> {
    fs::create_dir_all(logs).with_context(|| format!("create {logs:?}"))?;
    let path = logs.join(format!("{name}.txt"));
    if path.exists() {
        fsutil::rollover(&path, Some(LOG_GENERATIONS))?;
    }
    let stamp = generated_at
        .format(&Rfc3339)
        .unwrap_or_else(|_| generated_at.unix_timestamp().to_string());

    let mut file = fs::File::create(&path).with_context(|| format!("create {path:?}"))?;
    writeln!(
        file,
        "{} {} log generated at {stamp}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )?;
    for line in lines {
        writeln!(file, "{line}")?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn parses_plain_and_quoted_values() {
        assert_eq!(
            parse_env_overrides(r#"DRI_PRIME=1 TITLE="Metroid II" MANGOHUD=1"#),
            pairs(&[("DRI_PRIME", "1"), ("TITLE", "Metroid II"), ("MANGOHUD", "1")])
        );
    }

    #[test]
    fn skips_malformed_tokens() {
        assert_eq!(
            parse_env_overrides("junk =nope  A=1 B= C"),
            pairs(&[("A", "1"), ("B", "")])
        );
        assert!(parse_env_overrides("").is_empty());
        assert!(parse_env_overrides("   ").is_empty());
    }

    #[test]
    fn text_after_closing_quote_is_not_a_name() {
        assert_eq!(
            parse_env_overrides(r#"A="x"y B=1 C="z""#),
            pairs(&[("A", "x"), ("B", "1"), ("C", "z")])
        );
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        assert_eq!(
            parse_env_overrides(r#"A=1 B="open value C=2"#),
            pairs(&[("A", "1"), ("B", "open value C=2")])
        );
    }

    #[test]
    fn game_log_keeps_five_generations() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let stamp = OffsetDateTime::from_unix_timestamp(0).unwrap();
        for round in 0..7 {
            write_log(&logs, "Community Updates", &[format!("round {round}")], stamp).unwrap();
        }

        let current = fs::read_to_string(logs.join("Community Updates.txt")).unwrap();
        assert!(current.starts_with(&format!(
            "am2rforge {} log generated at 1970-01-01T00:00:00Z",
            env!("CARGO_PKG_VERSION")
        )));
        assert!(current.ends_with("round 6\n"));
        assert!(logs.join("Community Updates.txt.5").exists());
        assert!(!logs.join("Community Updates.txt.6").exists());
    }

    #[cfg(unix)]
    #[test]
    fn captured_launch_uses_profile_dir_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let profile_dir = layout.profile_dir("Test");
        fs::create_dir_all(&profile_dir).unwrap();
        fs::write(
            profile_dir.join("AM2R.AppImage"),
            "#!/bin/sh\necho \"cwd $(basename \"$PWD\")\"\necho \"title $TITLE\"\necho oops >&2\n",
        )
        .unwrap();

        let save = dir.path().join("save");
        let profile = ProfileDescriptor {
            name: "Test".to_string(),
            author: String::new(),
            version: String::new(),
            operating_system: String::new(),
            xml_version: String::new(),
            save_location: save.display().to_string(),
            uses_yyc: false,
            installable: true,
            supports_android: false,
            uses_custom_music: false,
            notes: String::new(),
            data_path: PathBuf::new(),
        };

        let status = GameLauncher::new(&layout, Platform::Linux)
            .launch(&profile, r#"TITLE="Metroid II""#, true)
            .unwrap();
        assert!(status.success());

        let log = fs::read_to_string(save.join("logs/Test.txt")).unwrap();
        assert!(log.contains("cwd Test"));
        assert!(log.contains("title Metroid II"));
        assert!(log.contains("oops"));
    }

    #[test]
    fn launching_uninstalled_profile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let profile = ProfileDescriptor::parse(
            crate::profile::testing::descriptor_xml("Missing", true, false).as_bytes(),
        )
        .unwrap();
        let err = GameLauncher::new(&layout, Platform::Linux)
            .launch(&profile, "", false)
            .unwrap_err();
        assert!(matches!(
            crate::error::find_launcher_error(&err),
            Some(LauncherError::ProfileNotFound(_))
        ));
    }
}
