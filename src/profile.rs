use crate::platform::Platform;
use anyhow::{anyhow, bail, Context, Result};
use quick_xml::{events::Event, Reader};
use serde::Serialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

pub const DESCRIPTOR_FILE: &str = "profile.xml";

const ARCHIVE_NOTES: &str =
    "This profile is archived and can no longer be installed. It stays playable until deleted.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDescriptor {
    pub name: String,
    pub author: String,
    pub version: String,
    pub operating_system: String,
    pub xml_version: String,
    pub save_location: String,
    pub uses_yyc: bool,
    pub installable: bool,
    pub supports_android: bool,
    pub uses_custom_music: bool,
    pub notes: String,
    pub data_path: PathBuf,
}

impl ProfileDescriptor {
    /// Parses a descriptor document. Missing `Name`/`Installable` or a
    /// malformed flag is an error; the caller skips such files.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let attrs = root_attributes(bytes)?;
        let text = |key: &str| attrs.get(key).cloned().unwrap_or_default();
        let flag = |key: &str| -> Result<bool> {
            match attrs.get(key) {
                None => Ok(false),
                Some(value) => parse_bool(value).with_context(|| format!("attribute {key}")),
            }
        };

        let name = attrs
            .get("Name")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("descriptor has no Name")?;
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            bail!("descriptor name is not a valid folder name: {name}");
        }
        let installable = parse_bool(attrs.get("Installable").context("descriptor has no Installable")?)
            .context("attribute Installable")?;

        Ok(Self {
            name,
            author: text("Author"),
            version: text("Version"),
            operating_system: text("OperatingSystem"),
            xml_version: text("XMLVersion"),
            save_location: text("SaveLocation"),
            uses_yyc: flag("UsesYYC")?,
            installable,
            supports_android: flag("SupportsAndroid")?,
            uses_custom_music: flag("UsesCustomMusic")?,
            notes: text("ProfileNotes"),
            data_path: PathBuf::new(),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read {path:?}"))?;
        Self::parse(&bytes).with_context(|| format!("parse {path:?}"))
    }

    pub fn display_notes(&self) -> &str {
        if self.installable {
            &self.notes
        } else {
            ARCHIVE_NOTES
        }
    }

    pub fn save_dir(&self, platform: Platform) -> PathBuf {
        let home = std::env::var(platform.home_var()).unwrap_or_default();
        PathBuf::from(expand_save_location(&self.save_location, platform, &home))
    }
}

pub fn expand_save_location(template: &str, platform: Platform, home: &str) -> String {
    match platform {
        Platform::Windows => replace_ignore_ascii_case(template, platform.save_placeholder(), home),
        Platform::Linux => template.replacen(platform.save_placeholder(), home, 1),
    }
}

fn replace_ignore_ascii_case(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower = haystack.to_ascii_lowercase();
    match lower.find(&needle.to_ascii_lowercase()) {
        Some(start) => format!(
            "{}{}{}",
            &haystack[..start],
            replacement,
            &haystack[start + needle.len()..]
        ),
        None => haystack.to_string(),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(anyhow!("not a boolean: {other}")),
    }
}

fn root_attributes(bytes: &[u8]) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() != b"message" {
                    bail!(
                        "unexpected root element {}",
                        String::from_utf8_lossy(e.name().as_ref())
                    );
                }
                let mut attrs = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr.context("descriptor attribute")?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = attr.unescape_value().context("descriptor attribute value")?;
                    attrs.insert(key, value.to_string());
                }
                return Ok(attrs);
            }
            Ok(Event::Eof) => bail!("descriptor has no root element"),
            Err(err) => return Err(err).context("descriptor xml"),
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    pub fn descriptor_xml(name: &str, installable: bool, android: bool) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<message OperatingSystem="Linux" XMLVersion="1" Version="1.5.5" Name="{name}" Author="Community" UsesCustomMusic="false" SaveLocation="~/.config/AM2R" SupportsAndroid="{android}" Installable="{installable}" UsesYYC="true" ProfileNotes="Notes &amp; more" />"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::descriptor_xml;
    use super::*;

    #[test]
    fn parses_attribute_descriptor() {
        let profile = ProfileDescriptor::parse(descriptor_xml("Community Updates", true, true).as_bytes())
            .unwrap();
        assert_eq!(profile.name, "Community Updates");
        assert_eq!(profile.version, "1.5.5");
        assert!(profile.installable);
        assert!(profile.supports_android);
        assert!(profile.uses_yyc);
        assert!(!profile.uses_custom_music);
        assert_eq!(profile.notes, "Notes & more");
        assert_eq!(profile.display_notes(), "Notes & more");
    }

    #[test]
    fn fails_closed_on_bad_documents() {
        assert!(ProfileDescriptor::parse(b"<message Name=\"x\"/>").is_err());
        assert!(ProfileDescriptor::parse(b"<message Installable=\"true\"/>").is_err());
        assert!(ProfileDescriptor::parse(b"<message Name=\"x\" Installable=\"sure\"/>").is_err());
        assert!(ProfileDescriptor::parse(b"<profile Name=\"x\" Installable=\"true\"/>").is_err());
        assert!(ProfileDescriptor::parse(b"<message Name=\"../x\" Installable=\"true\"/>").is_err());
        assert!(ProfileDescriptor::parse(b"").is_err());
    }

    #[test]
    fn archived_profiles_show_archive_notice() {
        let profile =
            ProfileDescriptor::parse(descriptor_xml("Old", false, false).as_bytes()).unwrap();
        assert_eq!(profile.display_notes(), ARCHIVE_NOTES);
    }

    #[test]
    fn save_location_expansion_per_platform() {
        assert_eq!(
            expand_save_location("~/.config/AM2R", Platform::Linux, "/home/sam"),
            "/home/sam/.config/AM2R"
        );
        assert_eq!(
            expand_save_location("%LocalAppData%/AM2R", Platform::Windows, "C:/Users/sam/AppData/Local"),
            "C:/Users/sam/AppData/Local/AM2R"
        );
    }
}
