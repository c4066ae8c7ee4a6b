// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Property-file and stations-file formats (§6).
//!
//! Parsing/serialization of these two narrow, well-specified data formats
//! is in scope even though the backing store (where the files live, who
//! calls `save`) is an out-of-scope UI concern; see [`crate::external`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// `vol`/`bal` pair persisted under `last_audio_setting`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AudioSetting {
    /// Volume, `0.0..=1.0`.
    #[serde(default)]
    pub vol: f64,
    /// Left/right balance, `-1.0..=1.0`.
    #[serde(default)]
    pub bal: f64,
}

/// One entry of `last_radio_modes`: the last-tuned frequency per mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadioModeMemory {
    pub mode: String,
    pub freq: u32,
}

/// The persisted property file's recognized keys, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_audio_setting: Option<AudioSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_radio_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub last_radio_modes: Vec<RadioModeMemory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_menu_selected: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "cputemp-query-delay")]
    pub cputemp_query_delay: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "temp-query-delay")]
    pub temp_query_delay: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "compass-query-delay")]
    pub compass_query_delay: Option<u16>,
}

/// Loads/saves [`Properties`] as JSON.
pub trait PropertyStore {
    fn load(path: &Path) -> Result<Properties>;
    fn save(&self, path: &Path) -> Result<()>;
}

impl PropertyStore for Properties {
    fn load(path: &Path) -> Result<Properties> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::DeviceOpenFailed(format!("properties file: {e}")))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::DeviceOpenFailed(format!("properties file: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// One entry in a stations file: `mode<TAB>frequency_hz<TAB>title[<TAB>location]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub mode: String,
    pub frequency_hz: u32,
    pub title: String,
    pub location: Option<String>,
}

/// Parses the stations TSV format: `#` introduces a comment, blank lines
/// are allowed, fields are tab-separated.
pub fn parse_stations(text: &str) -> Vec<Station> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let mode = fields.next()?.to_string();
            let frequency_hz = fields.next()?.parse().ok()?;
            let title = fields.next()?.to_string();
            let location = fields.next().map(str::to_string);
            Some(Station { mode, frequency_hz, title, location })
        })
        .collect()
}

/// Loads a stations file from disk and parses it.
pub fn load_stations(path: &Path) -> Result<Vec<Station>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_stations(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn properties_round_trip_through_json() {
        let props = Properties {
            last_audio_setting: Some(AudioSetting { vol: 0.75, bal: -0.2 }),
            last_radio_mode: Some("FM".to_string()),
            last_radio_modes: vec![RadioModeMemory { mode: "FM".to_string(), freq: 97_500_000 }],
            last_menu_selected: Some(3),
            cputemp_query_delay: Some(30),
            temp_query_delay: None,
            compass_query_delay: None,
        };
        let file = NamedTempFile::new().unwrap();
        props.save(file.path()).unwrap();
        let loaded = Properties::load(file.path()).unwrap();
        assert_eq!(loaded, props);
    }

    #[test]
    fn properties_load_defaults_missing_keys() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "{}").unwrap();
        let loaded = Properties::load(file.path()).unwrap();
        assert_eq!(loaded, Properties::default());
    }

    #[test]
    fn parse_stations_skips_comments_and_blank_lines() {
        let text = "# comment\n\nFM\t97500000\tKROQ\tLA\nAM\t640000\tKFI\n";
        let stations = parse_stations(text);
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].location.as_deref(), Some("LA"));
        assert_eq!(stations[1].location, None);
        assert_eq!(stations[1].frequency_hz, 640_000);
    }
}
