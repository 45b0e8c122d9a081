use crate::error::{DemuxError, Result};
use crate::utils::warn::DEFAULT_WARN_INTERVAL;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Which audio or subtitle tracks survive stream discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackSelection {
    #[default]
    All,
    Nothing,
    /// ISO-639-2 codes, compared case-insensitively.
    Languages(Vec<String>),
    /// Logical stream ids.
    Ids(Vec<usize>),
}

impl TrackSelection {
    pub fn selects(&self, id: usize, language: Option<&str>) -> bool {
        match self {
            TrackSelection::All => true,
            TrackSelection::Nothing => false,
            TrackSelection::Languages(codes) => language
                .is_some_and(|lang| codes.iter().any(|c| c.eq_ignore_ascii_case(lang))),
            TrackSelection::Ids(ids) => ids.contains(&id),
        }
    }

    fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        match value {
            "all" => return Ok(TrackSelection::All),
            "none" => return Ok(TrackSelection::Nothing),
            _ => {}
        }
        if let Some(list) = value.strip_prefix("lang:") {
            return Ok(TrackSelection::Languages(
                list.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ));
        }
        if let Some(list) = value.strip_prefix("id:") {
            let ids = list
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<usize>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok(TrackSelection::Ids(ids));
        }
        Err(DemuxError::Config(format!("unknown track selection '{}'", value)))
    }
}

/// Per-handle demuxer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxConfig {
    /// Program number to demux; `None` takes the first program found.
    pub program: Option<u16>,
    pub audio: TrackSelection,
    pub subtitles: TrackSelection,
    pub probe_buffer_cap: usize,
    pub probe_attempts: u32,
    /// Units to drop while waiting for a keyframe before giving up.
    pub keyframe_budget: u32,
    pub duration_samples: usize,
    pub warn_interval_frames: u64,
    pub resync_window_packets: usize,
    /// Bytes scanned for tables and probing on open.
    pub discovery_limit: u64,
    pub verify_crc: bool,
    pub estimate_duration: bool,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            program: None,
            audio: TrackSelection::All,
            subtitles: TrackSelection::All,
            probe_buffer_cap: 1024 * 1024,
            probe_attempts: 3,
            keyframe_budget: 600,
            duration_samples: 128,
            warn_interval_frames: DEFAULT_WARN_INTERVAL,
            resync_window_packets: 80,
            discovery_limit: 32 * 1024 * 1024,
            verify_crc: true,
            estimate_duration: true,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(DemuxError::Config(format!(
            "{} expects a boolean, got '{}'",
            key, value
        ))),
    }
}

impl DemuxConfig {
    /// Parses `key = value` lines. Unknown keys are rejected, `#` starts a
    /// comment, values may be quoted.
    pub fn from_config_str(content: &str) -> Result<Self> {
        let mut config = DemuxConfig::default();
        for (number, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(DemuxError::Config(format!(
                    "line {}: expected key = value",
                    number + 1
                )));
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');

            match key {
                "program" => {
                    config.program = match value {
                        "first" | "" => None,
                        v => Some(v.parse()?),
                    }
                }
                "audio" => config.audio = TrackSelection::parse(value)?,
                "subtitles" => config.subtitles = TrackSelection::parse(value)?,
                "probe_buffer_cap" => config.probe_buffer_cap = value.parse()?,
                "probe_attempts" => config.probe_attempts = value.parse()?,
                "keyframe_budget" => config.keyframe_budget = value.parse()?,
                "duration_samples" => config.duration_samples = value.parse()?,
                "warn_interval_frames" => config.warn_interval_frames = value.parse()?,
                "resync_window_packets" => config.resync_window_packets = value.parse()?,
                "discovery_limit" => config.discovery_limit = value.parse()?,
                "verify_crc" => config.verify_crc = parse_bool(key, value)?,
                "estimate_duration" => config.estimate_duration = parse_bool(key, value)?,
                _ => {
                    return Err(DemuxError::Config(format!(
                        "line {}: unknown key '{}'",
                        number + 1,
                        key
                    )))
                }
            }
        }
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut content = String::new();
        File::open(path)?.read_to_string(&mut content)?;
        Self::from_config_str(&content)
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# esdemux configuration
# Every key is optional; the values below are the defaults.

# program number to demux, or "first"
program = first

# all, none, lang:eng,fre or id:1,2
audio = all
subtitles = all

probe_buffer_cap = 1048576
probe_attempts = 3
keyframe_budget = 600
duration_samples = 128
warn_interval_frames = 30000
resync_window_packets = 80
discovery_limit = 33554432
verify_crc = true
estimate_duration = true
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}
