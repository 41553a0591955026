//! Module-argument parsing and per-module configuration.
//!
//! Arguments arrive as whitespace-separated `key=value` tokens, the way the
//! host framework hands module arguments around; unknown keys are rejected.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::jitter::JitterConfig;
use crate::sample::{ChannelMap, SampleSpec};

pub const DEFAULT_IFACE: &str = "mon0";
pub const DEFAULT_SINK_NAME: &str = "iwabsink";
pub const DEFAULT_SOURCE_NAME: &str = "iwabsrc";

/// Deployed MCS index (16-QAM 1/2).
pub const DEFAULT_MCS_INDEX: u8 = 3;

/// Group address stamped into all three dot11 address fields; all-zero in
/// the deployed configuration.
pub const DEFAULT_GROUP: [u8; 6] = [0; 6];

/// Parsed `key=value` module arguments, validated against a key list.
struct ModArgs {
    values: HashMap<String, String>,
}

impl ModArgs {
    fn parse(args: &str, valid: &[&str]) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for token in args.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedArgument(token.to_owned()))?;
            if !valid.contains(&key) {
                return Err(ConfigError::UnknownArgument(key.to_owned()));
            }
            values.insert(key.to_owned(), value.to_owned());
        }
        Ok(Self { values })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

/// Apply `format`/`rate`/`channels`/`channel_map` arguments on top of the
/// wire-default sample spec. Both ends must be configured identically.
fn sample_spec_from_args(args: &ModArgs) -> Result<(SampleSpec, ChannelMap), ConfigError> {
    let mut spec = SampleSpec::default();

    if let Some(format) = args.get("format") {
        spec.format = format.parse()?;
    }
    if let Some(rate) = args.get("rate") {
        spec.rate = rate.parse().map_err(|e| ConfigError::InvalidValue {
            key: "rate",
            value: rate.to_owned(),
            reason: format!("{e}"),
        })?;
    }

    let explicit_channels = match args.get("channels") {
        Some(channels) => {
            spec.channels = channels.parse().map_err(|e| ConfigError::InvalidValue {
                key: "channels",
                value: channels.to_owned(),
                reason: format!("{e}"),
            })?;
            true
        }
        None => false,
    };

    let map = match args.get("channel_map") {
        Some(map) => {
            let map = ChannelMap::parse(map)?;
            // a lone channel map also sets the channel count
            if !explicit_channels {
                spec.channels = map.len() as u8;
            }
            map
        }
        None => ChannelMap::default_for(spec.channels),
    };

    if !spec.is_valid() {
        return Err(ConfigError::InvalidSampleSpec(format!("{spec}")));
    }
    if !map.matches(&spec) {
        return Err(ConfigError::ChannelMapMismatch {
            map: map.len(),
            channels: spec.channels,
        });
    }

    Ok((spec, map))
}

/// Configuration of the transmit side (the advertised sink).
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub sink_name: String,
    pub iface: String,
    pub spec: SampleSpec,
    pub channel_map: ChannelMap,
    pub group: [u8; 6],
    pub mcs_index: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let spec = SampleSpec::default();
        Self {
            sink_name: DEFAULT_SINK_NAME.to_owned(),
            iface: DEFAULT_IFACE.to_owned(),
            spec,
            channel_map: ChannelMap::default_for(spec.channels),
            group: DEFAULT_GROUP,
            mcs_index: DEFAULT_MCS_INDEX,
        }
    }
}

impl OutputConfig {
    const VALID_ARGS: &'static [&'static str] = &[
        "sink_name",
        "format",
        "rate",
        "channels",
        "channel_map",
        "iface",
    ];

    pub fn from_args(args: &str) -> Result<Self, ConfigError> {
        let ma = ModArgs::parse(args, Self::VALID_ARGS)?;
        let (spec, channel_map) = sample_spec_from_args(&ma)?;
        Ok(Self {
            sink_name: ma.get_or("sink_name", DEFAULT_SINK_NAME).to_owned(),
            iface: ma.get_or("iface", DEFAULT_IFACE).to_owned(),
            spec,
            channel_map,
            group: DEFAULT_GROUP,
            mcs_index: DEFAULT_MCS_INDEX,
        })
    }
}

/// Configuration of the receive side attached to an existing sink.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Name of the sink to attach to; the host resolves it.
    pub sink: Option<String>,
    pub iface: String,
    pub spec: SampleSpec,
    pub channel_map: ChannelMap,
    pub group: [u8; 6],
    pub jitter: JitterConfig,
}

impl Default for InputConfig {
    fn default() -> Self {
        let spec = SampleSpec::default();
        Self {
            sink: None,
            iface: DEFAULT_IFACE.to_owned(),
            spec,
            channel_map: ChannelMap::default_for(spec.channels),
            group: DEFAULT_GROUP,
            jitter: JitterConfig::default(),
        }
    }
}

impl InputConfig {
    const VALID_ARGS: &'static [&'static str] =
        &["sink", "format", "rate", "channels", "channel_map", "iface"];

    pub fn from_args(args: &str) -> Result<Self, ConfigError> {
        let ma = ModArgs::parse(args, Self::VALID_ARGS)?;
        let (spec, channel_map) = sample_spec_from_args(&ma)?;
        Ok(Self {
            sink: ma.get("sink").map(str::to_owned),
            iface: ma.get_or("iface", DEFAULT_IFACE).to_owned(),
            spec,
            channel_map,
            group: DEFAULT_GROUP,
            jitter: JitterConfig::default(),
        })
    }
}

/// Configuration of the capture-source variant.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source_name: String,
    pub iface: String,
    pub spec: SampleSpec,
    pub channel_map: ChannelMap,
    pub group: [u8; 6],
}

impl Default for SourceConfig {
    fn default() -> Self {
        let spec = SampleSpec::default();
        Self {
            source_name: DEFAULT_SOURCE_NAME.to_owned(),
            iface: DEFAULT_IFACE.to_owned(),
            spec,
            channel_map: ChannelMap::default_for(spec.channels),
            group: DEFAULT_GROUP,
        }
    }
}

impl SourceConfig {
    const VALID_ARGS: &'static [&'static str] = &[
        "source_name",
        "format",
        "rate",
        "channels",
        "channel_map",
        "iface",
    ];

    pub fn from_args(args: &str) -> Result<Self, ConfigError> {
        let ma = ModArgs::parse(args, Self::VALID_ARGS)?;
        let (spec, channel_map) = sample_spec_from_args(&ma)?;
        Ok(Self {
            source_name: ma.get_or("source_name", DEFAULT_SOURCE_NAME).to_owned(),
            iface: ma.get_or("iface", DEFAULT_IFACE).to_owned(),
            spec,
            channel_map,
            group: DEFAULT_GROUP,
        })
    }
}
