// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::Path;

use ioc4_sio::ring::RingSize;
use ioc4_sio::Tunables;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for the IOC4 serial engines on a host, keyed by chip name.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default, rename = "chip")]
    pub chips: BTreeMap<String, ChipConfig>,
}

impl Config {
    /// Tunables for the named chip. Chips without an entry run on the
    /// engine defaults.
    pub fn tunables(&self, chip: &str) -> Result<Tunables, ParseError> {
        match self.chips.get(chip) {
            Some(cfg) => cfg.tunables(chip),
            None => Ok(Tunables::default()),
        }
    }
}

/// Overrides for one IOC4. Anything left unset keeps its default.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChipConfig {
    /// Sub-ring size: "1k", "4k", or a power-of-two entry count.
    pub ring_size: Option<String>,
    pub xin_clk_hz: Option<u32>,
    pub ticks_per_sec: Option<u32>,
    pub default_baud: Option<u32>,

    pub pause_spin_limit: Option<u32>,
    pub idle_spin_limit: Option<u32>,
    pub drain_spin_limit: Option<u32>,
    pub flush_spin_limit: Option<u32>,
}

impl ChipConfig {
    fn tunables(&self, chip: &str) -> Result<Tunables, ParseError> {
        let mut t = Tunables::default();
        if let Some(size) = &self.ring_size {
            t.ring_size = RingSize::try_from(size.clone()).map_err(|_| {
                ParseError::InvalidRingSize(size.clone(), chip.to_string())
            })?;
        }
        let overrides = [
            (self.xin_clk_hz, &mut t.xin_clk_hz),
            (self.ticks_per_sec, &mut t.ticks_per_sec),
            (self.default_baud, &mut t.default_baud),
            (self.pause_spin_limit, &mut t.pause_spin_limit),
            (self.idle_spin_limit, &mut t.idle_spin_limit),
            (self.drain_spin_limit, &mut t.drain_spin_limit),
            (self.flush_spin_limit, &mut t.flush_spin_limit),
        ];
        for (val, field) in overrides {
            if let Some(val) = val {
                *field = val;
            }
        }
        Ok(t)
    }
}

/// Errors which may be returned when parsing the configuration.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ring size {0} for chip {1}")]
    InvalidRingSize(String, String),
}

/// Parses configuration from a TOML string, validating every chip entry.
pub fn from_str(contents: &str) -> Result<Config, ParseError> {
    let cfg = toml::from_str::<Config>(contents)?;
    for (name, chip) in cfg.chips.iter() {
        chip.tunables(name)?;
    }
    Ok(cfg)
}

/// Parses a TOML file into a configuration object.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    from_str(&contents)
}
