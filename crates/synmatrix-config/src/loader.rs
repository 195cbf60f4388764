// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Loading `synmatrix.toml` and layering overrides on top of it
//!
//! Precedence, lowest first: the file, `SYNMATRIX_*` environment variables,
//! then the CLI map. Every override key is listed once in [`OVERRIDES`]; the
//! CLI uses the key as is and the environment uses `SYNMATRIX_<KEY>`.

use crate::{validate_config, ConfigError, ConfigResult, SynmatrixConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "synmatrix.toml";
const CONFIG_PATH_VAR: &str = "SYNMATRIX_CONFIG_PATH";
const ENV_PREFIX: &str = "SYNMATRIX_";

/// Sets one field from its textual override
pub type OverrideSetter = fn(&mut SynmatrixConfig, &str) -> Result<(), String>;

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value.trim().parse().map_err(|_| format!("cannot parse '{}'", value))
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("'{}' is not a flag", value)),
    }
}

/// Keys accepted as overrides and the field each one sets
pub const OVERRIDES: &[(&str, OverrideSetter)] = &[
    ("timestep_us", |c, v| {
        c.simulation.machine_time_step_us = parse(v)?;
        Ok(())
    }),
    ("time_scale_factor", |c, v| {
        c.simulation.time_scale_factor = parse(v)?;
        Ok(())
    }),
    ("spikes_per_second", |c, v| {
        c.synapses.spikes_per_second = parse(v)?;
        Ok(())
    }),
    ("ring_buffer_sigma", |c, v| {
        c.synapses.ring_buffer_sigma = parse(v)?;
        Ok(())
    }),
    ("max_ring_buffer_shift", |c, v| {
        c.synapses.max_ring_buffer_shift = parse(v)?;
        Ok(())
    }),
    ("sdram_overscale", |c, v| {
        c.synapses.sdram_overscale = parse(v)?;
        Ok(())
    }),
    ("generate_on_machine", |c, v| {
        c.synapses.generate_on_machine = parse_flag(v)?;
        Ok(())
    }),
    ("max_delay_stages", |c, v| {
        c.delays.max_delay_stages = parse(v)?;
        Ok(())
    }),
    ("log_level", |c, v| {
        c.logging.level = v.trim().to_string();
        Ok(())
    }),
];

fn apply_override(
    config: &mut SynmatrixConfig,
    source: &str,
    key: &str,
    setter: OverrideSetter,
    value: &str,
) -> ConfigResult<()> {
    setter(config, value).map_err(|reason| ConfigError::InvalidValue(format!("{} {}: {}", source, key, reason)))
}

/// Config file to use when none is given explicitly
///
/// An explicit path wins and must exist; otherwise `start` and each of its
/// ancestors is searched for `synmatrix.toml`, nearest first.
pub fn find_config_file_from(start: &Path, explicit: Option<PathBuf>) -> ConfigResult<PathBuf> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path)
        } else {
            Err(ConfigError::FileNotFound(format!("{} ({} is set)", path.display(), CONFIG_PATH_VAR)))
        };
    }
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            ConfigError::FileNotFound(format!(
                "{} in {} or any parent; set {} to point elsewhere",
                CONFIG_FILE_NAME,
                start.display(),
                CONFIG_PATH_VAR
            ))
        })
}

/// [`find_config_file_from`] starting at the working directory, honouring `SYNMATRIX_CONFIG_PATH`
pub fn find_config_file() -> ConfigResult<PathBuf> {
    let start = env::current_dir()?;
    find_config_file_from(&start, env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))
}

/// Read, override and validate the configuration
///
/// With `config_path` of `None` the file is located by [`find_config_file`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SynmatrixConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    let mut config: SynmatrixConfig = toml::from_str(&fs::read_to_string(&config_file)?)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }
    validate_config(&config)?;
    Ok(config)
}

/// Apply `SYNMATRIX_<KEY>` overrides found by `lookup`
pub fn apply_overrides_from(
    config: &mut SynmatrixConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    for (key, setter) in OVERRIDES {
        let name = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
        if let Some(value) = lookup(&name) {
            apply_override(config, "environment", &name, *setter, &value)?;
        }
    }
    Ok(())
}

/// Apply overrides from the process environment
pub fn apply_environment_overrides(config: &mut SynmatrixConfig) -> ConfigResult<()> {
    apply_overrides_from(config, |name| env::var(name).ok())
}

/// Apply overrides passed on the command line; unknown keys are rejected
pub fn apply_cli_overrides(config: &mut SynmatrixConfig, cli_args: &HashMap<String, String>) -> ConfigResult<()> {
    for (key, value) in cli_args {
        let setter = OVERRIDES
            .iter()
            .find(|(known, _)| *known == key.as_str())
            .map(|(_, setter)| *setter)
            .ok_or_else(|| ConfigError::InvalidValue(format!("unknown override '{}'", key)))?;
        apply_override(config, "argument", key, setter, value)?;
    }
    Ok(())
}
