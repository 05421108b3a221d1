use std::path::PathBuf;

use anyhow::{Result, anyhow};

pub const DEFAULT_CONFIG_PATH: &str = "./insight-relay.jsonc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArg {
    pub path: PathBuf,
    /// Set when `--config` was given; a missing explicit file is an error.
    pub explicit: bool,
}

pub fn config_arg_from_args() -> Result<ConfigArg> {
    parse_config_arg(std::env::args().skip(1))
}

pub fn parse_config_arg(args: impl IntoIterator<Item = String>) -> Result<ConfigArg> {
    let mut args = args.into_iter();
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config"))?;
                config_path = Some(PathBuf::from(value));
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other}. usage: insight-relay [--config <path>]"
                ));
            }
        }
    }

    Ok(match config_path {
        Some(path) => ConfigArg {
            path,
            explicit: true,
        },
        None => ConfigArg {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            explicit: false,
        },
    })
}
