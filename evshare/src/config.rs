use crate::shortcut::Shortcut;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 5258;

/// Command line flags taking precedence over the configuration file. Flags
/// left out do not override anything.
#[derive(clap::Args, Serialize, Debug, Default)]
pub struct Overrides {
    /// Address to listen on (server) or connect to (client).
    #[clap(short, long, value_parser)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[clap(short, long, value_parser)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Devices to share, comma separated: handlers such as `event3`, paths or
    /// device names.
    #[clap(short, long, value_parser, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,

    #[clap(short, long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub verbose: bool,

    /// Name this client announces itself with.
    #[clap(short, long, value_parser)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub address: Option<String>,
    pub port: u16,
    pub devices: Vec<String>,
    pub verbose: bool,
    pub identification: Option<String>,
    pub shortcuts: Vec<Shortcut>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            port: DEFAULT_PORT,
            devices: Vec::new(),
            verbose: false,
            identification: None,
            shortcuts: Shortcut::defaults(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if there is one, then `EVSHARE_*`
    /// variables, then the command line.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, figment::Error> {
        Self::figment(path, overrides).extract()
    }

    fn figment(path: &Path, overrides: &Overrides) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("EVSHARE_"))
            .merge(Serialized::defaults(overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut::Action;
    use figment::Jail;

    #[test]
    fn defaults_without_a_file() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("missing.toml");
            let config = Config::load(&path, &Overrides::default())?;
            assert_eq!(config, Config::default());
            assert_eq!(config.port, DEFAULT_PORT);
            assert_eq!(config.shortcuts.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn file_then_environment_then_flags() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                address = "192.168.1.10"
                port = 6000
                devices = ["event3"]

                [[shortcuts]]
                name = "FOCUS_SWITCH_RIGHT"
                modifier = 97
                key = 106
                "#,
            )?;
            jail.set_env("EVSHARE_PORT", "7000");

            let overrides = Overrides {
                identification: Some("desk".to_owned()),
                verbose: true,
                ..Overrides::default()
            };
            let config = Config::load(&jail.directory().join("config.toml"), &overrides)?;

            assert_eq!(config.address.as_deref(), Some("192.168.1.10"));
            assert_eq!(config.port, 7000);
            assert_eq!(config.devices, vec!["event3".to_owned()]);
            assert_eq!(config.identification.as_deref(), Some("desk"));
            assert!(config.verbose);
            assert_eq!(
                config.shortcuts,
                vec![Shortcut {
                    name: Action::FocusSwitchRight,
                    modifier: 97,
                    key: 106,
                }]
            );
            Ok(())
        });
    }

    #[test]
    fn flags_beat_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "port = 6000")?;
            let overrides = Overrides {
                port: Some(6001),
                ..Overrides::default()
            };

            let config = Config::load(&jail.directory().join("config.toml"), &overrides)?;
            assert_eq!(config.port, 6001);
            Ok(())
        });
    }

    #[test]
    fn unknown_action_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [[shortcuts]]
                name = "FOCUS_SWITCH_UP"
                modifier = 29
                key = 103
                "#,
            )?;

            let path = jail.directory().join("config.toml");
            assert!(Config::load(&path, &Overrides::default()).is_err());
            Ok(())
        });
    }
}
