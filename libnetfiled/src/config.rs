// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Server configuration: base directory, listen port, and the flat
//! user/password table.
//!
//! Grounded on `examples/shell-pool-shpool/libshpool/src/config.rs`
//! for the read-and-parse shape (`read_config` taking an optional
//! explicit path and falling back to a default location), but the wire
//! format itself is the line-oriented one spec.md §6 pins: `base`,
//! `port`, and repeated `user <name> <password>` directives, `#`
//! comments, no quoting. Passwords are plain text, matching the
//! Non-goal "no credential hashing" in spec.md §1.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde_derive::Deserialize;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct Config {
    pub base: PathBuf,
    pub port: u16,
    users: HashMap<String, String>,
}

impl Config {
    pub fn user_exists(&self, user: &str) -> bool {
        self.users.contains_key(user)
    }

    pub fn is_user_pwd_valid(&self, user: &str, pwd: &str) -> bool {
        self.users.get(user).map(|expected| expected == pwd).unwrap_or(false)
    }
}

/// Parse the line-oriented config format from `path`.
#[instrument(skip_all)]
pub fn read_config(path: &str) -> anyhow::Result<Config> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    parse_config(&text, std::path::Path::new(path).parent().unwrap_or(std::path::Path::new(".")))
}

fn parse_config(text: &str, relative_to: &std::path::Path) -> anyhow::Result<Config> {
    let mut base: Option<PathBuf> = None;
    let mut port: Option<u16> = None;
    let mut users = HashMap::new();

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = match raw_line.find('#') {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut words = line.split_whitespace();
        let directive = words.next().ok_or_else(|| anyhow!("config line {}: empty directive", lineno + 1))?;
        match directive {
            "base" => {
                let dir = words
                    .next()
                    .ok_or_else(|| anyhow!("config line {}: `base` needs a directory", lineno + 1))?;
                let path = PathBuf::from(dir);
                base = Some(if path.is_absolute() { path } else { relative_to.join(path) });
            }
            "port" => {
                let raw = words
                    .next()
                    .ok_or_else(|| anyhow!("config line {}: `port` needs a number", lineno + 1))?;
                port = Some(raw.parse().with_context(|| format!("config line {}: bad port", lineno + 1))?);
            }
            "user" => {
                let name = words
                    .next()
                    .ok_or_else(|| anyhow!("config line {}: `user` needs a name", lineno + 1))?;
                let pwd = words
                    .next()
                    .ok_or_else(|| anyhow!("config line {}: `user` needs a password", lineno + 1))?;
                users.insert(name.to_string(), pwd.to_string());
            }
            other => return Err(anyhow!("config line {}: unknown directive `{}`", lineno + 1, other)),
        }
    }

    let base = base.ok_or_else(|| anyhow!("config is missing a `base` directive"))?;
    let port = port.ok_or_else(|| anyhow!("config is missing a `port` directive"))?;
    info!("loaded config: base={:?}, port={}, {} users", base, port, users.len());
    Ok(Config { base, port, users })
}

/// A secondary, toml-based representation accepted for tests and for
/// embedding config inline in integration harnesses; not the server's
/// on-disk format, which is the line-oriented one above.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TomlConfig {
    pub base: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl TomlConfig {
    pub fn into_config(self, relative_to: &std::path::Path) -> anyhow::Result<Config> {
        let base = self.base.ok_or_else(|| anyhow!("toml config is missing `base`"))?;
        let path = PathBuf::from(base);
        let base = if path.is_absolute() { path } else { relative_to.join(path) };
        let port = self.port.ok_or_else(|| anyhow!("toml config is missing `port`"))?;
        Ok(Config { base, port, users: self.users })
    }
}

pub fn parse_toml_config(text: &str) -> anyhow::Result<TomlConfig> {
    toml::from_str(text).context("parsing toml config")
}

/// Fatal at startup; not one of the reported-to-client `ErrorKind`s.
pub fn config_error(message: impl Into<String>) -> anyhow::Error {
    anyhow!("ConfigError: {}", message.into())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_base_port_and_users() {
        let text = "\
# a comment
base /srv/netfiled
port 4242
user alice hunter2
user bob swordfish
";
        let cfg = parse_config(text, std::path::Path::new(".")).unwrap();
        assert_eq!(cfg.base, PathBuf::from("/srv/netfiled"));
        assert_eq!(cfg.port, 4242);
        assert!(cfg.user_exists("alice"));
        assert!(cfg.is_user_pwd_valid("bob", "swordfish"));
        assert!(!cfg.is_user_pwd_valid("bob", "wrong"));
    }

    #[test]
    fn relative_base_resolves_against_config_dir() {
        let text = "base data\nport 1\n";
        let cfg = parse_config(text, std::path::Path::new("/etc/netfiled")).unwrap();
        assert_eq!(cfg.base, PathBuf::from("/etc/netfiled/data"));
    }

    #[test]
    fn missing_base_is_an_error() {
        let text = "port 1\n";
        assert!(parse_config(text, std::path::Path::new(".")).is_err());
    }

    #[test]
    fn toml_config_is_an_accepted_alternate_form() {
        let text = r#"
base = "/srv/netfiled"
port = 4242

[users]
alice = "hunter2"
"#;
        let toml_cfg = parse_toml_config(text).unwrap();
        let cfg = toml_cfg.into_config(std::path::Path::new(".")).unwrap();
        assert!(cfg.is_user_pwd_valid("alice", "hunter2"));
    }
}
