//! `.netrc` credential lookup
//!
//! Supports `machine`, `default`, `login`, `password` and `account` tokens.
//! `macdef` bodies are skipped up to the next blank line.

use crate::error::{CommonError, Result};
use std::path::{Path, PathBuf};

/// Username/password pair for basic auth
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone)]
struct Entry {
    /// `None` for the `default` entry
    machine: Option<String>,
    credentials: Credentials,
}

/// Parsed credentials file
#[derive(Debug, Clone, Default)]
pub struct Netrc {
    entries: Vec<Entry>,
}

impl Netrc {
    /// `~/.netrc`, when a home directory can be determined
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".netrc"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut in_macdef = false;

        for line in text.lines() {
            if in_macdef {
                in_macdef = !line.trim().is_empty();
                continue;
            }

            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token.starts_with('#') {
                    break;
                }

                match token {
                    "machine" => {
                        let name = next_value(&mut tokens, "machine")?;
                        entries.push(Entry {
                            machine: Some(name.to_string()),
                            credentials: Credentials::default(),
                        });
                    }
                    "default" => entries.push(Entry {
                        machine: None,
                        credentials: Credentials::default(),
                    }),
                    "login" | "password" | "account" => {
                        let value = next_value(&mut tokens, token)?;
                        let entry = entries.last_mut().ok_or_else(|| {
                            CommonError::Credentials(format!(
                                "'{}' appears before any machine entry",
                                token
                            ))
                        })?;
                        match token {
                            "login" => entry.credentials.login = value.to_string(),
                            "password" => entry.credentials.password = value.to_string(),
                            _ => {}
                        }
                    }
                    "macdef" => {
                        in_macdef = true;
                        break;
                    }
                    other => {
                        return Err(CommonError::Credentials(format!(
                            "unexpected token '{}'",
                            other
                        )))
                    }
                }
            }
        }

        Ok(Self { entries })
    }

    /// Credentials for `host`, falling back to the `default` entry.
    pub fn authenticator(&self, host: &str) -> Option<&Credentials> {
        self.entries
            .iter()
            .find(|e| e.machine.as_deref() == Some(host))
            .or_else(|| self.entries.iter().find(|e| e.machine.is_none()))
            .map(|e| &e.credentials)
    }
}

fn next_value<'a>(tokens: &mut impl Iterator<Item = &'a str>, token: &str) -> Result<&'a str> {
    tokens
        .next()
        .ok_or_else(|| CommonError::Credentials(format!("'{}' is missing its value", token)))
}
