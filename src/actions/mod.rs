//! Built-in actions
//!
//! An action step expands to a YAML document whose `type` field selects
//! the action.

pub mod get_secret;
pub mod set_vault;
pub mod vault;

use crate::error::{Error, Result};
use get_secret::GetSecret;
use serde::Deserialize;
use set_vault::SetVault;

#[derive(Debug, Clone)]
pub enum Action {
    GetSecret(GetSecret),
    SetVault(SetVault),
}

impl Action {
    /// Parse an expanded action document.
    pub fn parse(doc: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Header {
            #[serde(rename = "type", default)]
            kind: String,
        }

        let header: Header = serde_yaml::from_str(doc).map_err(|e| Error::parse("action", e))?;
        match header.kind.as_str() {
            "getSecret" => serde_yaml::from_str(doc)
                .map(Action::GetSecret)
                .map_err(|e| Error::parse("getSecret", e)),
            "setVault" => serde_yaml::from_str(doc)
                .map(Action::SetVault)
                .map_err(|e| Error::parse("setVault", e)),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::GetSecret(_) => "getSecret",
            Action::SetVault(_) => "setVault",
        }
    }
}
