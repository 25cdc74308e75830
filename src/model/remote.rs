use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

use crate::model::ParseError;

/// Namespace a ref was resolved in on the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    /// Path segment used by the hosting API under `git/refs/`.
    pub fn namespace(&self) -> &'static str {
        match self {
            RefKind::Branch => "heads",
            RefKind::Tag => "tags",
        }
    }
}

impl Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefKind::Branch => f.write_str("branch"),
            RefKind::Tag => f.write_str("tag"),
        }
    }
}

/// A ref resolved to the object id the forge reported for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRef {
    pub name: String,
    pub kind: RefKind,
    pub sha: String,
}

impl Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.sha)
    }
}

/// Git transport used for cloning. Read from configuration case-insensitively.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Protocol {
    #[default]
    Https,
    Git,
    Ssh,
}

impl TryFrom<String> for Protocol {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Protocol {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.to_ascii_lowercase();
        match value.as_str() {
            "https" => Ok(Protocol::Https),
            "git" => Ok(Protocol::Git),
            "ssh" => Ok(Protocol::Ssh),
            _ => Err(ParseError::InvalidProtocol(value)),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Protocol::Https => f.write_str("https"),
            Protocol::Git => f.write_str("git"),
            Protocol::Ssh => f.write_str("ssh"),
        }
    }
}
