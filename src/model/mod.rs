use thiserror::Error;

pub mod cookbook;
pub mod remote;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected a github user and a repo to download from, e.g. jnewland/chef_ipmi (got `{0}`)")]
    MissingComponent(String),
    #[error("Empty ref in `{0}`")]
    EmptyRef(String),
    #[error("Cookbook name derived from repository `{0}` is empty")]
    EmptyCookbookName(String),
    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),
}
