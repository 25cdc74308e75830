mod github;

use thiserror::Error;

use crate::model::{cookbook::PackageIdentity, remote::RemoteRef};

pub use github::{
    ApiResponse, GithubResolver, HttpRefApi, RefApi, DEFAULT_API_URL, DEFAULT_GIT_HOST,
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Could not find branch or tag {reference} in {repository}")]
    RefNotFound {
        repository: String,
        reference: String,
    },
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Invalid API URL {url}: {source}")]
    InvalidApiUrl {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Unexpected response from {url}: {source}")]
    MalformedResponse {
        url: String,
        source: serde_json::Error,
    },
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Turns a cookbook identity into something the fetcher can clone.
pub trait RemoteResolver {
    /// Resolves the identity's ref, preferring a branch over a tag of the same name.
    fn resolve(&self, identity: &PackageIdentity) -> Result<RemoteRef, ResolveError>;

    fn clone_uri(&self, identity: &PackageIdentity, use_ssh: bool) -> String;
}
