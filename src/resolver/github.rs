use std::time::Duration;

use log::{debug, info, trace};
use reqwest::{header::ACCEPT, Url};
use serde::Deserialize;

use crate::model::{
    cookbook::PackageIdentity,
    remote::{Protocol, RefKind, RemoteRef},
};

use super::{RemoteResolver, ResolveError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GIT_HOST: &str = "github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking GET against the hosting API.
pub trait RefApi {
    fn get(&self, url: &str) -> Result<ApiResponse, ResolveError>;
}

pub struct HttpRefApi {
    client: reqwest::blocking::Client,
}

impl HttpRefApi {
    pub fn new() -> Result<HttpRefApi, ResolveError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("cookfetch/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()?;
        Ok(HttpRefApi { client })
    }
}

impl RefApi for HttpRefApi {
    fn get(&self, url: &str) -> Result<ApiResponse, ResolveError> {
        let transport = |error: reqwest::Error| ResolveError::Transport {
            url: url.to_string(),
            source: Box::new(error),
        };
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(transport)?;
        Ok(ApiResponse { status, body })
    }
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

/// The refs endpoint returns a list when the name is only a prefix of existing refs.
#[derive(Deserialize)]
#[serde(untagged)]
enum RefsResponse {
    Exact(GitRef),
    Prefix(Vec<serde_json::Value>),
}

enum Lookup {
    Found(String),
    Missing,
}

pub struct GithubResolver<A> {
    api: A,
    api_url: String,
    git_host: String,
    protocol: Protocol,
    current_user: Option<String>,
    user_heuristic: bool,
}

impl<A: RefApi> GithubResolver<A> {
    pub fn new(
        api: A,
        api_url: impl Into<String>,
        git_host: impl Into<String>,
        protocol: Protocol,
        current_user: Option<String>,
        user_heuristic: bool,
    ) -> Self {
        GithubResolver {
            api,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            git_host: git_host.into(),
            protocol,
            current_user,
            user_heuristic,
        }
    }

    /// Refs endpoint for the identity, one escaped path segment per name part.
    fn ref_url(&self, identity: &PackageIdentity, kind: RefKind) -> Result<String, ResolveError> {
        let invalid = |source: Box<dyn std::error::Error + Send + Sync>| {
            ResolveError::InvalidApiUrl {
                url: self.api_url.clone(),
                source,
            }
        };
        let mut url = Url::parse(&self.api_url).map_err(|error| invalid(Box::new(error)))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base URL".into()))?
            .pop_if_empty()
            .extend([
                "repos",
                identity.owner.as_str(),
                identity.repo.as_str(),
                "git",
                "refs",
                kind.namespace(),
            ])
            .extend(identity.reference.split('/'));
        Ok(url.into())
    }

    fn lookup(&self, url: &str) -> Result<Lookup, ResolveError> {
        trace!("GET {}", url);
        let response = self.api.get(url)?;
        if !response.is_success() {
            debug!("{} answered with status {}", url, response.status);
            return Ok(Lookup::Missing);
        }
        let parsed = serde_json::from_str::<RefsResponse>(&response.body).map_err(|source| {
            ResolveError::MalformedResponse {
                url: url.to_string(),
                source,
            }
        })?;
        match parsed {
            RefsResponse::Exact(git_ref) => Ok(Lookup::Found(git_ref.object.sha)),
            RefsResponse::Prefix(candidates) => {
                debug!(
                    "{} matched {} refs by prefix only, treating as missing",
                    url,
                    candidates.len()
                );
                Ok(Lookup::Missing)
            }
        }
    }

    /// Whether the SSH transport should be used for this owner. The owner matching
    /// the local account name is a guess that the repository is the user's own fork.
    fn wants_ssh(&self, owner: &str, use_ssh: bool) -> bool {
        use_ssh
            || self.protocol == Protocol::Ssh
            || (self.user_heuristic && self.current_user.as_deref() == Some(owner))
    }
}

impl<A: RefApi> RemoteResolver for GithubResolver<A> {
    fn resolve(&self, identity: &PackageIdentity) -> Result<RemoteRef, ResolveError> {
        for kind in [RefKind::Branch, RefKind::Tag] {
            let url = self.ref_url(identity, kind)?;
            if let Lookup::Found(sha) = self.lookup(&url)? {
                info!(
                    "Resolved {} {} of {} to {}",
                    kind,
                    identity.reference,
                    identity.repository_path(),
                    sha
                );
                return Ok(RemoteRef {
                    name: identity.reference.clone(),
                    kind,
                    sha,
                });
            }
        }
        Err(ResolveError::RefNotFound {
            repository: identity.repository_path(),
            reference: identity.reference.clone(),
        })
    }

    fn clone_uri(&self, identity: &PackageIdentity, use_ssh: bool) -> String {
        if self.wants_ssh(&identity.owner, use_ssh) {
            format!(
                "git@{}:{}/{}.git",
                self.git_host, identity.owner, identity.repo
            )
        } else {
            format!(
                "{}://{}/{}/{}.git",
                self.protocol, self.git_host, identity.owner, identity.repo
            )
        }
    }
}
