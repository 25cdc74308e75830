use std::path::Path;

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    AutotagOption, Commit, Config, FetchOptions, Oid, Repository,
};
use log::{debug, info, warn};
use thiserror::Error;

use crate::model::remote::{RefKind, RemoteRef};

use super::credentials::remote_callbacks;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to clone {uri}: {source}")]
    Clone { uri: String, source: git2::Error },
    #[error("Failed to check out {reference}: {source}")]
    Checkout {
        reference: String,
        source: git2::Error,
    },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Produces an unversioned copy of a remote repository at a given ref.
pub trait SnapshotFetcher {
    fn fetch(
        &self,
        clone_uri: &str,
        reference: &RemoteRef,
        scratch_dir: &Path,
    ) -> Result<(), FetchError>;
}

pub struct GitSnapshotFetcher {
    git_config: Config,
}

impl GitSnapshotFetcher {
    pub fn new(git_config: Config) -> Self {
        GitSnapshotFetcher { git_config }
    }

    fn clone_repository(
        &self,
        clone_uri: &str,
        scratch_dir: &Path,
    ) -> Result<Repository, FetchError> {
        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(remote_callbacks(&self.git_config))
            .download_tags(AutotagOption::All);

        RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(clone_uri, scratch_dir)
            .map_err(|source| FetchError::Clone {
                uri: clone_uri.to_string(),
                source,
            })
    }
}

impl SnapshotFetcher for GitSnapshotFetcher {
    fn fetch(
        &self,
        clone_uri: &str,
        reference: &RemoteRef,
        scratch_dir: &Path,
    ) -> Result<(), FetchError> {
        if scratch_dir.exists() {
            debug!("Removing stale scratch directory {}", scratch_dir.display());
            std::fs::remove_dir_all(scratch_dir)?;
        }

        info!("Cloning {} into {}", clone_uri, scratch_dir.display());
        let repo = self.clone_repository(clone_uri, scratch_dir)?;
        let checkout_error = |source| FetchError::Checkout {
            reference: reference.to_string(),
            source,
        };
        let commit = find_commit(&repo, reference).map_err(checkout_error)?;
        let commit_id = commit.id();
        checkout(&repo, &commit).map_err(checkout_error)?;
        debug!("Checked out {} at {}", reference.name, commit_id);

        drop(commit);
        drop(repo);
        std::fs::remove_dir_all(scratch_dir.join(".git"))?;
        Ok(())
    }
}

/// The resolved object, peeled to a commit. Falls back to the ref name when the
/// object is not part of the clone.
fn find_commit<'r>(
    repo: &'r Repository,
    reference: &RemoteRef,
) -> Result<Commit<'r>, git2::Error> {
    let by_sha = Oid::from_str(&reference.sha)
        .and_then(|oid| repo.find_object(oid, None))
        .and_then(|object| object.peel_to_commit());
    match by_sha {
        Ok(commit) => Ok(commit),
        Err(error) => {
            warn!(
                "Object {} is not in the clone ({}), checking out {} by name",
                reference.sha,
                error.message(),
                reference.name
            );
            let refname = match reference.kind {
                RefKind::Branch => format!("refs/remotes/origin/{}", reference.name),
                RefKind::Tag => format!("refs/tags/{}", reference.name),
            };
            repo.revparse_single(&refname)?.peel_to_commit()
        }
    }
}

fn checkout(repo: &Repository, commit: &Commit<'_>) -> Result<(), git2::Error> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(commit.id())
}
