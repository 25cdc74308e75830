use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    git::{
        fetcher::{FetchError, SnapshotFetcher},
        repository::{RepoError, VendorRepository},
    },
    model::{cookbook::PackageIdentity, remote::RemoteRef, ParseError},
    resolver::{RemoteResolver, ResolveError},
    scratch::ScratchClone,
};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Usage(#[from] ParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error("Failed to move {package} into {path}: {source}")]
    Stage {
        package: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// New upstream content was merged into the main line.
    Installed { package: String, sha: String },
    /// The snapshot matched what the main line already holds.
    UpToDate { package: String, sha: String },
    /// The update conflicts with local changes. The repository is back on the
    /// main line and the vendor branch holds the import.
    Conflict {
        package: String,
        branch: String,
        paths: Vec<String>,
    },
}

impl InstallOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            InstallOutcome::Installed { .. } | InstallOutcome::UpToDate { .. } => 0,
            InstallOutcome::Conflict { .. } => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub use_ssh: bool,
}

/// Drives one cookbook through resolve, fetch, vendor import and merge.
pub struct Installer<R, F> {
    resolver: R,
    fetcher: F,
    install_root: PathBuf,
    main_branch: String,
    scratch_base: PathBuf,
}

impl<R: RemoteResolver, F: SnapshotFetcher> Installer<R, F> {
    pub fn new(
        resolver: R,
        fetcher: F,
        install_root: impl Into<PathBuf>,
        main_branch: impl Into<String>,
        scratch_base: impl Into<PathBuf>,
    ) -> Self {
        Installer {
            resolver,
            fetcher,
            install_root: install_root.into(),
            main_branch: main_branch.into(),
            scratch_base: scratch_base.into(),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn install(
        &self,
        identity: &PackageIdentity,
        options: &InstallOptions,
    ) -> Result<InstallOutcome, InstallError> {
        let remote_ref = self.resolver.resolve(identity)?;
        let clone_uri = self.resolver.clone_uri(identity, options.use_ssh);
        info!(
            "Installing {} from {} to {}",
            identity.local_name,
            clone_uri,
            self.install_root.display()
        );

        self.ensure_install_root()?;
        let mut repo = VendorRepository::new(&self.install_root, &self.main_branch);
        repo.sanity_check()?;
        repo.reset_to_default_state()?;

        let result = self.import_and_merge(&mut repo, identity, &remote_ref, &clone_uri);
        if result.is_err() {
            if let Err(error) = repo.reset_to_default_state() {
                warn!("Could not reset {}: {}", self.install_root.display(), error);
            }
        }
        result
    }

    fn import_and_merge(
        &self,
        repo: &mut VendorRepository,
        identity: &PackageIdentity,
        remote_ref: &RemoteRef,
        clone_uri: &str,
    ) -> Result<InstallOutcome, InstallError> {
        let package = identity.local_name.as_str();
        repo.prepare_to_import(package)?;

        let scratch = ScratchClone::new(&self.scratch_base, package);
        self.fetcher.fetch(clone_uri, remote_ref, scratch.path())?;

        // The vendor checkout already cleared this path; the working tree is
        // cleared again right before the snapshot lands.
        let target = repo.package_path(package)?;
        clear_existing_files(&target)?;
        scratch
            .move_into(&target)
            .map_err(|source| InstallError::Stage {
                package: package.to_string(),
                path: target.clone(),
                source,
            })?;

        let updated =
            repo.finalize_updates_from_remote(package, &identity.to_string(), &remote_ref.sha)?;
        repo.reset_to_default_state()?;
        if !updated {
            info!("{} is already up to date at {}", package, remote_ref.sha);
            return Ok(InstallOutcome::UpToDate {
                package: package.to_string(),
                sha: remote_ref.sha.clone(),
            });
        }

        self.ensure_install_root()?;
        match repo.merge_updates_from(package, &remote_ref.sha) {
            Ok(outcome) => {
                debug!("Merge of {} finished with {:?}", package, outcome);
                Ok(InstallOutcome::Installed {
                    package: package.to_string(),
                    sha: remote_ref.sha.clone(),
                })
            }
            Err(RepoError::MergeConflict { branch, paths }) => {
                repo.reset_to_default_state()?;
                Ok(InstallOutcome::Conflict {
                    package: package.to_string(),
                    branch,
                    paths,
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    fn ensure_install_root(&self) -> std::io::Result<()> {
        if !self.install_root.exists() {
            info!("Creating {}", self.install_root.display());
            std::fs::create_dir_all(&self.install_root)?;
        }
        Ok(())
    }
}

fn clear_existing_files(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        info!("Removing pre-existing version.");
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}
