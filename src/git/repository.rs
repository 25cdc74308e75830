use std::{
    fmt::Display,
    path::{Component, Path, PathBuf},
};

use git2::{
    build::CheckoutBuilder, BranchType, Commit, ErrorCode, IndexAddOption, Oid, Repository,
    RepositoryInitOptions, RepositoryState, ResetType, Signature, Status, StatusOptions,
};
use log::{debug, info, trace};
use thiserror::Error;

pub const VENDOR_BRANCH_PREFIX: &str = "chef-vendor-";
pub const IMPORT_TAG_PREFIX: &str = "cookbook-site-imported-";
pub const DEFAULT_MAIN_BRANCH: &str = "master";

const FALLBACK_NAME: &str = "cookfetch";
const FALLBACK_EMAIL: &str = "cookfetch@localhost";

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("The cookbook repo path {path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("The cookbook repo {path} is not a git repository")]
    NotARepository { path: PathBuf },
    #[error("The cookbook repo {path} is a bare repository")]
    Bare { path: PathBuf },
    #[error("The cookbook repo {path} belongs to a working copy rooted at {workdir}")]
    Foreign { path: PathBuf, workdir: PathBuf },
    #[error("The default branch '{branch}' does not exist in {path}")]
    MissingMainLine { path: PathBuf, branch: String },
    #[error("A {operation} is in progress in {path}")]
    OperationInProgress { path: PathBuf, operation: String },
    #[error("You have uncommitted changes to your cookbook repo ({path}): {}", .entries.join(", "))]
    Dirty { path: PathBuf, entries: Vec<String> },
    #[error("Invalid cookbook name `{0}`")]
    InvalidPackageName(String),
    #[error("Cannot {operation} while the repository is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: RepoState,
    },
    #[error("HEAD is not on the default branch '{branch}'")]
    NotOnMainLine { branch: String },
    #[error("Merging {branch} conflicts with local changes in: {}", .paths.join(", "))]
    MergeConflict { branch: String, paths: Vec<String> },
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Where the repository is in the import protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    Uninitialized,
    /// On the main line with nothing pending.
    Clean,
    ImportPrepared {
        package: String,
    },
    ImportFinalized {
        package: String,
    },
    Merged,
    /// A merge was abandoned; the working tree is untouched.
    RolledBack,
}

impl Display for RepoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoState::Uninitialized => f.write_str("uninitialized"),
            RepoState::Clean => f.write_str("clean"),
            RepoState::ImportPrepared { package } => write!(f, "preparing an import of {package}"),
            RepoState::ImportFinalized { package } => write!(f, "holding an import of {package}"),
            RepoState::Merged => f.write_str("merged"),
            RepoState::RolledBack => f.write_str("rolled back"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The vendor branch was already reachable from the main line.
    UpToDate,
    FastForward(Oid),
    Merged(Oid),
}

pub fn vendor_branch(package: &str) -> String {
    format!("{VENDOR_BRANCH_PREFIX}{package}")
}

pub fn import_tag(package: &str, sha: &str) -> String {
    format!("{IMPORT_TAG_PREFIX}{package}-{sha}")
}

/// The git working copy holding all installed cookbooks, with one pristine
/// vendor branch per cookbook.
pub struct VendorRepository {
    root: PathBuf,
    main_branch: String,
    repo: Option<Repository>,
    state: RepoState,
}

impl VendorRepository {
    pub fn new(root: impl Into<PathBuf>, main_branch: impl Into<String>) -> Self {
        VendorRepository {
            root: root.into(),
            main_branch: main_branch.into(),
            repo: None,
            state: RepoState::Uninitialized,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &RepoState {
        &self.state
    }

    /// Location of a cookbook inside the working tree.
    pub fn package_path(&self, package: &str) -> Result<PathBuf, RepoError> {
        let mut components = Path::new(package).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if package != ".git" => Ok(self.root.join(package)),
            _ => Err(RepoError::InvalidPackageName(package.to_string())),
        }
    }

    /// Opens the working copy, initializing it when the directory is absent or
    /// empty, and refuses anything that is not a clean, non-bare repository
    /// rooted at the install root.
    pub fn sanity_check(&mut self) -> Result<(), RepoError> {
        self.expect_state("check the repository", |state| {
            matches!(state, RepoState::Uninitialized)
        })?;

        if let Some(workdir) = self.enclosing_workdir()? {
            let rooted_here =
                self.root.exists() && workdir.canonicalize()? == self.root.canonicalize()?;
            if !rooted_here {
                return Err(RepoError::Foreign {
                    path: self.root.clone(),
                    workdir,
                });
            }
        }

        let repo = if !self.root.exists() || is_empty_dir(&self.root)? {
            self.initialize()?
        } else if !self.root.is_dir() {
            return Err(RepoError::NotADirectory {
                path: self.root.clone(),
            });
        } else {
            self.open_existing()?
        };

        self.repo = Some(repo);
        self.state = RepoState::Clean;
        Ok(())
    }

    /// Drops anything uncommitted and checks out the main line. Valid from every
    /// state once the repository is open.
    pub fn reset_to_default_state(&mut self) -> Result<(), RepoError> {
        let repo = self.git("reset the repository")?;
        info!("Checking out the {} branch.", self.main_branch);
        repo.cleanup_state()?;
        let main_ref = branch_ref(&self.main_branch);
        force_checkout(repo, &main_ref)?;
        self.state = RepoState::Clean;
        Ok(())
    }

    /// Switches to the cookbook's vendor branch, creating it from the main line
    /// if needed, and clears the cookbook's directory.
    pub fn prepare_to_import(&mut self, package: &str) -> Result<(), RepoError> {
        self.expect_state("prepare an import", |state| {
            matches!(state, RepoState::Clean)
        })?;
        let package_path = self.package_path(package)?;
        let branch = vendor_branch(package);
        let repo = self.git("prepare an import")?;

        match repo.find_branch(&branch, BranchType::Local) {
            Ok(_) => info!("Pristine copy branch ({}) exists, switching to it.", branch),
            Err(error) if error.code() == ErrorCode::NotFound => {
                info!("Creating pristine copy branch {}", branch);
                let main = main_line_tip(repo, &self.main_branch)?;
                repo.branch(&branch, &main, false)?;
            }
            Err(error) => return Err(error.into()),
        }
        force_checkout(repo, &branch_ref(&branch))?;

        remove_path(&package_path)?;
        self.state = RepoState::ImportPrepared {
            package: package.to_string(),
        };
        Ok(())
    }

    /// Commits the cookbook directory on its vendor branch and tags the import.
    ///
    /// Returns whether the vendor branch now holds anything the main line does
    /// not already contain.
    pub fn finalize_updates_from_remote(
        &mut self,
        package: &str,
        source_ref: &str,
        sha: &str,
    ) -> Result<bool, RepoError> {
        self.expect_state("finalize an import", |state| {
            matches!(state, RepoState::ImportPrepared { package: prepared } if prepared == package)
        })?;
        let branch = vendor_branch(package);
        let vendor_ref = branch_ref(&branch);
        let repo = self.git("finalize an import")?;

        let mut index = repo.index()?;
        index.add_all([package].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all([package].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let vendor_tip = repo.revparse_single(&vendor_ref)?.peel_to_commit()?;
        let imported = if vendor_tip.tree_id() == tree_id {
            info!("No changes made to {}", package);
            vendor_tip.id()
        } else {
            let tree = repo.find_tree(tree_id)?;
            let signature = signature(repo)?;
            let message = format!("Import {source_ref} version {sha}");
            let commit_id = repo.commit(
                Some(&vendor_ref),
                &signature,
                &signature,
                &message,
                &tree,
                &[&vendor_tip],
            )?;
            debug!("Committed {} on {}", commit_id, branch);

            let tag = import_tag(package, sha);
            info!("Creating tag {}", tag);
            let commit = repo.find_object(commit_id, None)?;
            repo.tag(
                &tag,
                &commit,
                &signature,
                &format!("Imported {source_ref} at {sha}"),
                true,
            )?;
            commit_id
        };
        drop(vendor_tip);

        let main = main_line_tip(repo, &self.main_branch)?.id();
        let has_updates = imported != main && !repo.graph_descendant_of(main, imported)?;
        trace!(
            "{} at {}, main line at {}, updates pending: {}",
            branch,
            imported,
            main,
            has_updates
        );

        self.state = RepoState::ImportFinalized {
            package: package.to_string(),
        };
        Ok(has_updates)
    }

    /// Merges the cookbook's vendor branch into the main line.
    ///
    /// The merge happens in memory; on conflict nothing is written, the state
    /// becomes [`RepoState::RolledBack`] and the vendor branch keeps the import
    /// for a manual merge.
    pub fn merge_updates_from(
        &mut self,
        package: &str,
        sha: &str,
    ) -> Result<MergeOutcome, RepoError> {
        self.expect_state("merge updates", |state| matches!(state, RepoState::Clean))?;
        let branch = vendor_branch(package);
        let repo = self.git("merge updates")?;

        let result = merge_into_main_line(repo, &self.main_branch, &branch);
        match &result {
            Ok(_) => {
                info!("Cookbook {} version {} successfully installed", package, sha);
                self.state = RepoState::Merged;
            }
            Err(RepoError::MergeConflict { .. }) => self.state = RepoState::RolledBack,
            Err(_) => {}
        }
        result
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: impl Fn(&RepoState) -> bool,
    ) -> Result<(), RepoError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(RepoError::InvalidTransition {
                operation,
                state: self.state.clone(),
            })
        }
    }

    fn git(&self, operation: &'static str) -> Result<&Repository, RepoError> {
        self.repo.as_ref().ok_or_else(|| RepoError::InvalidTransition {
            operation,
            state: self.state.clone(),
        })
    }

    /// Working directory of the repository containing the install root, if any,
    /// searching from the closest existing directory upwards.
    fn enclosing_workdir(&self) -> Result<Option<PathBuf>, RepoError> {
        let Some(start) = self.root.ancestors().find(|path| path.is_dir()) else {
            return Ok(None);
        };
        match Repository::discover(start) {
            Ok(repo) => Ok(repo.workdir().map(Path::to_path_buf)),
            Err(error) if error.code() == ErrorCode::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn initialize(&self) -> Result<Repository, RepoError> {
        info!("Initializing a cookbook repository at {}", self.root.display());
        std::fs::create_dir_all(&self.root)?;
        let mut options = RepositoryInitOptions::new();
        options.initial_head(&self.main_branch);
        let repo = Repository::init_opts(&self.root, &options)?;
        create_root_commit(&repo)?;
        Ok(repo)
    }

    fn open_existing(&self) -> Result<Repository, RepoError> {
        trace!("Opening existing repository at {}", self.root.display());
        let repo = Repository::open(&self.root).map_err(|error| match error.code() {
            ErrorCode::NotFound => RepoError::NotARepository {
                path: self.root.clone(),
            },
            _ => error.into(),
        })?;

        let workdir = match repo.workdir() {
            Some(workdir) => workdir.to_path_buf(),
            None => {
                return Err(RepoError::Bare {
                    path: self.root.clone(),
                })
            }
        };
        if workdir.canonicalize()? != self.root.canonicalize()? {
            return Err(RepoError::Foreign {
                path: self.root.clone(),
                workdir,
            });
        }

        let repo_state = repo.state();
        if repo_state != RepositoryState::Clean {
            return Err(RepoError::OperationInProgress {
                path: self.root.clone(),
                operation: format!("{repo_state:?}").to_lowercase(),
            });
        }

        let entries = dirty_entries(&repo)?;
        if !entries.is_empty() {
            return Err(RepoError::Dirty {
                path: self.root.clone(),
                entries,
            });
        }

        if repo.is_empty()? {
            debug!("Repository has no commits yet, creating the {} branch", self.main_branch);
            repo.set_head(&branch_ref(&self.main_branch))?;
            create_root_commit(&repo)?;
        } else if let Err(error) = repo.find_branch(&self.main_branch, BranchType::Local) {
            return Err(match error.code() {
                ErrorCode::NotFound => RepoError::MissingMainLine {
                    path: self.root.clone(),
                    branch: self.main_branch.clone(),
                },
                _ => error.into(),
            });
        }

        Ok(repo)
    }
}

fn merge_into_main_line(
    repo: &Repository,
    main_branch: &str,
    branch: &str,
) -> Result<MergeOutcome, RepoError> {
    let head = repo.head()?;
    if head.name() != Some(branch_ref(main_branch).as_str()) {
        return Err(RepoError::NotOnMainLine {
            branch: main_branch.to_string(),
        });
    }
    let main = main_line_tip(repo, main_branch)?;
    let vendor = repo.revparse_single(&branch_ref(branch))?.peel_to_commit()?;

    if main.id() == vendor.id() || repo.graph_descendant_of(main.id(), vendor.id())? {
        debug!("{} is already merged into {}", branch, main_branch);
        return Ok(MergeOutcome::UpToDate);
    }

    if repo.graph_descendant_of(vendor.id(), main.id())? {
        debug!("Fast-forwarding {} to {}", main_branch, branch);
        advance_main_line(repo, main_branch, &vendor, &format!("merge {branch}: Fast-forward"))?;
        return Ok(MergeOutcome::FastForward(vendor.id()));
    }

    let mut index = repo.merge_commits(&main, &vendor, None)?;
    if index.has_conflicts() {
        let mut paths = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                paths.push(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        return Err(RepoError::MergeConflict {
            branch: branch.to_string(),
            paths,
        });
    }

    let tree = repo.find_tree(index.write_tree_to(repo)?)?;
    let signature = signature(repo)?;
    let message = format!("Merge branch '{branch}'");
    let merge_id = repo.commit(None, &signature, &signature, &message, &tree, &[&main, &vendor])?;
    let merge = repo.find_commit(merge_id)?;
    advance_main_line(repo, main_branch, &merge, &message)?;
    Ok(MergeOutcome::Merged(merge_id))
}

/// Moves the checked out main line to `commit`, updating working tree and index.
fn advance_main_line(
    repo: &Repository,
    main_branch: &str,
    commit: &Commit<'_>,
    log_message: &str,
) -> Result<(), git2::Error> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.reference(&branch_ref(main_branch), commit.id(), true, log_message)?;
    let mut index = repo.index()?;
    index.read_tree(&commit.tree()?)?;
    index.write()
}

/// Checks out `refname` discarding staged, modified and untracked files.
fn force_checkout(repo: &Repository, refname: &str) -> Result<(), git2::Error> {
    // Unstaged leftovers count as untracked below and get removed.
    if let Ok(head) = repo.head().and_then(|head| head.peel_to_commit()) {
        repo.reset(head.as_object(), ResetType::Mixed, None)?;
    }
    let target = repo.revparse_single(refname)?.peel_to_commit()?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.checkout_tree(target.as_object(), Some(&mut checkout))?;
    repo.set_head(refname)?;
    let mut index = repo.index()?;
    index.read_tree(&target.tree()?)?;
    index.write()
}

fn main_line_tip<'r>(repo: &'r Repository, main_branch: &str) -> Result<Commit<'r>, git2::Error> {
    repo.find_branch(main_branch, BranchType::Local)?
        .get()
        .peel_to_commit()
}

fn create_root_commit(repo: &Repository) -> Result<Oid, git2::Error> {
    let tree_id = repo.index()?.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = signature(repo)?;
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        "Initialize cookbook repository",
        &tree,
        &[],
    )
}

fn signature(repo: &Repository) -> Result<Signature<'static>, git2::Error> {
    repo.signature()
        .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
}

fn dirty_entries(repo: &Repository) -> Result<Vec<String>, git2::Error> {
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut options))?;
    Ok(statuses
        .iter()
        .filter(|entry| entry.status() != Status::CURRENT && !entry.status().is_ignored())
        .filter_map(|entry| entry.path().map(str::to_string))
        .collect())
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
    Ok(path.is_dir() && path.read_dir()?.next().is_none())
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        debug!("Removing {}", path.display());
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        Ok(())
    }
}
