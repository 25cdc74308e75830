use std::{
    env,
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context};
use home::home_dir;

use crate::{
    git::{fetcher::GitSnapshotFetcher, repository::DEFAULT_MAIN_BRANCH},
    install::{InstallOptions, Installer},
    model::{cookbook::DEFAULT_REF, remote::Protocol},
    resolver::{GithubResolver, HttpRefApi, DEFAULT_API_URL, DEFAULT_GIT_HOST},
    Cookfetch,
};

const DEFAULT_COOKBOOK_PATH: &str = "cookbooks";

#[derive(Default)]
pub struct CookfetchBuilder {
    // Relative cookbook paths are resolved against `root`
    root: Option<PathBuf>,
    cookbook_path: Vec<PathBuf>,
    scratch_directory: Option<PathBuf>,
    main_branch: Option<String>,
    default_ref: Option<String>,

    ssh: bool,
    protocol: Option<Protocol>,
    git_host: Option<String>,
    api_url: Option<String>,
    current_user: Option<String>,
    user_heuristic: Option<bool>,
}

impl CookfetchBuilder {
    /// Base directory for relative cookbook paths.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Cookbook search path. Cookbooks are installed into the first element.
    ///
    /// Defaults to `cookbooks`.
    pub fn cookbook_path(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.cookbook_path = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Where snapshots are staged before being moved into place.
    ///
    /// Defaults to the system temporary directory.
    pub fn scratch_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_directory = Some(path.into());
        self
    }

    /// Name of the branch local work lives on. Defaults to `master`.
    pub fn main_branch(mut self, branch: impl Into<String>) -> Self {
        self.main_branch = Some(branch.into());
        self
    }

    /// Ref installed when the package does not name one. Defaults to `master`.
    pub fn default_ref(mut self, reference: impl Into<String>) -> Self {
        self.default_ref = Some(reference.into());
        self
    }

    /// Always clone over SSH.
    pub fn ssh(mut self, ssh: bool) -> Self {
        self.ssh = ssh;
        self
    }

    /// Transport for clones not done over SSH. `ssh` here has the same effect
    /// as [`CookfetchBuilder::ssh`].
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn git_host(mut self, host: impl Into<String>) -> Self {
        self.git_host = Some(host.into());
        self
    }

    /// Base URL of the hosting API. Defaults to `https://api.github.com`.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Local account name, compared against repository owners to pick SSH for
    /// the user's own repositories.
    pub fn current_user(mut self, user: Option<String>) -> Self {
        self.current_user = user;
        self
    }

    /// Whether an owner equal to the current user implies SSH. Defaults to `true`.
    pub fn user_heuristic(mut self, enabled: bool) -> Self {
        self.user_heuristic = Some(enabled);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Cookfetch> {
        let Self {
            root,
            cookbook_path,
            scratch_directory,
            main_branch,
            default_ref,
            ssh,
            protocol,
            git_host,
            api_url,
            current_user,
            user_heuristic,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir().context("Could not determine the current directory")?,
        };

        let install_root = match cookbook_path.into_iter().next() {
            Some(path) => resolve_path(&root, &path)?,
            None => root.join(DEFAULT_COOKBOOK_PATH),
        };
        let scratch_directory = match scratch_directory {
            Some(path) => resolve_path(&root, &path)?,
            None => env::temp_dir(),
        };

        let resolver = GithubResolver::new(
            HttpRefApi::new()?,
            api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            git_host.unwrap_or_else(|| DEFAULT_GIT_HOST.to_string()),
            protocol.unwrap_or_default(),
            current_user,
            user_heuristic.unwrap_or(true),
        );

        let git_config = git2::Config::open_default()?;
        let fetcher = GitSnapshotFetcher::new(git_config);

        let installer = Installer::new(
            resolver,
            fetcher,
            install_root,
            main_branch.unwrap_or_else(|| DEFAULT_MAIN_BRANCH.to_string()),
            scratch_directory,
        );

        Ok(Cookfetch {
            installer,
            default_ref: default_ref.unwrap_or_else(|| DEFAULT_REF.to_string()),
            options: InstallOptions { use_ssh: ssh },
        })
    }
}

/// Expands a leading `~` and anchors relative paths at `root`.
fn resolve_path(root: &Path, path: &Path) -> anyhow::Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let Some(home) = home_dir() else {
                bail!("Could not find home dir. Please define $HOME env variable.");
            };
            Ok(home.join(components.as_path()))
        }
        _ => Ok(root.join(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn relative_path_is_anchored_at_root() {
        assert_eq!(
            resolve_path(Path::new("/work"), Path::new("cookbooks")).unwrap(),
            PathBuf::from("/work/cookbooks")
        );
    }

    #[test]
    fn absolute_path_is_kept() {
        assert_eq!(
            resolve_path(Path::new("/work"), Path::new("/srv/chef/cookbooks")).unwrap(),
            PathBuf::from("/srv/chef/cookbooks")
        );
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = home_dir().unwrap();
        assert_eq!(
            resolve_path(Path::new("/work"), Path::new("~/chef/cookbooks")).unwrap(),
            home.join("chef/cookbooks")
        );
    }

    #[test]
    fn install_root_is_first_cookbook_path_element() {
        let cookfetch = Cookfetch::builder()
            .root("/work")
            .cookbook_path(["site-cookbooks", "cookbooks"])
            .try_build()
            .unwrap();
        assert_eq!(cookfetch.install_root(), Path::new("/work/site-cookbooks"));
    }

    #[test]
    fn install_root_defaults_to_cookbooks() {
        let cookfetch = Cookfetch::builder().root("/work").try_build().unwrap();
        assert_eq!(cookfetch.install_root(), Path::new("/work/cookbooks"));
    }

    #[test]
    fn invalid_package_is_a_usage_error() {
        let cookfetch = Cookfetch::builder().root("/work").try_build().unwrap();
        let error = cookfetch.install("acme").unwrap_err();
        assert!(
            matches!(error, crate::install::InstallError::Usage(_)),
            "{error:?}"
        );
    }
}
