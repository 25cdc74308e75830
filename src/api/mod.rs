use std::path::Path;

use log::debug;

use crate::{
    git::fetcher::GitSnapshotFetcher,
    install::{InstallError, InstallOptions, InstallOutcome, Installer},
    model::cookbook::PackageIdentity,
    resolver::{GithubResolver, HttpRefApi},
};

mod builder;

pub use builder::CookfetchBuilder;

pub struct Cookfetch {
    installer: Installer<GithubResolver<HttpRefApi>, GitSnapshotFetcher>,
    default_ref: String,
    options: InstallOptions,
}

impl Cookfetch {
    pub fn builder() -> CookfetchBuilder {
        CookfetchBuilder::default()
    }

    /// Directory holding the vendored cookbooks and their repository.
    pub fn install_root(&self) -> &Path {
        self.installer.install_root()
    }

    /// Installs or updates the cookbook named by `OWNER/REPO[/REF]`
    pub fn install(&self, package: &str) -> Result<InstallOutcome, InstallError> {
        let identity = PackageIdentity::parse(package, &self.default_ref)?;
        debug!("Parsed {} as {:?}", package, identity);
        self.installer.install(&identity, &self.options)
    }
}
