use log::{debug, warn};

use crate::{
    install::{InstallError, InstallOutcome},
    Cookfetch,
};

/// Handler to install command
pub fn do_install(cookfetch: &Cookfetch, package: &str) -> Result<InstallOutcome, InstallError> {
    let outcome = cookfetch.install(package)?;
    match &outcome {
        InstallOutcome::Installed { package, sha } => {
            debug!("Merged {} at {}", package, sha)
        }
        InstallOutcome::UpToDate { package, sha } => {
            debug!("Nothing to merge for {} at {}", package, sha)
        }
        InstallOutcome::Conflict {
            package,
            branch,
            paths,
        } => {
            warn!("Merge of {} conflicts in: {}", package, paths.join(", "));
            warn!(
                "You have merge conflicts - please resolve manually. Run `git merge {}` in {}",
                branch,
                cookfetch.install_root().display()
            );
        }
    }
    Ok(outcome)
}
