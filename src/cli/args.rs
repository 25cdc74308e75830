use std::path::PathBuf;

use clap::Parser;

use crate::config::split_path_list;

/// Installs Chef cookbooks from GitHub into a git-tracked cookbook directory.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Installs or updates a cookbook, keeping upstream imports on a vendor branch
    Install {
        /// Cookbook to install, as OWNER/REPO or OWNER/REPO/REF
        package: String,
        /// Clone over SSH instead of anonymously
        #[clap(short = 'S', long)]
        ssh: bool,
        /// Colon-separated cookbook path; cookbooks are installed into the first element
        #[clap(short = 'o', long, value_parser = parse_path_list)]
        cookbook_path: Option<PathList>,
        /// Ref to install when the package does not name one
        #[clap(short = 'B', long)]
        branch: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathList(pub Vec<PathBuf>);

fn parse_path_list(value: &str) -> Result<PathList, String> {
    let paths = split_path_list(value);
    if paths.is_empty() {
        return Err("cookbook path must name at least one directory".to_string());
    }
    Ok(PathList(paths))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_install() {
        let args = CliArgs::try_parse_from([
            "cookfetch",
            "install",
            "acme/chef-widget/v1.2.0",
            "-S",
            "-o",
            "/srv/cookbooks:site-cookbooks",
        ])
        .unwrap();
        let Command::Install {
            package,
            ssh,
            cookbook_path,
            branch,
        } = args.cmd;
        assert_eq!(package, "acme/chef-widget/v1.2.0");
        assert!(ssh);
        assert_eq!(
            cookbook_path,
            Some(PathList(vec![
                PathBuf::from("/srv/cookbooks"),
                PathBuf::from("site-cookbooks")
            ]))
        );
        assert_eq!(branch, None);
    }

    #[test]
    fn parse_long_flags() {
        let args = CliArgs::try_parse_from([
            "cookfetch",
            "install",
            "acme/widget",
            "--ssh",
            "--branch",
            "stable",
        ])
        .unwrap();
        let Command::Install { ssh, branch, .. } = args.cmd;
        assert!(ssh);
        assert_eq!(branch.as_deref(), Some("stable"));
    }

    #[test]
    fn missing_package_is_rejected() {
        assert!(CliArgs::try_parse_from(["cookfetch", "install"]).is_err());
    }

    #[test]
    fn extra_positional_is_rejected() {
        assert!(CliArgs::try_parse_from(["cookfetch", "install", "acme/widget", "extra"]).is_err());
    }

    #[test]
    fn empty_cookbook_path_is_rejected() {
        assert!(
            CliArgs::try_parse_from(["cookfetch", "install", "acme/widget", "-o", ":"]).is_err()
        );
    }
}
