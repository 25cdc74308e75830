use std::{collections::HashMap, env, path::PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use home::home_dir;
use log::debug;
use serde::Deserialize;

use crate::model::remote::Protocol;

const CONFIG_FILE_VARIABLE: &str = "COOKFETCH_CONFIG";

pub struct CookfetchConfig {
    pub cookbook_path: Option<Vec<PathBuf>>,
    pub use_ssh: bool,
    pub protocol: Option<Protocol>,
    pub git_host: Option<String>,
    pub default_ref: Option<String>,
    pub api_url: Option<String>,
    pub main_branch: Option<String>,
    pub user_name: Option<String>,
    pub user_heuristic: Option<bool>,
}

impl CookfetchConfig {
    pub fn load() -> anyhow::Result<Self> {
        let raw_config = RawConfig::load(None, default_config_file())?;

        Ok(Self {
            cookbook_path: raw_config.cookbook.path.map(|path| split_path_list(&path)),
            use_ssh: raw_config.git.ssh.unwrap_or(false),
            protocol: raw_config.git.protocol,
            git_host: raw_config.git.host,
            default_ref: raw_config.git.r#ref,
            api_url: raw_config.github.api,
            main_branch: raw_config.repo.branch,
            user_name: raw_config.user.name,
            user_heuristic: raw_config.user.heuristic,
        })
    }
}

/// Splits a colon-separated search path, skipping empty elements.
pub fn split_path_list(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|element| !element.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// `$COOKFETCH_CONFIG`, else `$HOME/.cookfetch/config.toml`.
fn default_config_file() -> Option<PathBuf> {
    env::var_os(CONFIG_FILE_VARIABLE)
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(".cookfetch/config.toml")))
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cookbook: CookbookConfig,
    #[serde(default)]
    git: GitConfig,
    #[serde(default)]
    github: GithubConfig,
    #[serde(default)]
    repo: RepoConfig,
    #[serde(default)]
    user: UserConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CookbookConfig {
    path: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GitConfig {
    ssh: Option<bool>,
    protocol: Option<Protocol>,
    host: Option<String>,
    r#ref: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct GithubConfig {
    api: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RepoConfig {
    branch: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct UserConfig {
    name: Option<String>,
    heuristic: Option<bool>,
}

impl RawConfig {
    fn load(
        env: Option<HashMap<String, String>>,
        file: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            debug!("Reading configuration from {} if present", file.display());
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("COOKFETCH")
                    .separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(Some(env), None).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            (
                "COOKFETCH_COOKBOOK_PATH".to_owned(),
                "/srv/cookbooks:site-cookbooks".to_owned(),
            ),
            ("COOKFETCH_GIT_PROTOCOL".to_owned(), "ssh".to_owned()),
            ("COOKFETCH_GIT_SSH".to_owned(), "true".to_owned()),
            ("COOKFETCH_GITHUB_API".to_owned(), "http://localhost:8080".to_owned()),
            ("COOKFETCH_USER_HEURISTIC".to_owned(), "false".to_owned()),
        ]);
        let config = RawConfig::load(Some(env), None).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cookbook: CookbookConfig {
                    path: Some("/srv/cookbooks:site-cookbooks".to_owned())
                },
                git: GitConfig {
                    ssh: Some(true),
                    protocol: Some(Protocol::Ssh),
                    host: None,
                    r#ref: None,
                },
                github: GithubConfig {
                    api: Some("http://localhost:8080".to_owned())
                },
                repo: RepoConfig::default(),
                user: UserConfig {
                    name: None,
                    heuristic: Some(false)
                },
            }
        )
    }

    #[test]
    fn load_file_overridden_by_environment() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "[repo]\nbranch = \"main\"\n\n[git]\nref = \"develop\"\nhost = \"git.example.com\"\n",
        )
        .unwrap();
        let env = HashMap::from([("COOKFETCH_REPO_BRANCH".to_owned(), "trunk".to_owned())]);

        let config = RawConfig::load(Some(env), Some(file)).unwrap();

        assert_eq!(config.repo.branch.as_deref(), Some("trunk"));
        assert_eq!(config.git.r#ref.as_deref(), Some("develop"));
        assert_eq!(config.git.host.as_deref(), Some("git.example.com"));
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = tempdir().unwrap();
        let config = RawConfig::load(
            Some(HashMap::new()),
            Some(dir.path().join("absent.toml")),
        )
        .unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_protocol_ignores_case() {
        let env = HashMap::from([("COOKFETCH_GIT_PROTOCOL".to_owned(), "Git".to_owned())]);
        let config = RawConfig::load(Some(env), None).unwrap();
        assert_eq!(config.git.protocol, Some(Protocol::Git));
    }

    #[test]
    fn load_rejects_unknown_protocol() {
        let env = HashMap::from([("COOKFETCH_GIT_PROTOCOL".to_owned(), "ftp".to_owned())]);
        let error = RawConfig::load(Some(env), None).unwrap_err();
        assert!(error.to_string().contains("ftp"), "{error}");
    }

    #[test]
    fn split_path_list_skips_empty_elements() {
        assert_eq!(
            split_path_list("cookbooks::/srv/chef:"),
            vec![PathBuf::from("cookbooks"), PathBuf::from("/srv/chef")]
        );
    }
}
