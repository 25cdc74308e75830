use std::{fmt::Display, sync::OnceLock};

use regex_lite::{Captures, Regex};

use crate::model::ParseError;

pub const DEFAULT_REF: &str = "master";

/// A cookbook to install, parsed from `OWNER/REPO[/REF]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub owner: String,
    pub repo: String,
    pub reference: String,
    pub local_name: String,
}

impl PackageIdentity {
    /// Parses `OWNER/REPO[/REF]`. Everything after the second `/` is the ref,
    /// so refs such as `feature/x` survive intact.
    pub fn parse(input: &str, default_ref: &str) -> Result<PackageIdentity, ParseError> {
        let mut parts = input.splitn(3, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        if owner.is_empty() || repo.is_empty() {
            return Err(ParseError::MissingComponent(input.to_string()));
        }

        let reference = match parts.next() {
            Some("") => return Err(ParseError::EmptyRef(input.to_string())),
            Some(reference) => reference,
            None if default_ref.is_empty() => return Err(ParseError::EmptyRef(input.to_string())),
            None => default_ref,
        };

        let local_name = local_name(repo);
        if local_name.is_empty() {
            return Err(ParseError::EmptyCookbookName(repo.to_string()));
        }

        Ok(PackageIdentity {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference: reference.to_string(),
            local_name,
        })
    }

    /// `owner/repo`, the path of the repository on the forge.
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl Display for PackageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.reference)
    }
}

/// Strips the decorative `chef` and `cookbook` affixes from a repository name.
///
/// `chef` directly followed by `-client`, `-server` or `_handler` is part of the
/// real name and stays. Stripping runs to a fixpoint, so the result is stable
/// under repeated application.
pub fn local_name(repo: &str) -> String {
    let mut name = repo.to_string();
    loop {
        let stripped = strip_affixes_once(&name);
        if stripped == name {
            return name;
        }
        name = stripped;
    }
}

fn strip_affixes_once(name: &str) -> String {
    let without_chef = chef_affix().replace_all(name, |caps: &Captures| {
        if caps.name("keep").is_some() {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    cookbook_affix().replace_all(&without_chef, "").into_owned()
}

fn chef_affix() -> &'static Regex {
    static CHEF_AFFIX: OnceLock<Regex> = OnceLock::new();
    CHEF_AFFIX.get_or_init(|| {
        Regex::new(r"[_-]?chef(?:(?P<keep>-client|-server|_handler)|[-_]?)")
            .expect("chef affix pattern is valid")
    })
}

fn cookbook_affix() -> &'static Regex {
    static COOKBOOK_AFFIX: OnceLock<Regex> = OnceLock::new();
    COOKBOOK_AFFIX
        .get_or_init(|| Regex::new(r"[_-]?cookbook[-_]?").expect("cookbook affix pattern is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_owner_and_repo_with_default_ref() {
        let identity = PackageIdentity::parse("acme/chef-widget", DEFAULT_REF).unwrap();
        assert_eq!(
            identity,
            PackageIdentity {
                owner: "acme".to_string(),
                repo: "chef-widget".to_string(),
                reference: "master".to_string(),
                local_name: "widget".to_string(),
            }
        );
        assert_eq!(identity.repository_path(), "acme/chef-widget");
        assert_eq!(identity.to_string(), "acme/chef-widget@master");
    }

    #[test]
    fn parse_explicit_ref_overrides_default() {
        let identity = PackageIdentity::parse("jnewland/chef_ipmi/v1.2.0", "develop").unwrap();
        assert_eq!(identity.reference, "v1.2.0");
        assert_eq!(identity.local_name, "ipmi");
    }

    #[test]
    fn parse_ref_with_slashes() {
        let identity = PackageIdentity::parse("acme/widget/feature/new-recipe", "master").unwrap();
        assert_eq!(identity.repo, "widget");
        assert_eq!(identity.reference, "feature/new-recipe");
    }

    #[test]
    fn parse_rejects_missing_components() {
        for input in ["", "acme", "acme/", "/widget"] {
            assert_eq!(
                PackageIdentity::parse(input, DEFAULT_REF),
                Err(ParseError::MissingComponent(input.to_string())),
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn parse_rejects_empty_ref() {
        assert_eq!(
            PackageIdentity::parse("acme/widget/", DEFAULT_REF),
            Err(ParseError::EmptyRef("acme/widget/".to_string()))
        );
    }

    #[test]
    fn parse_rejects_names_that_strip_to_nothing() {
        assert_eq!(
            PackageIdentity::parse("acme/chef-cookbook", DEFAULT_REF),
            Err(ParseError::EmptyCookbookName("chef-cookbook".to_string()))
        );
    }

    #[test]
    fn strips_decorative_affixes() {
        let cases = [
            ("chef-widget", "widget"),
            ("widget-cookbook", "widget"),
            ("chef_ipmi", "ipmi"),
            ("ipmi_chef", "ipmi"),
            ("cookbook-apache2", "apache2"),
            ("my-chef-repo", "myrepo"),
            ("apache2", "apache2"),
        ];
        for (repo, expected) in cases {
            assert_eq!(local_name(repo), expected, "repo: {repo}");
        }
    }

    #[test]
    fn keeps_chef_when_it_is_part_of_the_name() {
        assert_eq!(local_name("chef-client"), "chef-client");
        assert_eq!(local_name("chef-server-cookbook"), "chef-server");
        assert_eq!(local_name("chef_handler-sns"), "chef_handler-sns");
        assert_eq!(local_name("chef-chef-client"), "chef-client");
    }

    #[test]
    fn stripping_is_idempotent() {
        let repos = [
            "chef-widget",
            "chcookbookef-widget",
            "cochefokbook-widget",
            "chef-client",
            "widget_chef_cookbook",
            "nginx",
        ];
        for repo in repos {
            let once = local_name(repo);
            assert_eq!(local_name(&once), once, "repo: {repo}");
        }
        assert_eq!(local_name("chcookbookef-widget"), "widget");
    }
}
