use std::path::Path;

use git2::{cert::Cert, CertificateCheckStatus, Config, Cred, CredentialType, RemoteCallbacks};
use log::trace;
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// Callbacks authenticating clones: ssh-agent for SSH, the configured git
/// credential helper for HTTPS.
pub fn remote_callbacks(git_config: &Config) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username, allowed_types| {
        trace!(
            "Requested credentials for {}, username {:?}, allowed types {:?}",
            url,
            username,
            allowed_types
        );
        // Asking for ssh username
        if allowed_types.contains(CredentialType::USERNAME) {
            return Cred::username("git");
        }
        if allowed_types.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::credential_helper(git_config, url, username);
        }
        Err(git2::Error::from_str("no valid authentication available"))
    });

    callbacks.certificate_check(check_certificate);
    callbacks
}

fn check_certificate(
    certificate: &Cert<'_>,
    host: &str,
) -> Result<CertificateCheckStatus, git2::Error> {
    let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) else {
        return Ok(CertificateCheckStatus::CertificatePassthrough);
    };
    if is_known_host(Path::new(GLOBAL_KNOWN_HOSTS), host, hostkey) {
        Ok(CertificateCheckStatus::CertificateOk)
    } else {
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

/// Whether `known_hosts` pins `hostkey` for `host`. Unreadable files pin nothing.
fn is_known_host(known_hosts: &Path, host: &str, hostkey: &[u8]) -> bool {
    match KnownHosts::read_file(known_hosts) {
        Ok(entries) => entries.iter().any(|entry| {
            lists_host(entry.host_patterns(), host)
                && entry.public_key().to_bytes().as_deref() == Ok(hostkey)
        }),
        Err(error) => {
            trace!("Could not load {}: {}", known_hosts.display(), error);
            false
        }
    }
}

/// Plain host names only; wildcards and hashed names never match.
fn lists_host(patterns: &HostPatterns, host: &str) -> bool {
    let HostPatterns::Patterns(patterns) = patterns else {
        return false;
    };
    let host = host.to_lowercase();
    let mut listed = false;
    for pattern in patterns.iter().map(|pattern| pattern.to_lowercase()) {
        match pattern.strip_prefix('!') {
            Some(negated) if negated == host => return false,
            Some(_) => {}
            None => listed |= pattern == host,
        }
    }
    listed
}
