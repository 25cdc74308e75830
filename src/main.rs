use std::{env, process::ExitCode};

use clap::{error::ErrorKind, Parser};
use cookfetch::{
    cli::{
        args::{CliArgs, Command},
        command_handlers::do_install,
    },
    config::CookfetchConfig,
    install::InstallError,
    Cookfetch,
};

const EXIT_FAILURE: u8 = 1;
const USAGE: &str =
    "Usage: cookfetch install OWNER/REPO[/REF] [-S|--ssh] [-o|--cookbook-path PATH:PATH] [-B|--branch REF]";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli_args = match CliArgs::try_parse() {
        Ok(cli_args) => cli_args,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_FAILURE,
            };
            let _ = error.print();
            return ExitCode::from(code);
        }
    };

    match run(cli_args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli_args: CliArgs) -> anyhow::Result<u8> {
    let config = CookfetchConfig::load()?;

    let Command::Install {
        package,
        ssh,
        cookbook_path,
        branch,
    } = cli_args.cmd;

    let mut builder = Cookfetch::builder()
        .ssh(ssh || config.use_ssh)
        .current_user(config.user_name.or_else(current_user));
    if let Some(paths) = cookbook_path
        .map(|paths| paths.0)
        .or(config.cookbook_path)
    {
        builder = builder.cookbook_path(paths);
    }
    if let Some(reference) = branch.or(config.default_ref) {
        builder = builder.default_ref(reference);
    }
    if let Some(protocol) = config.protocol {
        builder = builder.protocol(protocol);
    }
    if let Some(host) = config.git_host {
        builder = builder.git_host(host);
    }
    if let Some(api_url) = config.api_url {
        builder = builder.api_url(api_url);
    }
    if let Some(main_branch) = config.main_branch {
        builder = builder.main_branch(main_branch);
    }
    if let Some(heuristic) = config.user_heuristic {
        builder = builder.user_heuristic(heuristic);
    }
    let cookfetch = builder.try_build()?;

    match do_install(&cookfetch, &package) {
        Ok(outcome) => Ok(outcome.exit_code()),
        Err(InstallError::Usage(error)) => {
            eprintln!("{error}");
            eprintln!("{USAGE}");
            Ok(EXIT_FAILURE)
        }
        Err(error) => Err(error.into()),
    }
}

fn current_user() -> Option<String> {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}
