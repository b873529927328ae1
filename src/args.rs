use std::path::PathBuf;

use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, Command};

use hprof_probe::errors::{HprofError, Result};
use hprof_probe::objects::SortBy;

pub enum SubCommand {
    Threads { local_vars: bool },
    Summary { all_props: bool },
    Objects { sort_by: SortBy, json: bool },
}

pub struct Args {
    pub hprof: PathBuf,
    pub no_progress: bool,
    pub command: SubCommand,
}

fn hprof_arg() -> Arg {
    Arg::new("hprof")
        .help("binary .hprof input file")
        .long("hprof")
        .short('f')
        .num_args(1)
        .value_parser(clap::value_parser!(PathBuf))
        .required(true)
}

fn no_progress_arg() -> Arg {
    Arg::new("noProgress")
        .help("do not show the indexing progress bar")
        .long("no-progress")
        .action(ArgAction::SetTrue)
}

fn command() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("threads")
                .about("print the per-thread stack dump")
                .arg(hprof_arg())
                .arg(no_progress_arg())
                .arg(
                    Arg::new("localVars")
                        .help("show local variables under each frame")
                        .long("local-vars")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("summary")
                .about("print the environment and heap summary")
                .arg(hprof_arg())
                .arg(no_progress_arg())
                .arg(
                    Arg::new("allProps")
                        .help("include every system property")
                        .long("all-props")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("objects")
                .about("print the per-class object count and size report")
                .arg(hprof_arg())
                .arg(no_progress_arg())
                .arg(
                    Arg::new("sortBy")
                        .help("order rows by \"count\" or \"size\"")
                        .long("sort-by")
                        .num_args(1)
                        .default_value("count"),
                )
                .arg(
                    Arg::new("json")
                        .help("emit the report as JSON")
                        .long("json")
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub fn get_args() -> Result<Args> {
    let matches = command().get_matches();
    let (name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| HprofError::format("a subcommand is required"))?;

    let hprof: PathBuf = sub_matches
        .get_one::<PathBuf>("hprof")
        .cloned()
        .ok_or_else(|| HprofError::format("--hprof is required"))?;
    if !hprof.is_file() {
        return Err(HprofError::not_found(format!(
            "input file {}",
            hprof.display()
        )));
    }
    let no_progress = sub_matches.get_flag("noProgress");

    let command = match name {
        "threads" => SubCommand::Threads {
            local_vars: sub_matches.get_flag("localVars"),
        },
        "summary" => SubCommand::Summary {
            all_props: sub_matches.get_flag("allProps"),
        },
        "objects" => SubCommand::Objects {
            sort_by: SortBy::from_flag(
                sub_matches
                    .get_one::<String>("sortBy")
                    .map(String::as_str)
                    .unwrap_or(""),
            )?,
            json: sub_matches.get_flag("json"),
        },
        other => {
            return Err(HprofError::unsupported(format!("subcommand {other}")));
        }
    };

    Ok(Args {
        hprof,
        no_progress,
        command,
    })
}

#[cfg(test)]
mod args_tests {
    use super::command;

    #[test]
    fn verify_command() {
        command().debug_assert();
    }
}
