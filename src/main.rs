mod args;

use tracing_subscriber::EnvFilter;

use hprof_probe::errors::HprofError;
use hprof_probe::objects::{collect_objects, render_objects, render_objects_json};
use hprof_probe::summary::{collect_summary, render_summary};
use hprof_probe::threads::{collect_thread_dump, render_thread_dump};
use hprof_probe::workspace::{ensure_indexed, open_accessor};

use crate::args::{get_args, SubCommand};

fn main() -> Result<(), HprofError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = get_args()?;
    ensure_indexed(&args.hprof, !args.no_progress)?;
    let mut accessor = open_accessor(&args.hprof)?;

    match args.command {
        SubCommand::Threads { local_vars } => {
            let dump = collect_thread_dump(&mut accessor)?;
            print!("{}", render_thread_dump(&dump, local_vars));
        }
        SubCommand::Summary { all_props } => {
            let summary = collect_summary(&mut accessor, all_props)?;
            print!("{}", render_summary(&summary));
        }
        SubCommand::Objects { sort_by, json } => {
            let report = collect_objects(&accessor)?;
            if json {
                println!("{}", render_objects_json(&report, sort_by)?);
            } else {
                print!("{}", render_objects(&report, sort_by));
            }
        }
    }
    Ok(())
}
