use clap::Parser;
use std::process::ExitCode;
use wacollect_runner::{init_logging, run, Args};

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref(), args.log_json)?;

    #[cfg(feature = "prometheus")]
    {
        if let Some(addr) = args.metrics_addr {
            wacollect_metrics::install_prometheus(addr)?;
        }
    }

    run(&args)
}
