use clap::Parser;
use firetrack::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
