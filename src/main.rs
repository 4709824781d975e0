use clap::Parser;
use marquee::cli::{Cli, run};

fn main() -> anyhow::Result<()> {
    run(Cli::parse())
}
