use clap::Parser;

fn main() -> miette::Result<()> {
    a68_run::Cli::parse().run()
}
