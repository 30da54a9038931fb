use a68_lang::SyntaxTree;
use a68_plugin::{CompiledSource, Error, Options, Plugin, tier};
use clap::Parser;
use colored::Colorize;
use miette::{IntoDiagnostic, WrapErr};
use std::fs;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "a68c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To generate C for a serialized tree:\n\
    a68c -O 3 program.json -o program.c\n\n\
    ## To read the tree from stdin with run-time checks:\n\
    a68c --checked < program.json")]
#[command(
    about = "a68c generates C for the fragments of an annotated a68 syntax tree that can run outside the interpreter.",
    long_about = None
)]
pub struct Cli {
    /// Optimisation level; 0 generates nothing, 1 compiles units only
    #[arg(short = 'O', long, default_value_t = tier::CLAUSES, value_parser = clap::value_parser!(u8).range(0..=9))]
    opt_level: u8,

    /// Emit the run-time checks of the interpreter's checked mode
    #[arg(long, default_value_t = false)]
    checked: bool,

    /// Write the generated C source to the file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the tree with its compilation annotations back as JSON
    #[arg(long, value_name = "FILE")]
    annotated: Option<PathBuf>,

    /// Raise the log level; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON-serialized syntax tree; read from stdin when omitted
    #[arg(value_name = "TREE")]
    tree: Option<PathBuf>,
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        self.init_tracing();

        let mut tree = self.read_tree()?;
        let options = Options::new(self.opt_level).with_checked(self.checked);
        let mut plugin = Plugin::new(options);

        let compiled = match &self.output {
            Some(path) => {
                let file = fs::File::create(path)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Failed to create {}", path.display()))?;
                plugin.compile_to(&mut tree, &mut BufWriter::new(file))?
            }
            None => plugin.compile_to(&mut tree, &mut io::stdout().lock())?,
        };

        self.report(&tree, &compiled);

        if let Some(path) = &self.annotated {
            let json = a68_lang::tree_to_json(&tree).into_diagnostic()?;
            fs::write(path, json)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }

    fn init_tracing(&self) {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("a68_plugin={level},a68_run={level}"))),
            )
            .with_writer(io::stderr)
            .try_init();
    }

    fn read_tree(&self) -> miette::Result<SyntaxTree> {
        let json = match &self.tree {
            Some(path) => fs::read_to_string(path)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to read {}", path.display()))?,
            None => {
                let mut json = String::new();
                io::stdin().read_to_string(&mut json).into_diagnostic()?;
                json
            }
        };
        let tree = a68_lang::tree_from_json(&json)
            .into_diagnostic()
            .wrap_err("Input is not a serialized syntax tree")?;
        tracing::info!(nodes = tree.nodes.len(), "read syntax tree");
        Ok(tree)
    }

    /// Prints every diagnostic and a one-line summary to stderr.
    fn report(&self, tree: &SyntaxTree, compiled: &CompiledSource) {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        for diagnostic in &compiled.diagnostics {
            let report = miette::Report::new(Error::from_diagnostic(tree, diagnostic));
            let _ = writeln!(handle, "{:?}", report);
        }

        let summary = format!(
            "{} functions generated, {} diagnostics",
            compiled.function_count(),
            compiled.error_count
        );
        let _ = if !stderr.is_terminal() {
            writeln!(handle, "{summary}")
        } else if compiled.error_count > 0 {
            writeln!(handle, "{}: {summary}", "Warning".yellow().bold())
        } else {
            writeln!(handle, "{}: {summary}", "Done".green().bold())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case::defaults(vec!["a68c"], tier::CLAUSES, false)]
    #[case::short(vec!["a68c", "-O", "1", "--checked"], 1, true)]
    #[case::long(vec!["a68c", "--opt-level", "9", "tree.json"], 9, false)]
    fn test_parse_options(#[case] args: Vec<&str>, #[case] opt_level: u8, #[case] checked: bool) {
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.opt_level, opt_level);
        assert_eq!(cli.checked, checked);
    }

    #[test]
    fn test_opt_level_above_nine_is_rejected() {
        assert!(Cli::try_parse_from(["a68c", "-O", "10"]).is_err());
    }
}
