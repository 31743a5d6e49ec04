use clap::{Parser, Subcommand};
use mailforge::{build, config, output};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter, e.g. `mailforge=debug`.
const LOG_ENV: &str = "MAILFORGE_LOG";

#[derive(Parser)]
#[command(name = "mailforge")]
#[command(about = "Build pipeline for HTML email templates")]
#[command(long_about = "\
Build pipeline for HTML email templates

Templates are copied into the destination directory and rendered in place:
layouts, remote content, components, plugins and {{ expressions }}. Each
template can override any config key in its YAML front matter.

Project structure:

  project/
  ├── config.toml                  # Project config (optional)
  ├── config.production.toml       # Merged on top for `build production`
  └── src/
      ├── templates/               # Rendered, one output per file
      │   └── welcome.html
      ├── layouts/                 # <extends src=\"src/layouts/main.html\">
      ├── components/              # <component src=\"src/components/button.html\">
      ├── css/                     # build.styles.css, exposed as {{ css }}
      └── assets/images/           # Copied to <destination>/images

Set MAILFORGE_LOG=debug for diagnostics.

Run 'mailforge gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Project directory (holds config.toml)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every template for an environment
    Build {
        /// Environment name; loads config.<env>.toml on top of config.toml
        #[arg(default_value = config::LOCAL_ENV)]
        env: String,
    },
    /// Validate config and list templates without building
    Check {
        #[arg(default_value = config::LOCAL_ENV)]
        env: String,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Build failed: {}", build::error_chain(&err));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), build::BuildError> {
    match &cli.command {
        Command::Build { env } => run_build(&cli.root, env),
        Command::Check { env } => {
            println!("==> Checking {} ({})", cli.root.display(), env);
            let report = build::check(&cli.root, env)?;
            print_lines(output::format_check_report(&report));
            println!("==> Project is valid");
            Ok(())
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
    }
}

fn run_build(root: &Path, env: &str) -> Result<(), build::BuildError> {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_build_event(&event) {
                println!("{}", line);
            }
        }
    });

    let result = build::build(root, env, Some(tx));
    // The sender is dropped with `build`, which ends the printer loop.
    if printer.join().is_err() {
        tracing::warn!("progress printer panicked");
    }

    let summary = result?;
    print_lines(output::format_summary(&summary));
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
