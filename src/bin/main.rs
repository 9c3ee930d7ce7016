use std::{ffi::OsString, io, path::PathBuf, process};

use clap::{Parser, Subcommand};
use glos::{
    driver,
    util::{
        fmt::{error, Context},
        intern::Interner,
    },
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

const USAGE: &str = "\
Usage:
    glos COMMAND [...]

Commands:
    help            Show this message
    run   [FILE]    Run the program
    build [FILE]    Compile the program
";

#[derive(Parser)]
#[command(
    name = "glos",
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show this message
    Help,
    /// Run the program
    Run {
        file: PathBuf,
        /// Optimize the generated code
        #[arg(long)]
        release: bool,
        /// Arguments forwarded to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Compile the program
    Build {
        file: PathBuf,
        /// Where to write the executable
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Optimize the generated code
        #[arg(long)]
        release: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("GLOS_LOG")
                .with_default_directive(LevelFilter::OFF.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let Ok(cli) = Cli::try_parse() else {
        eprint!("{USAGE}");
        process::exit(1);
    };

    let interner = &mut Interner::default();
    let (options, result) = match cli.command {
        Command::Help => {
            print!("{USAGE}");
            return;
        }
        Command::Build {
            file,
            output,
            release,
        } => {
            let options = driver::Options {
                output,
                release,
                ..driver::Options::new(file)
            };
            let result = driver::build(&options, interner).map(|_| 0);
            (options, result)
        }
        Command::Run {
            file,
            release,
            args,
        } => {
            let options = driver::Options {
                release,
                ..driver::Options::new(file)
            };
            let result = driver::run(&options, &args, interner);
            (options, result)
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            let path = options.input.display().to_string();
            let ctx = Context {
                ident_interner: interner,
                path: &path,
            };
            // Nothing left to do if stderr is gone.
            _ = error::report(&mut io::stderr().lock(), &ctx, &e);
            process::exit(e.exit_code());
        }
    }
}
