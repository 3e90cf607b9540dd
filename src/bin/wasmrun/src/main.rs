use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;
use wasmlink::{run_program, FsSource, HostConfig};

#[derive(clap::Parser, Clone, Debug)]
#[command(version, about = "Run WebAssembly modules against a stub C library")]
struct Cli {
    /// Module whose entry point is run.
    main: String,
    /// Modules linked ahead of the main module. Later modules provide symbols to earlier ones.
    extra: Vec<String>,
    /// Directories searched for modules given by relative name.
    #[arg(short = 'L', long = "search-path", env = "WASMRUN_PATH", value_delimiter = ':')]
    search_paths: Vec<PathBuf>,
    /// Size of the initial linear memory, in 64 KiB pages.
    #[arg(long, env = "WASMRUN_HEAP_PAGES", default_value_t = HostConfig::DEFAULT_PAGES)]
    heap_pages: u32,
    /// Name of the entry point exported by the main module.
    #[arg(long, default_value = HostConfig::DEFAULT_ENTRY)]
    entry: String,
    /// Log more. May be repeated. RUST_LOG takes precedence when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn config(&self) -> HostConfig {
        HostConfig {
            initial_pages: self.heap_pages,
            entry: self.entry.clone(),
            search_paths: self.search_paths.clone(),
            ..Default::default()
        }
    }
}

fn main() -> miette::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.level().to_string()));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    miette::set_hook(Box::new(|_| {
        Box::new(miette::NarratableReportHandler::new().with_cause_chain())
    }))
    .into_diagnostic()?;

    let config = cli.config();
    debug!("host configuration: {:?}", config);
    let source = FsSource::new(config.search_paths.clone());
    let outcome = run_program(
        config,
        Box::new(source),
        Box::new(std::io::stdout()),
        &wasmlink_libc::libraries(),
        &cli.main,
        cli.extra.as_slice(),
    )?;
    Ok(ExitCode::from(outcome.exit_code()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments() {
        let cli = Cli::parse_from([
            "wasmrun", "-vv", "-L", "a:b", "main.wasm", "x.wasm", "y.wasm",
        ]);
        assert_eq!(cli.main, "main.wasm");
        assert_eq!(cli.extra, ["x.wasm", "y.wasm"]);
        assert_eq!(cli.level(), Level::DEBUG);
        let config = cli.config();
        assert_eq!(config.search_paths, [PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(config.entry, "main");
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
