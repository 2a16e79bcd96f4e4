//! Main binary entry point for stix-codec.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use stix_codec::errors::CodecError;
use stix_codec::fetch::Source;
use stix_codec::formats::Format;
use stix_codec::{Config, Strictness};

#[derive(Parser, Debug)]
#[command(version, about = "Decode a STIX 1.x XML package and encode it back", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", conflicts_with = "url", help = "Input file (default: stdin)")]
    input: Option<PathBuf>,

    #[arg(long, value_name = "URL", help = "Fetch the input over HTTP (needs the `fetch` feature)")]
    url: Option<String>,

    #[arg(short, long, value_name = "FILE", help = "Output file (default: stdout)")]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    format: Option<Format>,

    #[arg(long, help = "Preserve unknown elements instead of rejecting them")]
    lenient: bool,

    #[arg(long, value_name = "FILE", help = "Schema artifact to use instead of the bundled STIX 1.2 one")]
    schema: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let filter_level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter(None, filter_level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run_app() -> Result<(), CodecError> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let input = match (cli.input, cli.url) {
        (Some(path), _) => Source::File(path),
        (None, Some(url)) => Source::Url(url),
        (None, None) => Source::Stdin,
    };

    let strictness = if cli.lenient {
        Strictness::Lenient
    } else {
        Strictness::Strict
    };

    let config = Config {
        input,
        output_file: cli.output,
        output_format: cli.format,
        strictness,
        schema_file: cli.schema,
    };

    stix_codec::run(config)
}

fn main() -> ExitCode {
    match run_app() {
        Ok(_) => {
            log::info!("Round trip completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("A fatal error occurred:");
            log::error!("{}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(s) = source {
                log::error!("  Caused by: {}", s);
                source = std::error::Error::source(s);
            }
            ExitCode::FAILURE
        }
    }
}
