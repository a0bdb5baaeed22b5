use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rayon::prelude::*;

use sheetscan_lib::errors::ScanError;
use sheetscan_lib::identifier::OpenCvSymbolReader;
use sheetscan_lib::layout::Choice;
use sheetscan_lib::pipeline::{ScanContext, ScanOptions, ScanResponse};
use sheetscan_lib::state;
use sheetscan_lib::template::SheetTemplate;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan sheet images, printing one JSON result per line
    Scan {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Sheet template; a generated 20-question A-D sheet when omitted
        #[arg(short, long)]
        template: Option<PathBuf>,
        /// Attach a base64 overlay of the scored cells
        #[arg(long)]
        debug: bool,
    },
    /// Write a template generated from simple parameters
    Template {
        #[arg(short, long)]
        questions: usize,
        #[arg(long, default_value = "ABCD")]
        options: String,
        #[arg(short, long, default_value_t = 1)]
        columns: usize,
        /// Print to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_options(letters: &str) -> anyhow::Result<Vec<Choice>> {
    letters
        .chars()
        .map(|letter| Choice::from_letter(letter).with_context(|| format!("unknown option letter {letter:?}")))
        .collect()
}

fn scan(images: &[PathBuf], template: Option<PathBuf>, debug: bool) -> anyhow::Result<()> {
    let template = match template {
        Some(path) => SheetTemplate::from_json_file(&path)
            .with_context(|| format!("loading template {}", path.display()))?,
        None => SheetTemplate::generate(20, &Choice::ALL, 1)?,
    };
    let template = state::init_template(template)?;
    let options = ScanOptions { debug };

    let lines = images
        .par_iter()
        .map_init(
            || OpenCvSymbolReader::new().map_err(ScanError::from),
            |reader, path| {
                let response = match (fs::read(path), reader) {
                    (Err(e), _) => {
                        log::error!("cannot read {}: {e}", path.display());
                        ScanResponse::failure(e)
                    }
                    (Ok(_), Err(e)) => {
                        sheetscan_lib::err_log!(&*e);
                        ScanResponse::failure(e)
                    }
                    (Ok(bytes), Ok(reader)) => match ScanContext::new(template, &*reader, options) {
                        Ok(context) => context.respond(&bytes),
                        Err(e) => ScanResponse::from(Err(e)),
                    },
                };
                serde_json::to_string(&response).or_else(|e| serde_json::to_string(&ScanResponse::failure(e)))
            },
        )
        .collect::<serde_json::Result<Vec<String>>>()?;

    let mut stdout = std::io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}

fn write_template(questions: usize, letters: &str, columns: usize, output: Option<PathBuf>) -> anyhow::Result<()> {
    let options = parse_options(letters)?;
    if options.len() < 2 {
        bail!("at least two option letters are required");
    }
    let template = SheetTemplate::generate(questions, &options, columns)?;
    match output {
        Some(path) => {
            template.write_json_file(&path)?;
            log::info!("wrote template {} to {}", template.name, path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&template)?),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Scan {
            images,
            template,
            debug,
        } => scan(&images, template, debug),
        Command::Template {
            questions,
            options,
            columns,
            output,
        } => write_template(questions, &options, columns, output),
    }
}
