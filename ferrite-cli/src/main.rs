mod commands;
mod config;
mod device;
mod logging;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::{Console, ExitStatus};
use config::CliConfig;
use device::{NullDevice, ReplayDevice};
use ferrite_core::trace::DeviceLink;
use ferrite_core::Session;
use logging::{LogEvent, StructuredLogger};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Ferrite: LF/HF RFID signal console",
    long_about = None
)]
struct Cli {
    /// Run a semicolon-separated command batch and exit
    #[arg(short = 'x', long = "commands")]
    batch: Option<String>,

    /// Preload a text trace into the graph buffer
    #[arg(short, long)]
    trace: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a JSONL command log
    #[arg(long)]
    log: Option<PathBuf>,

    /// Serve device reads from a raw capture file
    #[arg(long)]
    replay: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };

    let log_path = args.log.clone().or_else(|| config.log_file.clone());
    let mut logger = StructuredLogger::new(log_path.as_deref())?;
    logger.log(LogEvent::Info {
        message: "ferrite console starting".to_string(),
    });

    let device: Box<dyn DeviceLink> = match &args.replay {
        Some(path) => match ReplayDevice::from_file(path) {
            Ok(dev) => Box::new(dev),
            Err(err) => {
                eprintln!("cannot open replay capture: {err}");
                std::process::exit(ExitStatus::File.code());
            }
        },
        None => Box::new(NullDevice),
    };

    let session = Session::new(config.core.clone());
    let mut console = Console::new(session, device, logger);

    if let Some(path) = &args.trace {
        let status = console.run_line(&format!("load -f {}", path.display()));
        if status != ExitStatus::Success {
            std::process::exit(status.code());
        }
    }

    if let Some(batch) = &args.batch {
        let mut last = ExitStatus::Success;
        for line in batch.split(';') {
            last = console.run_line(line);
        }
        std::process::exit(last.code());
    }

    let prompt = config.prompt.unwrap_or_else(|| "data> ".to_string());
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{prompt}");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" {
            break;
        }
        console.run_line(trimmed);
    }
    Ok(())
}
