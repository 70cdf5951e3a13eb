use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use magic_detect::{Backend, Config, Detector, Flags, MagicLibrary};

const STDIN_NAME: &str = "/dev/stdin";

#[derive(Parser, Debug)]
#[command(
    name = "magic-detect",
    about = "Identify file contents with a libmagic-style engine",
    disable_version_flag = true
)]
struct Cli {
    /// Files to classify; `-` reads standard input
    files: Vec<String>,

    /// Output MIME type and encoding
    #[arg(short = 'i', long)]
    mime: bool,

    /// Output MIME type only
    #[arg(long)]
    mime_type: bool,

    /// Output MIME encoding only
    #[arg(long)]
    mime_encoding: bool,

    /// Follow symlinks
    #[arg(short = 'L', long)]
    dereference: bool,

    /// Look inside compressed files
    #[arg(short = 'z', long)]
    uncompress: bool,

    /// Magic database to use instead of the default (repeatable)
    #[arg(short = 'm', long = "magic-file", value_name = "PATH")]
    magic_file: Vec<String>,

    /// Validate the magic database and exit
    #[arg(long, conflicts_with = "compile")]
    check: bool,

    /// Compile the magic database and exit
    #[arg(long)]
    compile: bool,

    /// Print program and engine versions
    #[arg(short = 'v', long)]
    version: bool,

    /// Print the known flag names and values
    #[arg(long)]
    list_flags: bool,

    /// Emit one JSON object per file
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn flags(&self) -> Flags {
        let mut flags = Flags::NONE;
        if self.mime {
            flags |= Flags::MIME;
        }
        if self.mime_type {
            flags |= Flags::MIME_TYPE;
        }
        if self.mime_encoding {
            flags |= Flags::MIME_ENCODING;
        }
        if self.dereference {
            flags |= Flags::SYMLINK;
        }
        if self.uncompress {
            flags |= Flags::COMPRESS;
        }
        flags
    }
}

#[derive(Debug, Serialize)]
struct Report {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Report {
    fn print(&self, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
        } else {
            match (&self.result, &self.error) {
                (Some(result), _) => println!("{}: {}", self.file, result),
                (None, Some(error)) => println!("{}: ERROR: {}", self.file, error),
                (None, None) => println!("{}:", self.file),
            }
        }
        Ok(())
    }
}

fn build_library(backend: Backend) -> Result<Arc<dyn MagicLibrary>> {
    match backend {
        #[cfg(feature = "signatures")]
        Backend::Signatures => Ok(Arc::new(
            magic_detect::infrastructure::signatures::SignatureLibrary::new(),
        )),
        #[cfg(feature = "libmagic")]
        Backend::Libmagic => Ok(Arc::new(
            magic_detect::infrastructure::libmagic::LibMagic::new(),
        )),
        #[allow(unreachable_patterns)]
        other => bail!("Backend {} is not compiled into this build", other),
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::from_env();
    init_tracing(&config);
    config.validate()?;

    if cli.list_flags {
        for (name, flag) in Flags::named() {
            println!("{:<24} 0x{:08x}", name, flag.bits());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let backend = config.backend()?;
    let library = build_library(backend)?;
    info!("Using {} backend", library.name());

    if cli.version {
        println!("magic-detect {}", env!("CARGO_PKG_VERSION"));
        match Detector::version(library.as_ref()) {
            Ok(version) => println!("{} engine {}", library.name(), version),
            Err(e) => println!("{} engine version unavailable: {}", library.name(), e),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let flags = config.default_flags()? | cli.flags();
    let detector = Arc::new(
        Detector::with_flags(library, flags).context("Failed to open detection engine")?,
    );
    debug!("Detector ready: {:?}", detector);

    if cli.check {
        let valid = detector.check_async(cli.magic_file.clone()).await?;
        println!("{}", if valid { "valid" } else { "invalid" });
        return Ok(if valid { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    if cli.compile {
        detector
            .compile_async(cli.magic_file.clone())
            .await
            .context("Failed to compile magic database")?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.files.is_empty() {
        bail!("No files given (use `-` to read standard input)");
    }

    if cli.magic_file.is_empty() {
        if let Some(magic) = &config.magic_path {
            info!("MAGIC overrides the default database path: {:?}", magic);
        }
    }
    let path = detector
        .load_async(cli.magic_file.clone())
        .await
        .context("Failed to load magic database")?;
    info!("Loaded magic database from {}", path);

    let inputs = read_inputs(&cli.files).await?;
    let reports = classify_all(&detector, inputs, config.concurrency).await?;

    let mut failed = false;
    for report in &reports {
        failed |= report.error.is_some();
        report.print(cli.json)?;
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// One thing to classify.
#[derive(Debug)]
enum Input {
    File(String),
    /// Standard input, read up front
    Buffer(Vec<u8>),
}

/// Resolve `-` to the contents of standard input; it is read at most once.
async fn read_inputs(files: &[String]) -> Result<Vec<Input>> {
    let mut stdin: Option<Vec<u8>> = None;
    let mut inputs = Vec::with_capacity(files.len());

    for file in files {
        if file != "-" {
            inputs.push(Input::File(file.clone()));
            continue;
        }
        let buffer = match &stdin {
            Some(buffer) => buffer.clone(),
            None => {
                let mut buffer = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut buffer)
                    .await
                    .context("Failed to read standard input")?;
                stdin = Some(buffer.clone());
                buffer
            }
        };
        inputs.push(Input::Buffer(buffer));
    }
    Ok(inputs)
}

/// Classify every input, at most `concurrency` at a time, in input order.
///
/// Every engine call runs on the blocking pool so a call waiting on the
/// detector lock never stalls a runtime worker.
async fn classify_all(
    detector: &Arc<Detector>,
    inputs: Vec<Input>,
    concurrency: usize,
) -> Result<Vec<Report>> {
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(inputs.len());

    for input in inputs {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let detector = Arc::clone(detector);

        let handle = match input {
            Input::File(file) => tokio::spawn(async move {
                let outcome = detector.identify_file_async(file.clone()).await;
                drop(permit);
                report(&file, outcome)
            }),
            Input::Buffer(buffer) => tokio::task::spawn_blocking(move || {
                let outcome = detector.identify_buffer(&buffer);
                drop(permit);
                report(STDIN_NAME, outcome)
            }),
        };
        handles.push(handle);
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await?);
    }
    Ok(reports)
}

fn report(file: &str, outcome: Result<String, magic_detect::MagicError>) -> Report {
    match outcome {
        Ok(result) => Report {
            file: file.to_string(),
            result: Some(result),
            error: None,
        },
        Err(e) => Report {
            file: file.to_string(),
            result: None,
            error: Some(e.to_string()),
        },
    }
}
