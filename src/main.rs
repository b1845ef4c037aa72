//! bytepack - compact binary object codec
//!
//! Encodes JSON documents to the bytepack wire format and back, guided by
//! type definitions from a schema file.

mod commands;
mod config;

use bytepack_core::{IndexSize, TextEncoding};
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{CommandResult, Context};
use config::Config;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bytepack")]
#[command(about = "Encode, decode and inspect bytepack binary data")]
#[command(version)]
struct Cli {
    /// Config file (YAML); defaults to $BYTEPACK_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Schema file with type definitions (YAML or JSON)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    // ===== Wire Options =====
    /// Tag object members by name instead of index
    #[arg(long, global = true)]
    names: bool,

    /// Write the type name before every value
    #[arg(long, global = true)]
    types: bool,

    /// Use declaration order, ignoring explicit member indices
    #[arg(long, global = true)]
    ignore_index: bool,

    /// Member index width: byte or uint16
    #[arg(long, global = true)]
    index_size: Option<IndexSize>,

    /// String encoding: utf-8 or utf-16le
    #[arg(long, global = true)]
    text_encoding: Option<TextEncoding>,

    /// Bytes per read and per output chunk
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode JSON documents
    Encode {
        /// Type name or type expression, e.g. Order or list<i32>
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Input JSON file (stdin if omitted or "-")
        input: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print one hex line per value instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Decode values to JSON
    Decode {
        /// Type name or type expression
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Input file (stdin if omitted or "-")
        input: Option<PathBuf>,

        /// Input is hex text
        #[arg(long)]
        hex: bool,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Hex dump, optionally decoding one value of the given type
    Inspect {
        /// Input file (stdin if omitted or "-")
        input: Option<PathBuf>,

        /// Type name or type expression
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Input is hex text
        #[arg(long)]
        hex: bool,
    },

    /// Validate a schema file and build converters for every type
    CheckSchema {
        /// Schema file (YAML or JSON)
        path: PathBuf,
    },
}

impl Cli {
    /// Flags are the last configuration layer.
    fn apply_flags(&self, config: &mut Config) {
        if self.names {
            config.codec.use_property_names = true;
        }
        if self.types {
            config.codec.use_types = true;
        }
        if self.ignore_index {
            config.codec.ignore_index_attribute = true;
        }
        if let Some(size) = self.index_size {
            config.codec.index_size = size;
        }
        if let Some(encoding) = self.text_encoding {
            config.codec.text_encoding = encoding;
        }
        if let Some(size) = self.chunk_size {
            config.stream = config.stream.with_chunk_size(size);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    cli.apply_flags(&mut config);
    tracing::debug!("Using options {:?}", config.codec);

    if let Err(e) = run(&cli, &config).await {
        tracing::error!("Command failed: {}", e);
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: &Cli, config: &Config) -> CommandResult<()> {
    let ctx = Context::new(config, cli.schema.as_deref())?;

    match &cli.command {
        Commands::Encode {
            type_name,
            input,
            output,
            hex,
        } => {
            let ty = ctx.resolve(type_name)?;
            let text = String::from_utf8(read_input(input.as_deref()).await?)?;
            if *hex {
                for line in commands::encode_hex(&ctx, &ty, &text)? {
                    println!("{}", line);
                }
                return Ok(());
            }
            let (count, bytes) =
                commands::encode_stream(&ctx, &ty, &text, open_output(output.as_deref()).await?)
                    .await?;
            tracing::info!("Wrote {} value(s) of {} ({} bytes)", count, ty.name(), bytes);
        }

        Commands::Decode {
            type_name,
            input,
            hex,
            pretty,
        } => {
            let ty = ctx.resolve(type_name)?;
            let documents = if *hex {
                let text = String::from_utf8(read_input(input.as_deref()).await?)?;
                commands::decode_hex(&ctx, &ty, &text)?
            } else {
                commands::decode_stream(&ctx, &ty, open_input(input.as_deref()).await?).await?
            };
            for document in &documents {
                if *pretty {
                    println!("{}", commands::format_json(document));
                } else {
                    println!("{}", document);
                }
            }
        }

        Commands::Inspect {
            input,
            type_name,
            hex,
        } => {
            let raw = read_input(input.as_deref()).await?;
            let bytes = if *hex {
                commands::parse_hex(&String::from_utf8(raw)?)?
            } else {
                raw
            };
            let ty = type_name.as_deref().map(|name| ctx.resolve(name)).transpose()?;
            println!("{}", commands::inspect(&ctx, &bytes, ty.as_ref())?);
        }

        Commands::CheckSchema { path } => {
            print!("{}", commands::check_schema(&ctx, path)?);
        }
    }
    Ok(())
}

async fn open_input(path: Option<&Path>) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(Box::new(tokio::fs::File::open(path).await?)),
        _ => Ok(Box::new(tokio::io::stdin())),
    }
}

async fn open_output(path: Option<&Path>) -> std::io::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(Box::new(tokio::fs::File::create(path).await?)),
        _ => Ok(Box::new(tokio::io::stdout())),
    }
}

async fn read_input(path: Option<&Path>) -> std::io::Result<Vec<u8>> {
    let mut input = open_input(path).await?;
    let mut buf = Vec::new();
    input.read_to_end(&mut buf).await?;
    Ok(buf)
}
