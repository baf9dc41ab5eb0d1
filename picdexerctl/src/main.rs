use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use picdexer_config::Conf;
use picdexer_core::metadata::Exiftool;
use picdexer_core::setup::Setup;
use picdexer_core::{Dropzone, Pipeline, PipelineContext};

#[derive(Parser, Debug)]
#[command(name = "picdexerctl", version, about = "Picture metadata indexing & storing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index metadata and store binaries in one pass
    Full(RunArgs),
    /// Metadata utilities
    #[command(subcommand)]
    Metadata(MetadataCommand),
    /// Binary utilities
    #[command(subcommand)]
    Binary(BinaryCommand),
    /// Watch a dropzone folder and index stable files
    Dropzone(ConfArgs),
    /// Provision backend components
    Setup(ConfArgs),
}

#[derive(Subcommand, Debug)]
enum MetadataCommand {
    /// Print the bulk frames that an indexing run would push
    Simulate(RunArgs),
    /// Extract metadata and push it to the search backend
    Index(RunArgs),
    /// Dump the raw inspector fields of a single file
    Display(DisplayArgs),
}

#[derive(Subcommand, Debug)]
enum BinaryCommand {
    /// Resize into an output folder without uploading
    Simulate(BinarySimulateArgs),
    /// Resize and upload to the blob store
    Push(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Picdexer configuration file
    #[arg(short, long)]
    conf: PathBuf,
    /// Directory/File containing pictures (repeatable)
    #[arg(short, long = "dir", required = true)]
    dir: Vec<PathBuf>,
    /// Import identifier
    #[arg(short = 'i', long = "imp-id", default_value = "")]
    imp_id: String,
}

#[derive(Args, Debug)]
struct BinarySimulateArgs {
    #[command(flatten)]
    run: RunArgs,
    /// Output directory for resized pictures
    #[arg(short, long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ConfArgs {
    /// Picdexer configuration file
    #[arg(short, long)]
    conf: PathBuf,
}

#[derive(Args, Debug)]
struct DisplayArgs {
    /// File to inspect
    #[arg(short, long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Full(args) => {
            let conf = load(&args)?;
            let ctx = context(&args);
            Pipeline::new(conf).run_full(&ctx, &args.dir).await?;
        }
        Command::Metadata(MetadataCommand::Simulate(args)) => {
            let conf = load(&args)?;
            let ctx = context(&args);
            Pipeline::new(conf).run_metadata(&ctx, &args.dir, true).await?;
        }
        Command::Metadata(MetadataCommand::Index(args)) => {
            let conf = load(&args)?;
            let ctx = context(&args);
            Pipeline::new(conf).run_metadata(&ctx, &args.dir, false).await?;
        }
        Command::Metadata(MetadataCommand::Display(args)) => {
            init_logging("")?;
            display(&args.file).await?;
        }
        Command::Binary(BinaryCommand::Simulate(args)) => {
            let conf = load(&args.run)?;
            let ctx = context(&args.run);
            Pipeline::new(conf)
                .run_binary(&ctx, &args.run.dir, false, Some(args.out))
                .await?;
        }
        Command::Binary(BinaryCommand::Push(args)) => {
            let conf = load(&args)?;
            let ctx = context(&args);
            Pipeline::new(conf).run_binary(&ctx, &args.dir, true, None).await?;
        }
        Command::Dropzone(args) => {
            let conf = Conf::from_file(&args.conf)?;
            init_logging(&conf.logging_level)?;
            let ctx = PipelineContext::new("");
            cancel_on_ctrl_c(&ctx);
            Dropzone::new(conf)?.run(&ctx).await?;
        }
        Command::Setup(args) => {
            let conf = Conf::from_file(&args.conf)?;
            init_logging(&conf.logging_level)?;
            let setup = Setup::new(&conf.elasticsearch.url)?;
            setup.setup_elasticsearch().await?;
            info!("Setup done");
        }
    }
    Ok(())
}

fn load(args: &RunArgs) -> anyhow::Result<Conf> {
    let conf = Conf::from_file(&args.conf)?;
    init_logging(&conf.logging_level)?;
    Ok(conf)
}

fn context(args: &RunArgs) -> PipelineContext {
    let ctx = PipelineContext::new(&args.imp_id);
    cancel_on_ctrl_c(&ctx);
    ctx
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = if level.is_empty() { "info" } else { level };
    tracing::Level::from_str(level)
        .with_context(|| format!("error while setting logging level ({level})"))?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

fn cancel_on_ctrl_c(ctx: &PipelineContext) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping...");
            ctx.cancel();
        }
    });
}

async fn display(file: &Path) -> anyhow::Result<()> {
    let exiftool = Exiftool::new().await?;
    let fields = exiftool.extract(file).await?;
    for (key, value) in fields.iter() {
        println!("{key}: {value}");
    }
    exiftool.close().await?;
    Ok(())
}
