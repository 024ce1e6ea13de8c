use clap::{Parser, Subcommand};
use h2trace::cli::analyze::{self, Selection};
use h2trace::config::load_or_default;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "h2trace")]
#[command(about = "HTTP/2 stream lifecycle analyzer for httpd trace logs", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One row per stream with its lifecycle timings and busy workers
    Summary {
        #[command(flatten)]
        selection: Selection,
    },
    /// Log entries of the selected streams in their original order
    Entries {
        #[command(flatten)]
        selection: Selection,

        /// Include frame lines
        #[arg(long)]
        frames: bool,

        /// Only lines that record a lifecycle event or frame
        #[arg(long)]
        lifecycle: bool,
    },
    /// Frames sent and received for the selected streams
    Frames {
        #[command(flatten)]
        selection: Selection,

        /// Interleave the streams' lifecycle entries with the frames
        #[arg(long)]
        lifecycle: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented starter config
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Reports go to stdout; logs stay on stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "h2trace=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        match action {
            ConfigAction::Init { stdout } => h2trace::cli::config::init(*stdout)?,
        }
        return Ok(());
    }

    let config = load_or_default(cli.config.as_deref())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Commands::Summary { selection } => analyze::summary(&config, selection, &mut out)?,
        Commands::Entries {
            selection,
            frames,
            lifecycle,
        } => analyze::entries(&config, selection, *frames, *lifecycle, &mut out)?,
        Commands::Frames {
            selection,
            lifecycle,
        } => analyze::frames(&config, selection, *lifecycle, &mut out)?,
        Commands::Config { .. } => {}
    }

    out.flush()?;
    Ok(())
}
