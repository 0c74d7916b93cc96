#![forbid(unsafe_code)]

// The engine crate builds for wasm32; this runner is native-only.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod runner;
#[cfg(not(target_arch = "wasm32"))]
mod script;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs;
    use std::io::{self, BufWriter, Write};
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use clap::Parser;
    use tracing_subscriber::EnvFilter;
    use xhci_bar::{IoSnapshot, XhciBar, XhciBarConfig};

    use crate::runner::Runner;
    use crate::script;

    #[derive(Debug, Parser)]
    #[command(about = "Drive the xHCI BAR engine from a stimulus script")]
    pub struct Args {
        /// JSON engine config (clock_hz, primary_port, secondary_port). Defaults apply to
        /// missing keys.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Restore engine state from a snapshot before running the script.
        #[arg(long)]
        snapshot_load: Option<PathBuf>,

        /// Write engine state to a snapshot after the script finishes.
        #[arg(long)]
        snapshot_save: Option<PathBuf>,

        /// Log register traffic at debug level (overrides RUST_LOG).
        #[arg(short, long)]
        verbose: bool,

        /// Stimulus script (`-` for stdin).
        script: PathBuf,
    }

    fn init_tracing(verbose: bool) {
        let filter = if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    fn read_script(path: &PathBuf) -> Result<String> {
        if path.as_os_str() == "-" {
            return io::read_to_string(io::stdin()).context("read script from stdin");
        }
        fs::read_to_string(path).with_context(|| format!("read script {}", path.display()))
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();
        init_tracing(args.verbose);

        let config = match &args.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                XhciBarConfig::from_json(&json)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => XhciBarConfig::default(),
        };
        let mut bar = XhciBar::new(config).context("create engine")?;

        if let Some(path) = &args.snapshot_load {
            let bytes =
                fs::read(path).with_context(|| format!("read snapshot {}", path.display()))?;
            bar.load_state(&bytes)
                .with_context(|| format!("restore snapshot {}", path.display()))?;
            tracing::info!(path = %path.display(), ticks = bar.ticks(), "snapshot restored");
        }

        let lines = script::parse(&read_script(&args.script)?)?;

        let stdout = io::stdout();
        let mut runner = Runner::new(&mut bar, BufWriter::new(stdout.lock()));
        let result = runner.run(&lines);
        runner.into_output().flush()?;
        result?;

        if let Some(path) = &args.snapshot_save {
            fs::write(path, bar.save_state())
                .with_context(|| format!("write snapshot {}", path.display()))?;
            tracing::info!(path = %path.display(), ticks = bar.ticks(), "snapshot saved");
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
