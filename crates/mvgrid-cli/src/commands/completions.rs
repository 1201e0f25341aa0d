use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap_complete::{generate, Shell};
use tracing::info;

use mvgrid_cli::build_cli_command;

const BIN_NAME: &str = "mvgrid";

/// Completion script for `shell`, to `out` or stdout.
pub fn handle(shell: Shell, out: Option<&Path>) -> Result<()> {
    let mut sink: Box<dyn Write> = match out {
        Some(path) => Box::new(create_script_file(path)?),
        None => Box::new(io::stdout().lock()),
    };
    render(shell, &mut sink);
    sink.flush().context("flushing completion script")?;
    if let Some(path) = out {
        info!("{shell} completion script written to {}", path.display());
    }
    Ok(())
}

fn create_script_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating directory '{}'", dir.display()))?;
    }
    File::create(path).with_context(|| format!("creating '{}'", path.display()))
}

fn render(shell: Shell, sink: &mut dyn Write) {
    generate(shell, &mut build_cli_command(), BIN_NAME, sink);
}
