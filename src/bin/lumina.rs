//! Lumina room editing CLI
//!
//! Command-line interface over the lumina-stage pipeline: whole-room
//! generation, furniture removal and reference-guided staging against a
//! WebUI-compatible generation backend.

#[cfg(feature = "cli")]
use lumina_stage::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
