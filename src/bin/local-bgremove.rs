//! Local background removal CLI
//!
//! Command-line interface for removing backgrounds from images with the
//! local-bgremove library, using the portrait or general segmentation model.

#[cfg(feature = "cli")]
use local_bgremove::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
