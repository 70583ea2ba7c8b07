#![deny(clippy::all)]
#![deny(missing_debug_implementations)]

use dbal_bridge::links::LocalLink;
use dbal_core::memory::MemoryAdapter;
use dbal_daemon::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dbal_daemon::trace::init_default("DBAL_LOG");

    let link = LocalLink::new(MemoryAdapter::new());
    Cli::builder().link(link).build().run().await?;

    Ok(())
}
