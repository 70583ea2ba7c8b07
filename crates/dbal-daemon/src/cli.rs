use std::env;
use std::future;

use anyhow::Context;
use clap::Parser;
use dbal_bridge::links::Link;
use typed_builder::TypedBuilder;

use crate::env_file::EnvFile;
use crate::Server;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Arguments {
    /// The address to listen to.
    #[arg(long, default_value = "127.0.0.1:8787", env = "DBAL_DAEMON_LISTEN_ADDR")]
    listen_addr: String,
    /// The bearer token clients must present. [Default: no authentication]
    #[arg(long, env = "DBAL_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
    /// The name of the env profile.
    #[arg(long, env = "DBAL_ENV")]
    env: Option<String>,
}

/// The default command line instance for the daemon.
#[derive(Debug, TypedBuilder)]
pub struct Cli<L> {
    /// The link that resolves the calls of every client.
    link: L,
}

impl<L> Cli<L>
where
    L: 'static + Link + Clone,
{
    /// Parses the arguments and runs the daemon until interrupted.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self { link } = self;

        let args = Arguments::parse();

        let workspace_dir = env::current_dir().context("failed to read current directory")?;
        let envs = EnvFile::new(args.env.clone()).load(workspace_dir);

        // env files provide defaults for the arguments.
        let args = if envs.is_empty() {
            args
        } else {
            for (k, v) in envs {
                env::set_var(k, v);
            }

            Arguments::parse()
        };

        let mut server = Server::bind(args.listen_addr.as_str())
            .await
            .with_context(|| format!("failed to listen at {}", args.listen_addr))?;

        if let Some(m) = args.auth_token {
            server = server.with_token(m);
        }

        let addr = server.local_addr().context("failed to read listen address")?;
        tracing::info!("Listening at: ws://{}/", addr);

        server.serve_with_shutdown(link, shutdown_signal()).await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(reason = %e, "failed to listen for shutdown signal");
        future::pending::<()>().await;
    }

    tracing::info!("shutting down");
}
