use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kvconf::{
    cli::print_server_url,
    config::{authenticator_from_token, store_from_path},
    server::Server,
};
use kvconf_core::{
    cors::CorsPolicy,
    store::{memory::MemoryStore, Store},
};
use kvconf_shim::{ConfigShim, ReqwestFetch, ShimConfig};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[clap(version = VERSION)]
struct Opts {
    #[clap(subcommand)]
    subcmd: ServSubcommand,
}

#[derive(clap::Args)]
struct ClientOpts {
    /// Base URL of a running config service.
    #[clap(long, default_value = "http://127.0.0.1:8787", env = "KVCONF_URL")]
    url: Url,

    #[clap(long, env = "API_TOKEN")]
    api_token: Option<String>,
}

#[derive(Subcommand)]
enum ServSubcommand {
    Serve {
        /// A directory path or s3://bucket/prefix. Omit to keep the config in memory.
        #[clap(env = "KVCONF_STORE")]
        store: Option<String>,

        #[clap(long, default_value = "8787", env = "PORT")]
        port: u16,
        #[clap(long, env = "KVCONF_HOST")]
        host: Option<IpAddr>,

        #[clap(long, env = "API_TOKEN")]
        api_token: Option<String>,

        #[clap(long, env = "KVCONF_ALLOWED_ORIGINS", value_delimiter = ',')]
        allowed_origin: Vec<String>,

        #[clap(long)]
        prod: bool,
    },

    /// Print the stored config.
    Get {
        #[clap(flatten)]
        client: ClientOpts,
    },

    /// Replace the stored config with the contents of a file.
    Save {
        file: PathBuf,

        #[clap(flatten)]
        client: ClientOpts,
    },

    /// Print metadata about the stored config.
    Meta {
        #[clap(flatten)]
        client: ClientOpts,
    },

    /// Delete the stored config.
    Reset {
        #[clap(flatten)]
        client: ClientOpts,
    },

    Version,
}

fn client_shim(opts: &ClientOpts) -> Arc<ConfigShim> {
    let mut config = ShimConfig::new(opts.url.clone());
    config.api_token = opts.api_token.clone();
    config.cache_enabled = false;
    ConfigShim::new(config, Arc::new(ReqwestFetch::new(Some(opts.url.clone()))))
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to install CTRL+C signal handler")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match &opts.subcmd {
        ServSubcommand::Serve {
            store,
            port,
            host,
            api_token,
            allowed_origin,
            prod,
        } => {
            let auth = authenticator_from_token(api_token.as_deref())?;

            let store: Box<dyn Store> = if let Some(store) = store {
                store_from_path(store)?
            } else {
                tracing::warn!("No store set. The config will be stored in memory only.");
                Box::new(MemoryStore::new())
            };
            store.init().await.context("Failed to initialize store")?;

            let cors = if allowed_origin.is_empty() {
                CorsPolicy::default()
            } else {
                CorsPolicy::new(allowed_origin.iter().map(String::as_str))?
            };

            let addr = SocketAddr::new(
                host.unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
                *port,
            );
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind to {}", addr))?;
            let addr = listener.local_addr()?;

            if !prod {
                print_server_url(addr, &cors, auth.is_some());
            }

            let token = CancellationToken::new();
            let server = Server::new(Some(store), auth, cors, token.clone());
            let handle = tokio::spawn(server.serve(listener));

            tracing::info!("Listening on http://{}", addr);

            shutdown_signal().await?;

            tracing::info!("Shutting down.");
            token.cancel();

            handle.await??;
            tracing::info!("Server shut down.");
        }
        ServSubcommand::Get { client } => {
            let config = client_shim(client).get_config().await?;
            print!("{}", config);
        }
        ServSubcommand::Save { file, client } => {
            let config = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let saved = client_shim(client).save_config(&config).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        ServSubcommand::Meta { client } => {
            let meta = client_shim(client)
                .get_meta()
                .await
                .context("Failed to fetch config metadata")?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        ServSubcommand::Reset { client } => {
            client_shim(client).reset_config().await?;
            println!("Config reset.");
        }
        ServSubcommand::Version => {
            println!("{}", VERSION);
        }
    }

    Ok(())
}
