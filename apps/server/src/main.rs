use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use lectro_core::{config, store::DOCUMENT_FILE_NAME, DocumentStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;

/// Lectro sync server: serves the library document to reader clients and
/// runs its maintenance jobs. Single-instance only; the store's FIFO queue
/// does not protect two processes sharing one library root.
#[derive(Parser)]
#[command(name = "lectro-server")]
struct Cli {
	/// Port to listen on (IPv6 and IPv4).
	#[arg(long, env = "PORT", default_value_t = 8080)]
	port: u16,
	/// Directory holding lectro_config.json. Defaults to the working
	/// directory.
	#[arg(long)]
	data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
			EnvFilter::new("info,lectro_core=debug,lectro_server=debug")
		}))
		.init();

	let cli = Cli::parse();
	let data_dir = match cli.data_dir {
		Some(dir) => dir,
		None => env::current_dir()?,
	};

	let library_root = config::resolve_library_root(&data_dir);
	info!(
		document = %library_root.join(DOCUMENT_FILE_NAME).display(),
		"opening library store"
	);
	let store = Arc::new(DocumentStore::new(library_root));

	let app = routes::router(store);

	// This listens on IPv6 and IPv4
	let mut addr = "[::]:8080".parse::<SocketAddr>()?;
	addr.set_port(cli.port);
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("Listening on http://localhost:{}", cli.port);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "failed to install ctrl-c handler");
	}
}
