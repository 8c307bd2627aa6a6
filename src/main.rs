use std::io;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tower_lsp::{LspService, Server};
use tracing::{error, info};

use groovy_language_server::classpath::index_cache::SharedIndexCache;
use groovy_language_server::classpath::scan_cache::{ScanCacheConfig, SharedScanCache};
use groovy_language_server::logging::init_logger;
use groovy_language_server::lsp::backend::GroovyBackend;

#[derive(Debug, Clone, PartialEq)]
enum CommMode {
    Stdio,
    Socket(u16),
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Groovy Language Server",
    long_about = "LSP-based language server for the Groovy programming language."
)]
struct Args {
    #[arg(
        long,
        default_value = "info",
        help = "Set the logging level for the server",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    log_level: String,
    #[arg(long, help = "Disable ANSI color output")]
    no_color: bool,
    #[arg(
        long,
        help = "Use stdin/stdout for communication (default; mutually exclusive with --socket)",
        conflicts_with = "socket"
    )]
    stdio: bool,
    #[arg(
        long,
        requires = "port",
        help = "Use a TCP socket for communication (requires --port)"
    )]
    socket: bool,
    #[arg(long, help = "Port number for socket communication")]
    port: Option<u16>,
    #[arg(
        long,
        alias = "clientProcessId",
        help = "Process ID of the client, for monitoring (optional)"
    )]
    client_process_id: Option<u32>,
}

fn comm_mode(args: &Args) -> io::Result<CommMode> {
    if args.socket {
        let port = args.port.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Port required for socket mode")
        })?;
        Ok(CommMode::Socket(port))
    } else {
        Ok(CommMode::Stdio)
    }
}

fn build_service() -> (
    LspService<GroovyBackend>,
    tower_lsp::ClientSocket,
) {
    let scan_cache = Arc::new(SharedScanCache::new(ScanCacheConfig::default()));
    let index_cache = Arc::new(SharedIndexCache::new());
    LspService::build(move |client| GroovyBackend::new(client, scan_cache, index_cache))
        .custom_method("groovyLsp/decompiledSource", GroovyBackend::decompiled_source)
        .finish()
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    init_logger(args.no_color, Some(&args.log_level))?;
    let mode = comm_mode(&args)?;

    if let Some(pid) = args.client_process_id {
        info!("serving client process {pid}");
    }

    match mode {
        CommMode::Stdio => {
            info!("starting groovy language server on stdio");
            let (service, socket) = build_service();
            Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
                .serve(service)
                .await;
        }
        CommMode::Socket(port) => {
            let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
                error!("cannot bind 127.0.0.1:{port}: {e}");
                e
            })?;
            info!("listening on 127.0.0.1:{port}");
            let (stream, peer) = listener.accept().await?;
            info!("client connected from {peer}");
            let (read, write) = tokio::io::split(stream);
            let (service, socket) = build_service();
            Server::new(read, write, socket).serve(service).await;
        }
    }

    info!("groovy language server exiting");
    Ok(())
}
