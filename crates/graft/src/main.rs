use std::process;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use graft::dom::Document;
use graft::loader::{
    DEFAULT_MOUNT_ID, FragmentDescriptor, FragmentLoader, LoadStatus, ScriptActivationHook,
};
use graft::service::HostService;
use graft::transport::{ServerConfig, serve};
use graft::{GRAFT_VERSION, channel};

#[derive(Debug)]
struct Args {
    fragment_url: String,
    host: String,
    port: u16,
    mount_id: String,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: graftd --fragment-url <url> [--host <addr>] [--port <port>] [--mount-id <id>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --fragment-url <url>  Base URL the remote fragment is served from");
            eprintln!("  --host <addr>         Bind address [default: 127.0.0.1]");
            eprintln!("  --port <port>         Bind port [default: 5002]");
            eprintln!("  --mount-id <id>       Mount point element id [default: {DEFAULT_MOUNT_ID}]");
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut fragment_url: Option<String> = None;
    let mut host = "127.0.0.1".to_string();
    let mut port: u16 = 5002;
    let mut mount_id = DEFAULT_MOUNT_ID.to_string();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--fragment-url" => {
                i += 1;
                fragment_url = Some(args.get(i).ok_or("--fragment-url requires a value")?.clone());
            }
            "--host" => {
                i += 1;
                host = args.get(i).ok_or("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .ok_or("--port requires a value")?
                    .parse()
                    .map_err(|_| "--port must be a number".to_string())?;
            }
            "--mount-id" => {
                i += 1;
                mount_id = args.get(i).ok_or("--mount-id requires a value")?.clone();
            }
            "--help" | "-h" => return Err("".to_string()),
            arg => return Err(format!("unknown argument: {arg}")),
        }
        i += 1;
    }

    let fragment_url = fragment_url.ok_or("missing required argument: --fragment-url")?;
    Ok(Args {
        fragment_url,
        host,
        port,
        mount_id,
    })
}

#[tokio::main]
async fn run(args: Args) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = GRAFT_VERSION, fragment_url = %args.fragment_url, "graftd starting");

    let document = Document::new();

    // Stand-in for the fragment's own script: once activated, register the
    // fragment-side observer and log everything the host posts.
    let hook: ScriptActivationHook = Arc::new(|handle, src| {
        tracing::info!(%src, "Fragment script activated; registering fragment observer");
        channel::subscribe(handle, |envelope| {
            tracing::info!(time = %envelope.time, message = %envelope.message, "Fragment received message");
        })
        .detach();
    });

    let loader = Arc::new(
        FragmentLoader::new(FragmentDescriptor::new(args.fragment_url)).with_activation_hook(hook),
    );
    let handle = loader.mount(&document, &args.mount_id);

    let (status_tx, status_rx) = watch::channel(LoadStatus::Loading);
    loader.spawn(handle.clone(), status_tx);

    let service = Arc::new(HostService::new(handle, status_rx));
    let config = ServerConfig {
        host: args.host,
        port: args.port,
    };
    serve(config, service).await
}
