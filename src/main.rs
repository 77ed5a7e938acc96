use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use daria_desktop::api::HttpBackend;
use daria_desktop::config::{default_config_file, load_config, set_config, ClientConfig};
use daria_desktop::desktop::{run_desktop, TerminalNotifier};
use daria_desktop::geometry::Viewport;
use daria_desktop::logging::init_logging;
use daria_desktop::session::Session;
use daria_desktop::ui::{init_terminal, restore_terminal};

const USAGE: &str = "usage: daria-desktop [--server URL] [--config PATH] [--mobile]";

#[derive(Debug, Default)]
struct Args {
    server: Option<String>,
    config: Option<PathBuf>,
    mobile: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Args>> {
    let mut out = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--server" => out.server = Some(args.next().context("--server needs a URL")?),
            "--config" => out.config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--mobile" => out.mobile = true,
            "-h" | "--help" => return Ok(None),
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }
    Ok(Some(out))
}

fn build_config(args: &Args) -> ClientConfig {
    let path = args.config.clone().unwrap_or_else(default_config_file);
    let mut config = load_config(&path);
    if let Some(server) = &args.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }
    if args.mobile {
        config.force_mobile = true;
    }
    config
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let Some(args) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };
    let config = build_config(&args);
    init_logging(&config.log_filter, &config.log_path())?;
    set_config(config.clone());
    info!(server = %config.server_url, "starting");

    let backend = Arc::new(HttpBackend::new(&config.server_url)?);
    let mut session = Session::new(
        config,
        backend,
        Box::new(TerminalNotifier),
        StdRng::from_entropy(),
        Viewport::default(),
    );

    // Put the terminal back before the default hook prints the panic.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::DisableMouseCapture,
            crossterm::terminal::LeaveAlternateScreen
        );
        default_hook(panic);
    }));

    let mut terminal = init_terminal()?;
    let result = run_desktop(&mut terminal, &mut session).await;
    restore_terminal(&mut terminal).ok();

    if let Err(err) = &result {
        error!(%err, "desktop exited with an error");
    }
    result
}
