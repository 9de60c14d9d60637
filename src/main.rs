#![forbid(unsafe_code)]

mod config;
mod error;
mod gui;
mod net;
mod qr;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use config::Settings;
use server::serve::{self, ServeOptions};

#[derive(Parser, Debug)]
#[command(name = "quickserve", version, about = "Serve a local folder over HTTP from a small desktop window")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Folder to pre-fill in the GUI
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Preferred port to pre-fill in the GUI
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Address the server binds to
    #[arg(long)]
    bind: Option<IpAddr>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a folder in the foreground without the GUI
    Serve {
        /// Folder to serve
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[arg(long, default_value_t = 8000)]
        port: u16,

        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
        bind: IpAddr,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Serve { dir, port, bind }) => run_serve(dir, port, bind),
        None => run_gui(cli),
    }
}

fn run_serve(dir: PathBuf, port: u16, bind: IpAddr) -> Result<()> {
    // stdout is what the GUI log view reads, so keep lines plain
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stdout)
        .with_ansi(false)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Err(e) = serve::run(ServeOptions { root: dir, port, bind }) {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}

fn run_gui(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref());
    if let Some(folder) = cli.folder {
        settings.folder = folder.display().to_string();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(bind) = cli.bind {
        settings.set_bind_address(bind);
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.tracing_level())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    info!("settings={:#?}", settings);

    gui::run_gui(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["quickserve", "serve"]).unwrap();
        match cli.command {
            Some(Command::Serve { dir, port, bind }) => {
                assert_eq!(dir, PathBuf::from("."));
                assert_eq!(port, 8000);
                assert!(bind.is_unspecified());
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_gui_overrides() {
        let cli = Cli::try_parse_from([
            "quickserve", "--folder", "/srv", "--port", "8080", "--bind", "127.0.0.1",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.bind, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_port_zero_rejected() {
        assert!(Cli::try_parse_from(["quickserve", "--port", "0"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
