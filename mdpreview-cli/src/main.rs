//! mdpreview - live markdown preview and editor for a single file

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use mdpreview_core::{Config, CoreEngine, RenderMode};
use mdpreview_renderer::RendererPlugin;
use mdpreview_server::ServerPlugin;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

/// CLI arguments structure
#[derive(Debug, Clone)]
pub struct Args {
    pub file: PathBuf,
    pub addr: Option<String>,
    pub api: bool,
    pub debug: bool,
    pub config_file: Option<PathBuf>,
}

impl Args {
    fn command() -> Command {
        Command::new("mdpreview")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Preview and edit a markdown file in the browser")
            .long_about(
                "Serves a markdown file over HTTP, pushes a fresh rendering to every \
                connected browser whenever the file changes on disk, and writes edits \
                made in the browser back to the file atomically.",
            )
            .arg(
                Arg::new("file")
                    .help("Markdown file to serve")
                    .required(true)
                    .index(1)
                    .value_parser(clap::value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("addr")
                    .long("addr")
                    .help("Address to serve on, like :8080 or 0.0.0.0:7000")
                    .long_help(
                        "Address to serve on. An address that starts with ':' binds to \
                        127.0.0.1 on that port. Overrides the configuration file; \
                        defaults to 127.0.0.1:8080.",
                    )
                    .value_parser(clap::value_parser!(String)),
            )
            .arg(
                Arg::new("api")
                    .long("api")
                    .help("Render through the GitHub markdown API")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("debug")
                    .long("debug")
                    .help("Enable debug logging")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .help("Path to configuration file (JSON format)")
                    .value_parser(clap::value_parser!(PathBuf)),
            )
            .after_help(
                "EXAMPLES:\n    \
                mdpreview README.md                    Serve on 127.0.0.1:8080\n    \
                mdpreview --addr 0.0.0.0:7000 doc.md   Serve on all interfaces\n    \
                mdpreview --api README.md              Render through the GitHub API",
            )
    }

    /// Parse command line arguments
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    pub fn try_parse_from<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            file: matches
                .get_one::<PathBuf>("file")
                .cloned()
                .unwrap_or_default(),
            addr: matches.get_one::<String>("addr").cloned(),
            api: matches.get_flag("api"),
            debug: matches.get_flag("debug"),
            config_file: matches.get_one::<PathBuf>("config").cloned(),
        }
    }

    /// Load the configuration file, if any, and apply CLI overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config_file {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::new(),
        };

        if let Some(addr) = &self.addr {
            let (hostname, port) = split_addr(addr)?;
            config.server.hostname = hostname;
            config.server.port = port;
        }
        if self.api {
            config.render.mode = RenderMode::Github;
        }
        config.debug |= self.debug;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// `:8080` means `127.0.0.1:8080`
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("127.0.0.1{}", addr)
    } else {
        addr.to_string()
    }
}

/// Split an address into hostname and port
pub fn split_addr(addr: &str) -> Result<(String, u16)> {
    let addr = normalize_addr(addr);
    let Some((hostname, port)) = addr.rsplit_once(':') else {
        bail!("Address {} is missing a port", addr);
    };
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid port in address {}", addr))?;

    Ok((hostname.to_string(), port))
}

/// The file must exist; an unusual extension only warrants a warning
fn check_file(path: &Path) -> Result<()> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
        warn!("{} doesn't look like a Markdown file", path.display());
    }
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if debug { Level::DEBUG } else { Level::INFO })
        .with_target(debug)
        .with_line_number(debug)
        .with_file(debug);

    if debug {
        subscriber.with_ansi(true).pretty().init();
    } else {
        subscriber.with_ansi(true).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_logging(config.debug);

    check_file(&args.file)?;

    let mut engine = CoreEngine::new(config, &args.file).context("Failed to create engine")?;
    let context = engine.create_plugin_context();

    engine
        .register_plugin(Box::new(RendererPlugin::new()), &context)
        .await
        .context("Failed to start renderer")?;
    engine
        .register_plugin(Box::new(ServerPlugin::new()), &context)
        .await
        .context("Failed to start server")?;

    info!(
        "Starting mdpreview server at http://{}",
        engine.config().bind_address()
    );

    engine.run().await.context("Engine failed")?;
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_addr() {
        assert_eq!(normalize_addr(":8080"), "127.0.0.1:8080");
        assert_eq!(normalize_addr("0.0.0.0:7000"), "0.0.0.0:7000");
        assert_eq!(normalize_addr("localhost:1234"), "localhost:1234");
    }

    #[test]
    fn test_split_addr() {
        assert_eq!(
            split_addr(":8080").unwrap(),
            ("127.0.0.1".to_string(), 8080)
        );
        assert_eq!(
            split_addr("0.0.0.0:7000").unwrap(),
            ("0.0.0.0".to_string(), 7000)
        );
        assert_eq!(
            split_addr("[::1]:9000").unwrap(),
            ("[::1]".to_string(), 9000)
        );

        assert!(split_addr("localhost").is_err());
        assert!(split_addr(":http").is_err());
        assert!(split_addr(":70000").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["mdpreview", "README.md"]).unwrap();
        assert_eq!(args.file, PathBuf::from("README.md"));
        assert!(!args.api && !args.debug);

        let config = args.load_config().unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.render.mode, RenderMode::Local);
        assert!(!config.debug);
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "mdpreview",
            "--addr",
            ":7000",
            "--api",
            "--debug",
            "notes.md",
        ])
        .unwrap();

        let config = args.load_config().unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:7000");
        assert_eq!(config.render.mode, RenderMode::Github);
        assert!(config.debug);
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdpreview.json");
        std::fs::write(&path, r#"{"server": {"port": 9999}, "session": {"ping_interval_ms": 500}}"#)
            .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let args =
            Args::try_parse_from(["mdpreview", "--config", &path_arg, "README.md"]).unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.session.ping_interval_ms, 500);
        assert_eq!(config.session.read_timeout_ms, 60_000);
    }

    #[test]
    fn test_file_is_required() {
        assert!(Args::try_parse_from(["mdpreview"]).is_err());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_file(&dir.path().join("absent.md")).is_err());

        let other = dir.path().join("notes.txt");
        std::fs::write(&other, "plain").unwrap();
        assert!(check_file(&other).is_ok());
    }
}
