//! ultra-harvest command line host
//!
//! Lists or downloads the files on a course page, or answers JSON requests
//! read line by line from stdin.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use ultra_harvest::browser::DownloadTracker;
use ultra_harvest::download::display_name;
use ultra_harvest::{
    BrowserSession, ClickDownloadsResponse, ConnectionOptions, GetFilesResponse, HarvestConfig, HarvestRequest,
    LaunchOptions, ToolResult,
};

/// Where downloads land when no directory is given; headless Chrome drops them otherwise
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Silence after which no further downloads are expected
const DOWNLOAD_QUIET: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ultra-harvest")]
#[command(version)]
#[command(about = "Find and download course files hidden in LMS pages", long_about = None)]
struct Cli {
    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H', global = true)]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH", global = true)]
    executable_path: Option<PathBuf>,

    /// WebSocket endpoint of an already running browser
    #[arg(long, value_name = "URL", global = true)]
    ws_endpoint: Option<String>,

    /// Persistent browser profile directory (keeps the LMS login)
    #[arg(long, value_name = "DIR", global = true)]
    user_data_dir: Option<PathBuf>,

    /// Disable the Chrome sandbox
    #[arg(long, global = true)]
    no_sandbox: bool,

    /// Save downloads into this directory without prompting
    /// (default for `download`, and for headless `serve`: ./downloads)
    #[arg(long, value_name = "DIR", global = true)]
    download_dir: Option<PathBuf>,

    /// Seconds to wait for started downloads to finish before closing the browser
    #[arg(long, value_name = "SECS", default_value = "300", global = true)]
    download_timeout_secs: u64,

    /// JSON file with harvest settings
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Upper bound on expansion passes
    #[arg(long, global = true)]
    max_passes: Option<usize>,

    /// Most menu triggers opened when downloading
    #[arg(long, global = true)]
    overflow_limit: Option<usize>,

    /// Milliseconds to let the page render after it loads
    #[arg(long, value_name = "MS", default_value = "2000", global = true)]
    render_wait_ms: u64,

    /// Print responses as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every file URL on a page
    Files {
        /// Course page URL
        url: String,
    },
    /// Start a download for every file on a page
    Download {
        /// Course page URL
        url: String,
    },
    /// Answer JSON requests from stdin, one per line
    Serve {
        /// Page to open before reading requests
        url: Option<String>,
    },
}

impl Cli {
    fn harvest_config(&self) -> Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_json_file(path)?,
            None => HarvestConfig::default(),
        };
        if let Some(passes) = self.max_passes {
            config = config.max_passes(passes);
        }
        if let Some(limit) = self.overflow_limit {
            config = config.overflow_limit(limit);
        }
        Ok(config)
    }

    /// The explicit download directory, or the default wherever downloads would otherwise be lost
    fn download_dir(&self) -> Option<PathBuf> {
        let needs_dir = match self.command {
            Command::Download { .. } => true,
            Command::Serve { .. } => !self.headed,
            Command::Files { .. } => false,
        };
        self.download_dir
            .clone()
            .or_else(|| needs_dir.then(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)))
    }

    fn open_session(&self) -> Result<(BrowserSession, Option<DownloadTracker>)> {
        let session = match &self.ws_endpoint {
            Some(endpoint) => BrowserSession::connect(ConnectionOptions::new(endpoint))?,
            None => {
                let mut options = LaunchOptions::new().headless(!self.headed).sandbox(!self.no_sandbox);
                if let Some(path) = &self.executable_path {
                    options = options.chrome_path(path);
                }
                if let Some(dir) = &self.user_data_dir {
                    options = options.user_data_dir(dir);
                }
                BrowserSession::launch(options)?
            }
        };

        let session = session.with_config(self.harvest_config()?);
        let tracker = match self.download_dir() {
            Some(dir) => {
                std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
                Some(session.allow_downloads(&dir)?)
            }
            None => None,
        };
        Ok((session, tracker))
    }
}

fn open_page(session: &BrowserSession, url: &str, render_wait_ms: u64) -> Result<()> {
    session.execute_tool("navigate", json!({ "url": url, "render_wait_ms": render_wait_ms }))?;
    Ok(())
}

fn payload<T: serde::de::DeserializeOwned>(result: ToolResult) -> Result<T> {
    match result {
        ToolResult { success: true, data: Some(data), .. } => Ok(serde_json::from_value(data)?),
        ToolResult { error, .. } => bail!(error.unwrap_or_else(|| "Request failed".to_string())),
    }
}

fn list_files(session: &BrowserSession, as_json: bool) -> Result<()> {
    let files: GetFilesResponse = payload(session.handle(&HarvestRequest::GetFiles)?)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else if files.files.is_empty() {
        println!("No files found. Try refreshing the page or expanding content sections manually.");
    } else {
        for url in &files.files {
            println!("{}\t{}", display_name(url), url);
        }
    }
    Ok(())
}

fn download_all(session: &BrowserSession, tracker: &DownloadTracker, timeout: Duration, as_json: bool) -> Result<()> {
    let files: GetFilesResponse = payload(session.handle(&HarvestRequest::GetFiles)?)?;
    if files.files.is_empty() {
        println!("No files found. Try refreshing the page or expanding content sections manually.");
        return Ok(());
    }

    let response: ClickDownloadsResponse = payload(session.handle(&HarvestRequest::ClickDownloads)?)?;
    if !as_json {
        println!("Downloads started: {} files", response.total_started());
    }

    // The browser dies with the session, so in-flight downloads must land first
    let tally = tracker.wait_idle(response.total_started(), DOWNLOAD_QUIET, timeout);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "downloads": response, "finished": tally }))?);
    } else {
        println!(
            "Downloads finished: {} completed, {} canceled, {} unfinished",
            tally.completed, tally.canceled, tally.pending
        );
    }
    Ok(())
}

/// One response line for one request line
fn answer(session: &BrowserSession, line: &str) -> Value {
    let request: HarvestRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return json!({ "error": format!("Invalid request: {}", e) }),
    };

    match session.handle(&request) {
        Ok(ToolResult { success: true, data, .. }) => data.unwrap_or(Value::Null),
        Ok(ToolResult { error, .. }) => json!({ "error": error.unwrap_or_else(|| "Request failed".to_string()) }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

fn serve(session: &BrowserSession) -> Result<()> {
    let tools = session.tool_registry().names().collect::<Vec<_>>().join(", ");
    log::info!("Serving tools: {}", tools);
    eprintln!("Ready to accept requests on stdin");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = answer(session, &line);
        writeln!(stdout, "{}", response)?;
        stdout.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_defaults_a_directory() {
        let cli = Cli::parse_from(["ultra-harvest", "download", "https://lms.test/course"]);
        assert_eq!(cli.download_dir(), Some(PathBuf::from(DEFAULT_DOWNLOAD_DIR)));
        assert_eq!(cli.download_timeout_secs, 300);

        let cli = Cli::parse_from(["ultra-harvest", "download", "https://lms.test/course", "--download-dir", "out"]);
        assert_eq!(cli.download_dir(), Some(PathBuf::from("out")));
    }

    #[test]
    fn test_directory_only_where_downloads_happen() {
        let cli = Cli::parse_from(["ultra-harvest", "files", "https://lms.test/course"]);
        assert_eq!(cli.download_dir(), None);

        let cli = Cli::parse_from(["ultra-harvest", "serve"]);
        assert_eq!(cli.download_dir(), Some(PathBuf::from(DEFAULT_DOWNLOAD_DIR)));

        let cli = Cli::parse_from(["ultra-harvest", "--headed", "serve"]);
        assert_eq!(cli.download_dir(), None);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    eprintln!("ultra-harvest v{}", env!("CARGO_PKG_VERSION"));
    let (session, tracker) = cli.open_session()?;

    match &cli.command {
        Command::Files { url } => {
            open_page(&session, url, cli.render_wait_ms)?;
            list_files(&session, cli.json)
        }
        Command::Download { url } => {
            open_page(&session, url, cli.render_wait_ms)?;
            let tracker = tracker.context("Downloads need a download directory")?;
            download_all(&session, &tracker, Duration::from_secs(cli.download_timeout_secs), cli.json)
        }
        Command::Serve { url } => {
            if let Some(url) = url {
                open_page(&session, url, cli.render_wait_ms)?;
            }
            serve(&session)
        }
    }
}
