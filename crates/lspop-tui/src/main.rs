//! Terminal demo editor for `lspop`.
//!
//! ```bash
//! cargo run -p lspop-tui -- src/main.rs
//! cargo run -p lspop-tui -- --server pylsp script.py
//! ```
//!
//! The language server comes from `--server`, then `LSPOP_SERVER_CMD`, then a built-in default
//! for the file type (`rust-analyzer` for `.rs`, `gopls` for `.go`, ...). Logs are written to
//! `--log-file` (default: `lspop.log` in the temp directory), filtered by `LSPOP_LOG`.

mod app;
mod logging;

use app::App;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use lspop::{ServerConfig, find_project_root, guess_language_id};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "lspop", version, about = "Edit a file with language server completion")]
struct Cli {
    /// File to edit (created on first save)
    file: PathBuf,

    /// Language server executable
    #[arg(long)]
    server: Option<String>,

    /// Argument for the language server (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Workspace root sent to the server
    #[arg(long)]
    root: Option<PathBuf>,

    /// Protocol language id of the file
    #[arg(long)]
    language_id: Option<String>,

    /// Do not start a language server
    #[arg(long)]
    no_server: bool,

    /// Log file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Command-line values layered over the environment and the built-in defaults.
    fn server_config(&self) -> Option<ServerConfig> {
        if self.no_server {
            return None;
        }

        let mut config = match (&self.server, ServerConfig::from_env(&self.file)) {
            (Some(command), base) => {
                let base = base.unwrap_or_else(|| ServerConfig {
                    command: String::new(),
                    args: Vec::new(),
                    language_id: guess_language_id(&self.file).to_string(),
                    root: default_root(&self.file),
                });
                ServerConfig {
                    command: command.clone(),
                    args: Vec::new(),
                    ..base
                }
            }
            (None, base) => base?,
        };

        if !self.server_args.is_empty() {
            config.args = self.server_args.clone();
        }
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(language_id) = &self.language_id {
            config.language_id = language_id.clone();
        }
        Some(config)
    }

    fn language_id(&self, config: Option<&ServerConfig>) -> String {
        self.language_id
            .clone()
            .or_else(|| config.map(|config| config.language_id.clone()))
            .unwrap_or_else(|| guess_language_id(&self.file).to_string())
    }
}

fn default_root(file: &Path) -> PathBuf {
    find_project_root(file).unwrap_or_else(|| {
        file.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf()
    })
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("lspop.log"));
    if let Err(err) = logging::init(&log_file) {
        eprintln!("logging disabled: {err}");
    }

    let server_config = cli.server_config();
    let language_id = cli.language_id(server_config.as_ref());
    let mut app = App::new(cli.file.clone(), language_id, server_config)?;

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);
    app.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        tracing::error!("editor failed: {err}");
    }
    result
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    // Draw once so the text area is known before the server asks for positions.
    terminal.draw(|frame| app.render(frame))?;
    app.start_server();

    loop {
        app.poll_server();
        terminal.draw(|frame| app.render(frame))?;

        if app.should_quit() {
            return Ok(());
        }

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_overrides_server_settings() {
        let cli = Cli::parse_from([
            "lspop",
            "--server",
            "my-ls",
            "--server-arg",
            "--stdio",
            "--root",
            "/ws",
            "notes.txt",
        ]);
        let config = cli.server_config().unwrap();
        assert_eq!(config.command, "my-ls");
        assert_eq!(config.args, vec!["--stdio".to_string()]);
        assert_eq!(config.root, PathBuf::from("/ws"));
        assert_eq!(cli.language_id(Some(&config)), config.language_id);
    }

    #[test]
    fn test_no_server_flag() {
        let cli = Cli::parse_from(["lspop", "--no-server", "main.rs"]);
        assert_eq!(cli.server_config(), None);
        assert_eq!(cli.language_id(None), "rust");
    }
}
