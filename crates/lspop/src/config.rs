//! Configuration: which server to run for a document, plus overlay and session tuning.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the server command.
pub const ENV_SERVER_CMD: &str = "LSPOP_SERVER_CMD";
/// Environment variable with whitespace-separated server arguments.
pub const ENV_SERVER_ARGS: &str = "LSPOP_SERVER_ARGS";
/// Environment variable overriding the language id sent in `didOpen`.
pub const ENV_LANGUAGE_ID: &str = "LSPOP_LANGUAGE_ID";
/// Environment variable overriding the workspace root.
pub const ENV_ROOT: &str = "LSPOP_ROOT";

/// Files whose presence marks a project root.
const ROOT_MARKERS: [&str; 6] = [
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "Gemfile",
    ".git",
];

/// How to launch a language server for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Language id for `textDocument/didOpen`.
    pub language_id: String,
    /// Workspace root sent as `rootUri`.
    pub root: PathBuf,
}

impl ServerConfig {
    /// Resolve the configuration for `document` from the process environment.
    ///
    /// Returns `None` when no command is configured and the file type has no default server.
    pub fn from_env(document: &Path) -> Option<Self> {
        Self::from_lookup(document, |key| env::var(key).ok())
    }

    /// Like [`ServerConfig::from_env`] with an explicit variable lookup.
    pub fn from_lookup(document: &Path, lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let (command, args) = match non_empty(ENV_SERVER_CMD) {
            Some(command) => {
                let args = non_empty(ENV_SERVER_ARGS)
                    .map(|args| args.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                (command, args)
            }
            None => {
                let (command, args) = default_server_command(document)?;
                (
                    command.to_string(),
                    args.iter().map(|arg| arg.to_string()).collect(),
                )
            }
        };

        let language_id =
            non_empty(ENV_LANGUAGE_ID).unwrap_or_else(|| guess_language_id(document).to_string());

        let root = non_empty(ENV_ROOT)
            .map(PathBuf::from)
            .or_else(|| find_project_root(document))
            .unwrap_or_else(|| {
                document
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf()
            });

        Some(Self {
            command,
            args,
            language_id,
            root,
        })
    }
}

fn extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Well-known server for a file type.
pub fn default_server_command(document: &Path) -> Option<(&'static str, &'static [&'static str])> {
    let server: (&'static str, &'static [&'static str]) = match extension_lowercase(document).as_str() {
        "rs" => ("rust-analyzer", &[]),
        "go" => ("gopls", &[]),
        "py" => ("pylsp", &[]),
        "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" => ("clangd", &[]),
        "js" | "jsx" | "ts" | "tsx" => ("typescript-language-server", &["--stdio"]),
        _ => return None,
    };
    Some(server)
}

/// Protocol language id for a file, `plaintext` when unknown.
pub fn guess_language_id(document: &Path) -> &'static str {
    match extension_lowercase(document).as_str() {
        "rs" => "rust",
        "toml" => "toml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "md" | "markdown" => "markdown",
        "py" => "python",
        "js" => "javascript",
        "jsx" => "javascriptreact",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "java" => "java",
        "sh" | "bash" => "shellscript",
        "html" | "htm" => "html",
        "css" => "css",
        _ => "plaintext",
    }
}

/// Nearest ancestor directory of `path` containing a project marker.
pub fn find_project_root(path: &Path) -> Option<PathBuf> {
    let mut dir = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    loop {
        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Sizing limits for overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Most completion rows shown at once.
    pub max_items: u16,
    /// Widest an overlay may get, in columns.
    pub max_width: u16,
    /// Narrowest completion menu, in columns.
    pub min_width: u16,
    /// Rows kept free between an overlay placed below the anchor and the reserved strip.
    pub safety_margin: u16,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            max_items: 10,
            max_width: 60,
            min_width: 12,
            safety_margin: 1,
        }
    }
}

/// Protocol session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Keep the pending slot installed after a completion reply, so replies to earlier queries of
    /// a typing streak are still delivered.
    pub retain_completion_slot: bool,
    /// Most undrained events kept; the oldest are dropped beyond this.
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retain_completion_slot: true,
            event_capacity: 256,
        }
    }
}
