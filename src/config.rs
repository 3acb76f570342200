//! Endpoint discovery from supervisord.conf.
//!
//! Only the subset of the INI format supervisord actually uses for its RPC
//! endpoints is understood: `[section]` headers, `key = value` pairs and
//! `;`/`#` comment lines. Python-style multiline values are not supported.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where supervisord installs its config by default.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/supervisord.conf";

/// The `[inet_http_server]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct InetHttpServer {
    /// `host:port` listen address; a `*` host is normalized to 127.0.0.1.
    pub server_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// RPC endpoints extracted from a supervisord.conf.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcConfig {
    pub inet_http_server: Option<InetHttpServer>,
    /// From `[supervisorctl] serverurl` when it is a `unix://` URL.
    pub unix_socket: Option<PathBuf>,
}

/// Reads and parses the RPC endpoint sections of a supervisord.conf.
pub fn parse_rpc_config(path: impl AsRef<Path>) -> Result<RpcConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::Config(format!("cannot read {}: {e}", path.as_ref().display()))
    })?;
    Ok(parse_rpc_config_str(&contents))
}

pub(crate) fn parse_rpc_config_str(contents: &str) -> RpcConfig {
    let mut config = RpcConfig::default();

    let http = section(contents, "inet_http_server");
    if let Some(port) = http.get("port") {
        config.inet_http_server = Some(InetHttpServer {
            server_url: normalize_listen_address(port),
            username: http.get("username").cloned(),
            password: http.get("password").cloned(),
        });
    }

    if let Some(serverurl) = section(contents, "supervisorctl").get("serverurl")
        && let Some(path) = serverurl.strip_prefix("unix://")
    {
        config.unix_socket = Some(PathBuf::from(path));
    }

    config
}

/// Returns the key/value pairs of the `program:NAME` section, as supervisorctl
/// shows them. Errors if the section is absent.
pub fn program_options(
    config_file: impl AsRef<Path>,
    name: &str,
) -> Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(config_file.as_ref()).map_err(|e| {
        Error::Config(format!("cannot read {}: {e}", config_file.as_ref().display()))
    })?;
    let options = section(&contents, &format!("program:{name}"));
    if options.is_empty() {
        return Err(Error::Config(format!("no [program:{name}] section")));
    }
    Ok(options)
}

/// Collects the `key = value` pairs of one section.
fn section(contents: &str, wanted: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let mut in_section = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = header.trim() == wanted;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            pairs.insert(key.trim().to_string(), strip_inline_comment(value));
        }
    }

    pairs
}

fn strip_inline_comment(value: &str) -> String {
    // supervisord treats " ;" as a trailing comment
    match value.find(" ;") {
        Some(i) => value[..i].trim().to_string(),
        None => value.trim().to_string(),
    }
}

/// supervisord accepts `*:9001` to listen on all interfaces; for connecting we
/// need a concrete host.
fn normalize_listen_address(port: &str) -> String {
    match port.strip_prefix("*:") {
        Some(rest) => format!("127.0.0.1:{rest}"),
        None if !port.contains(':') => format!("127.0.0.1:{port}"),
        None => port.to_string(),
    }
}
