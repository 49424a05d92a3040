//! Client command implementations.

use super::OutputFormat;
use nskv_server::KvClient;
use serde::Serialize;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Result of a client command, as printed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Output {
    /// Get result. `value` is absent for a missing key.
    Get {
        /// Namespace.
        namespace: String,
        /// Key.
        key: String,
        /// Value, lossily decoded as UTF-8.
        value: Option<String>,
    },
    /// Put result.
    Put {
        /// Namespace.
        namespace: String,
        /// Key.
        key: String,
        /// Whether the key was newly added.
        added: bool,
    },
    /// Del result.
    Del {
        /// Namespace.
        namespace: String,
        /// Key or prefix.
        key: String,
        /// Number of keys removed.
        deleted: i64,
    },
    /// Exists result.
    Exists {
        /// Namespace.
        namespace: String,
        /// Key.
        key: String,
        /// Whether the key is present.
        exists: bool,
    },
    /// Keys result, sorted for display.
    Keys {
        /// Namespace.
        namespace: String,
        /// Prefix searched.
        prefix: String,
        /// Matching keys.
        keys: Vec<String>,
    },
}

impl Output {
    /// Renders the result in the requested format.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Text => Ok(match self {
                Output::Get { value: Some(v), .. } => v.clone(),
                Output::Get { key, value: None, .. } => format!("(not found: {key})"),
                Output::Put { added: true, .. } => "added".to_string(),
                Output::Put { added: false, .. } => "updated".to_string(),
                Output::Del { deleted, .. } => format!("deleted {deleted}"),
                Output::Exists { exists, .. } => exists.to_string(),
                Output::Keys { keys, .. } => keys.join("\n"),
            }),
        }
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn print(output: &Output, format: OutputFormat) -> CmdResult {
    let rendered = output.render(format)?;
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}

async fn connect(addr: &str) -> Result<KvClient, Box<dyn std::error::Error>> {
    tracing::debug!(addr, "connecting");
    KvClient::connect(addr)
        .await
        .map_err(|e| format!("Failed to connect to {addr}: {e}").into())
}

/// Runs the get command.
pub async fn get(addr: &str, namespace: &str, key: &str, format: OutputFormat) -> CmdResult {
    let mut client = connect(addr).await?;
    let value = client.get(namespace, key.as_bytes()).await?;
    print(
        &Output::Get {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            value: value.as_deref().map(text),
        },
        format,
    )
}

/// Runs the put command.
pub async fn put(
    addr: &str,
    namespace: &str,
    key: &str,
    value: &str,
    overwrite: bool,
    format: OutputFormat,
) -> CmdResult {
    let mut client = connect(addr).await?;
    let added = client
        .put(namespace, key.as_bytes(), value.as_bytes(), overwrite)
        .await?;
    print(
        &Output::Put {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            added,
        },
        format,
    )
}

/// Runs the del command.
pub async fn del(
    addr: &str,
    namespace: &str,
    key: &str,
    by_prefix: bool,
    format: OutputFormat,
) -> CmdResult {
    let mut client = connect(addr).await?;
    let deleted = client.del(namespace, key.as_bytes(), by_prefix).await?;
    print(
        &Output::Del {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            deleted,
        },
        format,
    )
}

/// Runs the exists command.
pub async fn exists(addr: &str, namespace: &str, key: &str, format: OutputFormat) -> CmdResult {
    let mut client = connect(addr).await?;
    let exists = client.exists(namespace, key.as_bytes()).await?;
    print(
        &Output::Exists {
            namespace: namespace.to_owned(),
            key: key.to_owned(),
            exists,
        },
        format,
    )
}

/// Runs the keys command.
pub async fn keys(addr: &str, namespace: &str, prefix: &str, format: OutputFormat) -> CmdResult {
    let mut client = connect(addr).await?;
    let mut keys: Vec<String> = client
        .keys(namespace, prefix.as_bytes())
        .await?
        .iter()
        .map(|k| text(k))
        .collect();
    keys.sort();
    print(
        &Output::Keys {
            namespace: namespace.to_owned(),
            prefix: prefix.to_owned(),
            keys,
        },
        format,
    )
}
