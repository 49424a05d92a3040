//! CLI command implementations.

pub mod kv;
pub mod serve;

/// How client commands print their results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain lines.
    Text,
    /// One JSON document.
    Json,
}

impl OutputFormat {
    /// Parses the `--format` flag.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown format: {other}")),
        }
    }
}
