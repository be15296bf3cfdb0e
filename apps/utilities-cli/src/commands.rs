use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use utilities_http::Diagnostics;
use utilities_resources::{Applied, Provider};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP fetch described by a YAML request file and print the state
    Fetch {
        /// Request file: `url`, `method`, `request_headers`, `retry`, ...
        #[arg(short = 'c', long = "request")]
        request: PathBuf,
    },
    /// Print a freshly generated nanoid
    Nanoid {
        #[arg(long)]
        alphabet: Option<String>,
        #[arg(long)]
        length: Option<i64>,
    },
    /// Download a URL once, whatever the status, and print the state
    Download { url: String },
}

/// What a command produced: text for stdout plus diagnostics for stderr.
#[derive(Debug, Default)]
pub struct Report {
    pub output: Option<String>,
    pub diagnostics: Diagnostics,
}

impl Report {
    fn from_applied(
        result: Result<Applied<Value>, Diagnostics>,
        render: impl FnOnce(&Value) -> Result<String>,
    ) -> Result<Self> {
        Ok(match result {
            Ok(applied) => Self {
                output: Some(render(&applied.state)?),
                diagnostics: applied.diagnostics,
            },
            Err(diagnostics) => Self {
                output: None,
                diagnostics,
            },
        })
    }

    /// Write the report and map it to the process exit code.
    #[must_use]
    pub fn emit(&self) -> ExitCode {
        if let Some(output) = &self.output {
            println!("{output}");
        }
        for diagnostic in &self.diagnostics {
            eprintln!("{diagnostic}");
        }
        if self.diagnostics.has_error() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

fn pretty(state: &Value) -> Result<String> {
    serde_json::to_string_pretty(state).context("failed to render state")
}

impl Command {
    /// # Errors
    /// Fails on unreadable input files; resource failures are reported as
    /// diagnostics instead.
    pub async fn run(self, provider: &Provider, cancel: &CancellationToken) -> Result<Report> {
        match self {
            Self::Fetch { request } => {
                let text = tokio::fs::read_to_string(&request)
                    .await
                    .with_context(|| format!("failed to read {}", request.display()))?;
                let config: Value = serde_saphyr::from_str(&text)
                    .with_context(|| format!("invalid request file {}", request.display()))?;
                let result = create(provider, "utilities_http", config, cancel).await?;
                Report::from_applied(result, pretty)
            }
            Self::Nanoid { alphabet, length } => {
                let mut config = Map::new();
                if let Some(alphabet) = alphabet {
                    config.insert("alphabet".to_owned(), json!(alphabet));
                }
                if let Some(length) = length {
                    config.insert("length".to_owned(), json!(length));
                }
                let result = create(provider, "utilities_nanoid", Value::Object(config), cancel)
                    .await?;
                Report::from_applied(result, |state| {
                    state["id"]
                        .as_str()
                        .map(str::to_owned)
                        .context("nanoid state has no id")
                })
            }
            Self::Download { url } => {
                let result = create(provider, "utilities_file", json!({ "url": url }), cancel).await?;
                Report::from_applied(result, pretty)
            }
        }
    }
}

async fn create(
    provider: &Provider,
    type_name: &str,
    config: Value,
    cancel: &CancellationToken,
) -> Result<Result<Applied<Value>, Diagnostics>> {
    let resource = provider
        .resource(type_name)
        .with_context(|| format!("unknown resource type {type_name}"))?;
    tracing::debug!(resource = type_name, "creating");
    Ok(resource.create(config, cancel).await)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use utilities_http::{DiagnosticKind, FetchEngine};

    fn provider() -> Provider {
        Provider::new("test", FetchEngine::default())
    }

    #[tokio::test]
    async fn test_nanoid_prints_bare_id() {
        let report = Command::Nanoid {
            alphabet: Some("ab".to_owned()),
            length: Some(10),
        }
        .run(&provider(), &CancellationToken::new())
        .await
        .unwrap();

        let id = report.output.unwrap();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c == 'a' || c == 'b'));
        assert!(report.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_nanoid_is_reported_not_raised() {
        let report = Command::Nanoid {
            alphabet: None,
            length: Some(99),
        }
        .run(&provider(), &CancellationToken::new())
        .await
        .unwrap();

        assert!(report.output.is_none());
        assert!(
            report
                .diagnostics
                .find(DiagnosticKind::InvalidConfiguration)
                .is_some()
        );
        assert!(report.diagnostics.has_error());
    }

    #[tokio::test]
    async fn test_missing_request_file_is_an_error() {
        let result = Command::Fetch {
            request: PathBuf::from("/nonexistent/request.yaml"),
        }
        .run(&provider(), &CancellationToken::new())
        .await;
        assert!(result.is_err());
    }
}
