//! Line-search providers.
//!
//! [`CommandLineSearch`] delegates row finding to an external program, invoked
//! as `program [args…] <comma-joined terms> <absolute path>`, whose stdout is
//! `term:row:context` records ending at the first empty line.
//! [`build_line_search`] picks the provider from `[line_search]`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use cinder_search_core::error::{Result, SearchError};
use cinder_search_core::rows::{parse_line_search_output, LineHit, LineSearch, ScanLineSearch};

use crate::config::LineSearchConfig;

/// Runs an external line-search program.
pub struct CommandLineSearch {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandLineSearch {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl LineSearch for CommandLineSearch {
    fn name(&self) -> &str {
        "command"
    }

    async fn search(&self, path: &Path, terms: &[String]) -> Result<Vec<LineHit>> {
        let absolute = std::path::absolute(path).map_err(|e| SearchError::io(path, e))?;
        debug!(program = %self.program.display(), path = %absolute.display(), "running line search");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(terms.join(","))
            .arg(&absolute)
            .output()
            .await
            .map_err(|e| {
                SearchError::LineSearch(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SearchError::LineSearch(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        parse_line_search_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Build the configured provider.
pub fn build_line_search(config: &LineSearchConfig) -> anyhow::Result<Box<dyn LineSearch>> {
    match config.provider.as_str() {
        "scan" => Ok(Box::new(ScanLineSearch)),
        "command" => {
            let program = config
                .command
                .clone()
                .ok_or_else(|| anyhow::anyhow!("line_search.command is not set"))?;
            Ok(Box::new(CommandLineSearch::new(program, config.args.clone())))
        }
        other => anyhow::bail!("Unknown line_search provider: '{}'", other),
    }
}
