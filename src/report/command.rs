//! Shell-command adapters for extraction and rendering.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use super::{DocumentExtractor, ReportRenderer, StructuredReport};
use crate::error::{EarbotError, Result};

/// A command line with `{input}` and `{output}` placeholders, run through `sh -c`
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub template: String,
    pub timeout: Duration,
}

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line with placeholders replaced by shell-quoted paths
    pub fn expand(&self, input: &Path, output: Option<&Path>) -> String {
        let mut line = self.template.replace("{input}", &shell_quote(&input.display().to_string()));
        if let Some(output) = output {
            line = line.replace("{output}", &shell_quote(&output.display().to_string()));
        }
        line
    }

    /// Run the expanded command and return its stdout
    async fn run(&self, input: &Path, output: Option<&Path>) -> Result<String> {
        let line = self.expand(input, output);
        debug!("Running: {}", line);

        let result = tokio::time::timeout(self.timeout, Command::new("sh").args(["-c", &line]).output()).await;
        match result {
            Ok(Ok(out)) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).to_string()),
            Ok(Ok(out)) => Err(EarbotError::Document(format!(
                "'{}' exited with {}: {}",
                line,
                out.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Ok(Err(e)) => Err(EarbotError::Document(format!("failed to run '{}': {}", line, e))),
            Err(_) => Err(EarbotError::Document(format!(
                "'{}' timed out after {:?}",
                line, self.timeout
            ))),
        }
    }
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Extractor whose command prints the report YAML on stdout
pub struct CommandExtractor {
    command: CommandTemplate,
}

impl CommandExtractor {
    pub fn new(command: CommandTemplate) -> Self {
        Self { command }
    }
}

#[async_trait]
impl DocumentExtractor for CommandExtractor {
    async fn extract(&self, source: &Path) -> Result<StructuredReport> {
        if !source.exists() {
            return Err(EarbotError::Document(format!("{} does not exist", source.display())));
        }
        let stdout = self.command.run(source, None).await?;
        StructuredReport::parse(&stdout)
    }
}

/// Renderer that writes the report YAML next to `output` and runs a command on it
pub struct CommandRenderer {
    command: CommandTemplate,
}

impl CommandRenderer {
    pub fn new(command: CommandTemplate) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ReportRenderer for CommandRenderer {
    async fn render(&self, report: &StructuredReport, output: &Path) -> Result<()> {
        if let Some(dir) = output.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let input = output.with_extension("yaml");
        tokio::fs::write(&input, report.with_placeholders().to_yaml()?).await?;
        self.command.run(&input, Some(output)).await?;
        info!("Rendered report {}", output.display());
        Ok(())
    }
}
