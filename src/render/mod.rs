//! HTML to image rendering through an external process.

use crate::error::ReportError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Turns an HTML page into PNG bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ReportError>;
}

/// Renderer that shells out to a program such as `wkhtmltoimage`.
///
/// The program is invoked as `<program> <args...> <html path> <png path>`
/// and must write the image to the given path.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessRenderer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the renderer on an HTML file, writing `output`.
    pub async fn render_file(&self, html_path: &Path, output: &Path) -> Result<(), ReportError> {
        debug!(
            "Rendering {} -> {} with {}",
            html_path.display(),
            output.display(),
            self.program.display()
        );

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(html_path)
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ReportError::Render(format!("failed to run {}: {}", self.program.display(), e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ReportError::Render(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        if !output.is_file() {
            return Err(ReportError::Render(format!(
                "renderer did not produce {}",
                output.display()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Renderer for ProcessRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ReportError> {
        let scratch = TempDir::new()
            .map_err(|e| ReportError::Render(format!("failed to create scratch directory: {}", e)))?;
        let html_path = scratch.path().join("report.html");
        let png_path = scratch.path().join("report.png");

        tokio::fs::write(&html_path, html)
            .await
            .map_err(|e| ReportError::Render(format!("failed to write HTML: {}", e)))?;

        self.render_file(&html_path, &png_path).await?;

        tokio::fs::read(&png_path)
            .await
            .map_err(|e| ReportError::Render(format!("failed to read rendered image: {}", e)))
    }
}
