//! Recipe instructions and how to execute them against a host.
//!
//! Instructions are immutable and shared by every host worker of a job. Commands and
//! destinations are passed to the host verbatim unless the instruction is marked as
//! a template, in which case they are rendered fresh for each host.

use std::fmt;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;

use crate::connection::Connection;
use crate::error::RaccoonError;
use crate::host::Host;
use crate::transport::shell_quote;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Run(Run),
    Add(Add),
}

/// Execute a shell command on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub description: String,
    pub command: String,
    /// Render `command` against the host before running it.
    pub template: bool,
}

/// Copy a local file onto the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Add {
    pub description: String,
    pub source_path: PathBuf,
    /// An existing remote directory receives the file under its local name.
    pub dest_path: String,
    /// Render `dest_path` against the host before copying.
    pub template: bool,
}

/// What happened when an instruction ran on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

impl Instruction {
    pub fn run(description: impl Into<String>, command: impl Into<String>) -> Self {
        Instruction::Run(Run {
            description: description.into(),
            command: command.into(),
            template: false,
        })
    }

    pub fn add(
        description: impl Into<String>,
        source_path: impl Into<PathBuf>,
        dest_path: impl Into<String>,
    ) -> Self {
        Instruction::Add(Add {
            description: description.into(),
            source_path: source_path.into(),
            dest_path: dest_path.into(),
            template: false,
        })
    }

    /// Fill in `{{address}}`, `{{port}}`, `{{username}}` and `{{description}}` per
    /// host. Without this, `{{` reaches the remote shell untouched.
    pub fn templated(mut self) -> Self {
        match &mut self {
            Instruction::Run(run) => run.template = true,
            Instruction::Add(add) => add.template = true,
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Run(_) => "RUN",
            Instruction::Add(_) => "ADD",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Instruction::Run(run) => &run.description,
            Instruction::Add(add) => &add.description,
        }
    }

    /// Execute against one host.
    ///
    /// Failures are logged with host and instruction context and reported in the
    /// returned `Outcome`; they never abort the caller's recipe.
    pub async fn execute(&self, conn: &mut Connection) -> Outcome {
        let result = match self {
            Instruction::Run(run) => run.execute(conn).await,
            Instruction::Add(add) => add.execute(conn).await,
        };
        match result {
            Ok(()) => Outcome::Succeeded,
            Err(reason) => {
                conn.logger()
                    .instruction_error(self.kind(), self.description(), &reason);
                Outcome::Failed(reason)
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.description())
    }
}

impl Run {
    async fn execute(&self, conn: &mut Connection) -> Result<(), String> {
        let command = if self.template {
            render(&self.command, conn.host()).map_err(|e| e.to_string())?
        } else {
            self.command.clone()
        };
        let logger = conn.logger().clone();
        let session = conn.open_session().await.map_err(|e| e.to_string())?;

        logger.instruction("RUN", &self.description, &self.description);
        match session.run(&command, None).await {
            Ok(status) if status.success() => {
                logger.instruction("RUN", &self.description, format!("=== done ({}) ===", status));
                Ok(())
            }
            Ok(status) => Err(format!("'{}' exited with {}", command, status)),
            Err(e) => Err(format!("'{}' failed: {}", command, e)),
        }
    }
}

impl Add {
    async fn execute(&self, conn: &mut Connection) -> Result<(), String> {
        let dest = if self.template {
            render(&self.dest_path, conn.host()).map_err(|e| e.to_string())?
        } else {
            self.dest_path.clone()
        };
        let logger = conn.logger().clone();
        let session = conn.open_session().await.map_err(|e| e.to_string())?;

        logger.instruction("ADD", &self.description, &self.description);
        let contents = tokio::fs::read(&self.source_path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", self.source_path.display(), e))?;
        let script = upload_script(&self.source_path, &dest);
        match session.run(&script, Some(contents)).await {
            Ok(status) if status.success() => {
                logger.instruction(
                    "ADD",
                    &self.description,
                    format!("=== copied {} to {} ===", self.source_path.display(), dest),
                );
                Ok(())
            }
            Ok(status) => Err(format!(
                "copying {} to {} exited with {}",
                self.source_path.display(),
                dest,
                status
            )),
            Err(e) => Err(format!(
                "copying {} to {} failed: {}",
                self.source_path.display(),
                dest,
                e
            )),
        }
    }
}

/// Remote script that writes its stdin to `dest`, or into `dest` under the source's
/// file name when `dest` is a directory.
fn upload_script(source: &Path, dest: &str) -> String {
    let dest = shell_quote(dest);
    match source.file_name() {
        Some(name) => {
            let name = shell_quote(&name.to_string_lossy());
            format!(
                "if [ -d {dest} ]; then cat > {dest}/{name}; else cat > {dest}; fi",
                dest = dest,
                name = name
            )
        }
        None => format!("cat > {}", dest),
    }
}

fn render(template: &str, host: &Host) -> Result<String, RaccoonError> {
    if !template.contains("{{") {
        return Ok(template.to_string());
    }
    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .render_template(template, &host.template_params())
        .map_err(|e| RaccoonError::Template {
            template: template.to_string(),
            reason: e.to_string(),
        })
}
