//! Main CLI application structure

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;

use crate::config::{BuildConfig, ProjectConfig, Workspace, BUILD_FILE_SUFFIX};
use crate::pipeline::{BuildPipeline, ProcessRunner, RunStatus};
use crate::toolchain::CommandLine;

use super::output::Output;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Incremental build orchestrator for C/C++ projects")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the given configuration
    Build {
        /// Name of the build configuration
        name: String,

        /// Print each synthesized compiler command instead of executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the given configuration, building first if the target binary is
    /// not found
    Run {
        /// Name of the build configuration
        name: String,
    },

    /// Generate a template for a new build configuration
    New {
        /// Name of the new configuration
        name: String,
    },

    /// List available build configurations
    List,

    /// Initialize a kiln workspace
    Init,

    /// Update to the latest release
    Update,

    /// Download a fresh copy of the current version
    Repair,
}

/// Parses arguments and executes the requested command
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { name, dry_run } => build(&name, dry_run),
        Commands::Run { name } => run_target(&name),
        Commands::New { name } => new_config(&name),
        Commands::List => list(),
        Commands::Init => not_implemented("Workspace initialization"),
        Commands::Update => not_implemented("Update"),
        Commands::Repair => not_implemented("Repair"),
    }
}

/// Placeholder actions report an explicit not-implemented outcome instead
/// of silently doing nothing
fn not_implemented(action: &str) -> Result<()> {
    bail!("{action} requested, but this action is not implemented yet");
}

/// Discovers the workspace and loads the immutable root configuration
///
/// Failures here are fatal: nothing runs without a project root and a
/// valid root config.
fn open_workspace() -> Result<(Workspace, ProjectConfig)> {
    let workspace = Workspace::discover()?;
    let project = ProjectConfig::load(workspace.config_dir())
        .context("Could not load the root configuration")?;
    Ok((workspace, project))
}

fn open_log(workspace: &Workspace, project: &ProjectConfig) -> Result<Output> {
    let log_path = project.log_path(workspace.project_root());
    let output = Output::with_log_file(&log_path).context("Could not open the log file")?;
    output.info_print_only(&format!("Logging to file '{}'", log_path.display()));
    output.info_log_only(&format!(
        "Project root directory detected as '{}'",
        workspace.project_root().display()
    ));
    Ok(output)
}

fn build(name: &str, dry_run: bool) -> Result<()> {
    let (workspace, project) = open_workspace()?;
    let build = BuildConfig::load(workspace.config_dir(), name)
        .with_context(|| format!("Could not load build configuration '{name}'"))?;

    let output = open_log(&workspace, &project)?;
    let _lock = workspace.lock()?;

    let mut pipeline = BuildPipeline::new(&project, &build, &output, workspace.project_root())?
        .dry_run(dry_run);
    let report = pipeline.run()?;

    if report.halted {
        output.warning_log_only("Operation exited with a failure result");
        bail!("build '{name}' halted");
    }

    output.info_log_only("Operation exited with code 0");
    Ok(())
}

fn run_target(name: &str) -> Result<()> {
    let (workspace, project) = open_workspace()?;
    let build = BuildConfig::load(workspace.config_dir(), name)
        .with_context(|| format!("Could not load build configuration '{name}'"))?;

    let output = open_log(&workspace, &project)?;
    let _lock = workspace.lock()?;

    let mut pipeline = BuildPipeline::new(&project, &build, &output, workspace.project_root())?;
    let target = pipeline.final_target_path()?;

    if !target.is_file() {
        output.info(&format!(
            "Target '{}' not found, building first",
            target.display()
        ));
        let report = pipeline.run()?;
        if report.halted {
            bail!("build '{name}' halted");
        }
    }

    let command = CommandLine {
        program: target.display().to_string(),
        args: vec![],
    };
    let result = ProcessRunner::new(&output, None, None).execute(&command)?;

    match result.status {
        RunStatus::Success => Ok(()),
        RunStatus::NonZeroExit(code) => bail!("'{}' exited with code {code}", target.display()),
    }
}

fn new_config(name: &str) -> Result<()> {
    let workspace = Workspace::discover()?;
    let path = workspace
        .config_dir()
        .join(format!("{name}{BUILD_FILE_SUFFIX}"));

    if path.exists() {
        bail!("Build configuration '{name}' already exists");
    }

    fs::write(&path, build_template(name))
        .with_context(|| format!("Could not write '{}'", path.display()))?;
    println!("Created build configuration '{}'", path.display());
    Ok(())
}

fn list() -> Result<()> {
    let workspace = Workspace::discover()?;
    let builds = workspace.available_builds()?;

    println!("Available Build Configurations:");
    for name in builds {
        println!("    {name}");
    }
    Ok(())
}

fn build_template(name: &str) -> String {
    format!(
        r#"{{
    "shared": {{
        "sourceExtension": {{
            "appliesTo": "all",
            "value": "c"
        }}
    }},
    "steps": {{
        "main": {{
            "targetName": "{name}",
            "targetType": "standalone",
            "sourceExtension": "kiln_lookup",
            "includeDirectories": ["include"],
            "sourceDirectories": ["src"],
            "defines": {{}},
            "additionalArguments": []
        }}
    }}
}}
"#
    )
}
