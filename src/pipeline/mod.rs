//! # Build Pipeline
//!
//! Sequences the steps of a build configuration and drives each one to
//! completion or first failure. For every step the pipeline resolves an
//! immutable [`StepContext`], consults the dependency graph to prune
//! sources that have not changed, asks the toolchain adapter for a
//! command line and hands it to the process runner.
//!
//! The pipeline is fail-fast: the first step reporting a hard failure
//! halts the run; outputs already produced by earlier steps stay on disk.
//! Line-level warnings inside a step (a missing include directory, a
//! compiler warning) are logged and recovered locally.

mod runner;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::cli::Output;
use crate::config::{BuildConfig, ConfigError, ProjectConfig, StepContext};
use crate::domain::{DependencyGraph, Fingerprint};
use crate::toolchain::{OutputLayout, Toolchain, ToolchainError};

pub use runner::{CancelToken, ProcessResult, ProcessRunner, RunStatus, RunnerError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Runner(RunnerError),

    #[error("Build cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<RunnerError> for PipelineError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Runner(other),
        }
    }
}

/// Observable pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    StepLoaded,
    StepExecuting,
    StepSucceeded,
    Halted,
    Completed,
}

/// Outcome of one executed step, matched exhaustively by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    /// The toolchain process exited non-zero; the pipeline halts here
    NonZeroExit(i32),
}

/// Per-step accounting
#[derive(Debug)]
pub struct StepReport {
    pub step_name: String,
    pub outcome: StepOutcome,
    /// Sources handed to the compiler
    pub compiled: usize,
    /// Sources pruned in favor of their previously produced artifact
    pub reused: usize,
}

/// Result of a full pipeline run
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub steps: Vec<StepReport>,
    pub halted: bool,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        !self.halted
    }
}

/// What one step will actually compile, after staleness pruning
struct CompilePlan {
    /// Compiler inputs: stale sources, plus reused object files standing
    /// in for their unchanged sources
    inputs: Vec<PathBuf>,
    /// Fingerprints to record once the step succeeds
    to_record: Vec<(PathBuf, Fingerprint)>,
    compiled: usize,
    reused: usize,
}

/// Sequential, fail-fast build-step driver
pub struct BuildPipeline<'a> {
    project: &'a ProjectConfig,
    build: &'a BuildConfig,
    output: &'a Output,
    project_root: PathBuf,
    toolchain: Toolchain,
    graph: DependencyGraph,
    cancel: CancelToken,
    dry_run: bool,
    state: PipelineState,
    cursor: usize,
    /// Output tree has been cleared and recreated for this build name
    prepared: bool,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        project: &'a ProjectConfig,
        build: &'a BuildConfig,
        output: &'a Output,
        project_root: &Path,
    ) -> Result<Self, PipelineError> {
        let toolchain: Toolchain = project.toolchain().parse()?;

        Ok(Self {
            project,
            build,
            output,
            project_root: project_root.to_path_buf(),
            toolchain,
            graph: DependencyGraph::new(),
            cancel: CancelToken::new(),
            dry_run: false,
            state: PipelineState::Idle,
            cursor: 0,
            prepared: false,
        })
    }

    /// Print synthesized commands instead of executing them
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Seeds the pipeline with an already populated graph
    pub fn with_graph(mut self, graph: DependencyGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Runs every step in declared order, halting at the first failure
    pub fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        self.cursor = 0;
        self.state = PipelineState::Idle;

        self.output
            .info(&format!("Active toolchain is {}", self.toolchain));
        self.prepare_output_tree()?;

        let mut report = PipelineReport::default();

        while let Some(step_name) = self.load_next_step() {
            self.state = PipelineState::StepLoaded;
            if self.cancel.is_cancelled() {
                self.prepared = false;
                self.state = PipelineState::Halted;
                return Err(PipelineError::Cancelled);
            }

            let ctx = self.resolve_step(&step_name)?;

            self.output.info(&format!("Running step '{step_name}'"));
            self.state = PipelineState::StepExecuting;

            let step_report = match self.run_step(&ctx) {
                Ok(step_report) => step_report,
                Err(e) => {
                    // Mid-step failure leaves outputs unusable; the next
                    // run must re-clean
                    self.prepared = false;
                    self.state = PipelineState::Halted;
                    return Err(e);
                }
            };

            let outcome = step_report.outcome;
            report.steps.push(step_report);

            match outcome {
                StepOutcome::Succeeded => {
                    self.state = PipelineState::StepSucceeded;
                    self.output.info(&format!("Step '{step_name}' succeeded"));
                }
                StepOutcome::NonZeroExit(code) => {
                    self.state = PipelineState::Halted;
                    report.halted = true;
                    self.output.warning(&format!(
                        "Step '{step_name}' failed with exit code {code}, halting build"
                    ));
                    return Ok(report);
                }
            }
        }

        self.state = PipelineState::Completed;
        Ok(report)
    }

    /// Advances to the next step name in declared order
    fn load_next_step(&mut self) -> Option<String> {
        let name = self.build.step_names().nth(self.cursor)?.to_string();
        self.cursor += 1;
        Some(name)
    }

    /// Resolves a step and roots its relative include directories at the
    /// project root
    ///
    /// The tool may be invoked from any directory below the root, so
    /// existence checks and the paths handed to the compiler must not
    /// depend on the CWD. Absolute include directories pass through
    /// unchanged; source directories get the same treatment during
    /// planning.
    fn resolve_step(&self, step_name: &str) -> Result<StepContext, PipelineError> {
        let mut ctx = self.build.resolve_step(step_name, self.project.platform())?;
        ctx.include_directories = ctx
            .include_directories
            .iter()
            .map(|dir| self.project_root.join(dir))
            .collect();
        Ok(ctx)
    }

    /// Resolves, synthesizes and executes a single step
    fn run_step(&mut self, ctx: &StepContext) -> Result<StepReport, PipelineError> {
        let layout = self.layout();
        let plan = self.plan_sources(ctx, &layout)?;

        let synthesized = self.toolchain.synthesize(ctx, &layout, &plan.inputs);
        for warning in &synthesized.warnings {
            self.output.warning(warning);
        }

        if self.dry_run {
            self.output.info(&synthesized.command.display_line());
            return Ok(StepReport {
                step_name: ctx.step_name.clone(),
                outcome: StepOutcome::Succeeded,
                compiled: plan.compiled,
                reused: plan.reused,
            });
        }

        let runner = ProcessRunner::new(
            self.output,
            self.toolchain.error_indicator(),
            self.toolchain.warning_indicator(),
        )
        .with_cancel_token(self.cancel.clone());

        let result = runner.execute(&synthesized.command)?;

        let outcome = match result.status {
            RunStatus::Success => {
                for (path, fingerprint) in plan.to_record {
                    self.graph.record(&path, fingerprint);
                }
                StepOutcome::Succeeded
            }
            RunStatus::NonZeroExit(code) => StepOutcome::NonZeroExit(code),
        };

        Ok(StepReport {
            step_name: ctx.step_name.clone(),
            outcome,
            compiled: plan.compiled,
            reused: plan.reused,
        })
    }

    /// Enumerates source files and applies the staleness policy
    ///
    /// A source is compiled unless all evidence says it is unchanged: a
    /// graph node with a matching fingerprint AND a live object artifact
    /// newer than the source. Anything ambiguous is treated as stale.
    fn plan_sources(
        &self,
        ctx: &StepContext,
        layout: &OutputLayout,
    ) -> Result<CompilePlan, PipelineError> {
        let mut plan = CompilePlan {
            inputs: Vec::new(),
            to_record: Vec::new(),
            compiled: 0,
            reused: 0,
        };

        let suffix = format!(".{}", ctx.source_extension.trim_start_matches('.'));

        for dir in &ctx.source_directories {
            let dir = self.project_root.join(dir);
            if !dir.is_dir() {
                self.output.warning(&format!(
                    "Skipping source directory '{}' because it could not be found",
                    dir.display()
                ));
                continue;
            }

            let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.ends_with(&suffix))
                })
                .collect();
            entries.sort();

            for path in entries {
                self.plan_one_source(path, layout, &mut plan)?;
            }
        }

        Ok(plan)
    }

    fn plan_one_source(
        &self,
        path: PathBuf,
        layout: &OutputLayout,
        plan: &mut CompilePlan,
    ) -> Result<(), PipelineError> {
        let fingerprint = Fingerprint::of_file(&path)?;
        let stale = self.graph.is_stale(&path, &fingerprint);

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        if let Some(object_name) = self.toolchain.object_file_name(stem) {
            let object_path = layout.object_dir.join(object_name);

            if !stale && is_newer(&object_path, &path) {
                plan.inputs.push(object_path);
                plan.reused += 1;
                return Ok(());
            }

            // The object is out of date; remove it so the toolchain
            // regenerates it rather than silently reusing it
            if object_path.exists() {
                fs::remove_file(&object_path)?;
            }
        }

        plan.inputs.push(path.clone());
        plan.to_record.push((path, fingerprint));
        plan.compiled += 1;
        Ok(())
    }

    /// Clears and recreates the per-build output directories
    ///
    /// First use for this build name wipes all three trees. Later runs of
    /// the same pipeline keep object and debug-symbol outputs so the
    /// staleness policy can reuse them, and only recreate the target dir.
    fn prepare_output_tree(&mut self) -> Result<(), PipelineError> {
        let layout = self.layout();

        if self.prepared {
            recreate_dir(&layout.target_dir)?;
            return Ok(());
        }

        recreate_dir(&layout.target_dir)?;
        recreate_dir(&layout.object_dir)?;
        recreate_dir(&layout.debug_symbols_dir)?;
        self.prepared = true;
        Ok(())
    }

    /// Output directories for this build name
    fn layout(&self) -> OutputLayout {
        let name = self.build.name();
        OutputLayout {
            target_dir: self.project.target_dir(&self.project_root).join(name),
            object_dir: self.project.object_dir(&self.project_root).join(name),
            debug_symbols_dir: self.project.debug_symbols_dir(&self.project_root).join(name),
        }
    }

    /// Full path of the binary produced by the final step
    pub fn final_target_path(&self) -> Result<PathBuf, PipelineError> {
        let last = self
            .build
            .step_names()
            .last()
            .ok_or_else(|| ConfigError::Invalid("build has no steps".to_string()))?
            .to_string();
        let ctx = self.resolve_step(&last)?;
        Ok(self.layout().target_dir.join(ctx.target_name))
    }
}

/// True only when both timestamps are readable and `candidate` is
/// strictly newer; unreadable evidence means "not newer" (stale)
fn is_newer(candidate: &Path, reference: &Path) -> bool {
    fn mtime(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    match (mtime(candidate), mtime(reference)) {
        (Some(c), Some(r)) => c > r,
        _ => false,
    }
}

/// Recursively clears a directory and recreates it empty
fn recreate_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const ROOT_JSON: &str = r#"{
        "outputDirectories": {
            "target": "out/bin",
            "object": "out/obj",
            "debugSymbols": "out/pdb",
            "log": "out/log"
        },
        "platform": "windows",
        "toolchain": "msvc"
    }"#;

    const BUILD_JSON: &str = r#"{
        "shared": {},
        "steps": {
            "engine": {
                "targetName": "engine",
                "sourceExtension": "c",
                "sourceDirectories": ["src"]
            }
        }
    }"#;

    /// A fake `cl` that records its arguments and touches an object file
    /// for every `.c` input, so staleness reuse can be observed
    const FAKE_CL: &str = r#"#!/bin/sh
obj=""
for a in "$@"; do
    case "$a" in /Fo:*) obj="${a#/Fo:}";; esac
done
for a in "$@"; do
    case "$a" in
        *.c) base=$(basename "$a" .c); : > "${obj}${base}.obj";;
    esac
done
exit 0
"#;

    struct Fixture {
        dir: TempDir,
        project: ProjectConfig,
        build: BuildConfig,
    }

    fn fixture(build_json: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("root.json"), ROOT_JSON).unwrap();
        fs::write(config_dir.join("debug.b.json"), build_json).unwrap();

        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.c"), "int a;").unwrap();
        fs::write(src.join("b.c"), "int b;").unwrap();
        fs::write(src.join("notes.txt"), "not a source").unwrap();
        backdate(&src.join("a.c"));
        backdate(&src.join("b.c"));

        let project = ProjectConfig::load(&config_dir).unwrap();
        let build = BuildConfig::load(&config_dir, "debug").unwrap();
        Fixture {
            dir,
            project,
            build,
        }
    }

    /// Serializes tests that mutate the process-wide PATH
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pushes a file's mtime into the past so artifacts produced during
    /// the test are strictly newer despite coarse kernel clock ticks
    fn backdate(path: &Path) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - std::time::Duration::from_secs(5))
            .unwrap();
    }

    /// Puts a fake compiler script on PATH for the test process
    fn install_fake_cl(dir: &Path, script: &str) {
        let bin = dir.join("fakebin");
        fs::create_dir_all(&bin).unwrap();
        let cl = bin.join("cl");
        fs::write(&cl, script).unwrap();
        fs::set_permissions(&cl, fs::Permissions::from_mode(0o755)).unwrap();

        let old = std::env::var("PATH").unwrap_or_default();
        std::env::set_var("PATH", format!("{}:{}", bin.display(), old));
    }

    #[test]
    fn dry_run_reports_both_sources_compiled() {
        let f = fixture(BUILD_JSON);
        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path())
                .unwrap()
                .dry_run(true);

        let report = pipeline.run().unwrap();

        assert!(report.succeeded());
        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].compiled, 2);
        assert_eq!(report.steps[0].reused, 0);

        // output tree was prepared
        assert!(f.dir.path().join("out/bin/debug").is_dir());
        assert!(f.dir.path().join("out/obj/debug").is_dir());
        assert!(f.dir.path().join("out/pdb/debug").is_dir());
    }

    #[test]
    fn unsupported_toolchain_is_rejected_up_front() {
        let f = fixture(BUILD_JSON);
        let bad = ROOT_JSON.replace("msvc", "tcc");
        fs::write(f.dir.path().join("config/root.json"), bad).unwrap();
        let project = ProjectConfig::load(&f.dir.path().join("config")).unwrap();

        let output = Output::console_only();
        let result = BuildPipeline::new(&project, &f.build, &output, f.dir.path());
        assert!(matches!(result, Err(PipelineError::Toolchain(_))));
    }

    #[test]
    fn second_run_reuses_unchanged_sources() {
        let _guard = env_lock();
        let f = fixture(BUILD_JSON);
        install_fake_cl(f.dir.path(), FAKE_CL);

        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path()).unwrap();

        let first = pipeline.run().unwrap();
        assert!(first.succeeded());
        assert_eq!(first.steps[0].compiled, 2);
        assert_eq!(pipeline.graph().len(), 2);

        // Nothing changed: both sources are pruned in favor of their objects
        let second = pipeline.run().unwrap();
        assert!(second.succeeded());
        assert_eq!(second.steps[0].compiled, 0);
        assert_eq!(second.steps[0].reused, 2);
    }

    #[test]
    fn changed_source_is_recompiled() {
        let _guard = env_lock();
        let f = fixture(BUILD_JSON);
        install_fake_cl(f.dir.path(), FAKE_CL);

        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path()).unwrap();
        pipeline.run().unwrap();

        fs::write(f.dir.path().join("src/a.c"), "int a = 1;").unwrap();
        backdate(&f.dir.path().join("src/a.c"));

        let report = pipeline.run().unwrap();
        assert_eq!(report.steps[0].compiled, 1);
        assert_eq!(report.steps[0].reused, 1);
    }

    #[test]
    fn missing_object_file_forces_recompilation() {
        let _guard = env_lock();
        let f = fixture(BUILD_JSON);
        install_fake_cl(f.dir.path(), FAKE_CL);

        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path()).unwrap();
        pipeline.run().unwrap();

        fs::remove_file(f.dir.path().join("out/obj/debug/a.obj")).unwrap();

        let report = pipeline.run().unwrap();
        assert_eq!(report.steps[0].compiled, 1);
        assert_eq!(report.steps[0].reused, 1);
    }

    #[test]
    fn nonzero_exit_halts_before_later_steps() {
        let _guard = env_lock();
        let two_steps = r#"{
            "shared": {},
            "steps": {
                "first": {
                    "targetName": "first",
                    "sourceExtension": "c",
                    "sourceDirectories": ["src"]
                },
                "second": {
                    "targetName": "second",
                    "sourceExtension": "c",
                    "sourceDirectories": ["src"]
                }
            }
        }"#;
        let f = fixture(two_steps);
        install_fake_cl(f.dir.path(), "#!/bin/sh\nexit 2\n");

        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path()).unwrap();

        let report = pipeline.run().unwrap();

        assert!(report.halted);
        assert_eq!(pipeline.state(), PipelineState::Halted);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].outcome, StepOutcome::NonZeroExit(2));
    }

    #[test]
    fn cancelled_token_halts_at_step_boundary() {
        let f = fixture(BUILD_JSON);
        let cancel = CancelToken::new();
        cancel.cancel();

        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path())
                .unwrap()
                .with_cancel_token(cancel);

        let result = pipeline.run();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(pipeline.state(), PipelineState::Halted);
    }

    #[test]
    fn missing_source_directory_warns_but_continues() {
        let f = fixture(
            r#"{
                "shared": {},
                "steps": {
                    "engine": {
                        "targetName": "engine",
                        "sourceExtension": "c",
                        "sourceDirectories": ["no/such/dir"]
                    }
                }
            }"#,
        );
        let output = Output::console_only();
        let mut pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path())
                .unwrap()
                .dry_run(true);

        let report = pipeline.run().unwrap();
        assert!(report.succeeded());
        assert_eq!(report.steps[0].compiled, 0);
    }

    #[test]
    fn include_directories_are_rooted_at_the_project() {
        let f = fixture(
            r#"{
                "shared": {},
                "steps": {
                    "engine": {
                        "targetName": "engine",
                        "sourceExtension": "c",
                        "sourceDirectories": ["src"],
                        "includeDirectories": ["include"]
                    }
                }
            }"#,
        );
        fs::create_dir_all(f.dir.path().join("include")).unwrap();

        let output = Output::console_only();
        let pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path()).unwrap();

        let ctx = pipeline.resolve_step("engine").unwrap();
        assert_eq!(
            ctx.include_directories,
            vec![f.dir.path().join("include")]
        );
        assert!(ctx.include_directories[0].is_dir());
    }

    #[test]
    fn final_target_path_uses_last_step() {
        let f = fixture(BUILD_JSON);
        let output = Output::console_only();
        let pipeline =
            BuildPipeline::new(&f.project, &f.build, &output, f.dir.path()).unwrap();

        let path = pipeline.final_target_path().unwrap();
        assert_eq!(path, f.dir.path().join("out/bin/debug/engine"));
    }
}
