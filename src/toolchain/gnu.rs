//! GNU-family command synthesis (clang and gcc)
//!
//! Both drivers share one argument grammar; only the program name differs.
//! Compilation and linking happen in a single invocation, so there is no
//! per-file object output to manage. Libraries come after the sources,
//! where the linker expects them.

use serde_json::Value;
use std::path::PathBuf;

use crate::config::{StepContext, TargetType};

use super::{CommandLine, OutputLayout, SynthesizedCommand};

pub(super) fn synthesize(
    program: &str,
    ctx: &StepContext,
    layout: &OutputLayout,
    sources: &[PathBuf],
) -> SynthesizedCommand {
    let mut args = Vec::new();
    let mut warnings = Vec::new();

    for (name, value) in &ctx.defines {
        args.push(render_define(name, value.as_ref()));
    }

    if ctx.target_type == TargetType::Library {
        args.push("-shared".to_string());
        args.push("-fPIC".to_string());
    }

    args.push("-g".to_string());
    args.push("-o".to_string());
    args.push(layout.target_dir.join(&ctx.target_name).display().to_string());

    for dir in &ctx.include_directories {
        if !dir.exists() {
            warnings.push(format!(
                "Skipping include directory '{}' because it could not be found",
                dir.display()
            ));
            continue;
        }
        args.push("-I".to_string());
        args.push(dir.display().to_string());
    }

    for source in sources {
        args.push(source.display().to_string());
    }

    for lib in ctx.dynamic_libraries.iter().chain(&ctx.static_libraries) {
        args.push(format!("-l{lib}"));
    }

    args.extend(ctx.additional_arguments.iter().cloned());

    SynthesizedCommand {
        command: CommandLine {
            program: program.to_string(),
            args,
        },
        warnings,
    }
}

fn render_define(name: &str, value: Option<&Value>) -> String {
    match value {
        None => format!("-D{name}"),
        Some(Value::String(s)) => format!("-D{name}=\"{s}\""),
        Some(other) => format!("-D{name}={other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> StepContext {
        StepContext {
            step_name: "game".to_string(),
            target_name: "game".to_string(),
            target_type: TargetType::Standalone,
            source_extension: "c".to_string(),
            header_extension: None,
            include_directories: vec![],
            source_directories: vec![],
            defines: vec![],
            static_libraries: vec![],
            dynamic_libraries: vec![],
            additional_arguments: vec![],
        }
    }

    fn layout() -> OutputLayout {
        OutputLayout {
            target_dir: PathBuf::from("/proj/out/bin/debug"),
            object_dir: PathBuf::from("/proj/out/obj/debug"),
            debug_symbols_dir: PathBuf::from("/proj/out/pdb/debug"),
        }
    }

    #[test]
    fn standalone_build_has_no_shared_flag() {
        let args = synthesize("gcc", &context(), &layout(), &[]).command.args;
        assert!(!args.contains(&"-shared".to_string()));
    }

    #[test]
    fn library_build_is_shared_pic() {
        let mut ctx = context();
        ctx.target_type = TargetType::Library;

        let args = synthesize("clang", &ctx, &layout(), &[]).command.args;
        assert!(args.contains(&"-shared".to_string()));
        assert!(args.contains(&"-fPIC".to_string()));
    }

    #[test]
    fn program_selects_driver() {
        assert_eq!(synthesize("clang", &context(), &layout(), &[]).command.program, "clang");
        assert_eq!(synthesize("gcc", &context(), &layout(), &[]).command.program, "gcc");
    }

    #[test]
    fn libraries_follow_sources() {
        let mut ctx = context();
        ctx.dynamic_libraries = vec!["m".to_string()];
        let sources = vec![PathBuf::from("src/main.c")];

        let args = synthesize("gcc", &ctx, &layout(), &sources).command.args;
        let source = args.iter().position(|a| a == "src/main.c").unwrap();
        let lib = args.iter().position(|a| a == "-lm").unwrap();
        assert!(source < lib);
    }

    #[test]
    fn missing_include_directory_warns() {
        let exists = TempDir::new().unwrap();
        let mut ctx = context();
        ctx.include_directories = vec![
            PathBuf::from("/nonexistent/include"),
            exists.path().to_path_buf(),
        ];

        let synthesized = synthesize("gcc", &ctx, &layout(), &[]);
        assert_eq!(synthesized.warnings.len(), 1);

        let args = &synthesized.command.args;
        let include = args.iter().position(|a| a == "-I").unwrap();
        assert_eq!(args[include + 1], exists.path().display().to_string());
    }

    #[test]
    fn define_rendering() {
        assert_eq!(render_define("NDEBUG", None), "-DNDEBUG");
        assert_eq!(render_define("LEVEL", Some(&Value::from(3))), "-DLEVEL=3");
        assert_eq!(
            render_define("NAME", Some(&Value::from("kiln"))),
            "-DNAME=\"kiln\""
        );
    }
}
