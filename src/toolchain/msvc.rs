//! MSVC-style command synthesis
//!
//! Produces a `cl` invocation. Argument order is load-bearing: defines,
//! target-type flag, output paths, include directories, libraries, source
//! files, raw extra arguments.

use serde_json::Value;
use std::path::PathBuf;

use crate::config::{StepContext, TargetType};

use super::{dir_with_separator, CommandLine, OutputLayout, SynthesizedCommand};

pub(super) fn synthesize(
    ctx: &StepContext,
    layout: &OutputLayout,
    sources: &[PathBuf],
) -> SynthesizedCommand {
    let mut args = vec!["/nologo".to_string()];
    let mut warnings = Vec::new();

    for (name, value) in &ctx.defines {
        args.push(render_define(name, value.as_ref()));
    }

    if ctx.target_type == TargetType::Library {
        args.push("/LD".to_string());
    }

    // cl wants trailing separators on directory-valued outputs
    args.push(format!(
        "/Fe:{}",
        layout.target_dir.join(&ctx.target_name).display()
    ));
    args.push(format!("/Fo:{}", dir_with_separator(&layout.object_dir)));
    args.push(format!(
        "/Fd:{}",
        dir_with_separator(&layout.debug_symbols_dir)
    ));

    for dir in &ctx.include_directories {
        if !dir.exists() {
            warnings.push(format!(
                "Skipping include directory '{}' because it could not be found",
                dir.display()
            ));
            continue;
        }
        args.push("/I".to_string());
        args.push(dir.display().to_string());
    }

    if !ctx.dynamic_libraries.is_empty() {
        args.push("/MD".to_string());
        args.extend(ctx.dynamic_libraries.iter().cloned());
    }

    if !ctx.static_libraries.is_empty() {
        args.push("/MT".to_string());
        args.extend(ctx.static_libraries.iter().cloned());
    }

    for source in sources {
        args.push(source.display().to_string());
    }

    args.extend(ctx.additional_arguments.iter().cloned());

    SynthesizedCommand {
        command: CommandLine {
            program: "cl".to_string(),
            args,
        },
        warnings,
    }
}

/// Renders one preprocessor define: string values quoted, numeric and
/// boolean values embedded bare
fn render_define(name: &str, value: Option<&Value>) -> String {
    match value {
        None => format!("/D{name}"),
        Some(Value::String(s)) => format!("/D{name}=\"{s}\""),
        Some(other) => format!("/D{name}={other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> StepContext {
        StepContext {
            step_name: "engine".to_string(),
            target_name: "engine".to_string(),
            target_type: TargetType::Library,
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
    fn library_define_and_include_ordering() {
        let include_dir = TempDir::new().unwrap();
        let mut ctx = context();
        ctx.defines = vec![("DEBUG".to_string(), Some(Value::from(1)))];
        ctx.include_directories = vec![include_dir.path().to_path_buf()];

        let synthesized = synthesize(&ctx, &layout(), &[]);
        let args = &synthesized.command.args;

        let define = args.iter().position(|a| a == "/DDEBUG=1").unwrap();
        let lib_flag = args.iter().position(|a| a == "/LD").unwrap();
        let include = args.iter().position(|a| a == "/I").unwrap();

        // defines come first, then the target-type flag, then includes
        assert!(define < lib_flag);
        assert!(lib_flag < include);

        // the include flag is immediately followed by the directory path
        assert_eq!(args[include + 1], include_dir.path().display().to_string());
        assert!(synthesized.warnings.is_empty());
    }

    #[test]
    fn define_value_rendering() {
        assert_eq!(render_define("DEBUG", Some(&Value::from(1))), "/DDEBUG=1");
        assert_eq!(
            render_define("VERBOSE", Some(&Value::from(true))),
            "/DVERBOSE=true"
        );
        assert_eq!(
            render_define("NAME", Some(&Value::from("kiln"))),
            "/DNAME=\"kiln\""
        );
        assert_eq!(render_define("BARE", None), "/DBARE");
    }

    #[test]
    fn missing_include_directory_is_skipped_with_warning() {
        let mut ctx = context();
        ctx.include_directories = vec![PathBuf::from("/nonexistent/include")];

        let synthesized = synthesize(&ctx, &layout(), &[]);

        assert!(!synthesized.command.args.contains(&"/I".to_string()));
        assert_eq!(synthesized.warnings.len(), 1);
        assert!(synthesized.warnings[0].contains("/nonexistent/include"));
    }

    #[test]
    fn output_paths_are_rooted_under_build_dir() {
        let ctx = context();
        let synthesized = synthesize(&ctx, &layout(), &[]);
        let args = &synthesized.command.args;

        let sep = std::path::MAIN_SEPARATOR;
        assert!(args.contains(&format!("/Fe:/proj/out/bin/debug{sep}engine")));
        assert!(args.contains(&format!("/Fo:/proj/out/obj/debug{sep}")));
        assert!(args.contains(&format!("/Fd:/proj/out/pdb/debug{sep}")));
    }

    #[test]
    fn library_flags_appear_once_before_names() {
        let mut ctx = context();
        ctx.dynamic_libraries = vec!["user32".to_string(), "gdi32".to_string()];
        ctx.static_libraries = vec!["zlib".to_string()];

        let args = synthesize(&ctx, &layout(), &[]).command.args;

        assert_eq!(args.iter().filter(|a| *a == "/MD").count(), 1);
        assert_eq!(args.iter().filter(|a| *a == "/MT").count(), 1);

        let md = args.iter().position(|a| a == "/MD").unwrap();
        assert_eq!(args[md + 1], "user32");
        assert_eq!(args[md + 2], "gdi32");

        let mt = args.iter().position(|a| a == "/MT").unwrap();
        assert_eq!(args[mt + 1], "zlib");
    }

    #[test]
    fn empty_library_lists_emit_no_flags() {
        let args = synthesize(&context(), &layout(), &[]).command.args;
        assert!(!args.contains(&"/MD".to_string()));
        assert!(!args.contains(&"/MT".to_string()));
    }

    #[test]
    fn sources_then_raw_arguments_come_last() {
        let mut ctx = context();
        ctx.additional_arguments = vec!["/W4".to_string(), "/EHsc".to_string()];
        let sources = vec![PathBuf::from("src/a.c"), PathBuf::from("src/b.c")];

        let args = synthesize(&ctx, &layout(), &sources).command.args;
        let len = args.len();

        assert_eq!(&args[len - 4..], &["src/a.c", "src/b.c", "/W4", "/EHsc"]);
    }
}
