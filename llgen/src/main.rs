use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use llang::verify::VerifyOptions;
use llgen::Compiler;

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage());
    }

    let mut source_path: Option<String> = None;
    let mut emit_ir = false;
    let mut run_main = false;
    let mut strict = false;
    let mut emit_obj: Option<PathBuf> = None;

    let mut index = 0;
    while index < args.len() {
        let arg = &args[index];
        match arg.as_str() {
            "--emit-ir" => {
                emit_ir = true;
            }
            "--run" => {
                run_main = true;
            }
            "--strict" => {
                strict = true;
            }
            "--emit-obj" => {
                index += 1;
                let Some(path) = args.get(index) else {
                    return Err("--emit-obj requires a path".to_string());
                };
                emit_obj = Some(PathBuf::from(path));
            }
            _ if arg.starts_with("--emit-obj=") => {
                if let Some(path) = arg.strip_prefix("--emit-obj=") {
                    emit_obj = Some(PathBuf::from(path));
                }
            }
            "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            _ if arg.starts_with("--") => {
                return Err(format!("unknown option '{}'", arg));
            }
            _ => {
                if source_path.is_none() {
                    source_path = Some(arg.clone());
                } else {
                    return Err("multiple source paths provided".to_string());
                }
            }
        }
        index += 1;
    }

    let Some(source_path) = source_path else {
        return Err(usage());
    };

    let mut compiler = Compiler::new();
    compiler.color = std::io::stderr().is_terminal();
    if strict {
        compiler.verify = VerifyOptions::strict();
    }

    let module = compiler
        .compile_file(Path::new(&source_path))
        .map_err(|err| err.to_string())?;

    // Checking alone is a valid use: no output means the file verified.
    if emit_ir {
        print!("{}", module);
    }

    if emit_obj.is_some() || run_main {
        native(&module, emit_obj.as_deref(), run_main)?;
    }

    Ok(())
}

#[cfg(feature = "cranelift-backend")]
fn native(module: &llgen::ir::Module, emit_obj: Option<&Path>, run_main: bool) -> Result<(), String> {
    use llgen::backend::cranelift::CraneliftBackend;
    use llgen::backend::Backend;

    let backend = CraneliftBackend::new().map_err(|err| err.to_string())?;

    if let Some(path) = emit_obj {
        let object_bytes = backend
            .generate(module)
            .map_err(|err| format!("object generation failed: {}", err))?;
        write_output_file(path, &object_bytes)?;
        println!("wrote object file {}", path.display());
    }

    if run_main {
        let exit_code = backend
            .run_main(module)
            .map_err(|err| format!("jit execution failed: {}", err))?;
        println!("program exited with code {}", exit_code);
    }

    Ok(())
}

#[cfg(not(feature = "cranelift-backend"))]
fn native(_module: &llgen::ir::Module, _emit_obj: Option<&Path>, _run_main: bool) -> Result<(), String> {
    Err("--emit-obj and --run need llgen built with the `cranelift-backend` feature".to_string())
}

#[cfg(feature = "cranelift-backend")]
fn write_output_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "failed to create output directory '{}': {}",
                    parent.display(),
                    err
                )
            })?;
        }
    }

    std::fs::write(path, bytes)
        .map_err(|err| format!("failed to write output file '{}': {}", path.display(), err))
}

fn usage() -> String {
    "usage: llgen <file.ll> [--emit-ir] [--emit-obj <path>] [--run] [--strict]".to_string()
}
