use std::io::Read;
use std::process::ExitCode;

use aurum_compiler::compiler;
use aurum_compiler::disasm;
use aurum_compiler::function::Heap;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() {
    eprintln!("usage: aurum [options] [script]");
    eprintln!("  -e chunk  compile the given chunk");
    eprintln!("  -l        list the compiled bytecode");
    eprintln!("  -v        show version information");
    eprintln!("With no -l, aurum only checks that the input compiles.");
}

/// Compile one source, reporting diagnostics to stderr. Returns whether
/// compilation succeeded.
fn run_source(source: &str, name: &str, list: bool) -> bool {
    let mut heap = Heap::new();
    match compiler::compile(source, name, &mut heap) {
        Ok(id) => {
            if list {
                print!("{}", disasm::disassemble(&heap, id));
            }
            true
        }
        Err(diags) => {
            for diag in &diags {
                eprintln!("{name}: {diag}");
            }
            false
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut script_file: Option<String> = None;
    let mut exec_chunks: Vec<String> = Vec::new();
    let mut list = false;
    let mut show_version = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-l" => {
                list = true;
                i += 1;
            }
            "-v" => {
                show_version = true;
                i += 1;
            }
            "-h" | "--help" => {
                usage();
                return ExitCode::SUCCESS;
            }
            "-e" => {
                if i + 1 >= args.len() {
                    eprintln!("aurum: '-e' needs argument");
                    return ExitCode::from(2);
                }
                exec_chunks.push(args[i + 1].clone());
                i += 2;
            }
            arg => {
                if arg.starts_with("-e") && arg.len() > 2 {
                    exec_chunks.push(arg[2..].to_string());
                    i += 1;
                } else if arg.starts_with('-') && arg != "-" {
                    eprintln!("aurum: unrecognized option '{arg}'");
                    usage();
                    return ExitCode::from(2);
                } else {
                    script_file = Some(arg.to_string());
                    i += 1;
                }
            }
        }
    }

    if show_version {
        println!("aurum {VERSION}");
        if exec_chunks.is_empty() && script_file.is_none() {
            return ExitCode::SUCCESS;
        }
    }

    if exec_chunks.is_empty() && script_file.is_none() {
        usage();
        return ExitCode::from(2);
    }

    let mut ok = true;

    for chunk in &exec_chunks {
        ok &= run_source(chunk, "<command line>", list);
    }

    if let Some(path) = &script_file {
        let source = if path == "-" {
            let mut buf = String::new();
            match std::io::stdin().read_to_string(&mut buf) {
                Ok(_) => buf,
                Err(e) => {
                    eprintln!("aurum: cannot read stdin: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("aurum: cannot open '{path}': {e}");
                    return ExitCode::FAILURE;
                }
            }
        };
        ok &= run_source(&source, path, list);
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
