//! hoc command line front end.

use std::path::{Path, PathBuf};

use hocc::commands::{
    check_image, list_opcodes, print_digests, run_demo, run_image, DemoOptions, RunOptions,
};
use hocc::{init_tracing, CliError};
use hoc_vm::{ExecMode, Interpreter, VmConfig};

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = &args[1];
    let result = match command.as_str() {
        "run" => {
            let mut options = RunOptions::default();
            let mut path = None;
            for arg in args.iter().skip(2) {
                match arg.as_str() {
                    "--profile" | "-p" => options.profile = true,
                    "--abort" => options.abort_on_fault = true,
                    _ if !arg.starts_with('-') && path.is_none() => path = Some(arg.as_str()),
                    _ => {
                        eprintln!("error: unexpected argument '{arg}'");
                        std::process::exit(1);
                    }
                }
            }
            let Some(path) = path else {
                eprintln!("Usage: hoc run <image> [--profile] [--abort]");
                std::process::exit(1);
            };
            match run_image(Path::new(path), &options) {
                Ok(0) => Ok(()),
                Ok(status) => std::process::exit(status),
                Err(err) => Err(err),
            }
        }
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: hoc check <image>");
                std::process::exit(1);
            }
            check_image(Path::new(&args[2]))
        }
        "demo" => {
            let mut options = DemoOptions::default();
            let mut rest = args.iter().skip(2);
            while let Some(arg) = rest.next() {
                if arg == "--write" || arg == "-o" {
                    let Some(path) = rest.next() else {
                        eprintln!("error: {arg} needs a file name");
                        std::process::exit(1);
                    };
                    options.write = Some(PathBuf::from(path));
                } else {
                    eprintln!("error: unexpected argument '{arg}'");
                    std::process::exit(1);
                }
            }
            let mut interp = Interpreter::with_config(VmConfig::for_mode(ExecMode::Batch));
            run_demo(&mut interp, &options)
        }
        "opcodes" => {
            list_opcodes();
            Ok(())
        }
        "digest" => {
            print_digests();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("hoc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(err) = result {
        report(&err);
        std::process::exit(1);
    }
}

fn report(err: &CliError) {
    // Faults caught at a boundary were already printed in batch mode.
    if !matches!(err, CliError::Exec(fault) if fault.backtrace.is_some()) {
        eprintln!("error: {err}");
    }
}

fn print_usage() {
    println!("hoc - stack machine interpreter for hoc bytecode");
    println!();
    println!("Usage: hoc <command> [options]");
    println!();
    println!("Commands:");
    println!("  run <image>          Run a body image as one top-level statement");
    println!("  check <image>        Decode and validate an image without running it");
    println!("  demo                 Build and run a short program through the host API");
    println!("  opcodes              List the opcode table");
    println!("  digest               Print the opcode and built-in table digests");
    println!("  help                 Show this help message");
    println!("  version              Show version information");
    println!();
    println!("Run options:");
    println!("  --profile, -p        Print the execution profile to stderr");
    println!("  --abort              Abort the process on a fault");
    println!();
    println!("Demo options:");
    println!("  --write, -o <file>   Save the demo loop as an image");
    println!();
    println!("Environment:");
    println!("  RUST_LOG             Tracing filter, e.g. hoc_vm=debug");
    println!("  HOC_LOG_TREE         Indent tracing output by span");
    println!();
    println!("Examples:");
    println!("  hoc demo --write squares.img");
    println!("  hoc check squares.img");
    println!("  hoc run squares.img --profile");
}
