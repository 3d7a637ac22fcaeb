//! ncc CLI: compile a source file and run it.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process;

use ncc::bytecode::{disassemble, disassemble_instruction, Vm};
use ncc::compiler::Compiler;
use ncc::diagnostics::render_runtime_error;
use ncc::source::SourceFile;

struct Options {
    file: String,
    /// `-d`: dump the disassembly after compiling and trace every VM step.
    show_opcodes: bool,
}

fn print_usage() {
    eprintln!("usage: ncc FILE [-d]");
}

fn parse_args() -> Option<Options> {
    let mut file = None;
    let mut show_opcodes = false;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-d" => show_opcodes = true,
            "--help" | "-h" => return None,
            _ if file.is_none() => file = Some(arg),
            _ => return None,
        }
    }
    Some(Options {
        file: file?,
        show_opcodes,
    })
}

fn run(options: &Options) -> i32 {
    let text = match fs::read_to_string(&options.file) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("ncc: {}: {}", options.file, err);
            return 1;
        }
    };
    let source = SourceFile::new(text);

    let result = Compiler::new(&source).compile();
    if options.show_opcodes {
        let mut dump = String::new();
        disassemble(&result.program, &mut dump);
        eprintln!("== bytecode ==");
        eprint!("{}", dump);
        eprintln!();
    }
    for entry in result.diagnostics.entries() {
        eprint!("{}", entry);
    }
    if !result.ok() {
        return 1;
    }

    let program = result.program;
    if options.show_opcodes {
        if let Some(main_addr) = program.main_addr {
            eprintln!("main function starts at:");
            let mut line = String::new();
            disassemble_instruction(&program.chunk, &program.globals, main_addr, &mut line);
            eprint!("{}", line);
        }
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let status = run_program(&program, stdin.lock(), stdout.lock(), options.show_opcodes);
    match status {
        Ok(()) => 0,
        Err(err) => {
            eprint!("{}", render_runtime_error(&source, &err));
            1
        }
    }
}

fn run_program<R: BufRead, W: Write>(
    program: &ncc::Program,
    input: R,
    output: W,
    trace: bool,
) -> Result<(), ncc::RuntimeError> {
    Vm::new(program, input, output).with_trace(trace).run()
}

fn main() {
    let Some(options) = parse_args() else {
        print_usage();
        process::exit(1);
    };
    process::exit(run(&options));
}
