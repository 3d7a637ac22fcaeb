//! End-to-end tests: compile a source string and run it on the VM with
//! captured stdin/stdout.

use std::io::Cursor;

use ncc::bytecode::Vm;
use ncc::compiler::Compiler;
use ncc::source::SourceFile;
use ncc::RuntimeError;

fn run_with_input(source: &str, stdin: &str) -> (String, Result<(), RuntimeError>) {
    let file = SourceFile::new(source.to_string());
    let result = Compiler::new(&file).compile();
    assert!(
        result.ok(),
        "compile failed:\n{}",
        result.diagnostics.entries().collect::<String>()
    );
    let mut out = Vec::new();
    let run = Vm::new(&result.program, Cursor::new(stdin.to_string()), &mut out).run();
    (String::from_utf8(out).unwrap(), run)
}

fn output(source: &str) -> String {
    let (out, result) = run_with_input(source, "");
    result.expect("runtime error");
    out
}

fn compile_errors(source: &str) -> String {
    let file = SourceFile::new(source.to_string());
    let result = Compiler::new(&file).compile();
    assert!(!result.ok(), "expected compile errors");
    result.diagnostics.entries().collect()
}

#[test]
fn hello_world() {
    assert_eq!(output("func main() { print(\"Hi\\n\"); }"), "Hi\n");
}

#[test]
fn expression_in_hole() {
    assert_eq!(
        output("func main() { var x = 2 + 3 * 4; print(\"{x}\\n\"); }"),
        "14\n"
    );
}

#[test]
fn recursive_factorial() {
    let source = r#"
func fact(n) {
    if (n <= 1) {
        return 1;
    }
    return n * fact(n - 1);
}

func main() {
    print("{fact(5)}\n");
}
"#;
    assert_eq!(output(source), "120\n");
}

#[test]
fn for_loop_sum() {
    let source = r#"
func main() {
    var s = 0;
    for (var i = 1; i <= 10; i = i + 1) {
        s = s + i;
    }
    print("{s}\n");
}
"#;
    assert_eq!(output(source), "55\n");
}

#[test]
fn short_circuit_or() {
    let source = r#"
func main() {
    var a = 1;
    var b = 2;
    print("{a == b || a < b}\n");
}
"#;
    assert_eq!(output(source), "true\n");
}

#[test]
fn adding_int_and_char_is_a_runtime_error() {
    let file = SourceFile::new("func main() { print(\"{1 + 'a'}\\n\"); }".to_string());
    let result = Compiler::new(&file).compile();
    assert!(result.ok());
    let mut out = Vec::new();
    let run = Vm::new(&result.program, Cursor::new(String::new()), &mut out).run();
    match run {
        Err(err) => assert_eq!(
            err.to_string(),
            "both operands have to be <integer> or <double>"
        ),
        Ok(()) => panic!("expected a runtime type error"),
    }
}

#[test]
fn fibonacci_iterative() {
    let source = r#"
func fib(n) {
    var a = 0;
    var b = 1;
    for (var i = 0; i < n; i = i + 1) {
        var t = a + b;
        a = b;
        b = t;
    }
    return a;
}

func main() {
    print("{fib(10)}\n");
}
"#;
    assert_eq!(output(source), "55\n");
}

#[test]
fn mutual_reads_of_globals() {
    let source = r#"
var total = 0;

func add(n) {
    total = total + n;
    return total;
}

func main() {
    add(3);
    add(4);
    print("{total}\n");
}
"#;
    assert_eq!(output(source), "7\n");
}

#[test]
fn while_with_elif_ladder() {
    let source = r#"
func classify(n) {
    if (n < 10) {
        return 1;
    } elif (n < 100) {
        return 2;
    } elif (n < 1000) {
        return 3;
    } else {
        return 4;
    }
}

func main() {
    var i = 1;
    while (i <= 10000) {
        print("{classify(i)}");
        i = i * 10;
    }
    print("\n");
}
"#;
    assert_eq!(output(source), "12344\n");
}

#[test]
fn reads_from_stdin() {
    let source = r#"
func main() {
    var a = 0;
    var b = 0;
    geti(a);
    geti(b);
    print("{a + b}\n");
}
"#;
    let (out, result) = run_with_input(source, "20 22\n");
    result.unwrap();
    assert_eq!(out, "42\n");
}

#[test]
fn multiple_print_segments_interleave_in_order() {
    let source = r#"
func main() {
    var x = 1;
    var y = 2;
    print("x={x}, y={y}, sum={x + y}\n");
}
"#;
    assert_eq!(output(source), "x=1, y=2, sum=3\n");
}

#[test]
fn char_comparisons_drive_loops() {
    let source = r#"
func main() {
    var c = 'a';
    var n = 0;
    while (c < 'f') {
        n = n + 1;
        if (n > 100) {
            return 1;
        }
        c = 'f';
    }
    print("{n}\n");
}
"#;
    assert_eq!(output(source), "1\n");
}

#[test]
fn sibling_scopes_and_branches_reuse_frame_slots() {
    let source = r#"
func side(c) {
    if (c) {
        var a = 10;
        return a;
    } else {
        var b = 20;
        return b;
    }
}

func main() {
    {
        var x = 1;
        print("{x}");
    }
    {
        var y = 2;
        print("{y}");
    }
    print("{side(true)} {side(false)}\n");
}
"#;
    assert_eq!(output(source), "1210 20\n");
}

#[test]
fn undefined_variable_is_a_compile_error() {
    let errors = compile_errors("func main() { x = 1; }");
    assert!(errors.contains("[line:1] error: undefined reference to 'x'"));
}

#[test]
fn syntax_error_reports_line_and_token() {
    let errors = compile_errors("func main() {\n  var = 3;\n}");
    assert!(errors.contains("[line:2]"));
    assert!(errors.contains("expected 'identifier', found '='"));
}

#[test]
fn errors_are_additive_across_functions() {
    let source = r#"
func f() { var x = missing1; }
func g() { var y = missing2; }
func main() { ; }
"#;
    let errors = compile_errors(source);
    assert!(errors.contains("missing1"));
    assert!(errors.contains("missing2"));
}

#[test]
fn deep_recursion_is_a_runtime_stack_overflow() {
    let source = "func f(n) { return f(n + 1); } func main() { f(0); }";
    let file = SourceFile::new(source.to_string());
    let result = Compiler::new(&file).compile();
    assert!(result.ok());
    let mut out = Vec::new();
    let run = Vm::new(&result.program, Cursor::new(String::new()), &mut out).run();
    assert!(matches!(run, Err(RuntimeError::StackOverflow { .. })));
}

#[test]
fn bounded_recursion_leaves_a_balanced_stack() {
    let source = r#"
func depth(n) {
    if (n == 0) {
        return 0;
    }
    return 1 + depth(n - 1);
}

func main() {
    print("{depth(200)}\n");
}
"#;
    assert_eq!(output(source), "200\n");
}
