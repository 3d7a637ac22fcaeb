//! The stack virtual machine.
//!
//! A classic fetch-decode-execute loop over the instruction buffer. Frames
//! are explicit: a call site pushes the arguments and a return address, the
//! callee's `ipush_bp` saves the old base pointer and claims the stack top
//! as its frame, and `ret` jumps back through the saved address. Type checks
//! happen before every arithmetic, relational, and equality operation.

use std::io::{self, BufRead, Write};

use crate::bytecode::chunk::Program;
use crate::bytecode::disassembler::disassemble_instruction;
use crate::bytecode::opcode::Op;
use crate::error::RuntimeError;
use crate::value::Value;

/// Fixed operand stack capacity.
pub const STACK_MAX: usize = 32767;

pub struct Vm<'a, 'src, R, W> {
    program: &'a Program<'src>,
    input: R,
    output: W,
    trace: bool,

    stack: Vec<Value<'src>>,
    globals: Vec<Value<'src>>,
    /// Instruction pointer: offset of the next byte to fetch.
    ip: usize,
    /// Offset of the opcode currently executing, for error lines.
    op_offset: usize,
    /// Base pointer: start of the current frame's slots.
    bp: usize,
    /// The dedicated return-value register.
    ret_value: Value<'src>,
}

impl<'a, 'src, R: BufRead, W: Write> Vm<'a, 'src, R, W> {
    pub fn new(program: &'a Program<'src>, input: R, output: W) -> Self {
        Self {
            program,
            input,
            output,
            trace: false,
            stack: Vec::new(),
            globals: vec![Value::Nil; program.globals.len()],
            ip: 0,
            op_offset: 0,
            bp: 0,
            ret_value: Value::Nil,
        }
    }

    /// Dump the stack and the next instruction to stderr before every step.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Run the program from its `main`.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        let Some(main_addr) = self.program.main_addr else {
            return Err(RuntimeError::MainNotFound);
        };
        self.ip = main_addr;
        let result = self.execute();
        self.output.flush()?;
        result
    }

    fn execute(&mut self) -> Result<(), RuntimeError> {
        loop {
            let chunk = &self.program.chunk;
            if self.ip >= chunk.len() {
                return Ok(());
            }
            if self.trace {
                self.trace_step();
            }
            self.op_offset = self.ip;
            let byte = chunk.code[self.ip];
            self.ip += 1;
            let Some(op) = Op::from_u8(byte) else {
                return Err(RuntimeError::UnknownOpcode {
                    opcode: byte,
                    line: self.line(),
                });
            };

            match op {
                Op::IntC | Op::CharC | Op::DoubleC | Op::StringC => {
                    let index = self.read_u16();
                    let value = self.program.chunk.constants[index as usize];
                    self.push(value)?;
                }

                Op::Add | Op::Sub | Op::Mult | Op::Idiv | Op::Mod => {
                    self.check_arithmetic()?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = self.arithmetic(op, a, b)?;
                    self.push(result)?;
                }

                Op::Positive => {
                    if !self.peek(0)?.is_int() {
                        return Err(RuntimeError::IntOperand { line: self.line() });
                    }
                }
                Op::Neg => {
                    let Value::Int(v) = self.peek(0)? else {
                        return Err(RuntimeError::IntOperand { line: self.line() });
                    };
                    let top = self.stack.len() - 1;
                    self.stack[top] = Value::Int(v.wrapping_neg());
                }

                Op::Nil => self.push(Value::Nil)?,
                Op::TrueL => self.push(Value::Bool(true))?,
                Op::FalseL => self.push(Value::Bool(false))?,

                Op::Lt | Op::Lte | Op::Gt | Op::Gte => {
                    self.check_relational()?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(relational(op, a, b)))?;
                }

                Op::Eq | Op::Neq => {
                    let b = self.peek(0)?;
                    let a = self.peek(1)?;
                    if !a.same_kind(&b) {
                        return Err(RuntimeError::EqualityOperands { line: self.line() });
                    }
                    self.pop()?;
                    self.pop()?;
                    let equal = values_equal(a, b);
                    self.push(Value::Bool(if op == Op::Eq { equal } else { !equal }))?;
                }

                Op::Inot => {
                    let v = self.pop()?;
                    self.push(Value::Bool(!v.as_bool()))?;
                }

                Op::LogicalAnd => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a.as_bool() && b.as_bool()))?;
                }
                Op::LogicalOr => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a.as_bool() || b.as_bool()))?;
                }

                // Conditional jumps peek: the guard is popped by explicit
                // ipops on both edges, or kept as the result of `&&`/`||`.
                Op::Jit => {
                    if self.peek(0)?.as_bool() {
                        self.ip = self.program.chunk.read_u16(self.ip) as usize;
                    } else {
                        self.ip += 2;
                    }
                }
                Op::Jif => {
                    if !self.peek(0)?.as_bool() {
                        self.ip = self.program.chunk.read_u16(self.ip) as usize;
                    } else {
                        self.ip += 2;
                    }
                }
                Op::Jump => {
                    self.ip = self.program.chunk.read_u16(self.ip) as usize;
                }

                Op::Ipop => {
                    self.pop()?;
                }

                Op::IpushBp => {
                    let saved = Value::Int(self.bp as i64);
                    self.push(saved)?;
                    self.bp = self.stack.len();
                }
                Op::IpopBp => {
                    let saved = self.pop_int()?;
                    self.bp = saved as usize;
                }
                Op::RetAddr => {
                    let addr = self.read_u16();
                    self.push(Value::Int(addr as i64))?;
                }

                Op::Print => {
                    let count = self.program.chunk.code[self.ip];
                    self.ip += 1;
                    for i in (0..count).rev() {
                        let value = self.peek(i as usize)?;
                        value.write_expanded(&mut self.output)?;
                    }
                    for _ in 0..count {
                        self.pop()?;
                    }
                }

                Op::GetC => {
                    let slot = self.read_u16();
                    let c = read_byte(&mut self.input)?.unwrap_or(0);
                    self.globals[slot as usize] = Value::Char(c);
                }
                Op::GetI => {
                    let slot = self.read_u16();
                    let v = read_i64(&mut self.input)?;
                    self.globals[slot as usize] = Value::Int(v);
                }
                Op::GetD => {
                    let slot = self.read_u16();
                    let v = read_f64(&mut self.input)?;
                    self.globals[slot as usize] = Value::double(v);
                }
                Op::LocalGetC => {
                    let addr = self.local_addr()?;
                    let c = read_byte(&mut self.input)?.unwrap_or(0);
                    self.stack[addr] = Value::Char(c);
                }
                Op::LocalGetI => {
                    let addr = self.local_addr()?;
                    let v = read_i64(&mut self.input)?;
                    self.stack[addr] = Value::Int(v);
                }
                Op::LocalGetD => {
                    let addr = self.local_addr()?;
                    let v = read_f64(&mut self.input)?;
                    self.stack[addr] = Value::double(v);
                }

                Op::DefineGlobal => {
                    let slot = self.read_u16();
                    self.globals[slot as usize] = self.pop()?;
                }
                Op::SetGlobal => {
                    let slot = self.read_u16();
                    self.globals[slot as usize] = self.peek(0)?;
                }
                Op::GetGlobal => {
                    let slot = self.read_u16();
                    let value = self.globals[slot as usize];
                    self.push(value)?;
                }

                // define_local writes the top of stack to its own slot: the
                // freshly pushed initializer *is* the local's storage.
                Op::DefineLocal | Op::SetLocal => {
                    let addr = self.local_addr()?;
                    self.stack[addr] = self.peek(0)?;
                }
                Op::GetLocal => {
                    let addr = self.local_addr()?;
                    let value = self.stack[addr];
                    self.push(value)?;
                }

                Op::StoreRetValue => {
                    self.ret_value = self.pop()?;
                }
                Op::LoadRetValue => {
                    let value = self.ret_value;
                    self.push(value)?;
                }

                Op::Ret => {
                    let addr = self.pop_int()?;
                    self.ip = addr as usize;
                }
                Op::MainRet => return Ok(()),
            }
        }
    }

    // ---- stack ----------------------------------------------------------

    fn push(&mut self, value: Value<'src>) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow { line: self.line() });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value<'src>, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { line: self.line() })
    }

    fn pop_int(&mut self) -> Result<i64, RuntimeError> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            _ => Err(RuntimeError::StackUnderflow { line: self.line() }),
        }
    }

    fn peek(&self, distance: usize) -> Result<Value<'src>, RuntimeError> {
        self.stack
            .len()
            .checked_sub(1 + distance)
            .map(|i| self.stack[i])
            .ok_or(RuntimeError::StackUnderflow { line: self.line() })
    }

    /// Resolve a signed frame slot against the base pointer.
    fn local_addr(&mut self) -> Result<usize, RuntimeError> {
        let slot = self.read_u16() as i16;
        let addr = self.bp as i64 + slot as i64;
        if addr < 0 || addr >= self.stack.len() as i64 {
            return Err(RuntimeError::StackUnderflow { line: self.line() });
        }
        Ok(addr as usize)
    }

    fn read_u16(&mut self) -> u16 {
        let v = self.program.chunk.read_u16(self.ip);
        self.ip += 2;
        v
    }

    fn line(&self) -> u32 {
        self.program.chunk.line(self.op_offset)
    }

    // ---- operations -----------------------------------------------------

    /// Both operands must share a tag and be int or double.
    fn check_arithmetic(&self) -> Result<(), RuntimeError> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;
        if !a.same_kind(&b) || !(a.is_int() || a.is_double()) {
            return Err(RuntimeError::ArithmeticOperands { line: self.line() });
        }
        Ok(())
    }

    /// Both operands must share a tag and be int, double, or char.
    fn check_relational(&self) -> Result<(), RuntimeError> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;
        if !a.same_kind(&b) || !(a.is_int() || a.is_double() || matches!(a, Value::Char(_))) {
            return Err(RuntimeError::RelationalOperands { line: self.line() });
        }
        Ok(())
    }

    fn arithmetic(
        &self,
        op: Op,
        a: Value<'src>,
        b: Value<'src>,
    ) -> Result<Value<'src>, RuntimeError> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                let v = match op {
                    Op::Add => x.wrapping_add(y),
                    Op::Sub => x.wrapping_sub(y),
                    Op::Mult => x.wrapping_mul(y),
                    Op::Idiv | Op::Mod => {
                        if y == 0 {
                            return Err(RuntimeError::DivisionByZero { line: self.line() });
                        }
                        if op == Op::Idiv {
                            x.wrapping_div(y)
                        } else {
                            x.wrapping_rem(y)
                        }
                    }
                    _ => unreachable!("checked arithmetic opcode"),
                };
                Ok(Value::Int(v))
            }
            (Value::Double { value: x, .. }, Value::Double { value: y, .. }) => {
                let v = match op {
                    Op::Add => x + y,
                    Op::Sub => x - y,
                    Op::Mult => x * y,
                    Op::Idiv => x / y,
                    Op::Mod => x % y,
                    _ => unreachable!("checked arithmetic opcode"),
                };
                Ok(Value::double(v))
            }
            _ => unreachable!("operands were type-checked"),
        }
    }

    fn trace_step(&self) {
        let mut items = String::new();
        for value in &self.stack {
            items.push_str(&value.to_string());
            items.push(' ');
        }
        eprintln!("\t\t\t\t\tstack = [ {}]", items);
        let mut out = String::new();
        disassemble_instruction(&self.program.chunk, &self.program.globals, self.ip, &mut out);
        eprint!("{}", out);
    }
}

fn relational(op: Op, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match op {
            Op::Lt => x < y,
            Op::Lte => x <= y,
            Op::Gt => x > y,
            Op::Gte => x >= y,
            _ => unreachable!(),
        },
        (Value::Char(x), Value::Char(y)) => match op {
            Op::Lt => x < y,
            Op::Lte => x <= y,
            Op::Gt => x > y,
            Op::Gte => x >= y,
            _ => unreachable!(),
        },
        (Value::Double { value: x, .. }, Value::Double { value: y, .. }) => match op {
            Op::Lt => x < y,
            Op::Lte => x <= y,
            Op::Gt => x > y,
            Op::Gte => x >= y,
            _ => unreachable!(),
        },
        _ => unreachable!("operands were type-checked"),
    }
}

/// Equality over same-tag pairs. Doubles compare `|a-b|` against zero,
/// which is exact equality; this is intentional.
fn values_equal(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Double { value: x, .. }, Value::Double { value: y, .. }) => (x - y).abs() == 0.0,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => unreachable!("operands were tag-checked"),
    }
}

// ---- stdin, scanf-style ------------------------------------------------

fn read_byte<R: BufRead>(input: &mut R) -> io::Result<Option<u8>> {
    let buf = input.fill_buf()?;
    let Some(&b) = buf.first() else {
        return Ok(None);
    };
    input.consume(1);
    Ok(Some(b))
}

fn peek_stdin<R: BufRead>(input: &mut R) -> io::Result<Option<u8>> {
    Ok(input.fill_buf()?.first().copied())
}

fn skip_ws<R: BufRead>(input: &mut R) -> io::Result<()> {
    while let Some(b) = peek_stdin(input)? {
        if !b.is_ascii_whitespace() {
            break;
        }
        input.consume(1);
    }
    Ok(())
}

/// Read a decimal integer like `scanf("%ld")`: leading whitespace skipped,
/// optional sign, digit run. A failed match reads as zero.
fn read_i64<R: BufRead>(input: &mut R) -> io::Result<i64> {
    skip_ws(input)?;
    let mut negative = false;
    if let Some(b @ (b'-' | b'+')) = peek_stdin(input)? {
        negative = b == b'-';
        input.consume(1);
    }
    let mut value: i64 = 0;
    while let Some(b) = peek_stdin(input)? {
        if !b.is_ascii_digit() {
            break;
        }
        input.consume(1);
        value = value.wrapping_mul(10).wrapping_add((b - b'0') as i64);
    }
    Ok(if negative { -value } else { value })
}

/// Read a decimal floating-point number like `scanf("%lF")`.
fn read_f64<R: BufRead>(input: &mut R) -> io::Result<f64> {
    skip_ws(input)?;
    let mut text = String::new();
    if let Some(b @ (b'-' | b'+')) = peek_stdin(input)? {
        text.push(b as char);
        input.consume(1);
    }
    while let Some(b) = peek_stdin(input)? {
        if b.is_ascii_digit() || (b == b'.' && !text.contains('.')) {
            text.push(b as char);
            input.consume(1);
        } else {
            break;
        }
    }
    Ok(text.parse().unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::source::SourceFile;

    fn run_with_input(source: &str, stdin: &str) -> (String, Result<(), RuntimeError>) {
        let file = SourceFile::new(source.to_string());
        let result = Compiler::new(&file).compile();
        assert!(
            result.ok(),
            "compile failed: {:?}",
            result.diagnostics.entries().collect::<Vec<_>>()
        );
        let mut out = Vec::new();
        let run = Vm::new(&result.program, io::Cursor::new(stdin.to_string()), &mut out).run();
        (String::from_utf8(out).unwrap(), run)
    }

    fn run(source: &str) -> (String, Result<(), RuntimeError>) {
        run_with_input(source, "")
    }

    fn output(source: &str) -> String {
        let (out, result) = run(source);
        result.unwrap();
        out
    }

    #[test]
    fn prints_a_literal() {
        assert_eq!(output("func main() { print(\"Hi\\n\"); }"), "Hi\n");
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(
            output("func main() { var x = 2 + 3 * 4; print(\"{x}\\n\"); }"),
            "14\n"
        );
    }

    #[test]
    fn integer_division_and_modulo() {
        assert_eq!(
            output("func main() { print(\"{7 / 2} {7 % 2}\\n\"); }"),
            "3 1\n"
        );
    }

    #[test]
    fn double_arithmetic_prints_default_precision() {
        assert_eq!(
            output("func main() { print(\"{1.5 + 1.25}\\n\"); }"),
            "2.750000\n"
        );
    }

    #[test]
    fn double_literal_precision_is_observed() {
        assert_eq!(
            output("func main() { print(\"{2.5}|{2.50}\\n\"); }"),
            "2.5|2.50\n"
        );
    }

    #[test]
    fn unary_operators() {
        assert_eq!(
            output("func main() { var x = 5; print(\"{-x} {!true} {+x}\\n\"); }"),
            "-5 false 5\n"
        );
    }

    #[test]
    fn comparisons_and_equality() {
        assert_eq!(
            output("func main() { print(\"{1 < 2} {2 <= 1} {'a' < 'b'} {1 == 1} {1 != 1}\\n\"); }"),
            "true false true true false\n"
        );
    }

    #[test]
    fn string_equality_compares_contents() {
        assert_eq!(
            output("func main() { print(\"{\"ab\" == \"ab\"} {\"ab\" != \"ba\"}\\n\"); }"),
            "true true\n"
        );
    }

    #[test]
    fn nil_equals_nil() {
        assert_eq!(output("func main() { print(\"{nil == nil}\\n\"); }"), "true\n");
    }

    #[test]
    fn short_circuit_keeps_left_value() {
        assert_eq!(
            output(
                "func main() { var a = 1; var b = 2; print(\"{a == b || a < b}\\n\"); }"
            ),
            "true\n"
        );
        // && skips the right side when the left is falsy.
        assert_eq!(
            output("func main() { print(\"{false && true}\\n\"); }"),
            "false\n"
        );
    }

    #[test]
    fn short_circuit_skips_side_effects() {
        // Division by zero on the right side must not run.
        assert_eq!(
            output("func main() { print(\"{false && 1 / 0 == 1}\\n\"); }"),
            "false\n"
        );
    }

    #[test]
    fn while_loop_sums() {
        let source = "func main() { var s = 0; var i = 1; while (i <= 10) { s = s + i; i = i + 1; } print(\"{s}\\n\"); }";
        assert_eq!(output(source), "55\n");
    }

    #[test]
    fn for_loop_sums() {
        let source = "func main() { var s = 0; for (var i = 1; i <= 10; i = i + 1) { s = s + i; } print(\"{s}\\n\"); }";
        assert_eq!(output(source), "55\n");
    }

    #[test]
    fn nested_for_loops() {
        let source = "func main() { var n = 0; for (var i = 0; i < 3; i = i + 1) { for (var j = 0; j < 4; j = j + 1) { n = n + 1; } } print(\"{n}\\n\"); }";
        assert_eq!(output(source), "12\n");
    }

    #[test]
    fn if_elif_else_chain() {
        let source = "func pick(n) { if (n < 0) { return 1; } elif (n == 0) { return 2; } else { return 3; } }\nfunc main() { print(\"{pick(-5)}{pick(0)}{pick(9)}\\n\"); }";
        assert_eq!(output(source), "123\n");
    }

    #[test]
    fn function_calls_and_recursion() {
        let source = "func fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); }\nfunc main() { print(\"{fact(5)}\\n\"); }";
        assert_eq!(output(source), "120\n");
    }

    #[test]
    fn two_argument_function() {
        let source = "func sub(a, b) { return a - b; }\nfunc main() { print(\"{sub(10, 4)}\\n\"); }";
        assert_eq!(output(source), "6\n");
    }

    #[test]
    fn early_return_value_survives_trailing_code() {
        let source = "func f(n) { if (n > 0) { return 7; } var unused = 1; }\nfunc main() { print(\"{f(1)} {f(0)}\\n\"); }";
        assert_eq!(output(source), "7 0\n");
    }

    #[test]
    fn function_without_return_yields_zero() {
        let source = "func noop() { var x = 1; }\nfunc main() { print(\"{noop()}\\n\"); }";
        assert_eq!(output(source), "0\n");
    }

    #[test]
    fn globals_are_shared_across_functions() {
        let source = "var counter = 0;\nfunc bump() { counter = counter + 1; return counter; }\nfunc main() { bump(); bump(); print(\"{counter}\\n\"); }";
        assert_eq!(output(source), "2\n");
    }

    #[test]
    fn block_scoping_shadows_and_restores() {
        let source = "func main() { var x = 1; { var x = 2; print(\"{x}\"); } print(\"{x}\\n\"); }";
        assert_eq!(output(source), "21\n");
    }

    #[test]
    fn sibling_blocks_reuse_stack_slots() {
        let source = "func main() { { var a = 1; print(\"{a}\"); } { var b = 2; print(\"{b}\"); } print(\"\\n\"); }";
        assert_eq!(output(source), "12\n");
    }

    #[test]
    fn both_branch_arms_may_declare_locals() {
        let source = "func pick(c) { if (c) { var a = 1; return a; } else { var b = 2; return b; } }\nfunc main() { print(\"{pick(true)}{pick(false)}\\n\"); }";
        assert_eq!(output(source), "12\n");
    }

    #[test]
    fn sequential_loops_reuse_loop_variable_slots() {
        let source = "func main() { var s = 0; for (var i = 0; i < 2; i = i + 1) { s = s + 1; } for (var j = 0; j < 3; j = j + 1) { s = s + 1; } print(\"{s}\\n\"); }";
        assert_eq!(output(source), "5\n");
    }

    #[test]
    fn type_error_mixing_int_and_char() {
        let (_, result) = run("func main() { print(\"{1 + 'a'}\\n\"); }");
        assert!(matches!(
            result,
            Err(RuntimeError::ArithmeticOperands { .. })
        ));
    }

    #[test]
    fn type_error_mixing_int_and_double() {
        let (_, result) = run("func main() { var x = 1 + 2.5; }");
        assert!(matches!(
            result,
            Err(RuntimeError::ArithmeticOperands { .. })
        ));
    }

    #[test]
    fn type_error_carries_the_source_line() {
        let (_, result) = run("func main() {\n var x = 1;\n x = x + 'a';\n}");
        match result {
            Err(RuntimeError::ArithmeticOperands { line }) => assert_eq!(line, 3),
            other => panic!("expected arithmetic type error, got {:?}", other),
        }
    }

    #[test]
    fn relational_rejects_bools() {
        let (_, result) = run("func main() { var x = true < false; }");
        assert!(matches!(
            result,
            Err(RuntimeError::RelationalOperands { .. })
        ));
    }

    #[test]
    fn equality_requires_matching_tags() {
        let (_, result) = run("func main() { var x = 1 == 'a'; }");
        assert!(matches!(result, Err(RuntimeError::EqualityOperands { .. })));
    }

    #[test]
    fn negating_a_double_is_rejected() {
        let (_, result) = run("func main() { var x = -2.5; }");
        assert!(matches!(result, Err(RuntimeError::IntOperand { .. })));
    }

    #[test]
    fn division_by_zero() {
        let (_, result) = run("func main() { var x = 1 / 0; }");
        assert!(matches!(result, Err(RuntimeError::DivisionByZero { .. })));
    }

    #[test]
    fn missing_main() {
        let file = SourceFile::new("func helper() { return 1; }".to_string());
        let result = Compiler::new(&file).compile();
        assert!(result.ok());
        let mut out = Vec::new();
        let run = Vm::new(&result.program, io::Cursor::new(String::new()), &mut out).run();
        assert!(matches!(run, Err(RuntimeError::MainNotFound)));
    }

    #[test]
    fn runaway_recursion_overflows_the_stack() {
        let (_, result) = run("func f(n) { return f(n + 1); }\nfunc main() { f(0); }");
        assert!(matches!(result, Err(RuntimeError::StackOverflow { .. })));
    }

    #[test]
    fn geti_reads_integers() {
        let source = "func main() { var x = 0; geti(x); print(\"{x + 1}\\n\"); }";
        let (out, result) = run_with_input(source, "41\n");
        result.unwrap();
        assert_eq!(out, "42\n");
    }

    #[test]
    fn geti_accepts_negative_numbers() {
        let source = "var g; func main() { geti(g); print(\"{g}\\n\"); }";
        let (out, result) = run_with_input(source, "  -17\n");
        result.unwrap();
        assert_eq!(out, "-17\n");
    }

    #[test]
    fn getd_reads_doubles() {
        let source = "func main() { var x = 0.0; getd(x); print(\"{x}\\n\"); }";
        let (out, result) = run_with_input(source, "2.5\n");
        result.unwrap();
        assert_eq!(out, "2.500000\n");
    }

    #[test]
    fn getc_reads_one_byte() {
        let source = "func main() { var c = 'x'; getc(c); print(\"{c}{c}\\n\"); }";
        let (out, result) = run_with_input(source, "q");
        result.unwrap();
        assert_eq!(out, "qq\n");
    }

    #[test]
    fn print_expands_escapes_in_stored_strings() {
        let source = "func main() { var s = \"a\\tb\"; print(\"{s}\\n\"); }";
        assert_eq!(output(source), "a\tb\n");
    }

    #[test]
    fn chars_and_bools_print_naturally() {
        assert_eq!(
            output("func main() { print(\"{'z'} {true} {nil}\\n\"); }"),
            "z true nil\n"
        );
    }

    #[test]
    fn expression_statements_leave_a_clean_stack() {
        // Net stack effect of a statement is zero; a long statement sequence
        // must end with an empty stack (main_ret leaves only the frame).
        let source = "func main() { 1 + 2; 3 * 4; var x = 5; x = x + 1; }";
        let file = SourceFile::new(source.to_string());
        let result = Compiler::new(&file).compile();
        assert!(result.ok());
        let mut out = Vec::new();
        let mut vm = Vm::new(&result.program, io::Cursor::new(String::new()), &mut out);
        vm.run().unwrap();
        // After main_ret: saved bp was popped by ipop_bp, locals by scope
        // exit; only nothing remains.
        assert!(vm.stack.is_empty());
    }
}
