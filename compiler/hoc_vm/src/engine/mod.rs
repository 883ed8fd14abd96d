//! Fetch-decode-execute loop and opcode dispatch.
//!
//! `execute` walks a body from a start position until it meets a `Stop`
//! word or sees `returning` set. Structured statements (`if`, loops,
//! iterator statements) re-enter `execute` for their arms and inspect
//! `returning` when the arm comes back.
//!
//! Handlers are grouped by concern:
//! - `arith`: arithmetic, comparison and logic
//! - `control`: branches, loops, `break`/`continue`/`stop`, iterators
//! - `vars`: variables, strings, assignment, declarations
//! - `args`: `$i` style argument access and the return opcodes
//! - `objects`: object references, `new`, member dispatch
//! - `output`: `print` and friends

mod args;
mod arith;
mod control;
mod objects;
mod output;
mod vars;

use std::rc::Rc;

use hoc_ir::{Code, CodeError, Inst, Opcode};

use crate::diagnostics::ExecCounters;
use crate::errors::{interrupted, ExecResult};
use crate::interpreter::{Interpreter, Returning};
use crate::stack::StackEntry;
use crate::stack_guard::ensure_sufficient_stack;

use arith::BinaryOp;

/// Where execution continues after an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    /// The instruction after this one's operands.
    Next,
    /// An absolute word position in the same body.
    Jump(usize),
}

/// Operand class of a stack entry, for handlers that accept several.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Operand {
    Number,
    Str,
    Object,
    Pointer,
    Other,
}

impl Operand {
    fn of(entry: &StackEntry) -> Self {
        match entry {
            StackEntry::Number(_) => Operand::Number,
            StackEntry::Str(_) => Operand::Str,
            StackEntry::ObjCell(_) | StackEntry::ObjTemp(_) => Operand::Object,
            StackEntry::Var(_) => Operand::Pointer,
            _ => Operand::Other,
        }
    }
}

impl Interpreter {
    /// Class of the entry `depth` below the top.
    fn operand_at(&self, depth: usize) -> ExecResult<Operand> {
        self.stack.peek(depth).map(Operand::of)
    }

    /// Run `code` from `pc` until a `Stop` word or a pending control
    /// transfer.
    pub(crate) fn execute(&mut self, code: &Rc<Code>, pc: usize) -> ExecResult<()> {
        ensure_sufficient_stack(|| self.run_from(code, pc))
    }

    fn run_from(&mut self, code: &Rc<Code>, start: usize) -> ExecResult<()> {
        let mut pc = start;
        while self.returning == Returning::Running {
            let op = match code.get(pc) {
                Some(Inst::Stop) => break,
                Some(Inst::Op(op)) => *op,
                Some(_) => return Err(CodeError::ExpectedOpcode { pos: pc }.into()),
                None => return Err(CodeError::MissingStop.into()),
            };
            if self.interrupt.take() {
                return Err(interrupted());
            }
            self.count(ExecCounters::count_instruction);
            pc = match self.step(op, code, pc)? {
                Flow::Next => pc + 1 + op.arity(),
                Flow::Jump(target) => target,
            };
        }
        Ok(())
    }

    /// Execute the instruction `op` at `pos`.
    fn step(&mut self, op: Opcode, code: &Rc<Code>, pos: usize) -> ExecResult<Flow> {
        let at = pos + 1;
        match op {
            // Stack and variables
            Opcode::Pop => {
                let entry = self.stack.pop()?;
                self.release_entry(entry)?;
            }
            Opcode::PushZero => self.stack.push_number(0.0)?,
            Opcode::ConstPush => self.const_push(code.symbol_at(at)?)?,
            Opcode::PushString => self.push_string(code.symbol_at(at)?)?,
            Opcode::VarPush => self.stack.push(StackEntry::Symbol(code.symbol_at(at)?))?,
            Opcode::Eval => self.eval()?,
            Opcode::EvalPointer => self.eval_pointer()?,
            Opcode::Assign => self.assign(code.int_at(at)?)?,
            Opcode::AssignStr | Opcode::AsgnObjToStr => self.assign_str()?,
            Opcode::Bltin => self.builtin(code.symbol_at(at)?)?,

            // Arithmetic, comparison and logic
            Opcode::Add => self.binary(BinaryOp::Add)?,
            Opcode::Sub => self.binary(BinaryOp::Sub)?,
            Opcode::Mul => self.binary(BinaryOp::Mul)?,
            Opcode::Div => self.binary(BinaryOp::Div)?,
            Opcode::Cyclic => self.binary(BinaryOp::Cyclic)?,
            Opcode::Power => self.binary(BinaryOp::Power)?,
            Opcode::Gt => self.binary(BinaryOp::Gt)?,
            Opcode::Lt => self.binary(BinaryOp::Lt)?,
            Opcode::Ge => self.binary(BinaryOp::Ge)?,
            Opcode::Le => self.binary(BinaryOp::Le)?,
            Opcode::And => self.binary(BinaryOp::And)?,
            Opcode::Or => self.binary(BinaryOp::Or)?,
            Opcode::Negate => self.negate()?,
            Opcode::Not => self.not()?,
            Opcode::Eq => self.equality(false)?,
            Opcode::Ne => self.equality(true)?,

            // Output
            Opcode::Print => self.print_line()?,
            Opcode::PrExpr => self.print_expr()?,
            Opcode::PrStr => self.print_str()?,
            Opcode::Newline => self.print.newline(),

            // Control flow
            Opcode::If => return self.if_code(code, pos),
            Opcode::For => return self.for_code(code, pos),
            Opcode::ShortFor => return self.short_for(code, pos),
            Opcode::ForSegment => return self.for_segment(code, pos),
            Opcode::Break => self.returning = Returning::Break,
            Opcode::Continue => self.returning = Returning::Continue,
            Opcode::HardStop => self.returning = Returning::Stop,

            // Calls and arguments
            Opcode::Call => self.call_symbol(code.symbol_at(at)?, code.count_at(at + 1)?)?,
            Opcode::Arg => self.arg(code.count_at(at)?)?,
            Opcode::ArgAssign => self.arg_assign(code.count_at(at)?, code.int_at(at + 1)?)?,
            Opcode::StringArg => self.string_arg(code.count_at(at)?)?,
            Opcode::ObjectArg => self.object_arg(code.count_at(at)?)?,
            Opcode::ArgRef => self.arg_ref(code.count_at(at)?, code.int_at(at + 1)? != 0)?,
            Opcode::ArgRefAssign => self.arg_ref_assign(
                code.count_at(at)?,
                code.int_at(at + 1)? != 0,
                code.int_at(at + 2)?,
            )?,
            Opcode::ArgRefArg => self.arg_ref_arg(code.count_at(at)?)?,
            Opcode::FuncRet => self.func_ret()?,
            Opcode::ProcRet => self.proc_ret()?,
            Opcode::ObjRet => self.obj_ret()?,

            // Locals and iterators
            Opcode::AutoObject => {
                let cell = self.object_cell(code.symbol_at(at)?)?;
                self.stack.push(StackEntry::ObjCell(cell))?;
            }
            Opcode::Iterator => return self.iterator_call(code, pos),
            Opcode::IteratorStmt => self.iterator_statement()?,
            Opcode::PushCurrentObject => {
                let owned = self.retain(self.context)?;
                self.push_temp(owned)?;
            }

            // Objects
            Opcode::ObjectVar => {
                let cell = self.object_cell(code.symbol_at(at)?)?;
                self.stack.push(StackEntry::ObjCell(cell))?;
            }
            Opcode::ObjVarDecl => self.objvar_decl(code.symbol_at(at)?, code.count_at(at + 1)?)?,
            Opcode::NewObj => self.new_object_assign(code.symbol_at(at)?, code.count_at(at + 1)?)?,
            Opcode::NewObjArg => {
                let owned = self.construct(code.symbol_at(at)?, code.count_at(at + 1)?)?;
                self.push_temp(owned)?;
            }
            Opcode::ObjectComponent => self.object_component(code, pos)?,
            Opcode::ObjectIter => return self.object_iterator(code, pos),
            Opcode::ObjectEval => self.object_eval()?,
            Opcode::ObjectAsgn => self.object_assign(code.int_at(at)?)?,
            Opcode::ObPointer => self.object_pointer()?,
            Opcode::ConstObject => self.const_object(code.symbol_at(at)?)?,

            // Type markers carry nothing the engine checks.
            Opcode::CmpOtype | Opcode::KnownType => {}

            // Declarations
            Opcode::DeleteSymbol => self.delete_symbol(code.symbol_at(at)?)?,
            Opcode::ArrayInstall => self.array_install(code.count_at(at)?)?,
        }
        Ok(Flow::Next)
    }
}
