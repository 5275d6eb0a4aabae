//! The stack machine. [Machine] borrows the shared context; every call to
//! [Machine::execute] runs on a fresh [State], which is what makes the nested
//! calls from macro expansion and the `eval`/`map`/`apply` primitives plain
//! host-stack recursion.

use std::rc::Rc;

use itertools::Itertools;

use crate::code::{CodeBlock, Instruction, Opcode};
use crate::context::Context;
use crate::env::{self, Env, EnvRef, VarPos};
use crate::error::{LanguageError, Result};
use crate::symbol::Symbol;
use crate::value::{Closure, ReturnAddress, Val};

/// Mutable machine registers: current closure, instruction index, environment,
/// evaluation stack, the transient argument-count register, and the halt flag.
pub struct State {
    func: Rc<Closure>,
    pc: usize,
    env: Option<EnvRef>,
    stack: Vec<Val>,
    argcount: usize,
    done: bool,
}

impl State {
    fn new(func: Rc<Closure>, args: &[Val]) -> State {
        State {
            env: func.env.clone(),
            stack: args.to_vec(),
            argcount: args.len(),
            pc: 0,
            done: false,
            func,
        }
    }

    fn pop(&mut self) -> Result<Val, LanguageError> {
        self.stack.pop().ok_or(LanguageError::StackUnderflow)
    }

    fn top(&self) -> Result<Val, LanguageError> {
        self.stack
            .last()
            .cloned()
            .ok_or(LanguageError::StackUnderflow)
    }

    fn env(&self) -> Result<&EnvRef, LanguageError> {
        self.env.as_ref().ok_or(LanguageError::InvalidVarPos {
            frame: 0,
            slot: 0,
        })
    }
}

pub struct Machine<'a> {
    ctx: &'a Context,
}

impl<'a> Machine<'a> {
    pub fn new(ctx: &'a Context) -> Machine<'a> {
        Machine { ctx }
    }

    /// Runs `closure` to completion with `args` and returns the value left on
    /// top of the stack.
    pub fn execute(&self, closure: &Rc<Closure>, args: &[Val]) -> Result<Val> {
        let mut st = State::new(closure.clone(), args);
        let mut block = self.ctx.code.get(st.func.code)?;

        while !st.done {
            let Some(instr) = block.instructions.get(st.pc).cloned() else {
                return Err(LanguageError::RunawayInstructions(st.func.debug_name()).into());
            };

            if self.ctx.logger.stack.get() {
                self.trace(&st, &instr);
            }
            st.pc += 1;

            if let Some(new_block) = self.step(&mut st, &instr, &block)? {
                block = new_block;
            }
        }

        st.stack.pop().ok_or_else(|| LanguageError::StackUnderflow.into())
    }

    fn trace(&self, st: &State, instr: &Instruction) {
        let stack = st.stack.iter().map(|v| v.to_string()).join(" ");
        self.ctx.logger.log(format_args!(
            "[{}] {:4} {:<30} | {}",
            st.func.debug_name(),
            st.pc,
            instr.to_string(),
            stack
        ));
    }

    /// Executes one instruction. Returns the new code block when control
    /// transferred to a different closure.
    fn step(
        &self,
        st: &mut State,
        instr: &Instruction,
        block: &Rc<CodeBlock>,
    ) -> Result<Option<Rc<CodeBlock>>> {
        match instr.op {
            Opcode::Label => {}

            Opcode::PushConst => st.stack.push(instr.a.clone()),

            Opcode::LocalGet => {
                let pos = var_pos(instr)?;
                let val = env::get_value(st.env()?, pos)?;
                st.stack.push(val);
            }

            Opcode::LocalSet => {
                let pos = var_pos(instr)?;
                let val = st.top()?;
                env::set_value(st.env()?, pos, val)?;
            }

            Opcode::GlobalGet => {
                let sym = symbol_operand(instr)?;
                let val = match sym.home() {
                    Some(home) => home.borrow().binding(sym.name()).unwrap_or(Val::Nil),
                    None => Val::Nil,
                };
                st.stack.push(val);
            }

            Opcode::GlobalSet => {
                let sym = symbol_operand(instr)?;
                let val = st.top()?;
                if let Some(home) = sym.home() {
                    if val.is_nil() {
                        home.borrow_mut().remove_binding(sym.name());
                    } else {
                        home.borrow_mut().set_binding(sym.name(), val);
                    }
                }
            }

            Opcode::Pop => {
                st.pop()?;
            }

            Opcode::Dup => {
                let val = st.top()?;
                st.stack.push(val);
            }

            Opcode::JmpIfTrue => {
                let val = st.pop()?;
                if val.cast_bool() {
                    st.pc = jump_target(instr, block)?;
                }
            }

            Opcode::JmpIfFalse => {
                let val = st.pop()?;
                if !val.cast_bool() {
                    st.pc = jump_target(instr, block)?;
                }
            }

            Opcode::Jmp => st.pc = jump_target(instr, block)?,

            Opcode::MakeEnv => {
                let n = int_operand(&instr.a)? as usize;
                if st.argcount != n {
                    return Err(LanguageError::WrongArgCount {
                        expected: n,
                        got: st.argcount,
                    }
                    .into());
                }
                let (named, _) = param_symbols(&st.func.args);
                let frame = Env::new(named, st.env.clone());
                for slot in (0..n).rev() {
                    let val = st.pop()?;
                    env::set_value(&frame, VarPos { frame: 0, slot }, val)?;
                }
                st.env = Some(frame);
            }

            Opcode::MakeEnvdot => {
                let n = int_operand(&instr.a)? as usize;
                if st.argcount < n {
                    return Err(LanguageError::TooFewArgs {
                        expected: n,
                        got: st.argcount,
                    }
                    .into());
                }
                let (mut symbols, rest) = param_symbols(&st.func.args);
                if let Some(rest) = rest {
                    symbols.push(rest);
                }
                let frame = Env::new(symbols, st.env.clone());

                // Collect the extra arguments into a list, preserving their
                // original order.
                let mut extras = Val::Nil;
                for _ in 0..(st.argcount - n) {
                    extras = Val::cons(st.pop()?, extras);
                }
                env::set_value(&frame, VarPos { frame: 0, slot: n }, extras)?;

                for slot in (0..n).rev() {
                    let val = st.pop()?;
                    env::set_value(&frame, VarPos { frame: 0, slot }, val)?;
                }
                st.env = Some(frame);
            }

            Opcode::MakeClosure => {
                let Val::Closure(template) = &instr.a else {
                    return Err(LanguageError::TypeMismatch {
                        expected: "a closure template",
                        got: instr.a.to_string(),
                    }
                    .into());
                };
                st.stack.push(Val::Closure(Rc::new(Closure {
                    code: template.code,
                    env: st.env.clone(),
                    args: template.args.clone(),
                    name: template.name.clone(),
                })));
            }

            Opcode::SaveReturn => {
                let pc = int_operand(&instr.b)? as usize;
                st.stack.push(Val::Return(Rc::new(ReturnAddress {
                    func: st.func.clone(),
                    pc,
                    env: st.env.clone(),
                    debug: st.func.debug_name(),
                })));
            }

            Opcode::JmpClosure => {
                let n = int_operand(&instr.a)? as usize;
                let callee = st.pop()?;
                let Val::Closure(callee) = callee else {
                    return Err(LanguageError::NotAClosure(callee.to_string()).into());
                };
                // The caller's argument frame is abandoned here; the argument
                // values themselves are already on the stack.
                st.env = callee.env.clone();
                st.pc = 0;
                st.argcount = n;
                st.func = callee;
                return Ok(Some(self.ctx.code.get(st.func.code)?));
            }

            Opcode::Return => {
                if st.stack.len() > 1 {
                    let ret = st.pop()?;
                    let addr = st.pop()?;
                    let Val::Return(addr) = addr else {
                        return Err(LanguageError::ReturnWithoutAddress.into());
                    };
                    st.stack.push(ret);
                    st.func = addr.func.clone();
                    st.env = addr.env.clone();
                    st.pc = addr.pc;
                    return Ok(Some(self.ctx.code.get(st.func.code)?));
                }
                st.done = true;
            }

            Opcode::CallPrimop => {
                let Val::Str(name) = &instr.a else {
                    return Err(LanguageError::UnknownPrimitive(instr.a.to_string()).into());
                };
                let argc = int_operand(&instr.b)? as usize;
                let prim = self
                    .ctx
                    .primitives
                    .get(name)
                    .ok_or_else(|| LanguageError::UnknownPrimitive(name.to_string()))?;
                if st.stack.len() < argc {
                    return Err(LanguageError::StackUnderflow.into());
                }
                let args = st.stack.split_off(st.stack.len() - argc);
                let result = (prim.func)(self.ctx, &args)?;
                st.stack.push(result);
            }
        }
        Ok(None)
    }
}

fn int_operand(v: &Val) -> Result<i64, LanguageError> {
    match v {
        Val::I64(n) => Ok(*n),
        other => Err(LanguageError::TypeMismatch {
            expected: "an integer operand",
            got: other.to_string(),
        }),
    }
}

fn symbol_operand(instr: &Instruction) -> Result<Rc<Symbol>, LanguageError> {
    match &instr.a {
        Val::Symbol(sym) => Ok(sym.clone()),
        other => Err(LanguageError::TypeMismatch {
            expected: "a symbol operand",
            got: other.to_string(),
        }),
    }
}

fn var_pos(instr: &Instruction) -> Result<VarPos, LanguageError> {
    let frame = int_operand(&instr.a)?;
    let slot = int_operand(&instr.b)?;
    if frame < 0 || slot < 0 {
        return Err(LanguageError::InvalidVarPos {
            frame: frame.max(0) as usize,
            slot: slot.max(0) as usize,
        });
    }
    Ok(VarPos {
        frame: frame as usize,
        slot: slot as usize,
    })
}

fn jump_target(instr: &Instruction, block: &Rc<CodeBlock>) -> Result<usize, LanguageError> {
    match instr.b {
        Val::I64(n) if n >= 0 && (n as usize) < block.instructions.len() => Ok(n as usize),
        Val::I64(n) => Err(LanguageError::BadJumpTarget(n)),
        _ => Err(LanguageError::BadJumpTarget(-1)),
    }
}

/// Best-effort split of a declared argument list into named symbols and an
/// optional rest symbol. The compiler has already validated the shape.
fn param_symbols(args: &Val) -> (Vec<Rc<Symbol>>, Option<Rc<Symbol>>) {
    if let Val::Symbol(rest) = args {
        return (Vec::new(), Some(rest.clone()));
    }
    match args.to_list() {
        Some((items, tail)) => {
            let named = items
                .into_iter()
                .filter_map(|v| v.as_symbol().cloned())
                .collect();
            let rest = tail.and_then(|t| t.as_symbol().cloned());
            (named, rest)
        }
        None => (Vec::new(), None),
    }
}
