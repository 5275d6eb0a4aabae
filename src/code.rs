//! Instructions, code blocks and the arena that owns them. Compiled code is
//! only ever referenced through a [CodeHandle]: a small 1-based index into
//! the arena. Handle 0 is reserved as the invalid handle; blocks are never
//! renumbered, so a handle stays valid for the life of the context.

use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::error::LanguageError;
use crate::value::Val;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeHandle(usize);

impl CodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for CodeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Label,
    PushConst,
    LocalGet,
    LocalSet,
    GlobalGet,
    GlobalSet,
    Pop,
    Dup,
    JmpIfTrue,
    JmpIfFalse,
    Jmp,
    MakeEnv,
    MakeEnvdot,
    MakeClosure,
    SaveReturn,
    JmpClosure,
    Return,
    CallPrimop,
}

impl Opcode {
    /// The jump family: instructions whose first operand is a label that
    /// assembly rewrites into an integer target in the second operand.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::JmpIfTrue | Opcode::JmpIfFalse | Opcode::SaveReturn
        )
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Label => "LABEL",
            Opcode::PushConst => "PUSH_CONST",
            Opcode::LocalGet => "LOCAL_GET",
            Opcode::LocalSet => "LOCAL_SET",
            Opcode::GlobalGet => "GLOBAL_GET",
            Opcode::GlobalSet => "GLOBAL_SET",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::JmpIfTrue => "JMP_IF_TRUE",
            Opcode::JmpIfFalse => "JMP_IF_FALSE",
            Opcode::Jmp => "JMP",
            Opcode::MakeEnv => "MAKE_ENV",
            Opcode::MakeEnvdot => "MAKE_ENVDOT",
            Opcode::MakeClosure => "MAKE_CLOSURE",
            Opcode::SaveReturn => "SAVE_RETURN",
            Opcode::JmpClosure => "JMP_CLOSURE",
            Opcode::Return => "RETURN",
            Opcode::CallPrimop => "CALL_PRIMOP",
        };
        write!(f, "{}", name)
    }
}

/// One machine instruction. Operands are plain values; the optional debug
/// text never affects execution and is excluded from equality, which the
/// compiler relies on when comparing branches.
#[derive(Clone)]
pub struct Instruction {
    pub op: Opcode,
    pub a: Val,
    pub b: Val,
    pub debug: Option<String>,
}

impl Instruction {
    pub fn new(op: Opcode, a: Val, b: Val) -> Instruction {
        Instruction {
            op,
            a,
            b,
            debug: None,
        }
    }

    pub fn with_debug(op: Opcode, a: Val, b: Val, debug: impl Into<String>) -> Instruction {
        Instruction {
            op,
            a,
            b,
            debug: Some(debug.into()),
        }
    }
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Instruction) -> bool {
        self.op == other.op && self.a == other.a && self.b == other.b
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.a.is_nil() || !self.b.is_nil() {
            write!(f, " {}", self.a)?;
        }
        if !self.b.is_nil() {
            write!(f, " {}", self.b)?;
        }
        if let Some(debug) = &self.debug {
            write!(f, " ; {}", debug)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[derive(Debug)]
pub struct CodeBlock {
    pub handle: CodeHandle,
    pub instructions: Vec<Instruction>,
    pub debug: String,
}

impl CodeBlock {
    pub fn disassemble(&self) -> String {
        let mut out = format!("block {} ; {}\n", self.handle, self.debug);
        for (i, instr) in self.instructions.iter().enumerate() {
            out.push_str(&format!("  {:4} {}\n", i, instr));
        }
        out
    }
}

/// The arena of compiled blocks. Slot 0 is permanently reserved so that a
/// zero handle can never name real code; removal leaves a hole.
pub struct CodeArena {
    blocks: RefCell<Vec<Option<Rc<CodeBlock>>>>,
}

impl CodeArena {
    pub fn new() -> CodeArena {
        CodeArena {
            blocks: RefCell::new(vec![None]),
        }
    }

    pub fn add(&self, instructions: Vec<Instruction>, debug: impl Into<String>) -> CodeHandle {
        let mut blocks = self.blocks.borrow_mut();
        let handle = CodeHandle(blocks.len());
        blocks.push(Some(Rc::new(CodeBlock {
            handle,
            instructions,
            debug: debug.into(),
        })));
        handle
    }

    pub fn get(&self, handle: CodeHandle) -> Result<Rc<CodeBlock>, LanguageError> {
        self.blocks
            .borrow()
            .get(handle.0)
            .and_then(|slot| slot.clone())
            .ok_or(LanguageError::BadCodeHandle(handle.0))
    }

    pub fn contains(&self, handle: CodeHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Drops the block at `handle`, leaving a hole; the handle is never
    /// reissued.
    pub fn remove(&self, handle: CodeHandle) {
        let mut blocks = self.blocks.borrow_mut();
        if handle.0 >= 1 {
            if let Some(slot) = blocks.get_mut(handle.0) {
                *slot = None;
            }
        }
    }
}

impl Default for CodeArena {
    fn default() -> Self {
        CodeArena::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Vec<Instruction> {
        vec![
            Instruction::new(Opcode::PushConst, Val::I64(1), Val::Nil),
            Instruction::new(Opcode::Return, Val::Nil, Val::Nil),
        ]
    }

    #[test]
    fn handles_are_one_based_and_stable() {
        let arena = CodeArena::new();
        let a = arena.add(block(), "a");
        let b = arena.add(block(), "b");
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 2);

        arena.remove(a);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));

        let c = arena.add(block(), "c");
        assert_eq!(c.index(), 3);
    }

    #[test]
    fn invalid_handles_are_rejected(){
        let arena = CodeArena::new();
        assert!(arena.get(CodeHandle(0)).is_err());
        assert!(arena.get(CodeHandle(99)).is_err());
    }

    #[test]
    fn instruction_equality_ignores_debug_text() {
        let a = Instruction::with_debug(Opcode::PushConst, Val::I64(1), Val::Nil, "x");
        let b = Instruction::new(Opcode::PushConst, Val::I64(1), Val::Nil);
        assert_eq!(a, b);

        let c = Instruction::new(Opcode::PushConst, Val::I64(2), Val::Nil);
        assert_ne!(a, c);
    }

    #[test]
    fn disassembly_mentions_every_instruction() {
        let arena = CodeArena::new();
        let h = arena.add(block(), "demo");
        let text = arena.get(h).unwrap().disassemble();
        assert!(text.contains("PUSH_CONST"));
        assert!(text.contains("RETURN"));
        assert!(text.contains("demo"));
    }
}
