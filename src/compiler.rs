//! The compiler turns one expression into a code block. Every sub-expression
//! carries two flags: `used` (false means the value is discarded, so constants
//! and bare variable references compile to nothing) and `more` (false marks
//! tail position, where value-producing code is followed by `RETURN`).
//! Macros run on the machine during compilation, so the compiler and the
//! machine are mutually recursive through the shared context.

use std::rc::Rc;

use fxhash::FxHashMap;

use crate::code::{CodeHandle, Instruction, Opcode};
use crate::context::Context;
use crate::env::{self, EnvRef};
use crate::error::{CompileError, Error, Result};
use crate::symbol::Symbol;
use crate::value::{Closure, MacroDef, Val};
use crate::vm::Machine;

pub struct CompiledUnit {
    pub closure: Rc<Closure>,
    /// Every code block this compilation added to the arena, wrapper last.
    pub handles: Vec<CodeHandle>,
}

/// Compiles `expr` into a synthetic zero-argument closure whose body is the
/// expression.
pub fn compile(ctx: &Context, expr: &Val) -> Result<CompiledUnit> {
    let mut compiler = Compiler::new(ctx);

    let mut code = vec![Instruction::new(Opcode::MakeEnv, Val::I64(0), Val::Nil)];
    compiler.expr(expr, &None, true, false, &mut code)?;
    let code = compiler.assemble(code)?;

    let handle = ctx.code.add(code, clip(&expr.to_string()));
    compiler.handles.push(handle);

    let closure = Rc::new(Closure {
        code: handle,
        env: None,
        args: Val::Nil,
        name: None,
    });
    Ok(CompiledUnit {
        closure,
        handles: compiler.handles,
    })
}

/// Expands `expr` once if its head names a macro. Returns the (possibly
/// unchanged) form and whether an expansion happened.
pub fn macroexpand_1(ctx: &Context, expr: &Val) -> Result<(Val, bool)> {
    if let Some((items, None)) = expr.to_list() {
        if let Some(head) = items.first().and_then(|h| h.as_symbol()) {
            if let Some(def) = macro_lookup(head) {
                let expanded = run_macro(ctx, &def, &items[1..])?;
                return Ok((expanded, true));
            }
        }
    }
    Ok((expr.clone(), false))
}

/// Expands the head position until it stops changing, then recursively
/// expands each element of the resulting list.
pub fn macroexpand_full(ctx: &Context, expr: &Val) -> Result<Val> {
    let mut current = expr.clone();
    loop {
        let (next, changed) = macroexpand_1(ctx, &current)?;
        current = next;
        if !changed {
            break;
        }
    }

    if current.is_cons() {
        if let Some(items) = current.proper_list() {
            let expanded = items
                .iter()
                .map(|item| macroexpand_full(ctx, item))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Val::list_from(expanded));
        }
    }
    Ok(current)
}

fn macro_lookup(sym: &Rc<Symbol>) -> Option<Rc<MacroDef>> {
    let home = sym.home()?;
    let def = home.borrow().macro_def(sym.name());
    def
}

/// Runs a macro body on a fresh machine state with the unevaluated argument
/// forms. Failures surface as compile errors even though they come from the
/// machine.
fn run_macro(ctx: &Context, def: &Rc<MacroDef>, args: &[Val]) -> Result<Val> {
    Machine::new(ctx).execute(&def.body, args).map_err(|e| {
        Error::Compile(CompileError::MacroExpansion {
            name: def.name.name().to_string(),
            source: Box::new(e),
        })
    })
}

fn clip(text: &str) -> String {
    if text.chars().count() > 60 {
        let head: String = text.chars().take(57).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

struct Compiler<'a> {
    ctx: &'a Context,
    labels: usize,
    handles: Vec<CodeHandle>,
}

impl<'a> Compiler<'a> {
    fn new(ctx: &'a Context) -> Compiler<'a> {
        Compiler {
            ctx,
            labels: 0,
            handles: Vec::new(),
        }
    }

    fn label(&mut self) -> String {
        let label = format!("L{}", self.labels);
        self.labels += 1;
        label
    }

    fn expr(
        &mut self,
        expr: &Val,
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        match expr {
            Val::Symbol(sym) => {
                if !used {
                    return Ok(());
                }
                match env::lookup(env, sym) {
                    Some(pos) => out.push(Instruction::with_debug(
                        Opcode::LocalGet,
                        Val::I64(pos.frame as i64),
                        Val::I64(pos.slot as i64),
                        sym.full_name(),
                    )),
                    None => out.push(Instruction::new(
                        Opcode::GlobalGet,
                        Val::Symbol(sym.clone()),
                        Val::Nil,
                    )),
                }
                self.epilogue(true, more, out);
                Ok(())
            }
            Val::Cons(_) => self.combination(expr, env, used, more, out),
            constant => {
                self.constant(constant.clone(), used, more, out);
                Ok(())
            }
        }
    }

    /// Constants compile to nothing when their value is discarded.
    fn constant(&mut self, value: Val, used: bool, more: bool, out: &mut Vec<Instruction>) {
        if !used {
            return;
        }
        out.push(Instruction::new(Opcode::PushConst, value, Val::Nil));
        self.epilogue(true, more, out);
    }

    fn epilogue(&mut self, used: bool, more: bool, out: &mut Vec<Instruction>) {
        if !used {
            out.push(Instruction::new(Opcode::Pop, Val::Nil, Val::Nil));
        }
        if !more {
            out.push(Instruction::new(Opcode::Return, Val::Nil, Val::Nil));
        }
    }

    fn combination(
        &mut self,
        expr: &Val,
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        let Some(items) = expr.proper_list() else {
            return Err(CompileError::WrongForm {
                form: "call",
                expected: "a proper list",
            }
            .into());
        };
        let (head, args) = items.split_first().expect("cons is never empty");

        if let Val::Symbol(sym) = head {
            if let Some(def) = macro_lookup(sym) {
                let expanded = run_macro(self.ctx, &def, args)?;
                return self.expr(&expanded, env, used, more, out);
            }

            let sp = &self.ctx.specials;
            if Rc::ptr_eq(sym, &sp.quote) {
                return self.quote(args, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.begin) {
                return self.begin(args, env, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.set) {
                return self.set(args, env, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.if_) {
                return self.if_(args, env, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.if_star) {
                return self.if_star(args, env, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.while_) {
                return self.while_(args, env, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.lambda) {
                return self.lambda_form(args, env, used, more, out);
            }
            if Rc::ptr_eq(sym, &sp.defmacro) {
                return self.defmacro(args, env, used, more, out);
            }
        }

        self.call(head, args, env, used, more, out)
    }

    fn quote(
        &mut self,
        args: &[Val],
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        if args.len() != 1 {
            return Err(CompileError::WrongForm {
                form: "quote",
                expected: "exactly one form",
            }
            .into());
        }
        self.constant(args[0].clone(), used, more, out);
        Ok(())
    }

    fn begin(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        match args.split_last() {
            None => {
                self.constant(Val::Nil, used, more, out);
                Ok(())
            }
            Some((last, init)) => {
                for form in init {
                    self.expr(form, env, false, true, out)?;
                }
                self.expr(last, env, used, more, out)
            }
        }
    }

    fn set(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        if args.len() != 2 {
            return Err(CompileError::WrongForm {
                form: "set!",
                expected: "a symbol and a value",
            }
            .into());
        }
        let Val::Symbol(sym) = &args[0] else {
            return Err(CompileError::InvalidSetTarget(args[0].to_string()).into());
        };

        // Name closures after the variable they are stored in.
        if self.is_lambda_form(&args[1]) {
            let forms = args[1].proper_list().ok_or(CompileError::WrongForm {
                form: "lambda",
                expected: "a proper list",
            })?;
            let template =
                self.lambda(&forms[1], &forms[2..], env, Some(sym.name().to_string()))?;
            out.push(Instruction::new(
                Opcode::MakeClosure,
                Val::Closure(template),
                Val::Nil,
            ));
        } else {
            self.expr(&args[1], env, true, true, out)?;
        }

        match env::lookup(env, sym) {
            Some(pos) => out.push(Instruction::with_debug(
                Opcode::LocalSet,
                Val::I64(pos.frame as i64),
                Val::I64(pos.slot as i64),
                sym.full_name(),
            )),
            None => out.push(Instruction::new(
                Opcode::GlobalSet,
                Val::Symbol(sym.clone()),
                Val::Nil,
            )),
        }
        self.epilogue(used, more, out);
        Ok(())
    }

    fn is_lambda_form(&self, v: &Val) -> bool {
        match v.first() {
            Some(Val::Symbol(head)) => {
                Rc::ptr_eq(&head, &self.ctx.specials.lambda)
                    && v.proper_list().map(|l| l.len() >= 2).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// A literal predicate decides the branch at compile time: `#f` picks the
    /// else branch; numbers, strings and `#t` pick the then branch. Nothing
    /// else folds — notably nil does not, even though the machine treats it
    /// as false.
    fn fold_if(&self, pred: &Val) -> Option<bool> {
        match pred {
            Val::Bool(false) => Some(false),
            Val::Bool(true) => Some(true),
            Val::I32(_) | Val::I64(_) | Val::U32(_) | Val::U64(_) => Some(true),
            Val::F32(_) | Val::F64(_) => Some(true),
            Val::Str(_) => Some(true),
            _ => None,
        }
    }

    fn if_(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        if args.len() != 2 && args.len() != 3 {
            return Err(CompileError::WrongForm {
                form: "if",
                expected: "two or three forms",
            }
            .into());
        }

        if let Some(truthy) = self.fold_if(&args[0]) {
            return if truthy {
                self.expr(&args[1], env, used, more, out)
            } else if args.len() == 3 {
                self.expr(&args[2], env, used, more, out)
            } else {
                self.constant(Val::Nil, used, more, out);
                Ok(())
            };
        }

        let mut then_code = Vec::new();
        self.expr(&args[1], env, used, more, &mut then_code)?;

        let mut else_code = Vec::new();
        if args.len() == 3 {
            self.expr(&args[2], env, used, more, &mut else_code)?;
        } else {
            self.constant(Val::Nil, used, more, &mut else_code);
        }

        // Identical branches collapse to (begin pred then).
        if then_code == else_code {
            self.expr(&args[0], env, false, true, out)?;
            out.extend(then_code);
            return Ok(());
        }

        self.expr(&args[0], env, true, true, out)?;
        let l_else = self.label();
        out.push(Instruction::new(
            Opcode::JmpIfFalse,
            Val::string(l_else.clone()),
            Val::Nil,
        ));
        out.extend(then_code);
        if more {
            let l_done = self.label();
            out.push(Instruction::new(
                Opcode::Jmp,
                Val::string(l_done.clone()),
                Val::Nil,
            ));
            out.push(Instruction::new(
                Opcode::Label,
                Val::string(l_else),
                Val::Nil,
            ));
            out.extend(else_code);
            out.push(Instruction::new(
                Opcode::Label,
                Val::string(l_done),
                Val::Nil,
            ));
        } else {
            out.push(Instruction::new(
                Opcode::Label,
                Val::string(l_else),
                Val::Nil,
            ));
            out.extend(else_code);
        }
        Ok(())
    }

    /// `(if* p e)`: the predicate value itself is the result when truthy.
    fn if_star(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        if args.len() != 2 {
            return Err(CompileError::WrongForm {
                form: "if*",
                expected: "a predicate and an alternative",
            }
            .into());
        }

        self.expr(&args[0], env, true, true, out)?;
        out.push(Instruction::new(Opcode::Dup, Val::Nil, Val::Nil));
        let l_done = self.label();
        out.push(Instruction::new(
            Opcode::JmpIfTrue,
            Val::string(l_done.clone()),
            Val::Nil,
        ));
        out.push(Instruction::new(Opcode::Pop, Val::Nil, Val::Nil));
        self.expr(&args[1], env, true, true, out)?;
        out.push(Instruction::new(
            Opcode::Label,
            Val::string(l_done),
            Val::Nil,
        ));
        self.epilogue(used, more, out);
        Ok(())
    }

    /// The loop leaves the last body value (or nil) on the stack.
    fn while_(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        let Some((pred, body)) = args.split_first() else {
            return Err(CompileError::WrongForm {
                form: "while",
                expected: "a predicate",
            }
            .into());
        };

        out.push(Instruction::new(Opcode::PushConst, Val::Nil, Val::Nil));
        let l_top = self.label();
        let l_done = self.label();
        out.push(Instruction::new(
            Opcode::Label,
            Val::string(l_top.clone()),
            Val::Nil,
        ));
        self.expr(pred, env, true, true, out)?;
        out.push(Instruction::new(
            Opcode::JmpIfFalse,
            Val::string(l_done.clone()),
            Val::Nil,
        ));
        out.push(Instruction::new(Opcode::Pop, Val::Nil, Val::Nil));

        match body.split_last() {
            None => out.push(Instruction::new(Opcode::PushConst, Val::Nil, Val::Nil)),
            Some((last, init)) => {
                for form in init {
                    self.expr(form, env, false, true, out)?;
                }
                self.expr(last, env, true, true, out)?;
            }
        }

        out.push(Instruction::new(Opcode::Jmp, Val::string(l_top), Val::Nil));
        out.push(Instruction::new(
            Opcode::Label,
            Val::string(l_done),
            Val::Nil,
        ));
        self.epilogue(used, more, out);
        Ok(())
    }

    fn lambda_form(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        let Some((params, body)) = args.split_first() else {
            return Err(CompileError::WrongForm {
                form: "lambda",
                expected: "a parameter list",
            }
            .into());
        };

        // An unused closure has no observable effect; skip the block entirely.
        if !used {
            return Ok(());
        }

        let template = self.lambda(params, body, env, None)?;
        out.push(Instruction::new(
            Opcode::MakeClosure,
            Val::Closure(template),
            Val::Nil,
        ));
        self.epilogue(true, more, out);
        Ok(())
    }

    /// Compiles a lambda into a fresh code block and returns the closure
    /// template whose environment `MAKE_CLOSURE` fills in at runtime.
    fn lambda(
        &mut self,
        params: &Val,
        body: &[Val],
        env: &Option<EnvRef>,
        name: Option<String>,
    ) -> Result<Rc<Closure>> {
        let (named, rest) = parse_params(params)?;

        let mut frame_symbols = named.clone();
        if let Some(rest) = &rest {
            frame_symbols.push(rest.clone());
        }
        let child = Some(crate::env::Env::new(frame_symbols, env.clone()));

        let mut code = Vec::new();
        let count = Val::I64(named.len() as i64);
        if rest.is_some() {
            code.push(Instruction::new(Opcode::MakeEnvdot, count, Val::Nil));
        } else {
            code.push(Instruction::new(Opcode::MakeEnv, count, Val::Nil));
        }

        match body.split_last() {
            None => {
                code.push(Instruction::new(Opcode::PushConst, Val::Nil, Val::Nil));
                code.push(Instruction::new(Opcode::Return, Val::Nil, Val::Nil));
            }
            Some((last, init)) => {
                for form in init {
                    self.expr(form, &child, false, true, &mut code)?;
                }
                self.expr(last, &child, true, false, &mut code)?;
            }
        }

        let code = self.assemble(code)?;
        let debug = name.clone().unwrap_or_else(|| "lambda".to_string());
        let handle = self.ctx.code.add(code, debug);
        self.handles.push(handle);

        Ok(Rc::new(Closure {
            code: handle,
            env: None,
            args: params.clone(),
            name,
        }))
    }

    /// `defmacro` takes effect at compile time: the body becomes a closure
    /// and the macro record is installed in the name's home package.
    fn defmacro(
        &mut self,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        if args.len() < 2 {
            return Err(CompileError::WrongForm {
                form: "defmacro",
                expected: "a name, a parameter list and a body",
            }
            .into());
        }
        let Val::Symbol(name) = &args[0] else {
            return Err(CompileError::WrongForm {
                form: "defmacro",
                expected: "a symbol name",
            }
            .into());
        };

        let body = self.lambda(&args[1], &args[2..], env, Some(name.name().to_string()))?;
        let def = Rc::new(MacroDef {
            name: name.clone(),
            args: args[1].clone(),
            body,
        });
        if let Some(home) = name.home() {
            home.borrow_mut().set_macro(name.name(), def);
        }

        self.constant(Val::Nil, used, more, out);
        Ok(())
    }

    fn call(
        &mut self,
        head: &Val,
        args: &[Val],
        env: &Option<EnvRef>,
        used: bool,
        more: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<()> {
        // A call to an unshadowed core primitive with a registered arity
        // skips the closure protocol entirely.
        if let Val::Symbol(sym) = head {
            let unshadowed = env::lookup(env, sym).is_none();
            let in_core = sym
                .home()
                .map(|home| Rc::ptr_eq(&home, &self.ctx.packages.core()))
                .unwrap_or(false);
            if unshadowed && in_core {
                if let Some(prim) = self.ctx.primitives.lookup(sym.name(), args.len()) {
                    for arg in args {
                        self.expr(arg, env, true, true, out)?;
                    }
                    out.push(Instruction::new(
                        Opcode::CallPrimop,
                        Val::string(prim.name),
                        Val::I64(args.len() as i64),
                    ));
                    self.epilogue(used, more, out);
                    return Ok(());
                }
            }
        }

        let argc = Val::I64(args.len() as i64);
        if more {
            let l_ret = self.label();
            out.push(Instruction::new(
                Opcode::SaveReturn,
                Val::string(l_ret.clone()),
                Val::Nil,
            ));
            for arg in args {
                self.expr(arg, env, true, true, out)?;
            }
            self.expr(head, env, true, true, out)?;
            out.push(Instruction::new(Opcode::JmpClosure, argc, Val::Nil));
            out.push(Instruction::new(
                Opcode::Label,
                Val::string(l_ret),
                Val::Nil,
            ));
            if !used {
                out.push(Instruction::new(Opcode::Pop, Val::Nil, Val::Nil));
            }
        } else {
            for arg in args {
                self.expr(arg, env, true, true, out)?;
            }
            self.expr(head, env, true, true, out)?;
            out.push(Instruction::new(Opcode::JmpClosure, argc, Val::Nil));
        }
        Ok(())
    }

    /// Resolves every jump label to an instruction index. Labels stay in the
    /// stream as no-ops so disassembly keeps its shape.
    fn assemble(&self, mut code: Vec<Instruction>) -> Result<Vec<Instruction>> {
        let mut positions: FxHashMap<String, usize> = FxHashMap::default();
        for (i, instr) in code.iter().enumerate() {
            if instr.op == Opcode::Label {
                if let Val::Str(label) = &instr.a {
                    positions.insert(label.to_string(), i);
                }
            }
        }

        for instr in code.iter_mut() {
            if instr.op.is_jump() {
                let Val::Str(label) = instr.a.clone() else {
                    return Err(CompileError::UnresolvedLabel(instr.a.to_string()).into());
                };
                match positions.get(label.as_ref()) {
                    Some(&target) => instr.b = Val::I64(target as i64),
                    None => {
                        return Err(CompileError::UnresolvedLabel(label.to_string()).into());
                    }
                }
            }
        }
        Ok(code)
    }
}

/// Splits a parameter list into named parameters and an optional rest
/// parameter: `(a b)` has two named, `(a b . rest)` adds a rest, and a bare
/// symbol collects everything.
pub fn parse_params(params: &Val) -> Result<(Vec<Rc<Symbol>>, Option<Rc<Symbol>>)> {
    if let Val::Symbol(rest) = params {
        return Ok((Vec::new(), Some(rest.clone())));
    }

    let Some((items, tail)) = params.to_list() else {
        return Err(CompileError::InvalidParamList(params.to_string()).into());
    };

    let mut named = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            Val::Symbol(sym) => named.push(sym.clone()),
            _ => return Err(CompileError::InvalidParamList(params.to_string()).into()),
        }
    }

    let rest = match tail {
        None => None,
        Some(Val::Symbol(sym)) => Some(sym),
        Some(_) => return Err(CompileError::InvalidParamList(params.to_string()).into()),
    };
    Ok((named, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::log::Logger;

    fn ctx() -> Context {
        Context::new(false, Logger::silent()).unwrap()
    }

    fn parse(ctx: &Context, src: &str) -> Val {
        let mut reader = crate::reader::Reader::new();
        reader.add_string(src);
        reader
            .parse_next(&ctx.packages, &ctx.logger)
            .unwrap()
            .unwrap()
    }

    fn ops(ctx: &Context, src: &str) -> Vec<Opcode> {
        let expr = parse(ctx, src);
        let unit = compile(ctx, &expr).unwrap();
        let block = ctx.code.get(unit.closure.code).unwrap();
        block.instructions.iter().map(|i| i.op).collect()
    }

    #[test]
    fn constants_compile_to_push_and_return() {
        let ctx = ctx();
        assert_eq!(
            ops(&ctx, "5"),
            vec![Opcode::MakeEnv, Opcode::PushConst, Opcode::Return]
        );
    }

    #[test]
    fn unused_constants_compile_to_nothing() {
        let ctx = ctx();
        assert_eq!(
            ops(&ctx, "(begin 1 2 3)"),
            vec![Opcode::MakeEnv, Opcode::PushConst, Opcode::Return]
        );
    }

    #[test]
    fn compiled_handles_are_live_in_the_arena() {
        let ctx = ctx();
        let expr = parse(&ctx, "(lambda (x) x)");
        let unit = compile(&ctx, &expr).unwrap();
        assert_eq!(unit.handles.len(), 2);
        for handle in &unit.handles {
            assert!(handle.index() >= 1);
            assert!(ctx.code.contains(*handle));
        }
    }

    #[test]
    fn if_constant_folds_on_literals() {
        let ctx = ctx();
        // #f picks the else branch, a number picks the then branch; neither
        // emits any jump.
        for src in ["(if #f 1 2)", "(if 7 1 2)", "(if \"s\" 1 2)"] {
            let ops = ops(&ctx, src);
            assert!(
                !ops.contains(&Opcode::JmpIfFalse),
                "{} should fold, got {:?}",
                src,
                ops
            );
        }
        // A nil literal does not fold.
        assert!(ops(&ctx, "(if () 1 2)").contains(&Opcode::JmpIfFalse));
    }

    #[test]
    fn if_with_equal_branches_collapses() {
        let ctx = ctx();
        // The unused variable reference compiles to nothing, so only the
        // shared branch remains.
        assert_eq!(
            ops(&ctx, "(if x 5 5)"),
            vec![Opcode::MakeEnv, Opcode::PushConst, Opcode::Return]
        );
    }

    #[test]
    fn tail_calls_skip_the_return_address() {
        let ctx = ctx();
        let expr = parse(&ctx, "(lambda (f) (f 1))");
        let unit = compile(&ctx, &expr).unwrap();
        let body = ctx.code.get(unit.handles[0]).unwrap();
        let ops: Vec<Opcode> = body.instructions.iter().map(|i| i.op).collect();
        assert!(ops.contains(&Opcode::JmpClosure));
        assert!(!ops.contains(&Opcode::SaveReturn));
        assert!(!ops.contains(&Opcode::Return));
    }

    #[test]
    fn non_tail_calls_save_a_return_address() {
        let ctx = ctx();
        let expr = parse(&ctx, "(lambda (f) (f 1) 2)");
        let unit = compile(&ctx, &expr).unwrap();
        let body = ctx.code.get(unit.handles[0]).unwrap();
        let ops: Vec<Opcode> = body.instructions.iter().map(|i| i.op).collect();
        assert!(ops.contains(&Opcode::SaveReturn));
        // The call result is discarded.
        assert!(ops.contains(&Opcode::Pop));
    }

    #[test]
    fn assembly_resolves_every_jump() {
        let ctx = ctx();
        let expr = parse(&ctx, "(if x (f) (g))");
        let unit = compile(&ctx, &expr).unwrap();
        let block = ctx.code.get(unit.closure.code).unwrap();
        for instr in &block.instructions {
            if instr.op.is_jump() {
                assert!(
                    matches!(instr.b, Val::I64(n) if n >= 0),
                    "unresolved jump {:?}",
                    instr
                );
            }
        }
    }

    #[test]
    fn dotted_parameter_lists_use_envdot() {
        let ctx = ctx();
        let expr = parse(&ctx, "(lambda (a . rest) rest)");
        let unit = compile(&ctx, &expr).unwrap();
        let body = ctx.code.get(unit.handles[0]).unwrap();
        assert_eq!(body.instructions[0].op, Opcode::MakeEnvdot);
        assert_eq!(body.instructions[0].a, Val::I64(1));
    }

    #[test]
    fn malformed_forms_are_compile_errors() {
        let ctx = ctx();
        for src in [
            "(set! 5 1)",
            "(set! x)",
            "(if)",
            "(if a b c d)",
            "(quote)",
            "(lambda (1) x)",
            "(while)",
            "(defmacro)",
        ] {
            let expr = parse(&ctx, src);
            assert!(
                matches!(compile(&ctx, &expr), Err(Error::Compile(_))),
                "{} should not compile",
                src
            );
        }
    }

    #[test]
    fn macroexpand_1_is_idempotent_without_a_macro() {
        let ctx = ctx();
        let expr = parse(&ctx, "(no-such-macro 1 2)");
        let (out, expanded) = macroexpand_1(&ctx, &expr).unwrap();
        assert!(!expanded);
        assert!(out.structural_eq(&expr));
    }
}
