//! AST -> bytecode. One [`FunctionBuilder`] per compiled function body
//! (top-level script included), pushed and popped in lockstep with
//! [`crate::scope::ScopeStack`]'s function stack.

use std::path::PathBuf;
use std::rc::Rc;

use oyc_runtime::{Instr, Op, Prototype, SourceLocation, Value};

use crate::ast::*;
use crate::config::CompilerConfig;
use crate::error::{CompileError, SemanticError};
use crate::scope::{Resolved, ScopeStack};

struct FunctionBuilder {
    name: Option<String>,
    arity: u16,
    code: Vec<Instr>,
    locations: Vec<SourceLocation>,
    constants: Vec<Value>,
    children: Vec<Rc<Prototype>>,
}

impl FunctionBuilder {
    fn new(name: Option<String>, arity: u16) -> Self {
        FunctionBuilder {
            name,
            arity,
            code: Vec::new(),
            locations: Vec::new(),
            constants: Vec::new(),
            children: Vec::new(),
        }
    }

    fn emit(&mut self, op: Op, a: u16, b: i32, c: i32, loc: &SourceLocation) -> usize {
        self.code.push(Instr::new(op, a, b, c));
        self.locations.push(loc.clone());
        self.code.len() - 1
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        self.code[at].b = target as i32 - at as i32;
    }

    fn add_const(&mut self, v: Value) -> i32 {
        self.constants.push(v);
        (self.constants.len() - 1) as i32
    }
}

/// Where an assignable expression's storage lives, resolved once so a
/// compound-assignment or increment/decrement never re-evaluates an index
/// target's object/key sub-expressions.
enum TargetRegs {
    Local(u16),
    Upvalue(u16),
    Index { obj: u16, key: u16 },
}

pub struct Codegen {
    builders: Vec<FunctionBuilder>,
    scope: ScopeStack,
    file: PathBuf,
    config: CompilerConfig,
    /// Jump indices pending a patch to the end of the nearest enclosing
    /// loop or `switch`, one frame per nesting level.
    break_targets: Vec<Vec<usize>>,
    /// Jump indices pending a patch to the nearest enclosing loop's
    /// continue point. `switch` does not push a frame here, so `continue`
    /// inside a `switch` bubbles to the loop around it.
    continue_targets: Vec<Vec<usize>>,
}

type CResult<T> = Result<T, CompileError>;

pub fn compile_program(
    program: &Program,
    file: PathBuf,
    config: CompilerConfig,
) -> CResult<Rc<Prototype>> {
    let mut cg = Codegen {
        builders: Vec::new(),
        scope: ScopeStack::new(),
        file,
        config,
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
    };
    cg.scope.enter_function();
    cg.scope
        .declare_local("argv")
        .expect("argv is the first declaration in a fresh top-level scope");
    cg.builders.push(FunctionBuilder::new(None, 1));
    for stmt in &program.body {
        cg.compile_stmt(stmt)?;
    }
    let end_loc = program
        .body
        .last()
        .map(|s| s.loc.clone())
        .unwrap_or_else(|| SourceLocation::new(cg.file.clone(), 1, 1));
    cg.emit_implicit_return(&end_loc);
    Ok(cg.finish_function())
}

impl Codegen {
    fn builder(&mut self) -> &mut FunctionBuilder {
        self.builders.last_mut().expect("no active function builder")
    }

    fn emit_implicit_return(&mut self, loc: &SourceLocation) {
        let null_reg = self.scope.alloc_temp();
        let loc = loc.clone();
        self.builder().emit(Op::LoadNull, null_reg, 0, 0, &loc);
        self.builder().emit(Op::Return, null_reg, 0, 0, &loc);
    }

    fn finish_function(&mut self) -> Rc<Prototype> {
        let b = self.builders.pop().expect("unbalanced function builders");
        let (register_count, upvalues) = self.scope.leave_function();
        Rc::new(Prototype {
            name: b.name,
            arity: b.arity,
            register_count: register_count.max(b.arity),
            constants: b.constants,
            code: b.code,
            locations: b.locations,
            upvalues,
            children: b.children,
        })
    }

    fn semantic_err(&self, message: impl Into<String>, loc: &SourceLocation) -> CompileError {
        CompileError::Semantic(SemanticError {
            message: message.into(),
            at: loc.clone(),
        })
    }

    /// Declares a local, turning a scope-level redeclaration conflict into a
    /// located `SemanticError` (spec §4.2: "Redeclaration in the same scope
    /// is an error").
    fn declare_local(&mut self, name: &str, loc: &SourceLocation) -> CResult<u16> {
        self.scope.declare_local(name).map_err(|msg| self.semantic_err(msg, loc))
    }

    // --- statements ---

    fn compile_stmt(&mut self, stmt: &Stmt) -> CResult<()> {
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.compile_expr(e)?;
            }
            StmtKind::Let { name, value } => self.compile_let(name, value, &stmt.loc)?,
            StmtKind::If { init, cond, then_body, else_body } => {
                self.compile_if(init, cond, then_body, else_body, &stmt.loc)?;
            }
            StmtKind::While { cond, body } => self.compile_while(cond, body)?,
            StmtKind::DoWhile { body, cond } => self.compile_do_while(body, cond, &stmt.loc)?,
            StmtKind::ForC { init, cond, step, body } => {
                self.compile_for_c(init, cond, step, body, &stmt.loc)?;
            }
            StmtKind::ForEach { key_name, value_name, iterable, body } => {
                self.compile_foreach(key_name, value_name, iterable, body, &stmt.loc)?;
            }
            StmtKind::Switch { init, subject, cases, default } => {
                self.compile_switch(init, subject, cases, default, &stmt.loc)?;
            }
            StmtKind::Break => self.compile_break(&stmt.loc)?,
            StmtKind::Continue => self.compile_continue(&stmt.loc)?,
            StmtKind::Return(value) => {
                let reg = match value {
                    Some(e) => self.compile_expr(e)?,
                    None => {
                        let r = self.scope.alloc_temp();
                        self.builder().emit(Op::LoadNull, r, 0, 0, &stmt.loc);
                        r
                    }
                };
                self.builder().emit(Op::Return, reg, 0, 0, &stmt.loc);
            }
            StmtKind::Delete(target) => self.compile_delete(target, &stmt.loc)?,
            StmtKind::Block(body) => {
                self.scope.enter_block();
                for s in body {
                    self.compile_stmt(s)?;
                }
                self.scope.leave_block();
            }
        }
        Ok(())
    }

    fn compile_let(&mut self, name: &str, value: &Expr, loc: &SourceLocation) -> CResult<()> {
        // Pre-declare the local before compiling the value whenever it is a
        // closure literal, so a self-recursive `auto f = (...) { ...f()... };`
        // can resolve `f` inside its own body.
        if let ExprKind::Function { params, body } = &value.kind {
            let local_reg = self.declare_local(name, loc)?;
            let value_reg = self.compile_function(Some(name.to_string()), params, body)?;
            self.builder().emit(Op::Fresh, local_reg, value_reg as i32, 0, loc);
            return Ok(());
        }
        let value_reg = self.compile_expr(value)?;
        let local_reg = self.declare_local(name, loc)?;
        self.builder().emit(Op::Fresh, local_reg, value_reg as i32, 0, loc);
        Ok(())
    }

    /// Resolves an lvalue's storage location, evaluating any index
    /// sub-expressions exactly once.
    fn eval_target(&mut self, target: &LValue, loc: &SourceLocation) -> CResult<TargetRegs> {
        match target {
            LValue::Ident(name) => match self.scope.resolve(name) {
                Some(Resolved::Local(reg)) => Ok(TargetRegs::Local(reg)),
                Some(Resolved::Upvalue(idx)) => Ok(TargetRegs::Upvalue(idx)),
                None => Err(self.semantic_err(format!("undeclared variable '{name}'"), loc)),
            },
            LValue::Index(obj, key) => {
                let obj_reg = self.compile_expr(obj)?;
                let key_reg = self.compile_expr(key)?;
                Ok(TargetRegs::Index { obj: obj_reg, key: key_reg })
            }
        }
    }

    fn load_target(&mut self, target: &TargetRegs, loc: &SourceLocation) -> u16 {
        match *target {
            TargetRegs::Local(reg) => reg,
            TargetRegs::Upvalue(idx) => {
                let r = self.scope.alloc_temp();
                self.builder().emit(Op::GetUpvalue, r, idx as i32, 0, loc);
                r
            }
            TargetRegs::Index { obj, key } => {
                let r = self.scope.alloc_temp();
                self.builder().emit(Op::Index, r, obj as i32, key as i32, loc);
                r
            }
        }
    }

    fn store_target(&mut self, target: &TargetRegs, value_reg: u16, loc: &SourceLocation) {
        match *target {
            TargetRegs::Local(reg) => {
                self.builder().emit(Op::Move, reg, value_reg as i32, 0, loc);
            }
            TargetRegs::Upvalue(idx) => {
                self.builder().emit(Op::SetUpvalue, value_reg, idx as i32, 0, loc);
            }
            TargetRegs::Index { obj, key } => {
                self.builder().emit(Op::SetIndex, value_reg, obj as i32, key as i32, loc);
            }
        }
    }

    fn compile_delete(&mut self, target: &LValue, loc: &SourceLocation) -> CResult<()> {
        match target {
            LValue::Ident(name) => {
                Err(self.semantic_err(format!("cannot delete variable '{name}'"), loc))
            }
            LValue::Index(obj, key) => {
                let obj_reg = self.compile_expr(obj)?;
                let key_reg = self.compile_expr(key)?;
                self.builder().emit(Op::Delete, obj_reg, key_reg as i32, 0, loc);
                Ok(())
            }
        }
    }

    fn compile_if(
        &mut self,
        init: &Option<Box<Stmt>>,
        cond: &Expr,
        then_body: &[Stmt],
        else_body: &[Stmt],
        loc: &SourceLocation,
    ) -> CResult<()> {
        self.scope.enter_block();
        if let Some(init_stmt) = init {
            self.compile_stmt(init_stmt)?;
        }
        let cond_reg = self.compile_expr(cond)?;
        let jump_else = self.builder().emit(Op::JumpIfFalse, cond_reg, 0, 0, loc);
        self.scope.enter_block();
        for s in then_body {
            self.compile_stmt(s)?;
        }
        self.scope.leave_block();
        if else_body.is_empty() {
            let here = self.builder().code.len();
            self.builder().patch_jump(jump_else, here);
        } else {
            let jump_end = self.builder().emit(Op::Jump, 0, 0, 0, loc);
            let here = self.builder().code.len();
            self.builder().patch_jump(jump_else, here);
            self.scope.enter_block();
            for s in else_body {
                self.compile_stmt(s)?;
            }
            self.scope.leave_block();
            let here = self.builder().code.len();
            self.builder().patch_jump(jump_end, here);
        }
        self.scope.leave_block();
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) -> CResult<()> {
        let loc = cond.loc.clone();
        self.break_targets.push(Vec::new());
        self.continue_targets.push(Vec::new());
        let loop_start = self.builder().code.len();
        let cond_reg = self.compile_expr(cond)?;
        let jump_exit = self.builder().emit(Op::JumpIfFalse, cond_reg, 0, 0, &loc);
        self.scope.enter_block();
        for s in body {
            self.compile_stmt(s)?;
        }
        self.scope.leave_block();
        self.builder().emit(Op::Jump, 0, 0, 0, &loc);
        let back = self.builder().code.len() - 1;
        self.builder().patch_jump(back, loop_start);
        let here = self.builder().code.len();
        self.builder().patch_jump(jump_exit, here);
        self.patch_loop_targets(loop_start, here);
        Ok(())
    }

    fn compile_do_while(&mut self, body: &[Stmt], cond: &Expr, loc: &SourceLocation) -> CResult<()> {
        self.break_targets.push(Vec::new());
        self.continue_targets.push(Vec::new());
        let loop_start = self.builder().code.len();
        self.scope.enter_block();
        for s in body {
            self.compile_stmt(s)?;
        }
        self.scope.leave_block();
        let continue_point = self.builder().code.len();
        let cond_reg = self.compile_expr(cond)?;
        let jump_back = self.builder().emit(Op::JumpIfTrue, cond_reg, 0, 0, loc);
        self.builder().patch_jump(jump_back, loop_start);
        let end = self.builder().code.len();
        self.patch_loop_targets(continue_point, end);
        Ok(())
    }

    fn compile_for_c(
        &mut self,
        init: &Option<Box<Stmt>>,
        cond: &Option<Expr>,
        step: &Option<Expr>,
        body: &[Stmt],
        loc: &SourceLocation,
    ) -> CResult<()> {
        self.scope.enter_block();
        if let Some(init_stmt) = init {
            self.compile_stmt(init_stmt)?;
        }
        self.break_targets.push(Vec::new());
        self.continue_targets.push(Vec::new());
        let cond_start = self.builder().code.len();
        let jump_exit = match cond {
            Some(c) => {
                let cond_reg = self.compile_expr(c)?;
                Some(self.builder().emit(Op::JumpIfFalse, cond_reg, 0, 0, loc))
            }
            None => None,
        };
        self.scope.enter_block();
        for s in body {
            self.compile_stmt(s)?;
        }
        self.scope.leave_block();
        let step_start = self.builder().code.len();
        if let Some(step_expr) = step {
            self.compile_expr(step_expr)?;
        }
        self.builder().emit(Op::Jump, 0, 0, 0, loc);
        let back = self.builder().code.len() - 1;
        self.builder().patch_jump(back, cond_start);
        let end = self.builder().code.len();
        if let Some(j) = jump_exit {
            self.builder().patch_jump(j, end);
        }
        self.patch_loop_targets(step_start, end);
        self.scope.leave_block();
        Ok(())
    }

    fn compile_foreach(
        &mut self,
        key_name: &str,
        value_name: &str,
        iterable: &Expr,
        body: &[Stmt],
        loc: &SourceLocation,
    ) -> CResult<()> {
        let iter_reg = self.compile_expr(iterable)?;
        let handle_reg = self.scope.alloc_temp();
        self.builder().emit(Op::IterInit, handle_reg, iter_reg as i32, 0, loc);

        self.scope.enter_block();
        let key_reg = self.declare_local(key_name, loc)?;
        let value_reg = self.declare_local(value_name, loc)?;
        debug_assert_eq!(value_reg, key_reg + 1, "foreach bindings must be adjacent registers");

        self.break_targets.push(Vec::new());
        self.continue_targets.push(Vec::new());
        let loop_start = self.builder().code.len();
        let exit_jump = self.builder().emit(Op::IterNext, handle_reg, 0, key_reg as i32, loc);
        for s in body {
            self.compile_stmt(s)?;
        }
        self.builder().emit(Op::Jump, 0, 0, 0, loc);
        let back = self.builder().code.len() - 1;
        self.builder().patch_jump(back, loop_start);
        let here = self.builder().code.len();
        self.builder().patch_jump(exit_jump, here);
        self.patch_loop_targets(loop_start, here);
        self.scope.leave_block();
        Ok(())
    }

    /// Patches a loop's just-popped `continue`/`break` target lists:
    /// continues jump to `continue_point` (the per-iteration re-check or
    /// step), breaks jump to `end` (past the whole construct).
    fn patch_loop_targets(&mut self, continue_point: usize, end: usize) {
        let continues = self.continue_targets.pop().expect("unbalanced continue targets");
        for idx in continues {
            self.builder().patch_jump(idx, continue_point);
        }
        let breaks = self.break_targets.pop().expect("unbalanced break targets");
        for idx in breaks {
            self.builder().patch_jump(idx, end);
        }
    }

    fn compile_switch(
        &mut self,
        init: &Option<Box<Stmt>>,
        subject: &Expr,
        cases: &[(Expr, Vec<Stmt>)],
        default: &Option<Vec<Stmt>>,
        loc: &SourceLocation,
    ) -> CResult<()> {
        self.scope.enter_block();
        if let Some(init_stmt) = init {
            self.compile_stmt(init_stmt)?;
        }
        let subject_reg = self.compile_expr(subject)?;
        self.break_targets.push(Vec::new());

        let mut test_jumps = Vec::with_capacity(cases.len());
        for (case_expr, _) in cases {
            let case_reg = self.compile_expr(case_expr)?;
            let eq_reg = self.scope.alloc_temp();
            self.builder().emit(Op::Eq, eq_reg, subject_reg as i32, case_reg as i32, loc);
            let jump = self.builder().emit(Op::JumpIfTrue, eq_reg, 0, 0, loc);
            test_jumps.push(jump);
        }
        let no_match_jump = self.builder().emit(Op::Jump, 0, 0, 0, loc);

        let mut case_starts = Vec::with_capacity(cases.len());
        for (_, body) in cases {
            case_starts.push(self.builder().code.len());
            for s in body {
                self.compile_stmt(s)?;
            }
        }
        let default_start = self.builder().code.len();
        if let Some(default_body) = default {
            for s in default_body {
                self.compile_stmt(s)?;
            }
        }
        let end = self.builder().code.len();

        for (jump, start) in test_jumps.iter().zip(case_starts.iter()) {
            self.builder().patch_jump(*jump, *start);
        }
        let no_match_target = if default.is_some() { default_start } else { end };
        self.builder().patch_jump(no_match_jump, no_match_target);

        let breaks = self.break_targets.pop().expect("unbalanced break targets");
        for idx in breaks {
            self.builder().patch_jump(idx, end);
        }
        self.scope.leave_block();
        Ok(())
    }

    fn compile_break(&mut self, loc: &SourceLocation) -> CResult<()> {
        if self.break_targets.is_empty() {
            return Err(self.semantic_err("break outside of loop or switch", loc));
        }
        let idx = self.builder().emit(Op::Jump, 0, 0, 0, loc);
        self.break_targets.last_mut().unwrap().push(idx);
        Ok(())
    }

    fn compile_continue(&mut self, loc: &SourceLocation) -> CResult<()> {
        if self.continue_targets.is_empty() {
            return Err(self.semantic_err("continue outside of loop", loc));
        }
        let idx = self.builder().emit(Op::Jump, 0, 0, 0, loc);
        self.continue_targets.last_mut().unwrap().push(idx);
        Ok(())
    }

    // --- expressions ---

    fn compile_expr(&mut self, expr: &Expr) -> CResult<u16> {
        let loc = &expr.loc;
        match &expr.kind {
            ExprKind::Null => {
                let r = self.scope.alloc_temp();
                self.builder().emit(Op::LoadNull, r, 0, 0, loc);
                Ok(r)
            }
            ExprKind::Bool(b) => {
                let r = self.scope.alloc_temp();
                self.builder().emit(Op::LoadBool, r, *b as i32, 0, loc);
                Ok(r)
            }
            ExprKind::Int(n) => Ok(self.load_int_const(*n, loc)),
            ExprKind::Float(f) => {
                let r = self.scope.alloc_temp();
                let k = self.builder().add_const(Value::Float(*f));
                self.builder().emit(Op::LoadConst, r, k, 0, loc);
                Ok(r)
            }
            ExprKind::Str(s) => {
                let r = self.scope.alloc_temp();
                let k = self.builder().add_const(Value::str(s.as_str()));
                self.builder().emit(Op::LoadConst, r, k, 0, loc);
                Ok(r)
            }
            ExprKind::Ident(name) => self.compile_ident(name, loc),
            ExprKind::Array(items) => self.compile_array(items, loc),
            ExprKind::Struct(fields) => self.compile_struct(fields, loc),
            ExprKind::Function { params, body } => self.compile_function(None, params, body),
            ExprKind::Call { callee, args } => self.compile_call(callee, args, loc),
            ExprKind::Index(obj, key) => {
                let obj_reg = self.compile_expr(obj)?;
                let key_reg = self.compile_expr(key)?;
                let r = self.scope.alloc_temp();
                self.builder().emit(Op::Index, r, obj_reg as i32, key_reg as i32, loc);
                Ok(r)
            }
            ExprKind::Unary(op, inner) => self.compile_unary(*op, inner, loc),
            ExprKind::Binary(op, lhs, rhs) => self.compile_binary(*op, lhs, rhs, loc),
            ExprKind::Logical(op, lhs, rhs) => self.compile_logical(*op, lhs, rhs, loc),
            ExprKind::Cast(kind, inner) => {
                let r = self.compile_expr(inner)?;
                let dest = self.scope.alloc_temp();
                self.builder().emit(Op::Cast, dest, r as i32, cast_tag(*kind), loc);
                Ok(dest)
            }
            ExprKind::TypeOf(inner) => {
                let r = self.compile_expr(inner)?;
                let dest = self.scope.alloc_temp();
                self.builder().emit(Op::TypeOf, dest, r as i32, 0, loc);
                Ok(dest)
            }
            ExprKind::SizeOf(inner) => {
                let r = self.compile_expr(inner)?;
                let dest = self.scope.alloc_temp();
                self.builder().emit(Op::SizeOf, dest, r as i32, 0, loc);
                Ok(dest)
            }
            ExprKind::Require { path, args } => self.compile_require(path, args, loc),
            ExprKind::Assign { target, op, value } => self.compile_assign(target, *op, value, loc),
            ExprKind::Ternary { cond, then, els } => self.compile_ternary(cond, then, els, loc),
            ExprKind::PreIncDec { op, target } => self.compile_pre_inc_dec(*op, target, loc),
            ExprKind::PostIncDec { op, target } => self.compile_post_inc_dec(*op, target, loc),
        }
    }

    fn compile_ident(&mut self, name: &str, loc: &SourceLocation) -> CResult<u16> {
        match self.scope.resolve(name) {
            Some(Resolved::Local(reg)) => Ok(reg),
            Some(Resolved::Upvalue(idx)) => {
                let r = self.scope.alloc_temp();
                self.builder().emit(Op::GetUpvalue, r, idx as i32, 0, loc);
                Ok(r)
            }
            None => Err(self.semantic_err(format!("undeclared variable '{name}'"), loc)),
        }
    }

    fn load_int_const(&mut self, n: i64, loc: &SourceLocation) -> u16 {
        let r = self.scope.alloc_temp();
        let k = self.builder().add_const(Value::Int(n));
        self.builder().emit(Op::LoadConst, r, k, 0, loc);
        r
    }

    fn compile_assign(
        &mut self,
        target: &LValue,
        op: Option<BinaryOp>,
        value: &Expr,
        loc: &SourceLocation,
    ) -> CResult<u16> {
        match op {
            None => {
                let t = self.eval_target(target, loc)?;
                let value_reg = self.compile_expr(value)?;
                self.store_target(&t, value_reg, loc);
                Ok(value_reg)
            }
            Some(bop) => {
                let t = self.eval_target(target, loc)?;
                let current = self.load_target(&t, loc);
                let rhs = self.compile_expr(value)?;
                let new_val = self.emit_binop(bop, current, rhs, loc);
                self.store_target(&t, new_val, loc);
                Ok(new_val)
            }
        }
    }

    fn compile_ternary(&mut self, cond: &Expr, then: &Expr, els: &Expr, loc: &SourceLocation) -> CResult<u16> {
        let cond_reg = self.compile_expr(cond)?;
        let dest = self.scope.alloc_temp();
        let jump_else = self.builder().emit(Op::JumpIfFalse, cond_reg, 0, 0, loc);
        let then_reg = self.compile_expr(then)?;
        self.builder().emit(Op::Move, dest, then_reg as i32, 0, loc);
        let jump_end = self.builder().emit(Op::Jump, 0, 0, 0, loc);
        let here = self.builder().code.len();
        self.builder().patch_jump(jump_else, here);
        let els_reg = self.compile_expr(els)?;
        self.builder().emit(Op::Move, dest, els_reg as i32, 0, loc);
        let here = self.builder().code.len();
        self.builder().patch_jump(jump_end, here);
        Ok(dest)
    }

    fn compile_pre_inc_dec(&mut self, op: IncDecOp, target: &LValue, loc: &SourceLocation) -> CResult<u16> {
        let t = self.eval_target(target, loc)?;
        let current = self.load_target(&t, loc);
        let one = self.load_int_const(1, loc);
        let bop = match op {
            IncDecOp::Inc => BinaryOp::Add,
            IncDecOp::Dec => BinaryOp::Sub,
        };
        let new_val = self.emit_binop(bop, current, one, loc);
        self.store_target(&t, new_val, loc);
        Ok(new_val)
    }

    fn compile_post_inc_dec(&mut self, op: IncDecOp, target: &LValue, loc: &SourceLocation) -> CResult<u16> {
        let t = self.eval_target(target, loc)?;
        let current = self.load_target(&t, loc);
        // Copy into a fresh temp before mutating: for a `Local` target,
        // `current` IS the live register, so the post-increment's returned
        // "old" value would otherwise alias the value we're about to replace.
        let old = self.scope.alloc_temp();
        self.builder().emit(Op::Move, old, current as i32, 0, loc);
        let one = self.load_int_const(1, loc);
        let bop = match op {
            IncDecOp::Inc => BinaryOp::Add,
            IncDecOp::Dec => BinaryOp::Sub,
        };
        let new_val = self.emit_binop(bop, old, one, loc);
        self.store_target(&t, new_val, loc);
        Ok(old)
    }

    fn compile_array(&mut self, items: &[ArrayItem], loc: &SourceLocation) -> CResult<u16> {
        let arr = self.scope.alloc_temp();
        self.builder().emit(Op::NewArray, arr, 0, 0, loc);
        let mut cursor: i64 = 0;
        for item in items {
            match item {
                ArrayItem::Positional(e) => {
                    let item_reg = self.compile_expr(e)?;
                    let idx_reg = self.load_int_const(cursor, loc);
                    self.builder().emit(Op::SetIndex, item_reg, arr as i32, idx_reg as i32, loc);
                    cursor += 1;
                }
                ArrayItem::Indexed(idx_expr, value_expr) => {
                    let idx_reg = self.compile_expr(idx_expr)?;
                    let value_reg = self.compile_expr(value_expr)?;
                    self.builder().emit(Op::SetIndex, value_reg, arr as i32, idx_reg as i32, loc);
                    if let ExprKind::Int(n) = &idx_expr.kind {
                        cursor = cursor.max(*n + 1);
                    }
                }
            }
        }
        Ok(arr)
    }

    fn compile_struct(&mut self, fields: &[(StructKey, Expr)], loc: &SourceLocation) -> CResult<u16> {
        let st = self.scope.alloc_temp();
        self.builder().emit(Op::NewStruct, st, 0, 0, loc);
        for (key, value) in fields {
            let key_reg = match key {
                StructKey::Ident(name) => {
                    let r = self.scope.alloc_temp();
                    let k = self.builder().add_const(Value::str(name.as_str()));
                    self.builder().emit(Op::LoadConst, r, k, 0, loc);
                    r
                }
                StructKey::Computed(e) => self.compile_expr(e)?,
            };
            let value_reg = self.compile_expr(value)?;
            self.builder()
                .emit(Op::SetIndex, value_reg, st as i32, key_reg as i32, loc);
        }
        Ok(st)
    }

    fn compile_function(
        &mut self,
        name: Option<String>,
        params: &[String],
        body: &[Stmt],
    ) -> CResult<u16> {
        self.scope.enter_function();
        self.builders.push(FunctionBuilder::new(name, params.len() as u16));
        let params_loc = body
            .first()
            .map(|s| s.loc.clone())
            .unwrap_or_else(|| SourceLocation::new(self.file.clone(), 1, 1));
        for p in params {
            self.declare_local(p, &params_loc)?;
        }
        for s in body {
            self.compile_stmt(s)?;
        }
        let end_loc = body
            .last()
            .map(|s| s.loc.clone())
            .unwrap_or_else(|| SourceLocation::new(self.file.clone(), 1, 1));
        self.emit_implicit_return(&end_loc);
        let proto = self.finish_function();

        let parent = self.builders.last_mut().expect("function literal must have a parent");
        parent.children.push(proto);
        let child_idx = (parent.children.len() - 1) as i32;
        let dest = self.scope.alloc_temp();
        self.builder().emit(Op::MakeClosure, dest, child_idx, 0, &end_loc);
        Ok(dest)
    }

    /// Reserves `n + 1` consecutive registers up front (the call's `a..a+n`
    /// window) before evaluating any of the `n` expressions into them. The
    /// registers a sub-expression allocates for its own temporaries always
    /// land above this reserved block, since the allocator never reuses a
    /// register — so reserving first is what keeps the block contiguous.
    fn compile_into_contiguous_block(
        &mut self,
        first: &Expr,
        rest: &[Expr],
        loc: &SourceLocation,
    ) -> CResult<u16> {
        let base = self.scope.alloc_temp();
        let slots: Vec<u16> = rest.iter().map(|_| self.scope.alloc_temp()).collect();
        let first_reg = self.compile_expr(first)?;
        self.builder().emit(Op::Move, base, first_reg as i32, 0, loc);
        for (slot, e) in slots.iter().zip(rest) {
            let r = self.compile_expr(e)?;
            self.builder().emit(Op::Move, *slot, r as i32, 0, loc);
        }
        Ok(base)
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], loc: &SourceLocation) -> CResult<u16> {
        // `trace(...)` is the one builtin with its own opcode rather than
        // being a real closure value (spec §4.6): it has no callee slot, so
        // its argument block starts one register earlier than a real call.
        if let ExprKind::Ident(name) = &callee.kind {
            if name == "trace" && self.scope.resolve(name).is_none() {
                if args.is_empty() {
                    let base = self.scope.alloc_temp();
                    self.builder().emit(Op::Trace, base, 0, 0, loc);
                    return Ok(base);
                }
                let base = self.compile_into_contiguous_block(&args[0], &args[1..], loc)?;
                self.builder().emit(Op::Trace, base, 0, args.len() as i32, loc);
                return Ok(base);
            }
        }

        let base = self.compile_into_contiguous_block(callee, args, loc)?;
        self.builder().emit(Op::Call, base, 0, args.len() as i32, loc);
        let dest = self.scope.alloc_temp();
        self.builder().emit(Op::Move, dest, base as i32, 0, loc);
        Ok(dest)
    }

    fn compile_require(&mut self, path: &Expr, args: &[Expr], loc: &SourceLocation) -> CResult<u16> {
        let base = self.compile_into_contiguous_block(path, args, loc)?;
        let dest = self.scope.alloc_temp();
        self.builder().emit(Op::Require, dest, base as i32, args.len() as i32, loc);
        Ok(dest)
    }

    fn compile_unary(&mut self, op: UnaryOp, inner: &Expr, loc: &SourceLocation) -> CResult<u16> {
        let r = self.compile_expr(inner)?;
        let dest = self.scope.alloc_temp();
        let opcode = match op {
            UnaryOp::Neg => Op::Neg,
            UnaryOp::Not => Op::Not,
            UnaryOp::BitNot => Op::BitNot,
        };
        self.builder().emit(opcode, dest, r as i32, 0, loc);
        Ok(dest)
    }

    fn compile_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, loc: &SourceLocation) -> CResult<u16> {
        let l = self.compile_expr(lhs)?;
        let r = self.compile_expr(rhs)?;
        Ok(self.emit_binop(op, l, r, loc))
    }

    /// Lowers a binary operator over two already-evaluated registers,
    /// shared by plain binary-expression compilation and by the
    /// read-modify-write step of compound assignment/increment-decrement.
    fn emit_binop(&mut self, op: BinaryOp, l: u16, r: u16, loc: &SourceLocation) -> u16 {
        let dest = self.scope.alloc_temp();
        match op {
            BinaryOp::Add => self.builder().emit(Op::Add, dest, l as i32, r as i32, loc),
            BinaryOp::Sub => self.builder().emit(Op::Sub, dest, l as i32, r as i32, loc),
            BinaryOp::Mul => self.builder().emit(Op::Mul, dest, l as i32, r as i32, loc),
            BinaryOp::Div => self.builder().emit(Op::Div, dest, l as i32, r as i32, loc),
            BinaryOp::Mod => self.builder().emit(Op::Mod, dest, l as i32, r as i32, loc),
            BinaryOp::Eq => self.builder().emit(Op::Eq, dest, l as i32, r as i32, loc),
            BinaryOp::NotEq => {
                self.builder().emit(Op::Eq, dest, l as i32, r as i32, loc);
                self.builder().emit(Op::Not, dest, dest as i32, 0, loc)
            }
            BinaryOp::Lt => self.builder().emit(Op::Lt, dest, l as i32, r as i32, loc),
            BinaryOp::Le => self.builder().emit(Op::Le, dest, l as i32, r as i32, loc),
            BinaryOp::Gt => self.builder().emit(Op::Lt, dest, r as i32, l as i32, loc),
            BinaryOp::Ge => self.builder().emit(Op::Le, dest, r as i32, l as i32, loc),
            BinaryOp::BitAnd => self.builder().emit(Op::BitAnd, dest, l as i32, r as i32, loc),
            BinaryOp::BitOr => self.builder().emit(Op::BitOr, dest, l as i32, r as i32, loc),
            BinaryOp::BitXor => self.builder().emit(Op::BitXor, dest, l as i32, r as i32, loc),
            BinaryOp::Shl => self.builder().emit(Op::Shl, dest, l as i32, r as i32, loc),
            BinaryOp::Shr => self.builder().emit(Op::Shr, dest, l as i32, r as i32, loc),
        };
        dest
    }

    fn compile_logical(&mut self, op: LogicalOp, lhs: &Expr, rhs: &Expr, loc: &SourceLocation) -> CResult<u16> {
        let l = self.compile_expr(lhs)?;
        let jump = match op {
            LogicalOp::And => self.builder().emit(Op::JumpIfFalse, l, 0, 0, loc),
            LogicalOp::Or => self.builder().emit(Op::JumpIfTrue, l, 0, 0, loc),
        };
        let r = self.compile_expr(rhs)?;
        self.builder().emit(Op::Move, l, r as i32, 0, loc);
        let here = self.builder().code.len();
        self.builder().patch_jump(jump, here);
        // Whichever side decided the result, `&&`/`||` always produce a bool
        // (spec §4.3), not the raw operand value.
        self.builder().emit(Op::Cast, l, l as i32, cast_tag(CastKind::Bool), loc);
        Ok(l)
    }
}

fn cast_tag(kind: CastKind) -> i32 {
    match kind {
        CastKind::Bool => 0,
        CastKind::Int => 1,
        CastKind::Float => 2,
        CastKind::Str => 3,
    }
}

/// Compiles a parsed program honoring `config.max_registers` (spec §9's
/// register-budget semantic error).
pub fn check_register_budget(proto: &Prototype, config: &CompilerConfig) -> CResult<()> {
    fn walk(proto: &Prototype, config: &CompilerConfig) -> Result<(), SemanticError> {
        if proto.register_count > config.max_registers {
            return Err(SemanticError {
                message: format!(
                    "function{} needs {} registers, over the configured limit of {}",
                    proto.name.as_deref().map(|n| format!(" '{n}'")).unwrap_or_default(),
                    proto.register_count,
                    config.max_registers
                ),
                at: proto.locations.first().cloned().unwrap_or_default(),
            });
        }
        for child in &proto.children {
            walk(child, config)?;
        }
        Ok(())
    }
    walk(proto, config).map_err(CompileError::Semantic)
}
