//! The register VM's dispatch loop (spec §4.4).

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::array::ArrayObj;
use crate::chunk::{CastKind, Instr, Op, Prototype};
use crate::closure::ClosureObj;
use crate::error::RuntimeError;
use crate::loc::SourceLocation;
use crate::require::{self, Host};
use crate::structobj::StructObj;
use crate::value::{Key, Value};

type Reg = Rc<RefCell<Value>>;

fn cell(v: Value) -> Reg {
    Rc::new(RefCell::new(v))
}

struct Frame {
    proto: Rc<Prototype>,
    closure: Option<Rc<ClosureObj>>,
    registers: Vec<Reg>,
    ip: usize,
    file: Rc<PathBuf>,
}

impl Frame {
    fn top_level(proto: Rc<Prototype>, file: Rc<PathBuf>) -> Self {
        let registers = (0..proto.register_count).map(|_| cell(Value::Null)).collect();
        Frame {
            proto,
            closure: None,
            registers,
            ip: 0,
            file,
        }
    }

    fn loc(&self) -> SourceLocation {
        self.proto.location_of(self.ip)
    }
}

enum IterState {
    Array {
        arr: Rc<RefCell<ArrayObj>>,
        idx: usize,
    },
    Struct {
        keys: Vec<Key>,
        st: Rc<RefCell<StructObj>>,
        idx: usize,
    },
}

/// Compiles a `require`d file's source into a runnable prototype. Supplied
/// by whoever wires the compiler and runtime crates together (the `oyc`
/// binary), since the runtime crate must not depend on the compiler crate.
pub type CompileFn = Rc<dyn Fn(&str, &Path) -> Result<Rc<Prototype>, String>>;

pub struct Vm<H: Host> {
    host: H,
    compile: CompileFn,
    frames: Vec<Frame>,
    iterators: Vec<IterState>,
    require_chain: Vec<SourceLocation>,
}

impl<H: Host> Vm<H> {
    pub fn new(host: H, compile: CompileFn) -> Self {
        Vm {
            host,
            compile,
            frames: Vec::new(),
            iterators: Vec::new(),
            require_chain: Vec::new(),
        }
    }

    /// Runs a compiled top-level prototype as a program, passing `args` as
    /// its parameters (spec §5, `require`'s argument-forwarding form reuses
    /// this same entry point).
    pub fn run(
        &mut self,
        proto: Rc<Prototype>,
        file: PathBuf,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let file = Rc::new(file);
        let mut frame = Frame::top_level(proto, file);
        // The script is an anonymous function whose sole parameter is
        // `argv`, bound to register 0 as a single array, not scattered
        // positionally across the register window.
        if let Some(slot) = frame.registers.get(0) {
            *slot.borrow_mut() = Value::array(ArrayObj::from_vec(args));
        }
        self.frames.push(frame);
        let depth = self.frames.len();
        let result = self.execute(depth);
        self.frames.truncate(depth - 1);
        result
    }

    /// Executes until the frame at `base_depth` returns, then yields its
    /// return value. `base_depth` is the frame stack length right after the
    /// entry frame was pushed, so nested `Call`s recurse past it and this
    /// call returns only once that specific frame is popped.
    fn execute(&mut self, base_depth: usize) -> Result<Value, RuntimeError> {
        loop {
            let frame_idx = self.frames.len() - 1;
            let proto = self.frames[frame_idx].proto.clone();
            let ip = self.frames[frame_idx].ip;
            let Some(&instr) = proto.code.get(ip) else {
                return Ok(Value::Null);
            };
            self.frames[frame_idx].ip += 1;

            if let Some(result) = self.step(frame_idx, instr)? {
                if self.frames.len() == base_depth {
                    return Ok(result);
                }
                // A nested Call's Return: record the caller's result
                // register from that call and keep running the caller.
                self.finish_call(result)?;
            }
        }
    }

    /// Executes one instruction. Returns `Some(value)` when it was a
    /// `Return` popping the current frame.
    fn step(&mut self, frame_idx: usize, instr: Instr) -> Result<Option<Value>, RuntimeError> {
        use Op::*;
        let Instr { op, a, b, c } = instr;
        match op {
            LoadConst => {
                let v = self.frames[frame_idx].proto.constants[b as usize].clone();
                self.set_reg(frame_idx, a, v);
            }
            LoadNull => self.set_reg(frame_idx, a, Value::Null),
            LoadBool => self.set_reg(frame_idx, a, Value::Bool(b != 0)),
            Move => {
                let v = self.get_reg(frame_idx, b as u16);
                self.set_reg(frame_idx, a, v);
            }
            Fresh => {
                let v = self.get_reg(frame_idx, b as u16);
                self.frames[frame_idx].registers[a as usize] = cell(v);
            }

            Add => self.binop(frame_idx, a, b, c, |x, y| Self::add(x, y))?,
            Sub => self.arith(frame_idx, a, b, c, |x, y| x - y, |x, y| x.wrapping_sub(y))?,
            Mul => self.arith(frame_idx, a, b, c, |x, y| x * y, |x, y| x.wrapping_mul(y))?,
            Div => self.div_mod(frame_idx, a, b, c, true)?,
            Mod => self.div_mod(frame_idx, a, b, c, false)?,
            Neg => {
                let v = self.get_reg(frame_idx, b as u16);
                let loc = self.frames[frame_idx].loc();
                let result = match v {
                    Value::Int(n) => Value::Int(n.wrapping_neg()),
                    Value::Float(f) => Value::Float(-f),
                    other => {
                        return Err(RuntimeError::type_error(
                            format!("cannot negate a {}", other.type_name()),
                            loc,
                        ))
                    }
                };
                self.set_reg(frame_idx, a, result);
            }

            BitAnd => self.bitwise(frame_idx, a, b, c, |x, y| x & y)?,
            BitOr => self.bitwise(frame_idx, a, b, c, |x, y| x | y)?,
            BitXor => self.bitwise(frame_idx, a, b, c, |x, y| x ^ y)?,
            Shl => self.bitwise(frame_idx, a, b, c, |x, y| x.wrapping_shl(y as u32))?,
            Shr => self.bitwise(frame_idx, a, b, c, |x, y| x.wrapping_shr(y as u32))?,
            BitNot => {
                let v = self.get_reg(frame_idx, b as u16);
                let loc = self.frames[frame_idx].loc();
                match v {
                    Value::Int(n) => self.set_reg(frame_idx, a, Value::Int(!n)),
                    other => {
                        return Err(RuntimeError::type_error(
                            format!("cannot apply ~ to a {}", other.type_name()),
                            loc,
                        ))
                    }
                }
            }

            Eq => {
                let (x, y) = (self.get_reg(frame_idx, b as u16), self.get_reg(frame_idx, c as u16));
                self.set_reg(frame_idx, a, Value::Bool(x == y));
            }
            Lt => self.compare(frame_idx, a, b, c, |o| o == std::cmp::Ordering::Less)?,
            Le => self.compare(frame_idx, a, b, c, |o| o != std::cmp::Ordering::Greater)?,
            Not => {
                let v = self.get_reg(frame_idx, b as u16);
                self.set_reg(frame_idx, a, Value::Bool(!v.truthy()));
            }

            TypeOf => {
                let v = self.get_reg(frame_idx, b as u16);
                self.set_reg(frame_idx, a, Value::str(v.type_name()));
            }
            Cast => {
                let v = self.get_reg(frame_idx, b as u16);
                let kind = match c {
                    0 => CastKind::Bool,
                    1 => CastKind::Int,
                    2 => CastKind::Float,
                    _ => CastKind::Str,
                };
                let loc = self.frames[frame_idx].loc();
                let result = self.cast(v, kind, &loc)?;
                self.set_reg(frame_idx, a, result);
            }
            SizeOf => {
                let v = self.get_reg(frame_idx, b as u16);
                let loc = self.frames[frame_idx].loc();
                match v.size() {
                    Some(n) => self.set_reg(frame_idx, a, Value::Int(n)),
                    None => {
                        return Err(RuntimeError::type_error(
                            format!("sizeof is undefined for {}", v.type_name()),
                            loc,
                        ))
                    }
                }
            }

            NewArray => self.set_reg(frame_idx, a, Value::array(ArrayObj::new())),
            NewStruct => self.set_reg(frame_idx, a, Value::structure(StructObj::new())),
            Index => {
                let container = self.get_reg(frame_idx, b as u16);
                let key = self.get_reg(frame_idx, c as u16);
                let loc = self.frames[frame_idx].loc();
                let result = self.index_get(&container, &key, &loc)?;
                self.set_reg(frame_idx, a, result);
            }
            SetIndex => {
                let container = self.get_reg(frame_idx, b as u16);
                let key = self.get_reg(frame_idx, c as u16);
                let value = self.get_reg(frame_idx, a);
                let loc = self.frames[frame_idx].loc();
                self.index_set(&container, &key, value, &loc)?;
            }
            Delete => {
                let container = self.get_reg(frame_idx, a);
                let key = self.get_reg(frame_idx, b as u16);
                let loc = self.frames[frame_idx].loc();
                self.index_delete(&container, &key, &loc)?;
            }
            IterInit => {
                let container = self.get_reg(frame_idx, b as u16);
                let loc = self.frames[frame_idx].loc();
                let state = match container {
                    Value::Array(arr) => IterState::Array { arr, idx: 0 },
                    Value::Struct(st) => {
                        let keys = st.borrow().key_snapshot();
                        IterState::Struct { keys, st, idx: 0 }
                    }
                    other => {
                        return Err(RuntimeError::type_error(
                            format!("cannot iterate a {}", other.type_name()),
                            loc,
                        ))
                    }
                };
                self.iterators.push(state);
                let handle = (self.iterators.len() - 1) as i64;
                self.set_reg(frame_idx, a, Value::Int(handle));
            }
            IterNext => {
                let handle = match self.get_reg(frame_idx, a) {
                    Value::Int(h) => h as usize,
                    _ => unreachable!("iterator handle is always Int"),
                };
                let next = self.iterator_advance(handle);
                match next {
                    Some((key, value)) => {
                        // Fresh cells: a closure built inside the loop body
                        // must capture this iteration's key/value, not
                        // whatever the next iteration later writes here.
                        self.frames[frame_idx].registers[c as usize] = cell(key);
                        self.frames[frame_idx].registers[(c as usize) + 1] = cell(value);
                    }
                    None => {
                        self.frames[frame_idx].ip =
                            (self.frames[frame_idx].ip as i64 + b as i64 - 1) as usize;
                    }
                }
            }

            Jump => {
                self.frames[frame_idx].ip = (self.frames[frame_idx].ip as i64 + b as i64 - 1) as usize;
            }
            JumpIfFalse => {
                if !self.get_reg(frame_idx, a).truthy() {
                    self.frames[frame_idx].ip =
                        (self.frames[frame_idx].ip as i64 + b as i64 - 1) as usize;
                }
            }
            JumpIfTrue => {
                if self.get_reg(frame_idx, a).truthy() {
                    self.frames[frame_idx].ip =
                        (self.frames[frame_idx].ip as i64 + b as i64 - 1) as usize;
                }
            }

            Call => {
                let callee = self.get_reg(frame_idx, a);
                let loc = self.frames[frame_idx].loc();
                let Value::Closure(closure) = callee else {
                    return Err(RuntimeError::type_error(
                        format!("cannot call a {}", callee.type_name()),
                        loc,
                    ));
                };
                let mut args = Vec::with_capacity(c as usize);
                for i in 0..c as u16 {
                    args.push(self.get_reg(frame_idx, a + 1 + i));
                }
                self.push_call(closure, args);
            }
            Return => {
                let value = self.get_reg(frame_idx, a);
                return Ok(Some(value));
            }
            MakeClosure => {
                let proto = self.frames[frame_idx].proto.children[b as usize].clone();
                let upvalues = proto
                    .upvalues
                    .iter()
                    .map(|src| self.resolve_upvalue(frame_idx, *src))
                    .collect();
                self.set_reg(
                    frame_idx,
                    a,
                    Value::Closure(Rc::new(ClosureObj::new(proto, upvalues))),
                );
            }
            GetUpvalue => {
                let closure = self.frames[frame_idx]
                    .closure
                    .as_ref()
                    .expect("GetUpvalue only emitted inside a closure body");
                let v = closure.upvalues[b as usize].borrow().clone();
                self.set_reg(frame_idx, a, v);
            }
            SetUpvalue => {
                let v = self.get_reg(frame_idx, a);
                let closure = self.frames[frame_idx]
                    .closure
                    .as_ref()
                    .expect("SetUpvalue only emitted inside a closure body");
                *closure.upvalues[b as usize].borrow_mut() = v;
            }

            Require => {
                let path_value = self.get_reg(frame_idx, b as u16);
                let Value::Str(path) = path_value else {
                    let loc = self.frames[frame_idx].loc();
                    return Err(RuntimeError::type_error("require path must be a str", loc));
                };
                let mut args = Vec::with_capacity(c as usize);
                for i in 0..c as u16 {
                    args.push(self.get_reg(frame_idx, (b as u16) + 1 + i));
                }
                let result = self.do_require(frame_idx, &path)?;
                self.set_reg(frame_idx, a, result(args, self)?);
            }
            Trace => {
                let mut parts = Vec::with_capacity(c as usize);
                for i in 0..c as u16 {
                    let v = self.get_reg(frame_idx, a + i);
                    parts.push(crate::builtins::format_value(&v));
                }
                self.host.write_line(&parts.join(" "));
            }
        }
        Ok(None)
    }

    fn get_reg(&self, frame_idx: usize, reg: u16) -> Value {
        self.frames[frame_idx].registers[reg as usize].borrow().clone()
    }

    fn set_reg(&mut self, frame_idx: usize, reg: u16, value: Value) {
        *self.frames[frame_idx].registers[reg as usize].borrow_mut() = value;
    }

    fn resolve_upvalue(&self, frame_idx: usize, source: crate::chunk::UpvalueSource) -> Reg {
        use crate::chunk::UpvalueSource::*;
        match source {
            ParentLocal(reg) => self.frames[frame_idx].registers[reg as usize].clone(),
            ParentUpvalue(idx) => self.frames[frame_idx]
                .closure
                .as_ref()
                .expect("ParentUpvalue only valid inside a closure body")
                .upvalues[idx as usize]
                .clone(),
        }
    }

    fn push_call(&mut self, closure: Rc<ClosureObj>, args: Vec<Value>) {
        let proto = closure.proto.clone();
        let registers: Vec<Reg> = (0..proto.register_count)
            .map(|i| {
                let v = args.get(i as usize).cloned().unwrap_or(Value::Null);
                cell(v)
            })
            .collect();
        let file = self.frames.last().map(|f| f.file.clone()).unwrap();
        self.frames.push(Frame {
            proto,
            closure: Some(closure),
            registers,
            ip: 0,
            file,
        });
    }

    /// Called when `execute`'s inner loop observes a `Return` from a frame
    /// that is not the base frame: pop it and continue the caller with the
    /// return value written into the register the `Call` instruction named.
    fn finish_call(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.frames.pop();
        let caller_idx = self.frames.len() - 1;
        let caller_ip = self.frames[caller_idx].ip - 1;
        let Instr { a, .. } = self.frames[caller_idx].proto.code[caller_ip];
        self.set_reg(caller_idx, a, value);
        Ok(())
    }

    fn iterator_advance(&mut self, handle: usize) -> Option<(Value, Value)> {
        match &mut self.iterators[handle] {
            IterState::Array { arr, idx } => {
                let len = arr.borrow().len();
                if *idx >= len {
                    return None;
                }
                let key = Value::Int(*idx as i64);
                let value = arr.borrow().get(*idx as i64);
                *idx += 1;
                Some((key, value))
            }
            IterState::Struct { keys, st, idx } => {
                let key = keys.get(*idx)?.clone();
                let value = st.borrow().get(&key);
                *idx += 1;
                Some((key.to_value(), value))
            }
        }
    }

    fn add(x: Value, y: Value) -> Result<Value, String> {
        match (x, y) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            (a, b) => Err(format!(
                "cannot add {} and {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    fn binop(
        &mut self,
        frame_idx: usize,
        a: u16,
        b: i32,
        c: i32,
        f: impl Fn(Value, Value) -> Result<Value, String>,
    ) -> Result<(), RuntimeError> {
        let x = self.get_reg(frame_idx, b as u16);
        let y = self.get_reg(frame_idx, c as u16);
        let loc = self.frames[frame_idx].loc();
        let result = f(x, y).map_err(|msg| RuntimeError::type_error(msg, loc))?;
        self.set_reg(frame_idx, a, result);
        Ok(())
    }

    fn arith(
        &mut self,
        frame_idx: usize,
        a: u16,
        b: i32,
        c: i32,
        float_op: impl Fn(f64, f64) -> f64,
        int_op: impl Fn(i64, i64) -> i64,
    ) -> Result<(), RuntimeError> {
        let x = self.get_reg(frame_idx, b as u16);
        let y = self.get_reg(frame_idx, c as u16);
        let loc = self.frames[frame_idx].loc();
        let result = match (x, y) {
            (Value::Int(a), Value::Int(b)) => Value::Int(int_op(a, b)),
            (Value::Float(a), Value::Float(b)) => Value::Float(float_op(a, b)),
            (Value::Int(a), Value::Float(b)) => Value::Float(float_op(a as f64, b)),
            (Value::Float(a), Value::Int(b)) => Value::Float(float_op(a, b as f64)),
            (a, b) => {
                return Err(RuntimeError::type_error(
                    format!("cannot apply arithmetic to {} and {}", a.type_name(), b.type_name()),
                    loc,
                ))
            }
        };
        self.set_reg(frame_idx, a, result);
        Ok(())
    }

    /// `/` and `%`. Int-by-zero is a value error (spec §8's Open Question
    /// resolution); float-by-zero follows IEEE 754 (`inf`/`nan`, no error).
    fn div_mod(
        &mut self,
        frame_idx: usize,
        a: u16,
        b: i32,
        c: i32,
        is_div: bool,
    ) -> Result<(), RuntimeError> {
        let x = self.get_reg(frame_idx, b as u16);
        let y = self.get_reg(frame_idx, c as u16);
        let loc = self.frames[frame_idx].loc();
        let result = match (x, y) {
            (Value::Int(_), Value::Int(0)) => {
                let op = if is_div { "divide" } else { "take the modulus of" };
                return Err(RuntimeError::value_error(
                    format!("cannot {op} {} by zero", "an int"),
                    loc,
                ));
            }
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(if is_div { a.wrapping_div(b) } else { a.wrapping_rem(b) })
            }
            (Value::Float(a), Value::Float(b)) => Value::Float(if is_div { a / b } else { a % b }),
            (Value::Int(a), Value::Float(b)) => {
                Value::Float(if is_div { a as f64 / b } else { (a as f64) % b })
            }
            (Value::Float(a), Value::Int(b)) => {
                Value::Float(if is_div { a / b as f64 } else { a % b as f64 })
            }
            (a, b) => {
                return Err(RuntimeError::type_error(
                    format!("cannot apply arithmetic to {} and {}", a.type_name(), b.type_name()),
                    loc,
                ))
            }
        };
        self.set_reg(frame_idx, a, result);
        Ok(())
    }

    fn bitwise(
        &mut self,
        frame_idx: usize,
        a: u16,
        b: i32,
        c: i32,
        f: impl Fn(i64, i64) -> i64,
    ) -> Result<(), RuntimeError> {
        let x = self.get_reg(frame_idx, b as u16);
        let y = self.get_reg(frame_idx, c as u16);
        let loc = self.frames[frame_idx].loc();
        match (x, y) {
            (Value::Int(x), Value::Int(y)) => {
                self.set_reg(frame_idx, a, Value::Int(f(x, y)));
                Ok(())
            }
            (x, y) => Err(RuntimeError::type_error(
                format!("bitwise ops require ints, got {} and {}", x.type_name(), y.type_name()),
                loc,
            )),
        }
    }

    fn compare(
        &mut self,
        frame_idx: usize,
        a: u16,
        b: i32,
        c: i32,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), RuntimeError> {
        let x = self.get_reg(frame_idx, b as u16);
        let y = self.get_reg(frame_idx, c as u16);
        let loc = self.frames[frame_idx].loc();
        let ordering = match (&x, &y) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => None,
        };
        let result = match ordering {
            Some(o) => accept(o),
            None => {
                return Err(RuntimeError::type_error(
                    format!("cannot compare {} and {}", x.type_name(), y.type_name()),
                    loc,
                ))
            }
        };
        self.set_reg(frame_idx, a, Value::Bool(result));
        Ok(())
    }

    fn cast(&self, v: Value, kind: CastKind, loc: &SourceLocation) -> Result<Value, RuntimeError> {
        let result = match kind {
            CastKind::Bool => Value::Bool(v.truthy()),
            CastKind::Int => match v {
                Value::Int(n) => Value::Int(n),
                Value::Float(f) => Value::Int(f as i64),
                Value::Bool(b) => Value::Int(b as i64),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| RuntimeError::value_error(format!("cannot cast \"{s}\" to int"), loc.clone()))?,
                other => {
                    return Err(RuntimeError::type_error(
                        format!("cannot cast {} to int", other.type_name()),
                        loc.clone(),
                    ))
                }
            },
            CastKind::Float => match v {
                Value::Float(f) => Value::Float(f),
                Value::Int(n) => Value::Float(n as f64),
                Value::Bool(b) => Value::Float(if b { 1.0 } else { 0.0 }),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| RuntimeError::value_error(format!("cannot cast \"{s}\" to float"), loc.clone()))?,
                other => {
                    return Err(RuntimeError::type_error(
                        format!("cannot cast {} to float", other.type_name()),
                        loc.clone(),
                    ))
                }
            },
            CastKind::Str => Value::str(crate::builtins::format_value(&v)),
        };
        Ok(result)
    }

    fn index_get(&self, container: &Value, key: &Value, loc: &SourceLocation) -> Result<Value, RuntimeError> {
        match container {
            Value::Array(a) => match key {
                Value::Int(i) => Ok(a.borrow().get(*i)),
                other => Err(RuntimeError::value_error(
                    format!("array index must be an int, got {}", other.type_name()),
                    loc.clone(),
                )),
            },
            Value::Struct(s) => {
                let k = Key::from_value(key).ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("struct key must be a str or int, got {}", key.type_name()),
                        loc.clone(),
                    )
                })?;
                Ok(s.borrow().get(&k))
            }
            other => Err(RuntimeError::type_error(
                format!("cannot index a {}", other.type_name()),
                loc.clone(),
            )),
        }
    }

    fn index_set(
        &self,
        container: &Value,
        key: &Value,
        value: Value,
        loc: &SourceLocation,
    ) -> Result<(), RuntimeError> {
        match container {
            Value::Array(a) => match key {
                Value::Int(i) if *i >= 0 => {
                    a.borrow_mut().set(*i as usize, value);
                    Ok(())
                }
                Value::Int(_) => Err(RuntimeError::value_error("array index must not be negative", loc.clone())),
                other => Err(RuntimeError::value_error(
                    format!("array index must be an int, got {}", other.type_name()),
                    loc.clone(),
                )),
            },
            Value::Struct(s) => {
                let k = Key::from_value(key).ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("struct key must be a str or int, got {}", key.type_name()),
                        loc.clone(),
                    )
                })?;
                s.borrow_mut().set(k, value);
                Ok(())
            }
            other => Err(RuntimeError::type_error(
                format!("cannot index a {}", other.type_name()),
                loc.clone(),
            )),
        }
    }

    fn index_delete(&self, container: &Value, key: &Value, loc: &SourceLocation) -> Result<(), RuntimeError> {
        match container {
            Value::Array(a) => match key {
                Value::Int(i) if *i >= 0 => {
                    a.borrow_mut().truncate(*i as usize);
                    Ok(())
                }
                Value::Int(_) => Err(RuntimeError::value_error("array index must not be negative", loc.clone())),
                other => Err(RuntimeError::value_error(
                    format!("array index must be an int, got {}", other.type_name()),
                    loc.clone(),
                )),
            },
            Value::Struct(s) => {
                let k = Key::from_value(key).ok_or_else(|| {
                    RuntimeError::type_error(
                        format!("struct key must be a str or int, got {}", key.type_name()),
                        loc.clone(),
                    )
                })?;
                s.borrow_mut().remove(&k);
                Ok(())
            }
            other => Err(RuntimeError::type_error(
                format!("cannot delete from a {}", other.type_name()),
                loc.clone(),
            )),
        }
    }

    /// Loads, compiles, and runs a `require`d file as a nested program
    /// (spec §5). No cache: a file required twice is recompiled and
    /// re-executed twice, each with its own fresh top-level frame.
    #[allow(clippy::type_complexity)]
    fn do_require(
        &mut self,
        frame_idx: usize,
        path: &str,
    ) -> Result<Box<dyn FnOnce(Vec<Value>, &mut Self) -> Result<Value, RuntimeError>>, RuntimeError> {
        let caller_loc = self.frames[frame_idx].loc();
        let caller_dir = self.frames[frame_idx]
            .file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let resolved = require::resolve_require_path(path, &caller_dir);

        tracing::trace!(target = "oyc_runtime::require", path = %resolved.display(), "resolving require");

        let (abs_path, source) = self
            .host
            .load(path, &caller_dir)
            .map_err(|_| require::not_found_error(path, caller_loc.clone()))?;
        let proto = (self.compile)(&source, &abs_path).map_err(|msg| {
            let mut chain = self.require_chain.clone();
            chain.push(caller_loc.clone());
            RuntimeError::require_error(msg, caller_loc.clone(), chain)
        })?;

        let path_for_closure = resolved;
        let _ = path_for_closure;
        let abs_path_captured = abs_path;
        Ok(Box::new(move |args, vm: &mut Vm<H>| {
            vm.require_chain.push(caller_loc.clone());
            let outcome = vm.run(proto, abs_path_captured, args);
            vm.require_chain.pop();
            outcome
        }))
    }
}
