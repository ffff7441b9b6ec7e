//! Closures (spec §3.4, §4.4).
//!
//! Every local register is an `Rc<RefCell<Value>>` cell rather than a plain
//! `Value` slot; capturing an upvalue is just cloning that `Rc`. This is the
//! safe substitute for Lua's open/closed upvalue state machine described in
//! spec §9 ("Upvalue representation"): there is no "closing" step at scope
//! exit, because the cell was heap-allocated from the moment its local was
//! declared. A fresh loop iteration that re-declares a loop-body local gets
//! a brand-new cell (see `vm.rs`), which is what gives each iteration's
//! captured closures an independent copy of that local (spec §9, the
//! `make_counters` example).

use std::cell::RefCell;
use std::rc::Rc;

use crate::chunk::Prototype;
use crate::value::Value;

pub struct ClosureObj {
    pub proto: Rc<Prototype>,
    pub upvalues: Vec<Rc<RefCell<Value>>>,
}

impl ClosureObj {
    pub fn new(proto: Rc<Prototype>, upvalues: Vec<Rc<RefCell<Value>>>) -> Self {
        ClosureObj { proto, upvalues }
    }
}
