//! Runtime values.
//!
//! `'p` is the lifetime of the loaded chunk: closures borrow their prototype
//! from it instead of owning a copy.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use lunette_bytecode::proto::{Constant, Proto};
use thiserror::Error;

use crate::table::Table;

/// A shared, mutable slot. Registers and upvalues are both cells so a
/// closure that captures a register sees later writes to it.
pub type UpvalCell<'p> = Rc<RefCell<LuaValue<'p>>>;

pub type TableRef<'p> = Rc<RefCell<Table<'p>>>;

pub fn new_cell(value: LuaValue<'_>) -> UpvalCell<'_> {
    Rc::new(RefCell::new(value))
}

/// Error raised by a native function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NativeError(pub String);

impl NativeError {
    pub fn new(msg: impl Into<String>) -> Self {
        NativeError(msg.into())
    }
}

type NativeFn<'p> = dyn Fn(&[LuaValue<'p>]) -> Result<Vec<LuaValue<'p>>, NativeError> + 'p;

/// A host function callable from bytecode.
#[derive(Clone)]
pub struct NativeFunction<'p> {
    name: Rc<str>,
    func: Rc<NativeFn<'p>>,
}

impl<'p> NativeFunction<'p> {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[LuaValue<'p>]) -> Result<Vec<LuaValue<'p>>, NativeError> + 'p,
    {
        NativeFunction {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[LuaValue<'p>]) -> Result<Vec<LuaValue<'p>>, NativeError> {
        (self.func)(args)
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.func) as *const ()
    }
}

/// A prototype instantiated with its captured upvalue cells.
pub struct Closure<'p> {
    pub proto: &'p Proto,
    pub upvalues: Vec<UpvalCell<'p>>,
    /// Upvalue count declared by the chunk; activations get at least this many slots.
    pub file_upvalues: usize,
}

impl<'p> Closure<'p> {
    pub fn new(proto: &'p Proto, upvalues: Vec<UpvalCell<'p>>, file_upvalues: usize) -> Self {
        Closure {
            proto,
            upvalues,
            file_upvalues,
        }
    }
}

impl fmt::Debug for Closure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("source", &self.proto.source_name())
            .field("line", &self.proto.line_defined)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}

/// A Lua value.
#[derive(Clone, Default)]
pub enum LuaValue<'p> {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Table(TableRef<'p>),
    Closure(Rc<Closure<'p>>),
    Native(NativeFunction<'p>),
}

impl<'p> LuaValue<'p> {
    pub fn string(s: &str) -> Self {
        LuaValue::String(Rc::from(s))
    }

    /// A fresh empty table.
    pub fn new_table() -> Self {
        Self::from_table(Table::new())
    }

    pub fn from_table(table: Table<'p>) -> Self {
        LuaValue::Table(Rc::new(RefCell::new(table)))
    }

    pub fn from_constant(k: &Constant) -> Self {
        match k {
            Constant::Nil => LuaValue::Nil,
            Constant::Boolean(b) => LuaValue::Bool(*b),
            Constant::Integer(i) => LuaValue::Integer(*i),
            Constant::Float(f) => LuaValue::Float(*f),
            Constant::String(s) => LuaValue::string(s),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Bool(_) => "boolean",
            LuaValue::Integer(_) | LuaValue::Float(_) => "number",
            LuaValue::String(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Closure(_) | LuaValue::Native(_) => "function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, LuaValue::Nil)
    }

    /// Lua truthiness: only nil and false are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Bool(false))
    }

    pub fn is_falsy(&self) -> bool {
        !self.is_truthy()
    }

    pub fn is_number(&self) -> bool {
        matches!(self, LuaValue::Integer(_) | LuaValue::Float(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, LuaValue::Closure(_) | LuaValue::Native(_))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LuaValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float; integers convert.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            LuaValue::Integer(i) => Some(*i as f64),
            LuaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef<'p>> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<bool> for LuaValue<'_> {
    fn from(b: bool) -> Self {
        LuaValue::Bool(b)
    }
}

impl From<i64> for LuaValue<'_> {
    fn from(i: i64) -> Self {
        LuaValue::Integer(i)
    }
}

impl From<f64> for LuaValue<'_> {
    fn from(f: f64) -> Self {
        LuaValue::Float(f)
    }
}

impl From<&str> for LuaValue<'_> {
    fn from(s: &str) -> Self {
        LuaValue::string(s)
    }
}

impl<'p> From<Table<'p>> for LuaValue<'p> {
    fn from(t: Table<'p>) -> Self {
        LuaValue::from_table(t)
    }
}

// Key identity: integers and floats never alias, floats compare by bits,
// reference types by pointer.
impl PartialEq for LuaValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Bool(a), LuaValue::Bool(b)) => a == b,
            (LuaValue::Integer(a), LuaValue::Integer(b)) => a == b,
            (LuaValue::Float(a), LuaValue::Float(b)) => a.to_bits() == b.to_bits(),
            (LuaValue::String(a), LuaValue::String(b)) => a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Closure(a), LuaValue::Closure(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Native(a), LuaValue::Native(b)) => a.addr() == b.addr(),
            _ => false,
        }
    }
}

impl Eq for LuaValue<'_> {}

impl Hash for LuaValue<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LuaValue::Nil => {}
            LuaValue::Bool(b) => b.hash(state),
            LuaValue::Integer(i) => i.hash(state),
            LuaValue::Float(f) => f.to_bits().hash(state),
            LuaValue::String(s) => s.hash(state),
            LuaValue::Table(t) => Rc::as_ptr(t).hash(state),
            LuaValue::Closure(c) => Rc::as_ptr(c).hash(state),
            LuaValue::Native(n) => n.addr().hash(state),
        }
    }
}

fn fmt_float(f: f64, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    if f.is_nan() {
        write!(out, "nan")
    } else if f.is_infinite() {
        write!(out, "{}", if f > 0.0 { "inf" } else { "-inf" })
    } else {
        // `{:?}` keeps the trailing `.0` that marks a float
        write!(out, "{f:?}")
    }
}

impl fmt::Display for LuaValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Bool(b) => write!(f, "{b}"),
            LuaValue::Integer(i) => write!(f, "{i}"),
            LuaValue::Float(x) => fmt_float(*x, f),
            LuaValue::String(s) => write!(f, "{s}"),
            LuaValue::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            LuaValue::Closure(c) => write!(f, "function: {:p}", Rc::as_ptr(c)),
            LuaValue::Native(n) => write!(f, "function: builtin: {}", n.name()),
        }
    }
}

impl fmt::Debug for LuaValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Bool(b) => write!(f, "{b}"),
            LuaValue::Integer(i) => write!(f, "{i}"),
            LuaValue::Float(x) => fmt_float(*x, f),
            LuaValue::String(s) => write!(f, "{s:?}"),
            LuaValue::Table(t) => match t.try_borrow() {
                Ok(table) => write!(f, "table({} entries)@{:p}", table.len(), Rc::as_ptr(t)),
                Err(_) => write!(f, "table(<borrowed>)@{:p}", Rc::as_ptr(t)),
            },
            LuaValue::Closure(c) => write!(f, "{c:?}"),
            LuaValue::Native(n) => write!(f, "builtin({})", n.name()),
        }
    }
}
