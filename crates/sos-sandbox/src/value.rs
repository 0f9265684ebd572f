use std::rc::Rc;

use crate::object::{ObjectRef, ScriptObject};
use crate::{SandboxError, SandboxResult};

/// Tagged value crossing the host/script boundary. Objects are shared
/// handles; primitives copy. `ProxyOf` marks an interposed foreign object
/// so marshalling never wraps a proxy in another proxy of the same edge.
#[derive(Clone)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Obj(ObjectRef),
    Fn(ObjectRef),
    ProxyOf(ObjectRef),
}

impl Value {
    pub fn string(value: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(value.as_ref()))
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Null | Value::Undefined)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Obj(_) | Value::Fn(_) | Value::ProxyOf(_))
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Fn(_) => true,
            Value::Obj(obj) | Value::ProxyOf(obj) => obj.is_callable(),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Obj(obj) | Value::Fn(obj) | Value::ProxyOf(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Calls the value if it is callable.
    pub fn call(&self, this: Value, args: &[Value]) -> SandboxResult<Value> {
        match self.as_object() {
            Some(obj) if obj.is_callable() => obj.call(this, args),
            _ => Err(SandboxError::NotCallable),
        }
    }

    /// Identity comparison: pointer equality for objects, value equality
    /// for primitives.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) => match (a.as_object(), b.as_object()) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                _ => false,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Obj(_) => "object",
            Value::Fn(_) => "function",
            Value::ProxyOf(_) => "proxy",
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Obj(obj) => write!(f, "[object {:?}]", obj.tag()),
            Value::Fn(_) => write!(f, "[function]"),
            Value::ProxyOf(_) => write!(f, "[proxy]"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

/// Invocation frame handed to native functions.
pub struct FunctionCall {
    pub this: Value,
    pub args: Vec<Value>,
}

impl FunctionCall {
    pub fn argument(&self, idx: usize) -> Value {
        self.args.get(idx).cloned().unwrap_or(Value::Undefined)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

/// Host function exposed to scripts.
pub type NativeFunction = Rc<dyn Fn(FunctionCall) -> SandboxResult<Value>>;
