use std::rc::Rc;

use crate::{SandboxResult, Value};

pub type ObjectRef = Rc<dyn ScriptObject>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectTag {
    Plain,
    Array,
    Function,
    Proxy,
}

/// Property shape as observed through reflection. Either `value` or the
/// accessor pair is populated.
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub getter: Option<Value>,
    pub setter: Option<Value>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            getter: None,
            setter: None,
            writable,
            enumerable,
            configurable,
        }
    }

    pub fn accessor(getter: Option<Value>, setter: Option<Value>) -> Self {
        Self {
            value: None,
            getter,
            setter,
            writable: false,
            enumerable: true,
            configurable: false,
        }
    }
}

/// Object surface the kernel and the security proxy program against.
///
/// `get` on a missing property yields `Undefined`; errors are reserved for
/// thrown conditions (access violations, frozen targets). The boolean
/// results of `set`/`delete`/`define_property` report whether the mutation
/// took effect, mirroring proxy-trap semantics: a denied write is a
/// signalled no-op, not a panic.
pub trait ScriptObject {
    fn tag(&self) -> ObjectTag;

    fn get(&self, name: &str) -> SandboxResult<Value>;
    fn set(&self, name: &str, value: Value) -> SandboxResult<bool>;
    fn has(&self, name: &str) -> SandboxResult<bool>;
    fn keys(&self) -> Vec<String>;
    fn define_property(&self, name: &str, descriptor: PropertyDescriptor) -> SandboxResult<bool>;
    fn property_descriptor(&self, name: &str) -> SandboxResult<Option<PropertyDescriptor>>;
    fn delete(&self, name: &str) -> SandboxResult<bool>;

    fn prevent_extensions(&self) -> bool;
    fn is_extensible(&self) -> bool;
    fn freeze(&self);
    fn is_frozen(&self) -> bool;
    fn prototype(&self) -> SandboxResult<Value>;

    fn is_callable(&self) -> bool;
    fn call(&self, this: Value, args: &[Value]) -> SandboxResult<Value>;
    fn construct(&self, args: &[Value]) -> SandboxResult<Value>;

    /// Dense elements for array-tagged objects, `None` otherwise.
    fn elements(&self) -> Option<Vec<Value>>;
}

/// Stable address of the underlying object, used for identity caches.
pub fn object_id(obj: &ObjectRef) -> usize {
    Rc::as_ptr(obj) as *const () as usize
}
