//! Script-engine ABI: the capability interface the kernel programs against.
//!
//! The kernel never links a concrete engine. It talks to a [`Sandbox`]
//! (compile, execute, object construction, deep freeze) and moves
//! [`Value`]s through the [`ScriptObject`] trait. Engines implement this
//! crate; `sos-engine` ships the bundled deterministic implementation.

pub mod convert;
mod creator;
mod error;
mod object;
mod program;
mod value;

pub use creator::ObjectCreator;
pub use error::{SandboxError, SandboxResult};
pub use object::{object_id, ObjectRef, ObjectTag, PropertyDescriptor, ScriptObject};
pub use program::{Compiled, Program};
pub use value::{FunctionCall, NativeFunction, Value};

use std::rc::Rc;

/// One execution context. Each bundle owns exactly one sandbox; sandboxes
/// are never shared and the core never re-enters one concurrently.
pub trait Sandbox {
    fn global(&self) -> ObjectRef;
    fn new_object(&self) -> ObjectRef;
    fn new_array(&self, items: Vec<Value>) -> ObjectRef;
    fn new_function(&self, name: &str, function: NativeFunction) -> Value;

    /// Compiles `source`. The `cacheable` flag on the result tells the
    /// kernel whether the program may enter the process-wide script cache.
    fn compile(&self, filename: &str, source: &str) -> SandboxResult<Compiled>;

    /// Runs a compiled program to completion on this sandbox's globals.
    fn execute(&self, program: &Program) -> SandboxResult<Value>;

    /// Transitively freezes an object graph.
    fn deep_freeze(&self, value: &Value) -> SandboxResult<()>;
}

pub type SharedSandbox = Rc<dyn Sandbox>;

/// Constructs the sandbox for a freshly installed bundle, keyed by the
/// bundle's display name (used for diagnostics only).
pub type SandboxFactory = Rc<dyn Fn(&str) -> SharedSandbox>;
