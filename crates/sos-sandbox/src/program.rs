use std::any::Any;
use std::rc::Rc;

/// Engine-opaque compiled program. The kernel memoizes these in its
/// process-wide script cache; the owning engine downcasts the payload.
#[derive(Clone)]
pub struct Program {
    name: String,
    payload: Rc<dyn Any>,
}

impl Program {
    pub fn new(name: impl Into<String>, payload: Rc<dyn Any>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Source name the program was compiled from (`bundle:/path` form).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("name", &self.name).finish()
    }
}

/// Compile result: the program plus whether it may be memoized.
pub struct Compiled {
    pub program: Program,
    pub cacheable: bool,
}

impl std::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiled")
            .field("program", &self.program)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}
