use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use sos_sandbox::{ObjectRef, Sandbox};

use crate::bundle::{Bundle, SecurityInterceptor};
use crate::origin::Origin;
use crate::{KernelError, KernelResult};

/// A script (or native capability) with an exports container, owned by
/// exactly one bundle for its lifetime. Ownership runs bundle -> module;
/// the back edge is weak so cycles live only in the exports graph.
pub struct Module {
    id: String,
    name: RefCell<String>,
    origin: Origin,
    bundle: Weak<Bundle>,
    exports: ObjectRef,
    kernel_module: Cell<bool>,
    registered: Cell<bool>,
    interceptor: RefCell<Option<SecurityInterceptor>>,
}

impl Module {
    /// Creates the module with an exports object from the owning bundle's
    /// sandbox. An empty `name` defaults to the origin filename stem.
    pub fn new(
        id: &str,
        name: &str,
        origin: Origin,
        bundle: &Rc<Bundle>,
    ) -> KernelResult<Rc<Module>> {
        let exports = bundle.sandbox()?.new_object();
        let name = if name.trim().is_empty() {
            origin
                .filename()
                .split('.')
                .next()
                .unwrap_or(origin.filename())
                .to_string()
        } else {
            name.to_string()
        };
        Ok(Rc::new(Module {
            id: id.to_string(),
            name: RefCell::new(name),
            origin,
            bundle: Rc::downgrade(bundle),
            exports,
            kernel_module: Cell::new(false),
            registered: Cell::new(false),
            interceptor: RefCell::new(None),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.borrow_mut() = name.to_string();
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn bundle(&self) -> KernelResult<Rc<Bundle>> {
        self.bundle.upgrade().ok_or_else(|| KernelError::Load {
            path: self.origin.full_path().to_string(),
            message: "owning bundle is gone".to_string(),
        })
    }

    pub fn exports(&self) -> ObjectRef {
        self.exports.clone()
    }

    pub fn is_kernel_module(&self) -> bool {
        self.kernel_module.get()
    }

    pub(crate) fn mark_kernel_module(&self) {
        self.kernel_module.set(true);
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.get()
    }

    pub(crate) fn mark_registered(&self) -> KernelResult<()> {
        if self.registered.replace(true) {
            return Err(KernelError::Registration(format!(
                "module '{}' called register twice",
                self.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn set_interceptor(&self, interceptor: Option<SecurityInterceptor>) {
        *self.interceptor.borrow_mut() = interceptor;
    }

    /// Access check run when a caller bundle links this module
    /// (`<name>.inject`). A module-level interceptor wins over the owning
    /// bundle's; privileged callers always pass.
    pub fn is_accessible(&self, caller: &Rc<Bundle>) -> KernelResult<()> {
        if caller.privileged() {
            return Ok(());
        }
        let origin = self.bundle()?;
        let property = format!("{}.inject", self.name());
        let interceptor = self
            .interceptor
            .borrow()
            .clone()
            .or_else(|| origin.security_interceptor());
        let granted = match interceptor {
            Some(check) => check(caller, &property),
            None => false,
        };
        if granted {
            Ok(())
        } else {
            Err(KernelError::AccessDenied {
                caller: caller.name().to_string(),
                origin: origin.name().to_string(),
                property,
            })
        }
    }
}
