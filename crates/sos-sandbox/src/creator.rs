//! Deferred object construction for binder APIs.
//!
//! Binders describe an object tree (functions, constants, properties,
//! nested objects) against a creator; `build`/`build_into` then realizes
//! the tree in a concrete sandbox. Definition order is preserved.

use crate::convert::HostFunction;
use crate::{
    NativeFunction, ObjectRef, PropertyDescriptor, Sandbox, SandboxResult, ScriptObject, Value,
};

enum Definition {
    Function(String, NativeFunction),
    Constant(String, Value),
    SimpleProperty(String, Value),
    AccessorProperty(String, Option<NativeFunction>, Option<NativeFunction>),
    Object(String, Vec<Definition>),
}

pub struct ObjectCreator<'sb> {
    sandbox: &'sb dyn Sandbox,
    definitions: Vec<Definition>,
}

impl<'sb> ObjectCreator<'sb> {
    pub fn new(sandbox: &'sb dyn Sandbox) -> Self {
        Self {
            sandbox,
            definitions: Vec::new(),
        }
    }

    /// Defines a function operating on raw script values.
    pub fn define_function(&mut self, name: &str, function: NativeFunction) -> &mut Self {
        self.definitions
            .push(Definition::Function(name.to_string(), function));
        self
    }

    /// Defines a host function; the signature adapter is generated here.
    pub fn define_host_function<Args>(
        &mut self,
        name: &str,
        function: impl HostFunction<Args>,
    ) -> &mut Self {
        self.define_function(name, function.into_native())
    }

    /// Read-only, non-configurable data property.
    pub fn define_constant(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.definitions
            .push(Definition::Constant(name.to_string(), value.into()));
        self
    }

    /// Writable data property.
    pub fn define_simple_property(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.definitions
            .push(Definition::SimpleProperty(name.to_string(), value.into()));
        self
    }

    pub fn define_accessor_property(
        &mut self,
        name: &str,
        getter: Option<NativeFunction>,
        setter: Option<NativeFunction>,
    ) -> &mut Self {
        self.definitions.push(Definition::AccessorProperty(
            name.to_string(),
            getter,
            setter,
        ));
        self
    }

    /// Nested object populated by `binder`, which runs immediately.
    pub fn define_object_property(
        &mut self,
        name: &str,
        binder: impl FnOnce(&mut ObjectCreator<'_>),
    ) -> &mut Self {
        let mut nested = ObjectCreator::new(self.sandbox);
        binder(&mut nested);
        self.definitions
            .push(Definition::Object(name.to_string(), nested.definitions));
        self
    }

    /// Realizes the tree as a fresh object.
    pub fn build(&self) -> SandboxResult<ObjectRef> {
        let object = self.sandbox.new_object();
        Self::apply(self.sandbox, &object, &self.definitions)?;
        Ok(object)
    }

    /// Realizes the tree directly onto `target` (used for module exports).
    pub fn build_onto(&self, target: &ObjectRef) -> SandboxResult<()> {
        Self::apply(self.sandbox, target, &self.definitions)
    }

    /// Realizes the tree and attaches it to `parent` under `name`.
    pub fn build_into(&self, name: &str, parent: &ObjectRef) -> SandboxResult<()> {
        let object = self.build()?;
        parent.define_property(
            name,
            PropertyDescriptor::data(Value::Obj(object), true, true, false),
        )?;
        Ok(())
    }

    fn apply(
        sandbox: &dyn Sandbox,
        target: &ObjectRef,
        definitions: &[Definition],
    ) -> SandboxResult<()> {
        for definition in definitions {
            match definition {
                Definition::Function(name, function) => {
                    let value = sandbox.new_function(name, function.clone());
                    target.define_property(
                        name,
                        PropertyDescriptor::data(value, false, true, false),
                    )?;
                }
                Definition::Constant(name, value) => {
                    target.define_property(
                        name,
                        PropertyDescriptor::data(value.clone(), false, true, false),
                    )?;
                }
                Definition::SimpleProperty(name, value) => {
                    target.define_property(
                        name,
                        PropertyDescriptor::data(value.clone(), true, true, false),
                    )?;
                }
                Definition::AccessorProperty(name, getter, setter) => {
                    let getter = getter
                        .clone()
                        .map(|g| sandbox.new_function(&format!("get {name}"), g));
                    let setter = setter
                        .clone()
                        .map(|s| sandbox.new_function(&format!("set {name}"), s));
                    target.define_property(name, PropertyDescriptor::accessor(getter, setter))?;
                }
                Definition::Object(name, nested) => {
                    let object = sandbox.new_object();
                    Self::apply(sandbox, &object, nested)?;
                    target.define_property(
                        name,
                        PropertyDescriptor::data(Value::Obj(object), false, true, false),
                    )?;
                }
            }
        }
        Ok(())
    }
}
