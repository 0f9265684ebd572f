//! Authoring helpers for host programs that register modules.
//!
//! A module program calls the bundle-global `System.register` primitive
//! exactly the way transpiled script output does: optional module name,
//! dependency list, and an initializer returning `{ setters, execute }`.

use std::rc::Rc;

use sos_sandbox::{
    FunctionCall, NativeFunction, PropertyDescriptor, Sandbox, SandboxError, SandboxResult,
    ScriptObject, Value,
};

use crate::heap;
use crate::library::HostProgram;

/// What a module initializer hands back to the loader.
pub struct ModuleInit {
    /// One setter per dependency, invoked in dependency order with the
    /// (possibly proxied) exports of the resolved dependency.
    pub setters: Vec<NativeFunction>,
    /// Runs after all setters.
    pub execute: NativeFunction,
}

/// Arguments the loader passes to a module initializer.
pub struct InitArgs {
    /// The `export(name, value)` callback writing onto this module's
    /// exports object.
    pub export: Value,
    /// Context object carrying the module `id`.
    pub context: Value,
}

impl InitArgs {
    /// Publishes `value` under `name` via the export callback.
    pub fn export(&self, name: &str, value: impl Into<Value>) -> SandboxResult<Value> {
        self.export
            .call(Value::Undefined, &[Value::string(name), value.into()])
    }
}

/// Builds a host program whose body performs a `System.register` call.
///
/// `init` runs when the loader invokes the initializer; it returns the
/// setters/execute pair the loader will drive.
pub fn module_program<F>(name: Option<&str>, deps: &[&str], init: F) -> HostProgram
where
    F: Fn(InitArgs) -> SandboxResult<ModuleInit> + 'static,
{
    let name = name.map(str::to_string);
    let deps: Vec<String> = deps.iter().map(|dep| dep.to_string()).collect();
    let init = Rc::new(init);
    Rc::new(move |sandbox: &dyn Sandbox| {
        let callback: NativeFunction = {
            let init = init.clone();
            Rc::new(move |call: FunctionCall| -> SandboxResult<Value> {
                let ModuleInit { setters, execute } = init(InitArgs {
                    export: call.argument(0),
                    context: call.argument(1),
                })?;
                let setters: Vec<Value> = setters
                    .into_iter()
                    .enumerate()
                    .map(|(idx, setter)| heap::function_value(&format!("setter#{idx}"), setter))
                    .collect();
                let initializer = heap::new_object();
                initializer.define_property(
                    "setters",
                    PropertyDescriptor::data(
                        Value::Obj(heap::new_array(setters)),
                        false,
                        true,
                        false,
                    ),
                )?;
                initializer.define_property(
                    "execute",
                    PropertyDescriptor::data(
                        heap::function_value("execute", execute),
                        false,
                        true,
                        false,
                    ),
                )?;
                Ok(Value::Obj(initializer))
            })
        };

        let system = sandbox.global().get("System")?;
        let register = system
            .as_object()
            .ok_or_else(|| {
                SandboxError::Execution("System.register is not installed in this sandbox".into())
            })?
            .get("register")?;

        let mut args = Vec::new();
        if let Some(module_name) = &name {
            args.push(Value::string(module_name));
        }
        args.push(Value::Obj(
            sandbox.new_array(deps.iter().map(Value::string).collect()),
        ));
        args.push(sandbox.new_function("<module-init>", callback));
        register.call(Value::Undefined, &args)?;
        Ok(Value::Undefined)
    })
}

/// Shorthand for leaf modules that only export constants from `execute`.
pub fn exporting_program(
    name: Option<&str>,
    exports: Vec<(&'static str, Value)>,
) -> HostProgram {
    module_program(name, &[], move |args: InitArgs| {
        let export = args.export.clone();
        let exports = exports.clone();
        Ok(ModuleInit {
            setters: Vec::new(),
            execute: Rc::new(move |_call| {
                for (export_name, value) in &exports {
                    export.call(
                        Value::Undefined,
                        &[Value::string(export_name), value.clone()],
                    )?;
                }
                Ok(Value::Undefined)
            }),
        })
    })
}
