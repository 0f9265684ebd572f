//! Built-in API providers installed into every bundle sandbox at
//! construction time, before the bundle starts.

use std::rc::Rc;

use log::{error, info, warn};

use sos_sandbox::{FunctionCall, ObjectCreator, Sandbox, ScriptObject, Value};
use sos_vfs::exists;

use crate::bundle::Bundle;
use crate::{KernelError, KernelResult};

/// Installs one API surface into a bundle's sandbox. Receives the kernel
/// bundle and the target bundle.
pub type ApiProviderBinder = Rc<dyn Fn(&Rc<Bundle>, &Rc<Bundle>) -> KernelResult<()>>;

/// Default provider set: console, timeouts, promise polyfill.
pub fn default_api_providers() -> Vec<ApiProviderBinder> {
    vec![console_api(), timeout_api(), promise_api()]
}

/// `console.log` / `console.warn` / `console.error` routed through the
/// host logging facade, tagged with the emitting bundle.
pub fn console_api() -> ApiProviderBinder {
    Rc::new(|_kernel: &Rc<Bundle>, bundle: &Rc<Bundle>| {
        let sandbox = bundle.sandbox()?;
        let mut builder = ObjectCreator::new(sandbox.as_ref());
        let log_name = bundle.name().to_string();
        let warn_name = log_name.clone();
        let error_name = log_name.clone();
        builder
            .define_function(
                "log",
                Rc::new(move |call: FunctionCall| {
                    info!("{log_name}::console: {}", render(&call));
                    Ok(Value::Undefined)
                }),
            )
            .define_function(
                "warn",
                Rc::new(move |call: FunctionCall| {
                    warn!("{warn_name}::console: {}", render(&call));
                    Ok(Value::Undefined)
                }),
            )
            .define_function(
                "error",
                Rc::new(move |call: FunctionCall| {
                    error!("{error_name}::console: {}", render(&call));
                    Ok(Value::Undefined)
                }),
            );
        builder
            .build_into("console", &sandbox.global())
            .map_err(|err| KernelError::from_sandbox("console", err))
    })
}

fn render(call: &FunctionCall) -> String {
    call.args
        .iter()
        .map(|arg| match arg.as_str() {
            Some(text) => text.to_string(),
            None => format!("{arg:?}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `setTimeout` stub: scheduling is not a bundle capability; the call
/// resolves to null immediately.
pub fn timeout_api() -> ApiProviderBinder {
    Rc::new(|_kernel: &Rc<Bundle>, bundle: &Rc<Bundle>| {
        let sandbox = bundle.sandbox()?;
        let set_timeout = sandbox.new_function(
            "setTimeout",
            Rc::new(|_call: FunctionCall| Ok(Value::Null)),
        );
        sandbox
            .global()
            .set("setTimeout", set_timeout)
            .map_err(|err| KernelError::from_sandbox("setTimeout", err))?;
        Ok(())
    })
}

/// Loads the promise polyfill shipped on the kernel filesystem into the
/// bundle's sandbox, when one is shipped at all.
pub fn promise_api() -> ApiProviderBinder {
    Rc::new(|kernel_bundle: &Rc<Bundle>, bundle: &Rc<Bundle>| {
        let kernel = kernel_bundle.kernel()?;
        let polyfill = "/js/kernel/promise.js";
        if !exists(kernel_bundle.filesystem().as_ref(), polyfill) {
            return Ok(());
        }
        kernel.load_plain_script(polyfill, bundle)?;
        Ok(())
    })
}
