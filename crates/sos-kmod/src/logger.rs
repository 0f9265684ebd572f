use std::rc::Rc;

use log::{info, warn};

use sos_kernel::{Bundle, KernelModule, KernelResult, SecurityInterceptor};
use sos_sandbox::{FunctionCall, ObjectCreator, SandboxError, Value};

const LOGGER_MODULE_ID: &str = "3c6bddf9-7c84-41c4-8796-22379c4a5e29";

/// Structured logging for bundles: `logger.log.info(msg, ...)` routed to
/// the host logging facade, tagged with the emitting bundle.
pub struct LoggerModule;

impl LoggerModule {
    pub fn new() -> Rc<dyn KernelModule> {
        Rc::new(LoggerModule)
    }
}

impl KernelModule for LoggerModule {
    fn id(&self) -> &str {
        LOGGER_MODULE_ID
    }

    fn name(&self) -> &str {
        "logger"
    }

    fn api_definition_file(&self) -> &str {
        "/kernel/@types/logger"
    }

    fn security_interceptor(&self) -> Option<SecurityInterceptor> {
        // Everyone is supposed to use the logger API.
        Some(Rc::new(|_caller, _property| true))
    }

    fn bind(&self, bundle: &Rc<Bundle>, builder: &mut ObjectCreator<'_>) -> KernelResult<()> {
        let info_tag = bundle.name().to_string();
        let warn_tag = info_tag.clone();
        builder.define_object_property("log", move |log| {
            log.define_function(
                "info",
                Rc::new(move |call: FunctionCall| {
                    info!("{}", format_message(&info_tag, &call)?);
                    Ok(Value::Undefined)
                }),
            )
            .define_function(
                "warn",
                Rc::new(move |call: FunctionCall| {
                    warn!("{}", format_message(&warn_tag, &call)?);
                    Ok(Value::Undefined)
                }),
            );
        });
        Ok(())
    }
}

fn format_message(tag: &str, call: &FunctionCall) -> Result<String, SandboxError> {
    if call.is_empty() {
        return Err(SandboxError::type_error("log called without arguments"));
    }
    let mut rendered = String::new();
    for (idx, arg) in call.args.iter().enumerate() {
        if idx > 0 {
            rendered.push(' ');
        }
        match arg.as_str() {
            Some(text) => rendered.push_str(text),
            None => rendered.push_str(&format!("{arg:?}")),
        }
    }
    Ok(format!("{tag}: {rendered}"))
}
