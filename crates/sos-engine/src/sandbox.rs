use std::collections::HashSet;
use std::rc::Rc;

use log::debug;

use sos_sandbox::{
    object_id, Compiled, NativeFunction, ObjectRef, Program, Sandbox, SandboxError, SandboxResult,
    ScriptObject, Value,
};

use crate::heap;
use crate::library::{parse_pragma, HostProgram, ProgramLibrary};

/// Compiled payload stored inside a [`Program`]. `body` is `None` for
/// declaration sources, which execute as no-ops.
struct ProgramPayload {
    body: Option<HostProgram>,
}

/// The bundled sandbox: one heap of host objects plus the shared program
/// library. Single-threaded by construction.
pub struct HostSandbox {
    name: String,
    global: ObjectRef,
    library: ProgramLibrary,
}

impl HostSandbox {
    pub fn new(name: &str, library: ProgramLibrary) -> Self {
        Self {
            name: name.to_string(),
            global: heap::new_object(),
            library,
        }
    }

    /// Bundle name this sandbox belongs to (diagnostics only).
    pub fn bundle_name(&self) -> &str {
        &self.name
    }
}

impl Sandbox for HostSandbox {
    fn global(&self) -> ObjectRef {
        self.global.clone()
    }

    fn new_object(&self) -> ObjectRef {
        heap::new_object()
    }

    fn new_array(&self, items: Vec<Value>) -> ObjectRef {
        heap::new_array(items)
    }

    fn new_function(&self, name: &str, function: NativeFunction) -> Value {
        heap::function_value(name, function)
    }

    fn compile(&self, filename: &str, source: &str) -> SandboxResult<Compiled> {
        if let Some(key) = parse_pragma(source) {
            let entry = self.library.lookup(key).ok_or_else(|| SandboxError::Compile {
                filename: filename.to_string(),
                message: format!("unknown host program '{key}'"),
            })?;
            debug!("Sandbox: compiled {filename} -> host program '{key}'");
            return Ok(Compiled {
                program: Program::new(
                    filename,
                    Rc::new(ProgramPayload {
                        body: Some(entry.program),
                    }),
                ),
                cacheable: entry.cacheable,
            });
        }
        if source.contains("System.register") {
            return Err(SandboxError::Compile {
                filename: filename.to_string(),
                message: "this engine does not parse script text; publish a host program and \
                          reference it with a '//# program:' pragma"
                    .to_string(),
            });
        }
        // Declaration sources erase to nothing.
        debug!("Sandbox: compiled {filename} -> declaration no-op");
        Ok(Compiled {
            program: Program::new(filename, Rc::new(ProgramPayload { body: None })),
            cacheable: true,
        })
    }

    fn execute(&self, program: &Program) -> SandboxResult<Value> {
        let payload = program
            .payload::<ProgramPayload>()
            .ok_or_else(|| SandboxError::Execution(format!(
                "program '{}' was not compiled by this engine",
                program.name()
            )))?;
        match &payload.body {
            Some(body) => body(self),
            None => Ok(Value::Undefined),
        }
    }

    fn deep_freeze(&self, value: &Value) -> SandboxResult<()> {
        let mut visited = HashSet::new();
        freeze_graph(value, &mut visited)
    }
}

fn freeze_graph(value: &Value, visited: &mut HashSet<usize>) -> SandboxResult<()> {
    let Some(obj) = value.as_object() else {
        return Ok(());
    };
    if !visited.insert(object_id(obj)) {
        return Ok(());
    }
    obj.freeze();
    for key in obj.keys() {
        if let Some(descriptor) = obj.property_descriptor(&key)? {
            if let Some(nested) = descriptor.value {
                freeze_graph(&nested, visited)?;
            }
        }
    }
    if let Some(elements) = obj.elements() {
        for element in elements {
            freeze_graph(&element, visited)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standalone;

    #[test]
    fn pragma_selects_published_program() {
        let library = ProgramLibrary::new();
        library.publish(
            "demo/touch",
            Rc::new(|sandbox: &dyn Sandbox| {
                sandbox.global().set("touched", Value::Bool(true))?;
                Ok(Value::Undefined)
            }),
        );
        let sandbox = HostSandbox::new("demo", library);
        let compiled = sandbox
            .compile("demo:/index.ts", "//# program: demo/touch\n")
            .expect("compile");
        assert!(compiled.cacheable);
        sandbox.execute(&compiled.program).expect("execute");
        assert_eq!(
            sandbox.global().get("touched").expect("get").as_bool(),
            Some(true)
        );
    }

    #[test]
    fn unknown_program_is_a_compile_error() {
        let sandbox = HostSandbox::new("demo", ProgramLibrary::new());
        let err = sandbox
            .compile("demo:/index.ts", "//# program: missing\n")
            .expect_err("must fail");
        assert!(matches!(err, SandboxError::Compile { .. }));
    }

    #[test]
    fn declaration_sources_execute_as_noops() {
        let sandbox = standalone("demo");
        let compiled = sandbox
            .compile("kernel:/logger.d.ts", "declare function info(msg: string): void;\n")
            .expect("compile");
        let out = sandbox.execute(&compiled.program).expect("execute");
        assert!(!out.is_defined());
    }

    #[test]
    fn unparsed_register_calls_are_rejected() {
        let sandbox = standalone("demo");
        let err = sandbox
            .compile("demo:/index.ts", "System.register([], function () {});")
            .expect_err("must fail");
        assert!(matches!(err, SandboxError::Compile { .. }));
    }

    #[test]
    fn deep_freeze_handles_cycles() {
        let sandbox = standalone("demo");
        let a = sandbox.new_object();
        let b = sandbox.new_object();
        a.set("b", Value::Obj(b.clone())).expect("set");
        b.set("a", Value::Obj(a.clone())).expect("set");
        sandbox.deep_freeze(&Value::Obj(a.clone())).expect("freeze");
        assert!(a.is_frozen());
        assert!(b.is_frozen());
    }

    #[test]
    fn non_cacheable_programs_report_it() {
        let library = ProgramLibrary::new();
        library.publish_non_cacheable("volatile", Rc::new(|_| Ok(Value::Undefined)));
        let sandbox = HostSandbox::new("demo", library);
        let compiled = sandbox
            .compile("demo:/v.ts", "//# program: volatile\n")
            .expect("compile");
        assert!(!compiled.cacheable);
    }
}
