//! End-to-end checks for the built-in kernel modules.

use std::cell::RefCell;
use std::rc::Rc;

use sos_engine::system::{module_program, ModuleInit};
use sos_engine::ProgramLibrary;
use sos_kernel::{BundleStatus, Kernel, KernelConfig};
use sos_kmod::{FilesModule, LoggerModule};
use sos_sandbox::{ScriptObject, Value};
use sos_vfs::{MemFs, SharedVfs, Vfs};

fn write_app(fs: &MemFs, name: &str, id: &str, privileges: &str) {
    fs.write(
        &format!("/kernel/apps/{name}/bundle.json"),
        format!(
            r#"{{ "id": "{id}", "name": "{name}", "entrypoint": "./index.ts", "privileges": [{privileges}] }}"#
        )
        .as_bytes(),
    )
    .expect("manifest");
    fs.write(
        &format!("/kernel/apps/{name}/index.ts"),
        format!("//# program: {name}/entry\n").as_bytes(),
    )
    .expect("entry");
}

fn boot(fs: Rc<MemFs>, library: ProgramLibrary) -> Rc<Kernel> {
    let config = KernelConfig::new(sos_engine::factory(library))
        .with_kernel_module(LoggerModule::new())
        .with_kernel_module(FilesModule::new());
    let kernel = Kernel::boot(fs as SharedVfs, config).expect("boot");
    kernel.start().expect("start");
    kernel
}

/// Entry program that links `dep` and calls `method(arg)` on it during
/// execute, storing the result.
fn call_through(
    dep: &str,
    method: &'static str,
    arg: &'static str,
    result: Rc<RefCell<Option<Value>>>,
) -> sos_engine::HostProgram {
    module_program(None, &[dep], move |_args| {
        let result = result.clone();
        let stored: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
        let stored_for_setter = stored.clone();
        Ok(ModuleInit {
            setters: vec![Rc::new(move |call| {
                *stored_for_setter.borrow_mut() = Some(call.argument(0));
                Ok(Value::Undefined)
            })],
            execute: Rc::new(move |_| {
                let linked = stored.borrow().clone().expect("dependency linked");
                let linked = linked.as_object().expect("object").clone();
                let function = linked.get(method)?;
                *result.borrow_mut() =
                    Some(function.call(Value::Undefined, &[Value::string(arg)])?);
                Ok(Value::Undefined)
            }),
        })
    })
}

#[test]
fn files_resolve_path_classifies_nodes() {
    let fs = Rc::new(MemFs::new());
    write_app(&fs, "tool", "aaaaaaaa-0000-4000-8000-000000000001", "\"PRIVILEGE_FILES\"");
    fs.write("/kernel/apps/tool/data.txt", b"payload").expect("data");

    let library = ProgramLibrary::new();
    let result: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    library.publish(
        "tool/entry",
        call_through(
            "files",
            "resolvePath",
            "/kernel/apps/tool/data.txt",
            result.clone(),
        ),
    );

    let kernel = boot(fs, library);
    let bundle = kernel.find_bundle_by_name("tool").expect("bundle");
    assert_eq!(bundle.status(), BundleStatus::Started);

    let path_obj = result.borrow().clone().expect("resolvePath result");
    let path_obj = path_obj.as_object().expect("object").clone();
    // The result came through the security proxy.
    assert!(matches!(
        result.borrow().clone().expect("value"),
        Value::ProxyOf(_)
    ));
    assert_eq!(
        path_obj.get("name").expect("name").as_str(),
        Some("data.txt")
    );
    assert_eq!(
        path_obj.get("path").expect("path").as_str(),
        Some("/kernel/apps/tool/data.txt")
    );
    // FileType::File
    assert_eq!(path_obj.get("type").expect("type").as_number(), Some(8.0));

    let exists = path_obj.get("exists").expect("exists fn");
    assert_eq!(
        exists.call(Value::Undefined, &[]).expect("call").as_bool(),
        Some(true)
    );
}

#[test]
fn files_module_is_denied_without_the_privilege() {
    let fs = Rc::new(MemFs::new());
    write_app(&fs, "intruder", "aaaaaaaa-0000-4000-8000-000000000002", "");

    let library = ProgramLibrary::new();
    let result: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    library.publish(
        "intruder/entry",
        call_through("files", "resolvePath", "/x", result.clone()),
    );

    let kernel = boot(fs, library);
    let bundle = kernel.find_bundle_by_name("intruder").expect("bundle");
    // Linking is open; the first property access was denied.
    assert_eq!(bundle.status(), BundleStatus::Failed);
    assert!(result.borrow().is_none());
}

#[test]
fn logger_is_usable_by_everyone() {
    let fs = Rc::new(MemFs::new());
    write_app(&fs, "chatty", "aaaaaaaa-0000-4000-8000-000000000003", "\"PRIVILEGE_LOGGER\"");

    let library = ProgramLibrary::new();
    let result: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    library.publish(
        "chatty/entry",
        module_program(None, &["logger"], move |_args| {
            let result = result.clone();
            let stored: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
            let stored_for_setter = stored.clone();
            Ok(ModuleInit {
                setters: vec![Rc::new(move |call| {
                    *stored_for_setter.borrow_mut() = Some(call.argument(0));
                    Ok(Value::Undefined)
                })],
                execute: Rc::new(move |_| {
                    let logger = stored.borrow().clone().expect("logger linked");
                    let logger = logger.as_object().expect("object").clone();
                    let log = logger.get("log")?;
                    let log = log.as_object().expect("log object").clone();
                    let info = log.get("info")?;
                    *result.borrow_mut() =
                        Some(info.call(Value::Undefined, &[Value::string("hello from chatty")])?);
                    Ok(Value::Undefined)
                }),
            })
        }),
    );

    let kernel = boot(fs, library);
    let bundle = kernel.find_bundle_by_name("chatty").expect("bundle");
    assert_eq!(bundle.status(), BundleStatus::Started);
}
