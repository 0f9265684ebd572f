use std::rc::{Rc, Weak};

use sos_kernel::{Bundle, KernelModule, KernelResult, SecurityInterceptor};
use sos_sandbox::{FunctionCall, ObjectCreator, SandboxError, SandboxResult, Value};
use sos_vfs::{is_capability_file, path, Vfs};

const FILES_MODULE_ID: &str = "0c97cffa-f27f-49f9-95cf-5472a98253a9";

/// Filesystem access for bundles holding `PRIVILEGE_FILES`. Paths resolve
/// against the composed view of the bundle the module was bound into, so
/// nothing outside that view can be named.
pub struct FilesModule;

impl FilesModule {
    pub fn new() -> Rc<dyn KernelModule> {
        Rc::new(FilesModule)
    }
}

/// Classification of a resolved path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileType {
    Unknown = 1,
    Kernel = 2,
    Directory = 4,
    File = 8,
}

impl KernelModule for FilesModule {
    fn id(&self) -> &str {
        FILES_MODULE_ID
    }

    fn name(&self) -> &str {
        "files"
    }

    fn api_definition_file(&self) -> &str {
        "/kernel/@types/files"
    }

    fn security_interceptor(&self) -> Option<SecurityInterceptor> {
        // Linking is open; property access is gated by the caller's
        // grants at the proxy traps.
        Some(Rc::new(|_caller, _property| true))
    }

    fn bind(&self, bundle: &Rc<Bundle>, builder: &mut ObjectCreator<'_>) -> KernelResult<()> {
        let weak = Rc::downgrade(bundle);
        builder.define_function(
            "resolvePath",
            Rc::new(move |call: FunctionCall| {
                let requested = call
                    .argument(0)
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SandboxError::type_error("resolvePath expects a string"))?;
                resolve_path(&weak, &requested)
            }),
        );
        Ok(())
    }
}

fn bundle_of(weak: &Weak<Bundle>) -> SandboxResult<Rc<Bundle>> {
    weak.upgrade()
        .ok_or_else(|| SandboxError::Execution("bundle is gone".to_string()))
}

fn classify(bundle: &Rc<Bundle>, target: &str) -> FileType {
    let filesystem = bundle.filesystem();
    match filesystem.stat(target) {
        Ok(meta) if meta.is_dir() => FileType::Directory,
        Ok(_) if is_capability_file(filesystem.as_ref(), target) => FileType::Kernel,
        Ok(_) => FileType::File,
        Err(_) => FileType::Unknown,
    }
}

/// Builds the path object handed back to scripts: constants describing
/// the node plus `exists`/`mkdir`/`resolve` operations.
fn resolve_path(weak: &Weak<Bundle>, requested: &str) -> SandboxResult<Value> {
    let bundle = bundle_of(weak)?;
    let target = path::clean(requested);
    let file_type = classify(&bundle, &target);

    let sandbox = bundle
        .sandbox()
        .map_err(|err| SandboxError::Execution(err.to_string()))?;
    let mut creator = ObjectCreator::new(sandbox.as_ref());
    creator
        .define_constant("name", path::base(&target))
        .define_constant("path", target.as_str())
        .define_constant("type", file_type as i64);

    let exists_weak = weak.clone();
    let exists_target = target.clone();
    creator.define_function(
        "exists",
        Rc::new(move |_call: FunctionCall| {
            let bundle = bundle_of(&exists_weak)?;
            Ok(Value::Bool(sos_vfs::exists(
                bundle.filesystem().as_ref(),
                &exists_target,
            )))
        }),
    );

    let mkdir_weak = weak.clone();
    let mkdir_target = target.clone();
    creator.define_function(
        "mkdir",
        Rc::new(move |call: FunctionCall| {
            let recursive = call
                .argument(0)
                .as_bool()
                .ok_or_else(|| SandboxError::type_error("mkdir expects a boolean"))?;
            let bundle = bundle_of(&mkdir_weak)?;
            let filesystem = bundle.filesystem();
            if !recursive {
                let parent = path::dir(&mkdir_target);
                if !sos_vfs::exists(filesystem.as_ref(), &parent) {
                    return Err(SandboxError::Execution(format!(
                        "parent directory does not exist: {parent}"
                    )));
                }
            }
            filesystem
                .mkdir_all(&mkdir_target)
                .map_err(|err| SandboxError::Execution(err.to_string()))?;
            Ok(Value::Undefined)
        }),
    );

    let resolve_weak = weak.clone();
    let resolve_target = target.clone();
    creator.define_function(
        "resolve",
        Rc::new(move |call: FunctionCall| {
            let child = call
                .argument(0)
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| SandboxError::type_error("resolve expects a string"))?;
            resolve_path(&resolve_weak, &path::join(&resolve_target, &child))
        }),
    );

    creator.build().map(Value::Obj)
}
