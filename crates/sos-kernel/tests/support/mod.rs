//! Shared fixtures: an in-memory kernel filesystem, a program library,
//! and a counting transpiler, wired into a bootable kernel.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use sos_engine::ProgramLibrary;
use sos_kernel::{Kernel, KernelConfig, KernelResult, Transpiler};
use sos_vfs::{MemFs, SharedVfs, Vfs};

pub struct CountingTranspiler {
    calls: Rc<Cell<usize>>,
}

impl Transpiler for CountingTranspiler {
    fn version(&self) -> &str {
        "counting-1"
    }

    fn transpile(&self, source: &str) -> Result<String, String> {
        self.calls.set(self.calls.get() + 1);
        Ok(source.to_string())
    }
}

pub struct TestWorld {
    pub fs: Rc<MemFs>,
    pub library: ProgramLibrary,
    pub transpile_calls: Rc<Cell<usize>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            fs: Rc::new(MemFs::new()),
            library: ProgramLibrary::new(),
            transpile_calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn write(&self, path: &str, content: &str) {
        self.fs.write(path, content.as_bytes()).expect("write fixture");
    }

    /// Writes an app skeleton: `bundle.json` plus an entry script whose
    /// body is the library program named `<app>/entry`.
    pub fn app(&self, name: &str, id: &str, privileges: &[&str]) {
        let manifest = format!(
            r#"{{ "id": "{id}", "name": "{name}", "entrypoint": "./index.ts", "privileges": [{}] }}"#,
            privileges
                .iter()
                .map(|p| format!("\"{p}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.write(&format!("/kernel/apps/{name}/bundle.json"), &manifest);
        self.write(
            &format!("/kernel/apps/{name}/index.ts"),
            &program_source(&format!("{name}/entry")),
        );
    }

    pub fn config(&self) -> KernelConfig {
        KernelConfig::new(sos_engine::factory(self.library.clone())).with_transpiler(Rc::new(
            CountingTranspiler {
                calls: self.transpile_calls.clone(),
            },
        ))
    }

    pub fn boot(&self) -> KernelResult<Rc<Kernel>> {
        Kernel::boot(self.fs.clone() as SharedVfs, self.config())
    }

    pub fn boot_with(&self, config: KernelConfig) -> KernelResult<Rc<Kernel>> {
        Kernel::boot(self.fs.clone() as SharedVfs, config)
    }
}

/// Script text selecting a published host program.
pub fn program_source(key: &str) -> String {
    format!("//# program: {key}\n")
}
