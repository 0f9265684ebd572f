//! Program library: the table of host programs scripts can name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sos_sandbox::{Sandbox, SandboxResult, Value};

/// A host program: the compiled form of a script in this engine. Runs
/// against the executing bundle's sandbox.
pub type HostProgram = Rc<dyn Fn(&dyn Sandbox) -> SandboxResult<Value>>;

/// Pragma selecting a host program from script source.
pub const PROGRAM_PRAGMA: &str = "//# program:";

/// First `//# program:` key found in `source`, if any.
pub fn parse_pragma(source: &str) -> Option<&str> {
    source.lines().find_map(|line| {
        line.trim()
            .strip_prefix(PROGRAM_PRAGMA)
            .map(str::trim)
            .filter(|key| !key.is_empty())
    })
}

#[derive(Clone)]
pub(crate) struct LibraryEntry {
    pub program: HostProgram,
    pub cacheable: bool,
}

/// Shared, process-wide table of host programs, cloned into every sandbox
/// the factory produces.
#[derive(Clone, Default)]
pub struct ProgramLibrary {
    entries: Rc<RefCell<HashMap<String, LibraryEntry>>>,
}

impl ProgramLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, key: &str, program: HostProgram) {
        self.entries.borrow_mut().insert(
            key.to_string(),
            LibraryEntry {
                program,
                cacheable: true,
            },
        );
    }

    /// Publishes a program whose compilations must never enter the script
    /// cache.
    pub fn publish_non_cacheable(&self, key: &str, program: HostProgram) {
        self.entries.borrow_mut().insert(
            key.to_string(),
            LibraryEntry {
                program,
                cacheable: false,
            },
        );
    }

    pub(crate) fn lookup(&self, key: &str) -> Option<LibraryEntry> {
        self.entries.borrow().get(key).cloned()
    }
}
