//! Bundled sandbox implementation.
//!
//! The concrete script engine is a replaceable collaborator of the kernel;
//! this crate ships the deterministic default. Programs are host closures
//! published in a [`ProgramLibrary`] and selected by a `//# program:`
//! pragma in the script source. Declaration sources (the output of
//! transpiling `.d.ts` files) compile to no-op programs. Anything the
//! library cannot name is a compile error — this engine does not parse
//! script text.

pub mod heap;
mod library;
mod sandbox;
pub mod system;

pub use library::{parse_pragma, HostProgram, ProgramLibrary, PROGRAM_PRAGMA};
pub use sandbox::HostSandbox;

use std::rc::Rc;

use sos_sandbox::{Sandbox, SandboxFactory, SharedSandbox};

/// Sandbox factory handing every bundle its own [`HostSandbox`] over the
/// shared program library.
pub fn factory(library: ProgramLibrary) -> SandboxFactory {
    Rc::new(move |bundle_name: &str| {
        Rc::new(HostSandbox::new(bundle_name, library.clone())) as SharedSandbox
    })
}

/// Convenience factory for sandboxes with an empty library (declaration
/// sources only).
pub fn empty_factory() -> SandboxFactory {
    factory(ProgramLibrary::new())
}

/// A bare sandbox for unit tests and embedders that drive the engine
/// directly.
pub fn standalone(name: &str) -> Rc<dyn Sandbox> {
    Rc::new(HostSandbox::new(name, ProgramLibrary::new()))
}
