//! Specifier resolution: bare, relative, and absolute specifiers probed
//! against a bundle's composed filesystem in a fixed candidate order.

use std::rc::Rc;

use log::debug;

use sos_vfs::{exists, path};

use crate::bundle::Bundle;
use crate::kernel::{Kernel, KERNEL_TYPES_PATH};
use crate::util::is_javascript;
use crate::KernelResult;

/// Where a script is read from: the path plus the bundle whose filesystem
/// backs it. Kernel-mounted virtual files resolve to the kernel bundle's
/// modules even when requested from an app.
#[derive(Clone)]
pub struct ResolvedScriptPath {
    pub path: String,
    pub loader: Rc<Bundle>,
}

/// Probe suffixes tried against an extensionless candidate, in contract
/// order: earlier hits win.
const TS_CANDIDATES: &[&str] = &[
    ".ts",
    "/index.ts",
    ".d.ts",
    "/index.d.ts",
    ".ts.gz",
    ".ts.bz2",
    "/index.d.ts.gz",
    "/index.d.ts.bz2",
];

/// Additional candidates for privileged bundles only.
const JS_CANDIDATES: &[&str] = &[
    ".js",
    "/index.js",
    ".js.gz",
    ".js.bz2",
    "/index.js.gz",
    "/index.js.bz2",
];

fn is_bare(specifier: &str) -> bool {
    !specifier.starts_with("./") && !specifier.starts_with("../") && !specifier.starts_with('/')
}

impl Kernel {
    /// Resolves `specifier` for `bundle`. Never fails the probe itself: if
    /// nothing matches, the canonicalized path is returned unchanged and
    /// the downstream load reports the missing script.
    pub fn resolve_script_path(
        &self,
        bundle: &Rc<Bundle>,
        specifier: &str,
    ) -> KernelResult<ResolvedScriptPath> {
        let filesystem = bundle.filesystem();
        let bare = is_bare(specifier);

        // Bare specifiers are assumed to name an exported kernel module.
        let filename = if bare {
            path::join(KERNEL_TYPES_PATH, specifier)
        } else {
            specifier.to_string()
        };

        let parent = match bundle.peek_loader_stack() {
            Some(module_id) => bundle
                .find_module_by_id(&module_id)
                .map(|module| module.origin().path().to_string())
                .unwrap_or_else(|| "/".to_string()),
            None => "/".to_string(),
        };

        let canonical = path::join(&parent, &path::clean(&filename));

        let permitted =
            |candidate: &str| bundle.privileged() || !is_javascript(candidate);

        if !path::ext(&canonical).is_empty()
            && permitted(&canonical)
            && exists(filesystem.as_ref(), &canonical)
        {
            return Ok(self.resolved(bundle, canonical));
        }

        for suffix in TS_CANDIDATES {
            let candidate = format!("{canonical}{suffix}");
            if exists(filesystem.as_ref(), &candidate) {
                return Ok(self.resolved(bundle, candidate));
            }
        }
        if bundle.privileged() {
            for suffix in JS_CANDIDATES {
                let candidate = format!("{canonical}{suffix}");
                if exists(filesystem.as_ref(), &candidate) {
                    return Ok(self.resolved(bundle, candidate));
                }
            }
        }

        // Last resort for bare specifiers: a declaration override next to
        // the importing module. Deliberately after the kernel-types probes
        // so local files cannot shadow kernel modules.
        if bare {
            let local = path::join(&parent, &format!("{specifier}.d.ts"));
            if exists(filesystem.as_ref(), &local) {
                return Ok(self.resolved(bundle, local));
            }
        }

        debug!(
            "Kernel: no candidate matched for '{}' in bundle '{}', keeping {}",
            specifier,
            bundle.name(),
            canonical
        );
        Ok(self.resolved(bundle, canonical))
    }

    fn resolved(&self, bundle: &Rc<Bundle>, path: String) -> ResolvedScriptPath {
        ResolvedScriptPath {
            path,
            loader: bundle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::kernel::{Kernel, KernelConfig};
    use crate::module::Module;
    use crate::origin::Origin;
    use sos_vfs::{MemFs, SharedVfs, Vfs};
    use std::rc::Rc;

    fn kernel_with(files: &[&str]) -> (Rc<Kernel>, Rc<MemFs>) {
        let fs = Rc::new(MemFs::new());
        for file in files {
            fs.write(file, b"declare const probe: number;\n")
                .expect("write");
        }
        let kernel = Kernel::boot(
            fs.clone() as SharedVfs,
            KernelConfig::new(sos_engine::empty_factory()),
        )
        .expect("boot");
        (kernel, fs)
    }

    fn resolve(kernel: &Rc<Kernel>, specifier: &str) -> String {
        kernel
            .resolve_script_path(kernel.bundle(), specifier)
            .expect("resolve")
            .path
    }

    #[test]
    fn plain_sources_win_over_declarations_and_indexes() {
        let (kernel, fs) = kernel_with(&[
            "/kernel/@types/foo.ts",
            "/kernel/@types/foo/index.ts",
            "/kernel/@types/foo.d.ts",
        ]);
        assert_eq!(resolve(&kernel, "foo"), "/kernel/@types/foo.ts");
        fs.remove("/kernel/@types/foo.ts").expect("remove");
        assert_eq!(resolve(&kernel, "foo"), "/kernel/@types/foo/index.ts");
        fs.remove("/kernel/@types/foo/index.ts").expect("remove");
        assert_eq!(resolve(&kernel, "foo"), "/kernel/@types/foo.d.ts");
    }

    #[test]
    fn compressed_candidates_come_after_plain_ones() {
        let (kernel, fs) = kernel_with(&[
            "/kernel/@types/pack.ts.gz",
            "/kernel/@types/pack.d.ts",
        ]);
        assert_eq!(resolve(&kernel, "pack"), "/kernel/@types/pack.d.ts");
        fs.remove("/kernel/@types/pack.d.ts").expect("remove");
        assert_eq!(resolve(&kernel, "pack"), "/kernel/@types/pack.ts.gz");
    }

    #[test]
    fn gzip_outranks_bzip2() {
        let (kernel, fs) = kernel_with(&[
            "/kernel/@types/pack.ts.gz",
            "/kernel/@types/pack.ts.bz2",
        ]);
        assert_eq!(resolve(&kernel, "pack"), "/kernel/@types/pack.ts.gz");
        fs.remove("/kernel/@types/pack.ts.gz").expect("remove");
        assert_eq!(resolve(&kernel, "pack"), "/kernel/@types/pack.ts.bz2");
    }

    #[test]
    fn existing_extensions_short_circuit_the_probe() {
        let (kernel, _fs) = kernel_with(&["/lib/util.d.ts"]);
        assert_eq!(resolve(&kernel, "/lib/util.d.ts"), "/lib/util.d.ts");
    }

    #[test]
    fn relative_specifiers_resolve_against_the_loading_module() {
        let (kernel, fs) = kernel_with(&["/apps/x/mod.ts", "/apps/x/sibling.ts"]);
        let bundle = kernel.bundle().clone();
        let module = Module::new(
            "m-1",
            "mod",
            Origin::new("/apps/x/mod.ts"),
            &bundle,
        )
        .expect("module");
        bundle.add_module(&module);
        bundle.push_loader_stack("m-1");

        assert_eq!(resolve(&kernel, "./sibling"), "/apps/x/sibling.ts");
        assert_eq!(resolve(&kernel, "../x/sibling"), "/apps/x/sibling.ts");

        // A bare specifier from the same module still goes to the kernel
        // types path first.
        fs.write("/kernel/@types/sibling.d.ts", b"declare const s: number;\n")
            .expect("write");
        assert_eq!(resolve(&kernel, "sibling"), "/kernel/@types/sibling.d.ts");
        bundle.pop_loader_stack();
    }

    #[test]
    fn unmatched_specifiers_keep_the_canonical_path() {
        let (kernel, _fs) = kernel_with(&[]);
        assert_eq!(resolve(&kernel, "ghost"), "/kernel/@types/ghost");
        assert_eq!(resolve(&kernel, "./ghost"), "/ghost");
    }
}
