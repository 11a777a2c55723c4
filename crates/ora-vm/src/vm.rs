//! The embedder-facing entry point: load packages, register native
//! modules, and run an entry function to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ora_native::NativeFunctionRegistry;
use rustc_hash::FxHashMap;

use crate::bridge::NativeBridge;
use crate::error::VmFault;
use crate::heap::{Handle, Heap, HeapOptions};
use crate::interpreter::{self, ExecContext, Outcome};
use crate::name::Name;
use crate::package::{loader, Function, Package};
use crate::tagged::Tagged;

/// Sizing and search-path configuration for a [`Vm`].
///
/// Everything here is a constructor argument rather than read from the
/// environment or a config file — an embedded VM has no ambient filesystem
/// convention of its own to read one from, and the host almost always
/// already knows these values (they came from its own configuration layer).
#[derive(Clone, Debug)]
pub struct VmOptions {
    /// New- and old-generation sizing for the managed heap.
    pub heap: HeapOptions,
    /// Directories searched for a `{name}.orapkg` file when resolving a
    /// dependency that isn't already loaded.
    pub search_paths: Vec<PathBuf>,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self { heap: HeapOptions::default(), search_paths: Vec::new() }
    }
}

/// A running instance of the engine: one heap, one native bridge, and the
/// set of packages linked into it so far.
pub struct Vm {
    heap: Heap,
    bridge: Arc<NativeBridge>,
    search_paths: Vec<PathBuf>,
    packages: FxHashMap<Name, Arc<Package>>,
}

impl Vm {
    /// Construct a VM with the given sizing and a registry of native
    /// modules the embedder has already populated.
    pub fn new(options: VmOptions, registry: NativeFunctionRegistry) -> Self {
        Self {
            heap: Heap::new(options.heap),
            bridge: Arc::new(NativeBridge::new(registry)),
            search_paths: options.search_paths,
            packages: FxHashMap::default(),
        }
    }

    /// Load `entry_path` and every (transitive) dependency it declares,
    /// registering each with the native bridge as a cross-package call
    /// target, and return the entry package.
    pub fn load_package(&mut self, entry_path: &Path) -> Result<Arc<Package>, VmFault> {
        let (entry, all) = loader::load_all(entry_path, &self.search_paths)?;
        for pkg in all {
            self.bridge.register_package(pkg.clone());
            self.packages.insert(pkg.name.clone(), pkg);
        }
        self.bridge.register_package(entry.clone());
        self.packages.insert(entry.name.clone(), entry.clone());
        Ok(entry)
    }

    /// Look up an already-loaded package by name.
    pub fn find_package(&self, name: &Name) -> Option<&Arc<Package>> {
        self.packages.get(name)
    }

    /// Run `package`'s declared entry function with no arguments, returning
    /// its raw result word or the fault that aborted the run.
    ///
    /// Exceptions that escape every `PUSHTRY` in the entry frame become
    /// [`VmFault::Uncaught`], carrying the trace accumulated while
    /// unwinding.
    pub fn run_entry(&mut self, package: &Arc<Package>) -> Result<u64, VmFault> {
        let entry_index = package
            .entry_function
            .ok_or_else(|| VmFault::AssertionFailed(format!("package {} declares no entry function", package.name)))?;
        let function = package.functions[entry_index].clone();
        self.call(package, &function, &[])
    }

    /// Run an arbitrary function by name within `package`, with raw
    /// register-encoded arguments (e.g. built via [`crate::tagged::Tagged`]
    /// for `Object`-typed parameters).
    pub fn call_function(&mut self, package: &Arc<Package>, name: &Name, args: &[u64]) -> Result<u64, VmFault> {
        let function = package.find_function(name).cloned().ok_or_else(|| {
            VmFault::AssertionFailed(format!("no function named {name} in package {}", package.name))
        })?;
        self.call(package, &function, args)
    }

    fn call(&mut self, package: &Arc<Package>, function: &Arc<Function>, args: &[u64]) -> Result<u64, VmFault> {
        let mut ctx = ExecContext { heap: &mut self.heap, bridge: &*self.bridge };
        match interpreter::run(&mut ctx, package, function, args)? {
            Outcome::Return(value) => Ok(value),
            Outcome::Thrown(exception, trace) => Err(VmFault::Uncaught { exception, trace }),
        }
    }

    /// Open a new handle scope: [`Handle`]s created before this call are
    /// unaffected by [`pop_scope`](Self::pop_scope), letting a host function
    /// hold roots across several VM calls without pinning every
    /// intermediate result for the lifetime of the whole program.
    pub fn push_scope(&mut self) {
        self.heap.handles.push_scope();
    }

    /// Close the innermost handle scope, discarding every handle created
    /// since the matching [`push_scope`](Self::push_scope) except `keep`,
    /// which is re-homed into the parent scope and returned as a handle
    /// valid there.
    pub fn pop_scope(&mut self, keep: Option<Tagged>) -> Option<Handle> {
        self.heap.handles.pop_scope(keep)
    }

    /// Pin a value behind a handle valid for the lifetime of the current
    /// scope.
    pub fn new_handle(&mut self, value: Tagged) -> Handle {
        self.heap.handles.new_handle(value)
    }

    /// Dereference a scoped handle.
    pub fn handle_value(&self, handle: Handle) -> Tagged {
        self.heap.handles.get(handle)
    }

    /// Run a minor collection immediately — exposed for tests and hosts that
    /// want deterministic GC timing rather than waiting for the next
    /// allocation failure.
    pub fn collect_minor(&mut self) -> crate::gc::CollectionStats {
        crate::gc::minor_collect(&mut self.heap)
    }

    /// Run a full (minor + major) collection immediately.
    pub fn collect_major(&mut self) -> crate::gc::CollectionStats {
        crate::gc::minor_collect(&mut self.heap);
        crate::gc::major_collect(&mut self.heap)
    }

    /// Fraction of the new-generation space in use.
    pub fn young_occupancy(&self) -> f64 {
        self.heap.young_occupancy()
    }

    /// Fraction of the old-generation space in use.
    pub fn old_occupancy(&self) -> f64 {
        self.heap.old_occupancy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_vm_has_no_packages() {
        let vm = Vm::new(VmOptions::default(), NativeFunctionRegistry::new());
        assert!(vm.find_package(&Name::parse("nothing")).is_none());
    }
}
