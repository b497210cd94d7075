//! Cross-file route group resolution.
//!
//! After pass 1 every file's groups and include edges are collected into a
//! frozen [`GroupIndex`]. Include targets are resolved by module name, the
//! child → parent graph is walked once from its roots (Kahn order, with at
//! most one parent per child), and every group gets its effective prefix.
//! Groups the walk never reaches sit on or below a cycle; they keep only
//! their own prefix and are marked [`GroupStatus::Cyclic`].

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use super::facts::{
    FileFacts, GroupInclude, GroupKey, GroupStatus, IncludeTarget, RouteFact, RouteGroupFact,
};

/// Join path fragments with single separators.
///
/// Runs of `/` collapse, the result always starts with `/`, and an empty
/// result is `/`.
pub fn join_paths<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !joined.ends_with('/') && !part.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(part);
    }

    let mut out = String::with_capacity(joined.len() + 1);
    let mut previous_slash = false;
    for c in joined.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    out
}

/// Whether `candidate` names the module `wanted`, allowing the host's module
/// names to carry extra leading packages (`src.app.routers` for `app.routers`).
pub(crate) fn module_matches(candidate: &str, wanted: &str) -> bool {
    !wanted.is_empty()
        && (candidate == wanted
            || candidate
                .strip_suffix(wanted)
                .map(|head| head.ends_with('.'))
                .unwrap_or(false))
}

/// Resolve a relative import (`..routers`) against the importing module.
pub(crate) fn absolute_module(importer: Option<&str>, module: &str) -> Option<String> {
    let dots = module.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return Some(module.to_string());
    }
    let rest = &module[dots..];
    let mut package: Vec<&str> = importer?.split('.').collect();
    if package.len() < dots {
        return None;
    }
    package.truncate(package.len() - dots);
    if !rest.is_empty() {
        package.push(rest);
    }
    Some(package.join("."))
}

/// Frozen view of every group in an analyzed unit.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    groups: Vec<RouteGroupFact>,
    by_key: HashMap<GroupKey, usize>,
    unresolved: Vec<GroupInclude>,
}

impl GroupIndex {
    /// Build the index from pass-1 facts and resolve every prefix.
    pub fn build(files: &[FileFacts]) -> Self {
        let modules: HashMap<&str, &str> = files
            .iter()
            .filter_map(|f| f.module.as_deref().map(|m| (f.path.as_str(), m)))
            .collect();

        let mut groups: Vec<RouteGroupFact> =
            files.iter().flat_map(|f| f.groups.iter().cloned()).collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        let by_key: HashMap<GroupKey, usize> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.key.clone(), i))
            .collect();

        let mut index = Self {
            groups,
            by_key,
            unresolved: Vec::new(),
        };

        let mut includes: Vec<&GroupInclude> = files.iter().flat_map(|f| &f.includes).collect();
        includes.sort_by(|a, b| (&a.file, a.span).cmp(&(&b.file, b.span)));

        // child -> (parent, include)
        let mut parent_of: Vec<Option<(usize, &GroupInclude)>> = vec![None; index.groups.len()];
        for include in includes {
            let parent = index.by_key.get(&include.parent).copied();
            let child = index.resolve_target(include, &modules);
            let (Some(parent), Some(child)) = (parent, child) else {
                warn!(
                    file = %include.file,
                    line = include.span.start_line,
                    method = %include.method,
                    "unresolved group include"
                );
                index.unresolved.push(include.clone());
                continue;
            };
            if parent_of[child].is_some() {
                debug!(
                    group = %index.groups[child].key,
                    "group already included elsewhere; keeping first parent"
                );
                continue;
            }
            parent_of[child] = Some((parent, include));
        }

        index.resolve_prefixes(&parent_of);
        index
    }

    fn resolve_target(&self, include: &GroupInclude, modules: &HashMap<&str, &str>) -> Option<usize> {
        match &include.target {
            IncludeTarget::Local { key } => self.by_key.get(key).copied(),
            IncludeTarget::Imported { module, name } => {
                let named: Vec<usize> = (0..self.groups.len())
                    .filter(|&i| self.groups[i].key.name == *name)
                    .filter(|&i| self.groups[i].key != include.parent)
                    .collect();
                let in_module = |wanted: &str| -> Vec<usize> {
                    named
                        .iter()
                        .copied()
                        .filter(|&i| {
                            modules
                                .get(self.groups[i].key.file.as_str())
                                .map(|m| module_matches(m, wanted))
                                .unwrap_or(false)
                        })
                        .collect()
                };

                let importer = modules.get(include.file.as_str()).copied();
                let mut candidates = absolute_module(importer, module)
                    .map(|m| in_module(&m))
                    .unwrap_or_default();
                if candidates.is_empty() {
                    candidates = in_module(module.trim_start_matches('.'));
                }
                if candidates.is_empty() && named.len() == 1 {
                    candidates = named;
                }
                // The last binding of a name is what an import sees.
                candidates.into_iter().max_by_key(|&i| {
                    let key = &self.groups[i].key;
                    (key.file.clone(), key.offset)
                })
            }
            IncludeTarget::Unknown { .. } => None,
        }
    }

    fn resolve_prefixes(&mut self, parent_of: &[Option<(usize, &GroupInclude)>]) {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.groups.len()];
        let mut queue = VecDeque::new();
        for (child, edge) in parent_of.iter().enumerate() {
            match edge {
                Some((parent, _)) => children[*parent].push(child),
                None => queue.push_back(child),
            }
        }

        let mut reached = vec![false; self.groups.len()];
        while let Some(i) = queue.pop_front() {
            reached[i] = true;
            let declared = self.groups[i].declared_prefix.clone();
            match parent_of[i] {
                None => {
                    self.groups[i].status = GroupStatus::Root;
                    self.groups[i].effective_prefix =
                        Some(join_paths(declared.as_deref()));
                }
                Some((parent, include)) => {
                    let base = self.groups[parent]
                        .effective_prefix
                        .clone()
                        .unwrap_or_default();
                    let mount = include.prefix.as_deref();
                    let own = if include.replaces_prefix && mount.is_some() {
                        join_paths([base.as_str()].into_iter().chain(mount))
                    } else {
                        join_paths(
                            [base.as_str()]
                                .into_iter()
                                .chain(mount)
                                .chain(declared.as_deref()),
                        )
                    };
                    let parent_key = self.groups[parent].key.clone();
                    let group = &mut self.groups[i];
                    group.status = GroupStatus::Linked;
                    group.parent = Some(parent_key);
                    group.mount_prefix = include.prefix.clone();
                    group.effective_prefix = Some(own);
                }
            }
            queue.extend(children[i].iter().copied());
        }

        for (i, seen) in reached.iter().enumerate() {
            if *seen {
                continue;
            }
            let group = &mut self.groups[i];
            warn!(group = %group.key, "group is part of an include cycle");
            group.status = GroupStatus::Cyclic;
            group.effective_prefix = Some(join_paths(group.declared_prefix.as_deref()));
        }
    }

    pub fn group(&self, key: &GroupKey) -> Option<&RouteGroupFact> {
        self.by_key.get(key).map(|&i| &self.groups[i])
    }

    /// Route path joined with its group's effective prefix.
    pub fn effective_path(&self, route: &RouteFact) -> Option<String> {
        let raw = route.raw_path.as_deref()?;
        let prefix = route
            .group
            .as_ref()
            .and_then(|key| self.group(key))
            .and_then(|g| g.effective_prefix.as_deref())
            .unwrap_or("");
        Some(join_paths([prefix, raw]))
    }

    pub fn groups(&self) -> &[RouteGroupFact] {
        &self.groups
    }

    pub fn unresolved(&self) -> &[GroupInclude] {
        &self.unresolved
    }

    pub fn into_parts(self) -> (Vec<RouteGroupFact>, Vec<GroupInclude>) {
        (self.groups, self.unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::facts::{Framework, GroupKind, Span};

    fn key(file: &str, name: &str, offset: usize) -> GroupKey {
        GroupKey {
            file: file.to_string(),
            name: name.to_string(),
            offset,
        }
    }

    fn group(key: GroupKey, prefix: Option<&str>) -> RouteGroupFact {
        RouteGroupFact {
            key,
            span: Span::default(),
            framework: Framework::FastApi,
            kind: GroupKind::Router,
            declared_prefix: prefix.map(str::to_string),
            parent: None,
            mount_prefix: None,
            effective_prefix: None,
            status: GroupStatus::Root,
            members: Vec::new(),
        }
    }

    fn include(parent: &GroupKey, target: IncludeTarget, prefix: Option<&str>) -> GroupInclude {
        GroupInclude {
            file: parent.file.clone(),
            span: Span {
                start_byte: parent.offset + 100,
                ..Span::default()
            },
            method: "include_router".to_string(),
            parent: parent.clone(),
            target,
            prefix: prefix.map(str::to_string),
            replaces_prefix: false,
        }
    }

    fn file(path: &str, module: &str) -> FileFacts {
        let mut facts = FileFacts::empty(path, "python");
        facts.module = Some(module.to_string());
        facts
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths(["/api", "/v1", "/items"]), "/api/v1/items");
        assert_eq!(join_paths(["/api/", "/items"]), "/api/items");
        assert_eq!(join_paths(["api", "items"]), "/api/items");
        assert_eq!(join_paths(["", ""]), "/");
        assert_eq!(join_paths(["/", "/"]), "/");
        assert_eq!(join_paths(["/users", "/"]), "/users/");
        assert_eq!(join_paths(["//a//", "b"]), "/a/b");
    }

    #[test]
    fn test_relative_module_resolution() {
        assert_eq!(absolute_module(Some("app.main"), ".routers").as_deref(), Some("app.routers"));
        assert_eq!(absolute_module(Some("app.api.v1"), "..admin").as_deref(), Some("app.admin"));
        assert_eq!(absolute_module(Some("main"), "..x"), None);
        assert_eq!(absolute_module(None, "app.x").as_deref(), Some("app.x"));
        assert!(module_matches("src.app.routers", "app.routers"));
        assert!(!module_matches("src.myapp.routers", "app.routers"));
    }

    #[test]
    fn test_prefix_composition_across_files() {
        let app = key("main.py", "app", 10);
        let api = key("main.py", "api", 40);
        let items = key("routers/items.py", "router", 5);

        let mut main = file("main.py", "app.main");
        main.groups = vec![group(app.clone(), None), group(api.clone(), Some("/api"))];
        main.includes = vec![
            include(
                &api,
                IncludeTarget::Imported {
                    module: ".routers.items".into(),
                    name: "router".into(),
                },
                Some("/v1"),
            ),
            include(&app, IncludeTarget::Local { key: api.clone() }, None),
        ];
        let mut items_file = file("routers/items.py", "app.routers.items");
        items_file.groups = vec![group(items.clone(), Some("/items"))];

        let index = GroupIndex::build(&[main, items_file]);
        let resolved = index.group(&items).unwrap();
        assert_eq!(resolved.status, GroupStatus::Linked);
        assert_eq!(resolved.parent.as_ref(), Some(&api));
        assert_eq!(resolved.mount_prefix.as_deref(), Some("/v1"));
        assert_eq!(resolved.effective_prefix.as_deref(), Some("/api/v1/items"));
        assert_eq!(index.group(&app).unwrap().status, GroupStatus::Root);
        assert_eq!(index.group(&app).unwrap().effective_prefix.as_deref(), Some("/"));
        assert!(index.unresolved().is_empty());
    }

    #[test]
    fn test_replacing_prefix() {
        let app = key("app.py", "app", 0);
        let bp = key("app.py", "bp", 20);
        let mut facts = file("app.py", "app");
        facts.groups = vec![group(app.clone(), None), group(bp.clone(), Some("/old"))];
        let mut edge = include(&app, IncludeTarget::Local { key: bp.clone() }, Some("/new"));
        edge.replaces_prefix = true;
        facts.includes = vec![edge];

        let index = GroupIndex::build(&[facts]);
        assert_eq!(index.group(&bp).unwrap().effective_prefix.as_deref(), Some("/new"));
    }

    #[test]
    fn test_cycle_is_flagged() {
        let a = key("m.py", "a", 0);
        let b = key("m.py", "b", 10);
        let mut facts = file("m.py", "m");
        facts.groups = vec![group(a.clone(), Some("/a")), group(b.clone(), Some("/b"))];
        facts.includes = vec![
            include(&a, IncludeTarget::Local { key: b.clone() }, None),
            include(&b, IncludeTarget::Local { key: a.clone() }, None),
        ];

        let index = GroupIndex::build(&[facts]);
        for k in [&a, &b] {
            let g = index.group(k).unwrap();
            assert_eq!(g.status, GroupStatus::Cyclic);
        }
        assert_eq!(index.group(&a).unwrap().effective_prefix.as_deref(), Some("/a"));
    }

    #[test]
    fn test_unresolved_include_is_listed() {
        let app = key("m.py", "app", 0);
        let mut facts = file("m.py", "m");
        facts.groups = vec![group(app.clone(), Some("/root"))];
        facts.includes = vec![include(
            &app,
            IncludeTarget::Unknown {
                expr: "make_router()".into(),
            },
            Some("/x"),
        )];

        let index = GroupIndex::build(&[facts]);
        assert_eq!(index.unresolved().len(), 1);
        assert_eq!(index.group(&app).unwrap().effective_prefix.as_deref(), Some("/root"));
    }

    #[test]
    fn test_first_parent_wins() {
        let a = key("m.py", "a", 0);
        let b = key("m.py", "b", 10);
        let child = key("m.py", "child", 20);
        let mut facts = file("m.py", "m");
        facts.groups = vec![
            group(a.clone(), Some("/a")),
            group(b.clone(), Some("/b")),
            group(child.clone(), None),
        ];
        facts.includes = vec![
            include(&b, IncludeTarget::Local { key: child.clone() }, None),
            include(&a, IncludeTarget::Local { key: child.clone() }, None),
        ];

        let index = GroupIndex::build(&[facts]);
        assert_eq!(index.group(&child).unwrap().parent.as_ref(), Some(&a));
        assert_eq!(index.group(&child).unwrap().effective_prefix.as_deref(), Some("/a"));
    }

    #[test]
    fn test_unique_name_fallback() {
        let app = key("main.py", "app", 0);
        let admin = key("admin/views.py", "admin_router", 0);
        let mut main = file("main.py", "main");
        main.groups = vec![group(app.clone(), None)];
        main.includes = vec![include(
            &app,
            IncludeTarget::Imported {
                module: "somewhere.else".into(),
                name: "admin_router".into(),
            },
            None,
        )];
        let mut views = FileFacts::empty("admin/views.py", "python");
        views.groups = vec![group(admin.clone(), Some("/admin"))];

        let index = GroupIndex::build(&[main, views]);
        assert_eq!(index.group(&admin).unwrap().effective_prefix.as_deref(), Some("/admin"));
        assert_eq!(index.group(&admin).unwrap().status, GroupStatus::Linked);
    }
}
