//! Dependency resolution and execution ordering.
//!
//! Edges are derived from each entity type's parent rule, never declared.
//! Ordering is Kahn's algorithm with the lowest declaration index always
//! taken first among ready nodes, so the same input always produces the
//! same order. A reference to a parent that is not part of the run adds no
//! edge; whether that parent already exists in the catalog is checked per
//! entity at execution time.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::handlers::HandlerRegistry;
use crate::types::{EntityDeclaration, EntityKey};

/// Something that can be placed in a dependency order.
pub trait DependencyNode {
    fn key(&self) -> &EntityKey;
    fn dependencies(&self) -> &[EntityKey];
}

/// Order nodes so that every in-run dependency precedes its dependents.
///
/// # Errors
///
/// Returns [`Error::DuplicateEntity`] if two nodes share a key and
/// [`Error::CycleDetected`] naming every node that could not be ordered.
pub fn topological_order<N: DependencyNode>(nodes: Vec<N>) -> Result<Vec<N>> {
    let mut index: HashMap<&EntityKey, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.key(), i).is_some() {
            return Err(Error::DuplicateEntity {
                key: node.key().to_string(),
            });
        }
    }

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let parents: BTreeSet<usize> = node
            .dependencies()
            .iter()
            .filter_map(|dep| index.get(dep).copied())
            .collect();
        for parent in parents {
            dependents[parent].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &dependents[next] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < nodes.len() {
        let entities = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].key().to_string())
            .collect();
        return Err(Error::CycleDetected { entities });
    }

    let mut slots: Vec<Option<N>> = nodes.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// A declaration with its identity and parents worked out.
#[derive(Debug, Clone)]
pub struct PlannedEntity {
    pub declaration: EntityDeclaration,
    pub key: EntityKey,
    pub dependencies: Vec<EntityKey>,
    /// Set when the declaration could not be keyed; execution fails it.
    pub plan_error: Option<String>,
}

impl PlannedEntity {
    /// Work out key and parents through the registered handler.
    ///
    /// A declaration whose name or parent properties are unusable still gets
    /// a unique placeholder key so it can be reported as a failed entity
    /// instead of aborting the run.
    pub fn plan(declaration: EntityDeclaration, index: usize, handlers: &HandlerRegistry) -> Self {
        let keyed = handlers.get(declaration.entity_type).and_then(|handler| {
            let key = handler.key(&declaration)?;
            let dependencies = handler.dependencies(&declaration)?;
            Ok((key, dependencies))
        });

        match keyed {
            Ok((key, dependencies)) => Self {
                declaration,
                key,
                dependencies,
                plan_error: None,
            },
            Err(e) => {
                let placeholder = format!("<invalid #{index} {}>", declaration.label());
                Self {
                    key: EntityKey::new(declaration.entity_type, placeholder),
                    declaration,
                    dependencies: Vec::new(),
                    plan_error: Some(e.to_string()),
                }
            }
        }
    }
}

impl DependencyNode for PlannedEntity {
    fn key(&self) -> &EntityKey {
        &self.key
    }

    fn dependencies(&self) -> &[EntityKey] {
        &self.dependencies
    }
}

/// Declarations in the order they must be executed.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOrder {
    entities: Vec<PlannedEntity>,
}

impl ExecutionOrder {
    /// Plan every declaration and order the result.
    ///
    /// # Errors
    ///
    /// Fails on a dependency cycle or a duplicated entity; no entity has
    /// been executed at that point.
    pub fn resolve(
        declarations: Vec<EntityDeclaration>,
        handlers: &HandlerRegistry,
    ) -> Result<Self> {
        let planned: Vec<_> = declarations
            .into_iter()
            .enumerate()
            .map(|(i, decl)| PlannedEntity::plan(decl, i, handlers))
            .collect();

        let entities = topological_order(planned)?;
        log::debug!("Resolved execution order for {} entities", entities.len());
        for (position, entity) in entities.iter().enumerate() {
            log::trace!("  {}. {}", position + 1, entity.key);
        }
        Ok(Self { entities })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedEntity> {
        self.entities.iter()
    }

    /// Keys in execution order.
    #[must_use]
    pub fn keys(&self) -> Vec<&EntityKey> {
        self.entities.iter().map(|e| &e.key).collect()
    }
}

impl<'a> IntoIterator for &'a ExecutionOrder {
    type Item = &'a PlannedEntity;
    type IntoIter = std::slice::Iter<'a, PlannedEntity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    #[derive(Debug)]
    struct Node {
        key: EntityKey,
        deps: Vec<EntityKey>,
    }

    fn node(name: &str, deps: &[&str]) -> Node {
        Node {
            key: EntityKey::new(EntityType::Table, name),
            deps: deps.iter().map(|d| EntityKey::new(EntityType::Table, *d)).collect(),
        }
    }

    impl DependencyNode for Node {
        fn key(&self) -> &EntityKey {
            &self.key
        }

        fn dependencies(&self) -> &[EntityKey] {
            &self.deps
        }
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.key.fqn.as_str()).collect()
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let nodes = vec![node("c", &[]), node("a", &[]), node("b", &[])];
        let order = topological_order(nodes).unwrap();
        assert_eq!(names(&order), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = topological_order(vec![
            node("d", &["b", "c"]),
            node("c", &["a"]),
            node("b", &["a"]),
            node("a", &[]),
        ])
        .unwrap();
        assert_eq!(names(&order), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_order_is_stable_across_runs() {
        let build = || {
            vec![
                node("x", &[]),
                node("y", &["x"]),
                node("z", &[]),
                node("w", &["z", "x"]),
            ]
        };
        let first = names(&topological_order(build()).unwrap())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        for _ in 0..5 {
            let again = topological_order(build()).unwrap();
            assert_eq!(names(&again), first);
        }
    }

    #[test]
    fn test_external_dependency_adds_no_edge() {
        let order = topological_order(vec![node("t", &["outside"])]).unwrap();
        assert_eq!(names(&order), vec!["t"]);
    }

    #[test]
    fn test_repeated_dependency_counted_once() {
        let order = topological_order(vec![node("b", &["a", "a"]), node("a", &[])]).unwrap();
        assert_eq!(names(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_names_entities() {
        let err = topological_order(vec![
            node("free", &[]),
            node("a", &["b"]),
            node("b", &["a"]),
        ])
        .unwrap_err();

        match err {
            Error::CycleDetected { entities } => {
                assert_eq!(entities, vec!["table:a", "table:b"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = topological_order(vec![node("a", &["a"])]).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = topological_order(vec![node("a", &[]), node("a", &[])]).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity { .. }));
    }

    #[test]
    fn test_reverse_declared_hierarchy_resolves_top_down() {
        let handlers = HandlerRegistry::with_defaults();
        let declarations = vec![
            EntityDeclaration::named(EntityType::Table, "T")
                .with_property("service", "S")
                .with_property("database", "D")
                .with_property("database_schema", "Sc"),
            EntityDeclaration::named(EntityType::DatabaseSchema, "Sc")
                .with_property("service", "S")
                .with_property("database", "D"),
            EntityDeclaration::named(EntityType::Database, "D").with_property("service", "S"),
            EntityDeclaration::named(EntityType::DatabaseService, "S")
                .with_property("service_type", "Postgres"),
        ];

        let order = ExecutionOrder::resolve(declarations, &handlers).unwrap();
        let keys: Vec<String> = order.keys().iter().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            vec![
                "database_service:S",
                "database:S.D",
                "database_schema:S.D.Sc",
                "table:S.D.Sc.T",
            ]
        );
    }

    #[test]
    fn test_unkeyable_declaration_is_planned_with_error() {
        let handlers = HandlerRegistry::with_defaults();
        let declarations = vec![
            EntityDeclaration::named(EntityType::Database, "orphan"),
            EntityDeclaration::named(EntityType::Database, "other"),
        ];

        let order = ExecutionOrder::resolve(declarations, &handlers).unwrap();
        assert_eq!(order.len(), 2);
        for entity in &order {
            assert!(entity.plan_error.as_deref().unwrap().contains("service"));
        }
    }
}
