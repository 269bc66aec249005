//! Skill-tree DAG over module prerequisite edges.
//!
//! Modules are nodes; an edge `A → B` means "B lists A in its
//! `unlock_requirements`" — A must be mastered before B unlocks.
//!
//! Topological ordering is computed via Kahn's algorithm, seeded and
//! tie-broken by course definition order so output is deterministic. Cycles
//! are extracted via DFS so the error names the offending chain.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ValidationError;
use crate::model::{CourseDefinition, ModuleId};

/// Prerequisite DAG for one course definition.
#[derive(Debug, Clone, Default)]
pub struct SkillGraph {
    /// Module ids in course definition order.
    order: Vec<ModuleId>,
    /// Definition index per module id (ties in Kahn waves break on this).
    index: HashMap<ModuleId, usize>,
    /// `module → prerequisites` (upstream edges, dangling refs excluded).
    prereqs: HashMap<ModuleId, Vec<ModuleId>>,
    /// `prerequisite → dependents` (downstream edges).
    dependents: HashMap<ModuleId, Vec<ModuleId>>,
    /// `(module, missing prerequisite)` pairs found during build.
    dangling: Vec<(ModuleId, ModuleId)>,
}

impl SkillGraph {
    /// Build the graph from a course definition.
    ///
    /// Unknown prerequisite ids are excluded from the edge set and recorded
    /// in [`dangling`](Self::dangling); the loader treats them as fatal,
    /// the progression evaluator degrades the node to locked instead.
    pub fn build(course: &CourseDefinition) -> Self {
        let mut graph = SkillGraph::default();
        for (idx, module) in course.modules.iter().enumerate() {
            graph.order.push(module.id.clone());
            graph.index.insert(module.id.clone(), idx);
            graph.prereqs.entry(module.id.clone()).or_default();
            graph.dependents.entry(module.id.clone()).or_default();
        }

        for module in &course.modules {
            for prereq in &module.unlock_requirements {
                if graph.index.contains_key(prereq) {
                    graph
                        .prereqs
                        .entry(module.id.clone())
                        .or_default()
                        .push(prereq.clone());
                    graph
                        .dependents
                        .entry(prereq.clone())
                        .or_default()
                        .push(module.id.clone());
                } else {
                    graph
                        .dangling
                        .push((module.id.clone(), prereq.clone()));
                }
            }
        }
        graph
    }

    /// Prerequisite references that do not resolve to a known module.
    pub fn dangling(&self) -> &[(ModuleId, ModuleId)] {
        &self.dangling
    }

    /// Resolved prerequisites of `module_id`.
    pub fn prereqs_of(&self, module_id: &str) -> &[ModuleId] {
        self.prereqs
            .get(module_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Return module ids in topological order (prerequisites first).
    ///
    /// Uses Kahn's algorithm with definition-order tie-breaking. Returns
    /// [`ValidationError::CycleDetected`] naming the cycle chain when the
    /// prerequisite edges are not acyclic.
    pub fn topological_order(&self) -> Result<Vec<ModuleId>, ValidationError> {
        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.prereqs[id].len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .filter(|id| in_degree[id.as_str()] == 0)
            .map(|id| id.as_str())
            .collect();

        let mut sorted: Vec<ModuleId> = Vec::with_capacity(self.order.len());

        while let Some(node) = queue.pop_front() {
            sorted.push(node.to_string());
            if let Some(dependents) = self.dependents.get(node) {
                let mut ready: Vec<&str> = Vec::new();
                for dep in dependents {
                    if let Some(deg) = in_degree.get_mut(dep.as_str()) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push(dep.as_str());
                        }
                    }
                }
                // Definition-order tie-break keeps output deterministic.
                ready.sort_unstable_by_key(|id| self.index[*id]);
                queue.extend(ready);
            }
        }

        if sorted.len() != self.order.len() {
            let chain = self.find_cycle().unwrap_or_else(|| {
                self.order
                    .iter()
                    .filter(|id| !sorted.contains(id))
                    .cloned()
                    .collect()
            });
            return Err(ValidationError::CycleDetected { chain });
        }

        Ok(sorted)
    }

    /// DFS over prerequisite edges to extract a concrete cycle chain.
    fn find_cycle(&self) -> Option<Vec<ModuleId>> {
        let mut visited = HashSet::new();
        for start in &self.order {
            let mut path = Vec::new();
            if self.dfs_cycle(start, &mut visited, &mut path) {
                // Trim the prefix before the first repeated node.
                if let Some(last) = path.last().cloned() {
                    if let Some(pos) = path.iter().position(|id| *id == last) {
                        return Some(path[pos..].to_vec());
                    }
                }
                return Some(path);
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<ModuleId>,
    ) -> bool {
        if path.iter().any(|p| p == node) {
            path.push(node.to_string());
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visited.insert(node.to_string());
        path.push(node.to_string());

        for prereq in self.prereqs_of(node) {
            if self.dfs_cycle(prereq, visited, path) {
                return true;
            }
        }

        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MasteryCriteria, Module};

    fn module(id: &str, prereqs: &[&str]) -> Module {
        Module {
            id: id.to_string(),
            name: id.to_string(),
            items: vec![],
            unlock_requirements: prereqs.iter().map(|s| s.to_string()).collect(),
            mastery_criteria: MasteryCriteria::ViewAll,
        }
    }

    fn course(modules: Vec<Module>) -> CourseDefinition {
        CourseDefinition {
            course_code: "TEST".into(),
            title: "Test".into(),
            modules,
            badges: vec![],
            gamification: Default::default(),
        }
    }

    #[test]
    fn test_topological_order_respects_prereqs() {
        let c = course(vec![
            module("advanced", &["basics"]),
            module("basics", &[]),
            module("capstone", &["advanced", "basics"]),
        ]);
        let order = SkillGraph::build(&c).topological_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("basics") < pos("advanced"));
        assert!(pos("advanced") < pos("capstone"));
    }

    #[test]
    fn test_order_is_deterministic_for_independent_modules() {
        let c = course(vec![
            module("b", &[]),
            module("a", &[]),
            module("c", &[]),
        ]);
        let order = SkillGraph::build(&c).topological_order().unwrap();
        // Ties resolve in definition order, not alphabetically.
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_two_node_cycle_is_detected_with_chain() {
        let c = course(vec![module("a", &["b"]), module("b", &["a"])]);
        let err = SkillGraph::build(&c).topological_order().unwrap_err();
        match err {
            ValidationError::CycleDetected { chain } => {
                assert!(chain.len() >= 2, "chain should name the cycle: {chain:?}");
                assert!(chain.contains(&"a".to_string()));
                assert!(chain.contains(&"b".to_string()));
            }
            other => panic!("expected CycleDetected, got {other}"),
        }
    }

    #[test]
    fn test_self_cycle_is_detected() {
        let c = course(vec![module("loop", &["loop"])]);
        assert!(matches!(
            SkillGraph::build(&c).topological_order(),
            Err(ValidationError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_dangling_prereq_is_recorded_not_edged() {
        let c = course(vec![module("m", &["ghost"])]);
        let graph = SkillGraph::build(&c);
        assert_eq!(
            graph.dangling(),
            &[("m".to_string(), "ghost".to_string())]
        );
        assert!(graph.prereqs_of("m").is_empty());
        // Still sortable — the dangling edge is not part of the DAG.
        assert_eq!(graph.topological_order().unwrap(), vec!["m"]);
    }

    #[test]
    fn test_diamond_resolves() {
        let c = course(vec![
            module("root", &[]),
            module("left", &["root"]),
            module("right", &["root"]),
            module("join", &["left", "right"]),
        ]);
        let order = SkillGraph::build(&c).topological_order().unwrap();
        assert_eq!(order.first().unwrap(), "root");
        assert_eq!(order.last().unwrap(), "join");
    }
}
