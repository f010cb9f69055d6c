use crate::workflow::{
    errors::{FlowrunError, Result},
    models::{
        Edge, EdgeKind, ForkNodeConfig, LoopNodeConfig, Node, NodeKind, PathNodeConfig,
        WorkflowDefinition,
    },
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Non-fatal findings surfaced alongside a successful validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Validate the entire workflow structure, recursing into loop, fork
    /// and path sub-graphs.
    pub fn validate(definition: &WorkflowDefinition) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        let mut seen_ids = HashSet::new();

        Self::validate_graph(
            &definition.nodes,
            &definition.edges,
            "workflow",
            &mut seen_ids,
            &mut report,
            Some(definition.config.level_timeout.unwrap_or(300) as f64),
        )?;

        Self::validate_entry_points(definition)?;
        Self::validate_end_reachable(definition, &mut report)?;

        Ok(report)
    }

    fn validate_graph(
        nodes: &[Node],
        edges: &[Edge],
        scope: &str,
        seen_ids: &mut HashSet<String>,
        report: &mut ValidationReport,
        enclosing_timeout: Option<f64>,
    ) -> Result<()> {
        for node in nodes {
            if !seen_ids.insert(node.id.clone()) {
                return Err(FlowrunError::Validation(format!(
                    "duplicate node id '{}' in {scope}",
                    node.id
                )));
            }
        }

        Self::validate_edge_consistency(nodes, edges, scope)?;
        Self::validate_no_cycles(nodes, edges, scope)?;
        Self::validate_branch_edges(nodes, edges, scope)?;

        for node in nodes {
            Self::validate_timeout_hierarchy(node, scope, enclosing_timeout, report);
            Self::validate_node_config(node, scope, seen_ids, report)?;
        }

        Ok(())
    }

    fn validate_node_config(
        node: &Node,
        scope: &str,
        seen_ids: &mut HashSet<String>,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let bad_config = |e: serde_json::Error| {
            FlowrunError::Validation(format!(
                "node '{}' in {scope} has an invalid {} config: {e}",
                node.id, node.kind
            ))
        };

        match node.kind {
            NodeKind::Loop => {
                let config: LoopNodeConfig =
                    serde_json::from_value(node.config.clone()).map_err(bad_config)?;
                Self::validate_graph(
                    &config.nodes,
                    &config.edges,
                    &format!("loop '{}'", node.id),
                    seen_ids,
                    report,
                    Some(config.level_timeout as f64),
                )?;
            }
            NodeKind::Path => {
                let config: PathNodeConfig =
                    serde_json::from_value(node.config.clone()).map_err(bad_config)?;
                Self::validate_graph(
                    &config.nodes,
                    &config.edges,
                    &format!("path '{}'", node.id),
                    seen_ids,
                    report,
                    Some(config.level_timeout as f64),
                )?;
            }
            NodeKind::Fork => {
                let config: ForkNodeConfig =
                    serde_json::from_value(node.config.clone()).map_err(bad_config)?;
                let mut path_ids = HashSet::new();
                let mut total = 0usize;
                for path in &config.paths {
                    if !path_ids.insert(path.id.as_str()) {
                        return Err(FlowrunError::Validation(format!(
                            "fork '{}' has duplicate path id '{}'",
                            node.id, path.id
                        )));
                    }
                    if path.nodes.len() > config.max_nodes_per_path {
                        return Err(FlowrunError::BudgetExceeded(format!(
                            "fork '{}' path '{}' has {} nodes, cap is {}",
                            node.id,
                            path.id,
                            path.nodes.len(),
                            config.max_nodes_per_path
                        )));
                    }
                    total += path.nodes.len();
                    Self::validate_graph(
                        &path.nodes,
                        &path.edges,
                        &format!("fork '{}' path '{}'", node.id, path.id),
                        seen_ids,
                        report,
                        Some(config.timeout as f64),
                    )?;
                }
                if total > config.max_total_nodes {
                    return Err(FlowrunError::BudgetExceeded(format!(
                        "fork '{}' spans {total} nodes, cap is {}",
                        node.id, config.max_total_nodes
                    )));
                }
            }
            NodeKind::Condition => {
                if node.config.get("expression").and_then(|v| v.as_str()).is_none() {
                    return Err(FlowrunError::Validation(format!(
                        "condition node '{}' in {scope} is missing an expression",
                        node.id
                    )));
                }
            }
            NodeKind::HttpRequest => {
                if node.config.get("url").and_then(|v| v.as_str()).is_none() {
                    return Err(FlowrunError::Validation(format!(
                        "http_request node '{}' in {scope} is missing a url",
                        node.id
                    )));
                }
            }
            NodeKind::Start | NodeKind::End | NodeKind::Noop => {}
        }

        Ok(())
    }

    fn validate_timeout_hierarchy(
        node: &Node,
        scope: &str,
        enclosing_timeout: Option<f64>,
        report: &mut ValidationReport,
    ) {
        let (Some(limit), Some(node_timeout)) = (
            enclosing_timeout,
            node.config.get("timeout").and_then(|v| v.as_f64()),
        ) else {
            return;
        };
        if node_timeout > limit {
            report.warnings.push(format!(
                "node '{}' timeout {node_timeout}s exceeds the {scope} deadline of {limit}s",
                node.id
            ));
        }
    }

    /// Every edge endpoint must name a node of the same (sub-)graph.
    fn validate_edge_consistency(nodes: &[Node], edges: &[Edge], scope: &str) -> Result<()> {
        let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        for edge in edges {
            if !node_ids.contains(edge.from.as_str()) {
                return Err(FlowrunError::Validation(format!(
                    "edge in {scope} references non-existent source node '{}'",
                    edge.from
                )));
            }
            if !node_ids.contains(edge.to.as_str()) {
                return Err(FlowrunError::Validation(format!(
                    "edge in {scope} references non-existent target node '{}'",
                    edge.to
                )));
            }
        }

        Ok(())
    }

    fn validate_no_cycles(nodes: &[Node], edges: &[Edge], scope: &str) -> Result<()> {
        let node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        for node_id in &node_ids {
            graph.insert(node_id.clone(), Vec::new());
        }
        for edge in edges {
            if let Some(out) = graph.get_mut(&edge.from) {
                out.push(edge.to.clone());
            }
        }

        // Three-color DFS.
        let mut white_set = node_ids.clone();
        let mut gray_set = HashSet::new();
        let mut black_set = HashSet::new();

        for node_id in &node_ids {
            if white_set.contains(node_id)
                && Self::has_cycle_dfs(node_id, &graph, &mut white_set, &mut gray_set, &mut black_set)
            {
                return Err(FlowrunError::Validation(format!(
                    "{scope} contains a cycle - DAG structure required"
                )));
            }
        }

        Ok(())
    }

    fn has_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        white_set: &mut HashSet<String>,
        gray_set: &mut HashSet<String>,
        black_set: &mut HashSet<String>,
    ) -> bool {
        white_set.remove(node);
        gray_set.insert(node.to_string());

        if let Some(neighbors) = graph.get(node) {
            for neighbor in neighbors {
                if black_set.contains(neighbor) {
                    continue;
                }
                if gray_set.contains(neighbor) {
                    return true;
                }
                if Self::has_cycle_dfs(neighbor, graph, white_set, gray_set, black_set) {
                    return true;
                }
            }
        }

        gray_set.remove(node);
        black_set.insert(node.to_string());

        false
    }

    /// `true`/`false` edges may only leave condition nodes.
    fn validate_branch_edges(nodes: &[Node], edges: &[Edge], scope: &str) -> Result<()> {
        let condition_ids: HashSet<&str> = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Condition)
            .map(|n| n.id.as_str())
            .collect();

        for edge in edges {
            if matches!(edge.kind, EdgeKind::True | EdgeKind::False)
                && !condition_ids.contains(edge.from.as_str())
            {
                return Err(FlowrunError::Validation(format!(
                    "branch edge from '{}' in {scope} requires a condition node",
                    edge.from
                )));
            }
        }

        Ok(())
    }

    /// The top-level graph needs exactly one `start` node.
    fn validate_entry_points(definition: &WorkflowDefinition) -> Result<()> {
        let starts: Vec<&Node> = definition
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Start)
            .collect();
        match starts.len() {
            0 => Err(FlowrunError::Validation(
                "workflow has no start node".to_string(),
            )),
            1 => Ok(()),
            n => Err(FlowrunError::Validation(format!(
                "workflow has {n} start nodes, exactly one is required"
            ))),
        }
    }

    /// At least one `end` node must be reachable from `start`; unreachable
    /// nodes are reported as warnings.
    fn validate_end_reachable(
        definition: &WorkflowDefinition,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let start = definition
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Start)
            .map(|n| n.id.as_str())
            .unwrap_or_default();

        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &definition.edges {
            successors
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(current) = queue.pop_front() {
            if let Some(nexts) = successors.get(current) {
                for next in nexts {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        let end_reachable = definition
            .nodes
            .iter()
            .any(|n| n.kind == NodeKind::End && visited.contains(n.id.as_str()));
        if !end_reachable {
            return Err(FlowrunError::Validation(
                "no end node is reachable from start".to_string(),
            ));
        }

        for node in &definition.nodes {
            if !visited.contains(node.id.as_str()) {
                report.warnings.push(format!(
                    "node '{}' is not reachable from start",
                    node.id
                ));
            }
        }

        Ok(())
    }
}
