//! Query-group execution.
//!
//! A group is a DAG of stored-query nodes. Execution walks the graph with a
//! ready queue: a node runs once every incoming edge's source has run, its
//! arguments are the union-merge of the incoming edges' transformed result
//! sets, and its result feeds the edges going out. The traversal is a
//! single-threaded cooperative loop; the only suspension points are the
//! executor calls, so deterministic backends yield deterministic runs.

pub(crate) mod args;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::binding::{ArgumentSet, ResultSet};
use crate::entity::{Backend, BackendType, EntityRegister, QueryEdge, QueryNode, StoredQuery};
use crate::error::{BackendErrorKind, EngineError, Result};
use crate::executor::{ExecOptions, Executor, HttpExecutor, HttpExecutorConfig, MemoryExecutor, N_QUADS};
use crate::query::{ParsedQuery, QueryForm, apply};
use crate::transform::map_results;

/// Everything one execution needs, passed explicitly instead of living in
/// globals: the entity register, the default executor, the optional shared
/// in-process executor, and per-node limits.
#[derive(Clone)]
pub struct ExecutionContext {
    pub register: Arc<EntityRegister>,
    pub default_executor: Arc<dyn Executor>,
    pub memory_executor: Option<Arc<MemoryExecutor>>,
    pub node_timeout: Option<Duration>,
    pub timing_logs: bool,
}

impl ExecutionContext {
    pub fn new(register: Arc<EntityRegister>, default_executor: Arc<dyn Executor>) -> Self {
        Self {
            register,
            default_executor,
            memory_executor: None,
            node_timeout: None,
            timing_logs: false,
        }
    }

    pub fn with_memory_executor(mut self, executor: Arc<MemoryExecutor>) -> Self {
        self.memory_executor = Some(executor);
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn with_timing_logs(mut self, enabled: bool) -> Self {
        self.timing_logs = enabled;
        self
    }
}

/// One group execution request.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub group_id: String,
    pub initial_arguments: Option<ArgumentSet>,
    pub start_node_id: Option<String>,
    /// Value for the stored queries' `LIMIT` placeholder, when declared.
    pub limit: Option<u64>,
    /// Value for the stored queries' `OFFSET` placeholder, when declared.
    pub offset: Option<u64>,
}

impl ExecutionRequest {
    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    pub fn with_initial_arguments(mut self, arguments: ArgumentSet) -> Self {
        self.initial_arguments = Some(arguments);
        self
    }

    pub fn with_start_node(mut self, node_id: impl Into<String>) -> Self {
        self.start_node_id = Some(node_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// The result of the finally-selected node.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Select(ResultSet),
    Graph { media_type: String, data: String },
    Boolean(bool),
}

impl QueryOutcome {
    pub fn as_select(&self) -> Option<&ResultSet> {
        match self {
            QueryOutcome::Select(results) => Some(results),
            _ => None,
        }
    }
}

/// A dry-run description of a group, produced by [`GroupRunner::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    /// Node ids grouped by dependency depth; a node appears after all of
    /// its predecessors' layers.
    pub layers: Vec<Vec<String>>,
    /// Per node, the declared parameters no incoming edge supplies.
    pub open_parameters: Vec<(String, Vec<String>)>,
}

/// Executes query groups against an [`ExecutionContext`].
pub struct GroupRunner {
    ctx: ExecutionContext,
}

struct GroupGraph {
    nodes_by_id: HashMap<String, Arc<QueryNode>>,
    in_edges: HashMap<String, Vec<Arc<QueryEdge>>>,
    out_edges: HashMap<String, Vec<Arc<QueryEdge>>>,
}

impl GroupRunner {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Run a group to completion and return the final node's result.
    ///
    /// Cancellation is dropping the returned future: all suspension points
    /// are backend calls, stored entities are never written.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<QueryOutcome> {
        let group = self.ctx.register.group(&request.group_id)?;
        let (nodes, edges) = self.resolve_members(&group)?;
        let graph = build_graph(&nodes, &edges);
        let start_ids = self.select_start_nodes(request, &group.id, &group.start_node_ids, &nodes, &graph)?;
        let reachable = reachable_from(&start_ids, &graph);

        let mut queue: VecDeque<String> = start_ids.iter().cloned().collect();
        let mut queued: HashSet<String> = queue.iter().cloned().collect();
        let mut executed: HashMap<String, QueryOutcome> = HashMap::new();
        let mut execution_order: Vec<String> = Vec::new();
        let mut stalls = 0usize;

        while let Some(node_id) = queue.pop_front() {
            queued.remove(&node_id);
            let node = graph.nodes_by_id[&node_id].clone();
            let is_start = start_ids.contains(&node_id);
            let takes_initial = is_start && request.initial_arguments.is_some();

            let incoming: Vec<Arc<QueryEdge>> = graph
                .in_edges
                .get(&node_id)
                .map(|edges| {
                    edges
                        .iter()
                        .filter(|edge| {
                            let in_subgraph = reachable.contains(&edge.from_node_id);
                            if !in_subgraph {
                                warn!(
                                    node = %node_id,
                                    edge = %edge.id,
                                    from = %edge.from_node_id,
                                    "prerequisite outside the reachable subgraph; ignoring"
                                );
                            }
                            in_subgraph
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let ready = takes_initial
                || incoming
                    .iter()
                    .all(|edge| executed.contains_key(&edge.from_node_id));
            if !ready {
                queue.push_back(node_id.clone());
                queued.insert(node_id);
                stalls += 1;
                if stalls > queue.len() {
                    return Err(EngineError::CyclicGraph {
                        group: group.id.clone(),
                        pending: queue.len(),
                    });
                }
                continue;
            }
            stalls = 0;

            let stored = self.ctx.register.query(&node.query_id)?;
            let merged = if takes_initial {
                let initial = request.initial_arguments.clone().unwrap_or_default();
                args::validate_arguments(&stored, &initial, "initial arguments", &node.id)?;
                initial
            } else {
                self.assemble_from_edges(&stored, &node, &incoming, &executed)?
            };

            let outcome = self.execute_node(request, &node, &stored, merged).await?;
            executed.insert(node_id.clone(), outcome);
            execution_order.push(node_id.clone());

            if let Some(outgoing) = graph.out_edges.get(&node_id) {
                for edge in outgoing {
                    let target = &edge.to_node_id;
                    if !executed.contains_key(target) && !queued.contains(target) {
                        queue.push_back(target.clone());
                        queued.insert(target.clone());
                    }
                }
            }
        }

        self.select_final_result(&group.id, &group.end_node_ids, &graph, executed, execution_order)
    }

    /// Resolve a group's node and edge references. Missing nodes are an
    /// error; edges that do not resolve or whose endpoints fall outside the
    /// group are logged and skipped.
    fn resolve_members(
        &self,
        group: &crate::entity::QueryGroup,
    ) -> Result<(Vec<Arc<QueryNode>>, Vec<Arc<QueryEdge>>)> {
        let mut nodes: Vec<Arc<QueryNode>> = Vec::new();
        for node_ref in &group.nodes {
            nodes.push(self.ctx.register.node(node_ref.id())?);
        }
        let node_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

        let mut edges: Vec<Arc<QueryEdge>> = Vec::new();
        for edge_ref in &group.edges {
            match self.ctx.register.edge(edge_ref.id()) {
                Ok(edge) => {
                    if node_ids.contains(&edge.from_node_id) && node_ids.contains(&edge.to_node_id)
                    {
                        edges.push(edge);
                    } else {
                        warn!(edge = %edge.id, "edge endpoints are outside the group; skipping");
                    }
                }
                Err(err) => {
                    warn!(edge = edge_ref.id(), error = %err, "unresolvable edge; skipping");
                }
            }
        }
        Ok((nodes, edges))
    }

    /// Describe a group without executing it: nodes in dependency layers,
    /// plus each node's parameters that no incoming edge feeds. Those open
    /// parameters are the ones an execution must receive as initial
    /// arguments (or leave unbound).
    pub fn plan(&self, group_id: &str) -> Result<GroupPlan> {
        let group = self.ctx.register.group(group_id)?;
        let (nodes, edges) = self.resolve_members(&group)?;
        let graph = build_graph(&nodes, &edges);

        let mut indegree: HashMap<&str, usize> = nodes
            .iter()
            .map(|node| {
                let count = graph
                    .in_edges
                    .get(&node.id)
                    .map(|edges| edges.len())
                    .unwrap_or(0);
                (node.id.as_str(), count)
            })
            .collect();

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<&str> = nodes
            .iter()
            .filter(|node| indegree[node.id.as_str()] == 0)
            .map(|node| node.id.as_str())
            .collect();
        let mut placed = 0usize;
        while !current.is_empty() {
            placed += current.len();
            let mut next: Vec<&str> = Vec::new();
            for id in &current {
                if let Some(outgoing) = graph.out_edges.get(*id) {
                    for edge in outgoing {
                        if let Some(remaining) = indegree.get_mut(edge.to_node_id.as_str()) {
                            *remaining -= 1;
                            if *remaining == 0 {
                                next.push(edge.to_node_id.as_str());
                            }
                        }
                    }
                }
            }
            layers.push(current.iter().map(|id| id.to_string()).collect());
            current = next;
        }
        if placed != nodes.len() {
            return Err(EngineError::CyclicGraph {
                group: group.id.clone(),
                pending: nodes.len() - placed,
            });
        }

        let mut open_parameters: Vec<(String, Vec<String>)> = Vec::new();
        for node in &nodes {
            let stored = self.ctx.register.query(&node.query_id)?;
            let fed: HashSet<&str> = graph
                .in_edges
                .get(&node.id)
                .map(|edges| {
                    edges
                        .iter()
                        .flat_map(|edge| edge.mappings.iter().map(|m| m.to_param.as_str()))
                        .collect()
                })
                .unwrap_or_default();
            let mut open: Vec<String> = stored
                .parameters
                .iter()
                .flat_map(|parameter_group| parameter_group.vars.iter())
                .map(|parameter| parameter.param_name.clone())
                .filter(|name| !fed.contains(name.as_str()))
                .collect();
            open.sort();
            open.dedup();
            if !open.is_empty() {
                open_parameters.push((node.id.clone(), open));
            }
        }

        Ok(GroupPlan {
            layers,
            open_parameters,
        })
    }

    /// Start-node precedence: explicit request → group declaration → nodes
    /// with no incoming edges → single-node group.
    fn select_start_nodes(
        &self,
        request: &ExecutionRequest,
        group_id: &str,
        declared: &[String],
        nodes: &[Arc<QueryNode>],
        graph: &GroupGraph,
    ) -> Result<Vec<String>> {
        if let Some(explicit) = &request.start_node_id {
            if !graph.nodes_by_id.contains_key(explicit) {
                return Err(EngineError::UnresolvedReference {
                    kind: crate::error::EntityKind::Node,
                    id: explicit.clone(),
                });
            }
            return Ok(vec![explicit.clone()]);
        }
        if !declared.is_empty() {
            for id in declared {
                if !graph.nodes_by_id.contains_key(id) {
                    return Err(EngineError::UnresolvedReference {
                        kind: crate::error::EntityKind::Node,
                        id: id.clone(),
                    });
                }
            }
            return Ok(declared.to_vec());
        }
        let candidates: Vec<String> = nodes
            .iter()
            .filter(|node| {
                graph
                    .in_edges
                    .get(&node.id)
                    .map(|edges| edges.is_empty())
                    .unwrap_or(true)
            })
            .map(|node| node.id.clone())
            .collect();
        if !candidates.is_empty() {
            return Ok(candidates);
        }
        if nodes.len() == 1 {
            return Ok(vec![nodes[0].id.clone()]);
        }
        Err(EngineError::AmbiguousStartSet {
            group: group_id.to_string(),
        })
    }

    /// Transform and validate each satisfied incoming edge, then union-merge
    /// the survivors. Failing edges are logged and skipped; a node whose
    /// edges all failed fails the execution with the last edge error.
    fn assemble_from_edges(
        &self,
        stored: &StoredQuery,
        node: &QueryNode,
        incoming: &[Arc<QueryEdge>],
        executed: &HashMap<String, QueryOutcome>,
    ) -> Result<ArgumentSet> {
        let mut collected: Vec<ArgumentSet> = Vec::new();
        let mut last_error: Option<EngineError> = None;
        let mut attempted = 0usize;

        for edge in incoming {
            let Some(source_outcome) = executed.get(&edge.from_node_id) else {
                continue;
            };
            attempted += 1;
            let assembled = match source_outcome.as_select() {
                Some(results) => {
                    let set = map_results(results, &edge.mappings);
                    args::validate_arguments(stored, &set, &format!("edge {}", edge.id), &node.id)
                        .map(|_| set)
                }
                None => Err(EngineError::Backend {
                    kind: BackendErrorKind::Protocol,
                    status: None,
                    message: format!(
                        "edge {} source node '{}' produced a non-tabular result",
                        edge.id, edge.from_node_id
                    ),
                }),
            };
            match assembled {
                Ok(set) => collected.push(set),
                Err(err) => {
                    warn!(
                        edge = %edge.id,
                        error = %err,
                        "edge argument assembly failed; continuing with remaining edges"
                    );
                    last_error = Some(err);
                }
            }
        }

        if attempted > 0 && collected.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(args::union_merge(collected))
    }

    /// Rewrite and run a single node's stored query.
    async fn execute_node(
        &self,
        request: &ExecutionRequest,
        node: &QueryNode,
        stored: &StoredQuery,
        merged: ArgumentSet,
    ) -> Result<QueryOutcome> {
        let mut text = stored.query_text.clone();
        if stored.has_limit_parameter {
            if let Some(limit) = request.limit {
                text = apply::apply_limit(&text, limit);
            }
        }
        if stored.has_offset_parameter {
            if let Some(offset) = request.offset {
                text = apply::apply_offset(&text, offset);
            }
        }

        let mut parsed = ParsedQuery::parse(&text)?;
        if parsed.is_update() {
            return Err(EngineError::UpdateNotAllowed {
                node: node.id.clone(),
            });
        }
        if parsed.form() != stored.query_type {
            return Err(EngineError::UnsupportedQueryType {
                query: stored.id.clone(),
                declared: stored.query_type.to_string(),
                parsed: parsed.form().to_string(),
            });
        }

        let groups = parsed.parameters().values;
        if groups.is_empty() {
            if !merged.is_empty() {
                warn!(node = %node.id, "arguments supplied to a query without parameters; ignoring");
            }
        } else {
            if merged.is_empty() {
                warn!(
                    node = %node.id,
                    "query declares parameters but no arguments are available"
                );
            }
            let sets = args::per_group_sets(&groups, &merged);
            parsed.apply_arguments(&sets)?;
        }

        let executor = self.executor_for(node, stored);
        let opts = ExecOptions {
            accept: None,
            deadline: self.ctx.node_timeout,
        };
        let started = Instant::now();
        let outcome = match parsed.form() {
            QueryForm::Select => QueryOutcome::Select(executor.select(&parsed, &opts).await?),
            QueryForm::Construct | QueryForm::Describe => QueryOutcome::Graph {
                media_type: N_QUADS.to_string(),
                data: executor.construct(&parsed, &opts).await?,
            },
            QueryForm::Ask => QueryOutcome::Boolean(executor.ask(&parsed, &opts).await?),
            QueryForm::Update => {
                return Err(EngineError::UpdateNotAllowed {
                    node: node.id.clone(),
                });
            }
        };
        if self.ctx.timing_logs {
            info!(
                node = %node.id,
                query = %stored.name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "node executed"
            );
        }
        Ok(outcome)
    }

    /// Executor precedence: node backend → stored query's default backend →
    /// context default. Resolution failures fall back with a warning.
    fn executor_for(&self, node: &QueryNode, stored: &StoredQuery) -> Arc<dyn Executor> {
        let backend_id = node
            .backend_id
            .as_deref()
            .or(stored.default_backend.as_deref());
        let Some(backend_id) = backend_id else {
            return self.ctx.default_executor.clone();
        };
        match self.ctx.register.backend(backend_id) {
            Ok(backend) => match self.instantiate(&backend) {
                Ok(executor) => executor,
                Err(err) => {
                    warn!(
                        backend = %backend.id,
                        error = %err,
                        "backend could not be instantiated; using default executor"
                    );
                    self.ctx.default_executor.clone()
                }
            },
            Err(err) => {
                warn!(
                    backend = backend_id,
                    error = %err,
                    "backend could not be resolved; using default executor"
                );
                self.ctx.default_executor.clone()
            }
        }
    }

    fn instantiate(&self, backend: &Backend) -> Result<Arc<dyn Executor>> {
        match backend.backend_type {
            BackendType::Http => {
                let query_url = backend.endpoint.clone().ok_or_else(|| EngineError::Backend {
                    kind: BackendErrorKind::Io,
                    status: None,
                    message: format!("backend '{}' declares no endpoint", backend.id),
                })?;
                let executor = HttpExecutor::new(HttpExecutorConfig {
                    query_url,
                    update_url: None,
                    credentials: backend.credentials.clone(),
                })?;
                Ok(Arc::new(executor))
            }
            BackendType::OxigraphMemory => match &self.ctx.memory_executor {
                Some(memory) => Ok(memory.clone() as Arc<dyn Executor>),
                None => {
                    warn!(
                        backend = %backend.id,
                        "no shared in-process store available; using default executor"
                    );
                    Ok(self.ctx.default_executor.clone())
                }
            },
        }
    }

    /// Final-result precedence over the executed nodes.
    fn select_final_result(
        &self,
        group_id: &str,
        end_node_ids: &[String],
        graph: &GroupGraph,
        mut executed: HashMap<String, QueryOutcome>,
        execution_order: Vec<String>,
    ) -> Result<QueryOutcome> {
        if execution_order.is_empty() {
            return Err(EngineError::NoResult {
                group: group_id.to_string(),
            });
        }

        let last_in_order = |ids: &[&String]| -> Option<String> {
            execution_order
                .iter()
                .filter(|id| ids.contains(id))
                .next_back()
                .cloned()
        };

        let chosen = if !end_node_ids.is_empty() {
            let executed_ends: Vec<&String> = end_node_ids
                .iter()
                .filter(|id| executed.contains_key(*id))
                .collect();
            match executed_ends.len() {
                1 => executed_ends[0].clone(),
                0 => {
                    warn!(group = group_id, "no declared end node executed; using the last executed node");
                    execution_order[execution_order.len() - 1].clone()
                }
                _ => {
                    warn!(group = group_id, "multiple end nodes executed; using the last in traversal order");
                    last_in_order(&executed_ends)
                        .unwrap_or_else(|| execution_order[execution_order.len() - 1].clone())
                }
            }
        } else {
            let leaves: Vec<&String> = execution_order
                .iter()
                .filter(|id| {
                    graph
                        .out_edges
                        .get(*id)
                        .map(|edges| edges.is_empty())
                        .unwrap_or(true)
                })
                .collect();
            match leaves.len() {
                1 => leaves[0].clone(),
                0 => {
                    warn!(group = group_id, "no executed leaf node; using the last executed node");
                    execution_order[execution_order.len() - 1].clone()
                }
                _ => {
                    warn!(group = group_id, "multiple executed leaves; using the last in traversal order");
                    leaves[leaves.len() - 1].to_string()
                }
            }
        };

        executed.remove(&chosen).ok_or_else(|| EngineError::NoResult {
            group: group_id.to_string(),
        })
    }
}

fn build_graph(nodes: &[Arc<QueryNode>], edges: &[Arc<QueryEdge>]) -> GroupGraph {
    let mut nodes_by_id = HashMap::new();
    let mut in_edges: HashMap<String, Vec<Arc<QueryEdge>>> = HashMap::new();
    let mut out_edges: HashMap<String, Vec<Arc<QueryEdge>>> = HashMap::new();
    for node in nodes {
        nodes_by_id.insert(node.id.clone(), node.clone());
        in_edges.entry(node.id.clone()).or_default();
        out_edges.entry(node.id.clone()).or_default();
    }
    for edge in edges {
        in_edges
            .entry(edge.to_node_id.clone())
            .or_default()
            .push(edge.clone());
        out_edges
            .entry(edge.from_node_id.clone())
            .or_default()
            .push(edge.clone());
    }
    GroupGraph {
        nodes_by_id,
        in_edges,
        out_edges,
    }
}

fn reachable_from(start_ids: &[String], graph: &GroupGraph) -> HashSet<String> {
    let mut reachable: HashSet<String> = start_ids.iter().cloned().collect();
    let mut frontier: VecDeque<String> = start_ids.iter().cloned().collect();
    while let Some(id) = frontier.pop_front() {
        if let Some(outgoing) = graph.out_edges.get(&id) {
            for edge in outgoing {
                if reachable.insert(edge.to_node_id.clone()) {
                    frontier.push_back(edge.to_node_id.clone());
                }
            }
        }
    }
    reachable
}
