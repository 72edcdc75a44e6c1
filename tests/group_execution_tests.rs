//! Query-group orchestration scenarios against a scripted backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parql::{
    ArgumentSet, ArgumentTermKind, Backend, BackendType, Binding, BoundTerm, EngineError,
    EntityRef, EntityRegister, ExecOptions, ExecutionContext, ExecutionRequest, Executor,
    GroupRunner, MemoryExecutor, ParameterMapping, ParsedQuery, QueryEdge, QueryGroup, QueryNode,
    QueryOutcome, ResultSet, StoredQuery,
};

/// Scripted executor: each fixture pairs a recognizable fragment of the
/// query text with the result set to return. Every executed query is
/// recorded for later assertions.
struct ScriptedExecutor {
    fixtures: Vec<(&'static str, ResultSet)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(fixtures: Vec<(&'static str, ResultSet)>) -> Self {
        Self {
            fixtures,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn select(&self, query: &ParsedQuery, _opts: &ExecOptions) -> parql::Result<ResultSet> {
        let text = query.to_sparql();
        self.calls.lock().unwrap().push(text.clone());
        for (needle, results) in &self.fixtures {
            if text.contains(needle) {
                return Ok(results.clone());
            }
        }
        Ok(ResultSet::select(Vec::new(), Vec::new()))
    }

    async fn construct(&self, query: &ParsedQuery, _opts: &ExecOptions) -> parql::Result<String> {
        let text = query.to_sparql();
        self.calls.lock().unwrap().push(text);
        Ok("<http://x/s> <http://x/p> <http://x/o> .\n".to_string())
    }

    async fn ask(&self, query: &ParsedQuery, _opts: &ExecOptions) -> parql::Result<bool> {
        self.calls.lock().unwrap().push(query.to_sparql());
        Ok(true)
    }

    async fn update(&self, _update: &ParsedQuery) -> parql::Result<()> {
        Ok(())
    }
}

fn uri_row(pairs: &[(&str, &str)]) -> Binding {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), BoundTerm::uri(*v)))
        .collect()
}

fn node(id: &str, query_id: &str) -> EntityRef<QueryNode> {
    EntityRef::Inline(QueryNode {
        id: id.into(),
        query_id: query_id.into(),
        backend_id: None,
    })
}

fn edge(id: &str, from: &str, to: &str, mappings: &[(&str, &str)]) -> EntityRef<QueryEdge> {
    EntityRef::Inline(QueryEdge {
        id: id.into(),
        from_node_id: from.into(),
        to_node_id: to.into(),
        mappings: mappings
            .iter()
            .map(|(f, t)| ParameterMapping {
                from_param: f.to_string(),
                to_param: t.to_string(),
            })
            .collect(),
    })
}

fn group(id: &str, nodes: Vec<EntityRef<QueryNode>>, edges: Vec<EntityRef<QueryEdge>>) -> QueryGroup {
    QueryGroup {
        id: id.into(),
        nodes,
        edges,
        start_node_ids: Vec::new(),
        end_node_ids: Vec::new(),
    }
}

fn runner_with(
    register: EntityRegister,
    executor: Arc<ScriptedExecutor>,
) -> GroupRunner {
    GroupRunner::new(ExecutionContext::new(Arc::new(register), executor))
}

const QUERY_A: &str = "SELECT ?s ?p WHERE { ?s a <http://x/T> ; ?p ?v }";
const QUERY_B: &str = "SELECT ?o WHERE { VALUES ?s { UNDEF } ?s <http://x/p> ?o }";

fn fixture_a() -> ResultSet {
    ResultSet::select(
        vec!["s".into(), "p".into()],
        vec![uri_row(&[("s", "http://a/1"), ("p", "http://a/2")])],
    )
}

fn fixture_b() -> ResultSet {
    ResultSet::select(
        vec!["o".into()],
        vec![vec![("o".to_string(), BoundTerm::literal("hit"))]
            .into_iter()
            .collect()],
    )
}

fn two_node_register() -> EntityRegister {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_group(group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb")],
        vec![edge("e1", "n1", "n2", &[("s", "s")])],
    ));
    register
}

#[tokio::test]
async fn chained_group_routes_mapped_bindings() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ("http://x/T", fixture_a()),
        ("http://x/p", fixture_b()),
    ]));
    let runner = runner_with(two_node_register(), executor.clone());

    let outcome = runner.run(&ExecutionRequest::group("g1")).await.unwrap();
    let results = outcome.as_select().expect("select outcome");
    assert_eq!(results.bindings()[0].get("o"), Some(&BoundTerm::literal("hit")));

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    // Only ?s was mapped across the edge: the VALUES row carries the
    // subject IRI, and the unmapped ?p never leaks into node B.
    assert!(calls[1].contains("<http://a/1>"), "{}", calls[1]);
    assert!(!calls[1].contains("http://a/2"), "{}", calls[1]);
    assert!(!calls[1].contains("UNDEF"), "{}", calls[1]);
}

#[tokio::test]
async fn type_mismatch_at_the_hop_carries_context() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(
        StoredQuery::introspect("qb", "expand", QUERY_B)
            .unwrap()
            .with_allowed_types("s", vec![ArgumentTermKind::Uri]),
    );
    register.insert_group(group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb")],
        vec![edge("e1", "n1", "n2", &[("s", "s")])],
    ));

    let literal_subject = ResultSet::select(
        vec!["s".into()],
        vec![vec![("s".to_string(), BoundTerm::literal("not-a-uri"))]
            .into_iter()
            .collect()],
    );
    let executor = Arc::new(ScriptedExecutor::new(vec![("http://x/T", literal_subject)]));
    let runner = runner_with(register, executor);

    let err = runner.run(&ExecutionRequest::group("g1")).await.unwrap_err();
    match err {
        EngineError::TypeMismatch {
            param,
            expected,
            got,
            row,
            source,
            target_node,
        } => {
            assert_eq!(param, "s");
            assert_eq!(expected, vec!["uri".to_string()]);
            assert_eq!(got, "literal");
            assert_eq!(row, 0);
            assert_eq!(source, "edge e1");
            assert_eq!(target_node, "n2");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn parameterless_query_executes_unchanged_without_arguments() {
    let mut register = EntityRegister::new();
    let text = "SELECT ?s WHERE { ?s ?p ?o }";
    register.insert_query(StoredQuery::introspect("q1", "plain", text).unwrap());
    register.insert_group(group("g1", vec![node("n1", "q1")], vec![]));

    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let runner = runner_with(register, executor.clone());
    runner.run(&ExecutionRequest::group("g1")).await.unwrap();

    assert_eq!(executor.calls(), vec![text.to_string()]);
}

#[tokio::test]
async fn initial_arguments_feed_the_start_node() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_group(group("g1", vec![node("n1", "qb")], vec![]));

    let executor = Arc::new(ScriptedExecutor::new(vec![("http://x/p", fixture_b())]));
    let runner = runner_with(register, executor.clone());

    let request = ExecutionRequest::group("g1").with_initial_arguments(ArgumentSet::new(
        vec!["s".into()],
        vec![uri_row(&[("s", "http://seed/1")])],
    ));
    runner.run(&request).await.unwrap();

    let calls = executor.calls();
    assert!(calls[0].contains("<http://seed/1>"), "{}", calls[0]);
    assert!(!calls[0].contains("UNDEF"), "{}", calls[0]);
}

#[tokio::test]
async fn disjoint_edges_union_merge_with_partial_rows() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "left", QUERY_A).unwrap());
    register.insert_query(
        StoredQuery::introspect(
            "qc",
            "right",
            "SELECT ?t WHERE { ?t a <http://x/U> }",
        )
        .unwrap(),
    );
    register.insert_query(
        StoredQuery::introspect(
            "qm",
            "merge",
            "SELECT * WHERE { VALUES (?a ?b) { (UNDEF UNDEF) } ?a <http://x/q> ?b }",
        )
        .unwrap(),
    );
    register.insert_group(group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qc"), node("n3", "qm")],
        vec![
            edge("e1", "n1", "n3", &[("s", "a")]),
            edge("e2", "n2", "n3", &[("t", "b")]),
        ],
    ));

    let right = ResultSet::select(
        vec!["t".into()],
        vec![uri_row(&[("t", "http://b/9")])],
    );
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ("http://x/T", fixture_a()),
        ("http://x/U", right),
    ]));
    let runner = runner_with(register, executor.clone());
    runner.run(&ExecutionRequest::group("g1")).await.unwrap();

    let calls = executor.calls();
    let merge_call = calls.last().unwrap();
    // One row per incoming edge, each partially bound: the other edge's
    // variable stays UNDEF inside that row.
    assert!(merge_call.contains("<http://a/1>"), "{merge_call}");
    assert!(merge_call.contains("<http://b/9>"), "{merge_call}");
    assert!(merge_call.contains("UNDEF"), "{merge_call}");
}

#[tokio::test]
async fn runs_are_deterministic_for_fixed_fixtures() {
    let fixtures = || {
        vec![
            ("http://x/T", fixture_a()),
            ("http://x/p", fixture_b()),
        ]
    };
    let executor1 = Arc::new(ScriptedExecutor::new(fixtures()));
    let executor2 = Arc::new(ScriptedExecutor::new(fixtures()));
    let outcome1 = runner_with(two_node_register(), executor1.clone())
        .run(&ExecutionRequest::group("g1"))
        .await
        .unwrap();
    let outcome2 = runner_with(two_node_register(), executor2.clone())
        .run(&ExecutionRequest::group("g1"))
        .await
        .unwrap();
    assert_eq!(outcome1, outcome2);
    assert_eq!(executor1.calls(), executor2.calls());
}

#[tokio::test]
async fn cyclic_group_with_declared_start_is_rejected() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    let mut cyclic = group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb")],
        vec![
            edge("e1", "n1", "n2", &[("s", "s")]),
            edge("e2", "n2", "n1", &[("o", "s")]),
        ],
    );
    cyclic.start_node_ids = vec!["n1".into()];
    register.insert_group(cyclic);

    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let runner = runner_with(register, executor);
    let err = runner.run(&ExecutionRequest::group("g1")).await.unwrap_err();
    assert!(matches!(err, EngineError::CyclicGraph { .. }), "{err:?}");
}

#[tokio::test]
async fn cyclic_group_without_starts_is_ambiguous() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_group(group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb")],
        vec![
            edge("e1", "n1", "n2", &[("s", "s")]),
            edge("e2", "n2", "n1", &[("o", "s")]),
        ],
    ));

    let runner = runner_with(register, Arc::new(ScriptedExecutor::new(vec![])));
    let err = runner.run(&ExecutionRequest::group("g1")).await.unwrap_err();
    assert!(matches!(err, EngineError::AmbiguousStartSet { .. }), "{err:?}");
}

#[tokio::test]
async fn updates_inside_groups_are_forbidden() {
    let mut register = EntityRegister::new();
    register.insert_query(
        StoredQuery::introspect(
            "u1",
            "retract",
            "DELETE { ?s ?p ?o } WHERE { ?s ?p ?o }",
        )
        .unwrap(),
    );
    register.insert_group(group("g1", vec![node("n1", "u1")], vec![]));

    let runner = runner_with(register, Arc::new(ScriptedExecutor::new(vec![])));
    let err = runner.run(&ExecutionRequest::group("g1")).await.unwrap_err();
    assert!(
        matches!(err, EngineError::UpdateNotAllowed { node } if node == "n1"),
        "unexpected error"
    );
}

#[tokio::test]
async fn declared_end_node_wins_over_later_leaves() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_query(
        StoredQuery::introspect("qc", "tail", "SELECT ?t WHERE { ?t a <http://x/U> }").unwrap(),
    );
    let mut g = group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb"), node("n3", "qc")],
        vec![
            edge("e1", "n1", "n2", &[("s", "s")]),
            edge("e2", "n1", "n3", &[]),
        ],
    );
    g.end_node_ids = vec!["n2".into()];
    register.insert_group(g);

    let tail = ResultSet::select(vec!["t".into()], vec![uri_row(&[("t", "http://c/1")])]);
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ("http://x/T", fixture_a()),
        ("http://x/p", fixture_b()),
        ("http://x/U", tail),
    ]));
    let runner = runner_with(register, executor);

    let outcome = runner.run(&ExecutionRequest::group("g1")).await.unwrap();
    let results = outcome.as_select().expect("select outcome");
    assert_eq!(results.bindings()[0].get("o"), Some(&BoundTerm::literal("hit")));
}

#[tokio::test]
async fn without_end_declaration_the_last_leaf_wins() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_query(
        StoredQuery::introspect("qc", "tail", "SELECT ?t WHERE { ?t a <http://x/U> }").unwrap(),
    );
    register.insert_group(group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb"), node("n3", "qc")],
        vec![
            edge("e1", "n1", "n2", &[("s", "s")]),
            edge("e2", "n1", "n3", &[]),
        ],
    ));

    let tail = ResultSet::select(vec!["t".into()], vec![uri_row(&[("t", "http://c/1")])]);
    let executor = Arc::new(ScriptedExecutor::new(vec![
        ("http://x/T", fixture_a()),
        ("http://x/p", fixture_b()),
        ("http://x/U", tail.clone()),
    ]));
    let runner = runner_with(register, executor);

    let outcome = runner.run(&ExecutionRequest::group("g1")).await.unwrap();
    // n2 and n3 are both leaves; n3 executes after n2 (edge order), so its
    // result is selected.
    assert_eq!(outcome.as_select(), Some(&tail));
}

#[tokio::test]
async fn ask_and_construct_nodes_produce_their_own_outcome_kinds() {
    let mut register = EntityRegister::new();
    register.insert_query(
        StoredQuery::introspect("ask1", "probe", "ASK { ?s ?p ?o }").unwrap(),
    );
    register.insert_query(
        StoredQuery::introspect(
            "con1",
            "export",
            "CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }",
        )
        .unwrap(),
    );
    register.insert_group(group("ga", vec![node("n1", "ask1")], vec![]));
    register.insert_group(group("gc", vec![node("n1c", "con1")], vec![]));

    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let runner = GroupRunner::new(ExecutionContext::new(Arc::new(register), executor));
    let ask = runner.run(&ExecutionRequest::group("ga")).await.unwrap();
    assert_eq!(ask, QueryOutcome::Boolean(true));

    let constructed = runner.run(&ExecutionRequest::group("gc")).await.unwrap();
    match constructed {
        QueryOutcome::Graph { media_type, data } => {
            assert_eq!(media_type, "application/n-quads");
            assert!(data.contains("<http://x/s>"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn missing_stored_query_is_an_unresolved_reference() {
    let mut register = EntityRegister::new();
    register.insert_group(group("g1", vec![node("n1", "ghost")], vec![]));
    let runner = runner_with(register, Arc::new(ScriptedExecutor::new(vec![])));
    let err = runner.run(&ExecutionRequest::group("g1")).await.unwrap_err();
    assert!(matches!(err, EngineError::UnresolvedReference { .. }), "{err:?}");
}

#[test]
fn plan_reports_layers_and_open_parameters() {
    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let runner = runner_with(two_node_register(), executor);

    let plan = runner.plan("g1").unwrap();
    assert_eq!(
        plan.layers,
        vec![vec!["n1".to_string()], vec!["n2".to_string()]]
    );
    // n2's parameter ?s is fed by edge e1, so nothing remains open.
    assert!(plan.open_parameters.is_empty());
}

#[test]
fn plan_flags_parameters_no_edge_feeds() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_group(group("g1", vec![node("n1", "qb")], vec![]));

    let runner = runner_with(register, Arc::new(ScriptedExecutor::new(vec![])));
    let plan = runner.plan("g1").unwrap();
    assert_eq!(
        plan.open_parameters,
        vec![("n1".to_string(), vec!["s".to_string()])]
    );
}

#[test]
fn plan_rejects_cycles() {
    let mut register = EntityRegister::new();
    register.insert_query(StoredQuery::introspect("qa", "roots", QUERY_A).unwrap());
    register.insert_query(StoredQuery::introspect("qb", "expand", QUERY_B).unwrap());
    register.insert_group(group(
        "g1",
        vec![node("n1", "qa"), node("n2", "qb")],
        vec![
            edge("e1", "n1", "n2", &[("s", "s")]),
            edge("e2", "n2", "n1", &[("o", "s")]),
        ],
    ));
    let runner = runner_with(register, Arc::new(ScriptedExecutor::new(vec![])));
    let err = runner.plan("g1").unwrap_err();
    assert!(
        matches!(err, EngineError::CyclicGraph { pending: 2, .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn limit_placeholder_values_come_from_the_request() {
    let mut register = EntityRegister::new();
    register.insert_query(
        StoredQuery::introspect(
            "q1",
            "paged",
            "SELECT ?s WHERE { ?s ?p ?o } LIMIT 000100",
        )
        .unwrap(),
    );
    register.insert_group(group("g1", vec![node("n1", "q1")], vec![]));

    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let runner = runner_with(register, executor.clone());
    runner
        .run(&ExecutionRequest::group("g1").with_limit(25))
        .await
        .unwrap();
    assert!(executor.calls()[0].contains("LIMIT 25"), "{}", executor.calls()[0]);
}

#[tokio::test]
async fn oxigraph_memory_backend_serves_pinned_nodes() {
    use oxigraph::model::{GraphName, NamedNode, Quad};

    let memory = Arc::new(MemoryExecutor::new().unwrap());
    for object in ["http://m/o1", "http://m/o2"] {
        let quad = Quad::new(
            NamedNode::new("http://m/s").unwrap(),
            NamedNode::new("http://m/p").unwrap(),
            NamedNode::new(object).unwrap(),
            GraphName::DefaultGraph,
        );
        memory.store().insert(&quad).unwrap();
    }

    let mut register = EntityRegister::new();
    register.insert_query(
        StoredQuery::introspect(
            "q1",
            "objects",
            "SELECT ?o WHERE { VALUES ?s { UNDEF } ?s <http://m/p> ?o }",
        )
        .unwrap(),
    );
    register.insert_backend(Backend {
        id: "mem".into(),
        backend_type: BackendType::OxigraphMemory,
        endpoint: None,
        credentials: None,
    });
    register.insert_group(group(
        "g1",
        vec![EntityRef::Inline(QueryNode {
            id: "n1".into(),
            query_id: "q1".into(),
            backend_id: Some("mem".into()),
        })],
        vec![],
    ));

    let scripted = Arc::new(ScriptedExecutor::new(vec![]));
    let ctx = ExecutionContext::new(Arc::new(register), scripted)
        .with_memory_executor(memory);
    let runner = GroupRunner::new(ctx);

    let request = ExecutionRequest::group("g1").with_initial_arguments(ArgumentSet::new(
        vec!["s".into()],
        vec![uri_row(&[("s", "http://m/s")])],
    ));
    let outcome = runner.run(&request).await.unwrap();
    let results = outcome.as_select().expect("select outcome");
    assert_eq!(results.bindings().len(), 2);
}
