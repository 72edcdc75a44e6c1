//! SELECT projection introspection.

use spargebra::Query;
use spargebra::algebra::GraphPattern;

use super::SparqlOperation;

/// Projection variable names of a SELECT query, sorted lexicographically.
///
/// `SELECT (expr AS ?v)` reports `v`; `SELECT *` falls back to the
/// variables visible in the WHERE clause. Non-SELECT operations report
/// nothing.
pub(crate) fn output_variables(op: &SparqlOperation) -> Vec<String> {
    let SparqlOperation::Query(Query::Select { pattern, .. }) = op else {
        return Vec::new();
    };

    // Peel the solution modifiers that wrap the projection.
    let mut child = pattern;
    loop {
        match child {
            GraphPattern::OrderBy { inner, .. }
            | GraphPattern::Distinct { inner }
            | GraphPattern::Reduced { inner }
            | GraphPattern::Slice { inner, .. } => child = inner,
            GraphPattern::Project { variables, .. } => {
                let mut names: Vec<String> =
                    variables.iter().map(|v| v.as_str().to_string()).collect();
                names.sort();
                return names;
            }
            other => {
                // SELECT *: every in-scope variable of the WHERE clause.
                let mut names = Vec::new();
                other.on_in_scope_variable(|v| names.push(v.as_str().to_string()));
                names.sort();
                names.dedup();
                return names;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::query::ParsedQuery;

    fn outputs(text: &str) -> Vec<String> {
        ParsedQuery::parse(text).unwrap().output_variables()
    }

    #[test]
    fn explicit_projection_is_sorted() {
        assert_eq!(
            outputs("SELECT ?p ?s WHERE { ?s ?p ?o }"),
            vec!["p".to_string(), "s".to_string()]
        );
    }

    #[test]
    fn alias_projects_the_alias_name() {
        assert_eq!(
            outputs("SELECT (COUNT(?s) AS ?count) WHERE { ?s ?p ?o }"),
            vec!["count".to_string()]
        );
        assert_eq!(
            outputs("SELECT ?s (STR(?o) AS ?label) WHERE { ?s ?p ?o }"),
            vec!["label".to_string(), "s".to_string()]
        );
    }

    #[test]
    fn star_reports_where_variables() {
        assert_eq!(
            outputs("SELECT * WHERE { ?s ?p ?o }"),
            vec!["o".to_string(), "p".to_string(), "s".to_string()]
        );
    }

    #[test]
    fn star_with_modifiers() {
        assert_eq!(
            outputs("SELECT DISTINCT * WHERE { ?s ?p ?o } ORDER BY ?s LIMIT 5"),
            vec!["o".to_string(), "p".to_string(), "s".to_string()]
        );
    }

    #[test]
    fn non_select_reports_nothing() {
        assert!(outputs("ASK { ?s ?p ?o }").is_empty());
        assert!(outputs("CONSTRUCT { ?s ?p ?o } WHERE { ?s ?p ?o }").is_empty());
        assert!(outputs("DELETE { ?s ?p ?o } WHERE { ?s ?p ?o }").is_empty());
    }
}
