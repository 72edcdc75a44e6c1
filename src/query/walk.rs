//! Document-order traversal over the parsed algebra.
//!
//! Every container that can hold a `VALUES` block is descended into: groups
//! (joins), OPTIONAL, both UNION branches, MINUS, GRAPH, SERVICE, FILTER
//! expressions with EXISTS / NOT EXISTS, BIND and ORDER BY expressions, and
//! subqueries. Updates descend into the WHERE pattern of DELETE/INSERT
//! operations; data and graph-management operations carry no patterns.
//!
//! The immutable and mutable visitors recurse in the same order, which is
//! what ties detected parameter groups to applied argument sets positionally.

use spargebra::algebra::{Expression, GraphPattern, OrderExpression};
use spargebra::{GraphUpdateOperation, Query, Update};

use super::SparqlOperation;

pub(crate) fn visit_operation<'a>(
    op: &'a SparqlOperation,
    f: &mut impl FnMut(&'a GraphPattern),
) {
    match op {
        SparqlOperation::Query(query) => {
            let (Query::Select { pattern, .. }
            | Query::Construct { pattern, .. }
            | Query::Describe { pattern, .. }
            | Query::Ask { pattern, .. }) = query;
            visit_pattern(pattern, f);
        }
        SparqlOperation::Update(update) => visit_update(update, f),
    }
}

fn visit_update<'a>(update: &'a Update, f: &mut impl FnMut(&'a GraphPattern)) {
    for operation in &update.operations {
        if let GraphUpdateOperation::DeleteInsert { pattern, .. } = operation {
            visit_pattern(pattern, f);
        }
    }
}

pub(crate) fn visit_pattern<'a>(
    pattern: &'a GraphPattern,
    f: &mut impl FnMut(&'a GraphPattern),
) {
    f(pattern);
    match pattern {
        GraphPattern::Bgp { .. } | GraphPattern::Path { .. } | GraphPattern::Values { .. } => {}
        GraphPattern::Join { left, right }
        | GraphPattern::Union { left, right }
        | GraphPattern::Minus { left, right } => {
            visit_pattern(left, f);
            visit_pattern(right, f);
        }
        GraphPattern::LeftJoin {
            left,
            right,
            expression,
        } => {
            visit_pattern(left, f);
            visit_pattern(right, f);
            if let Some(expr) = expression {
                visit_expression(expr, f);
            }
        }
        GraphPattern::Filter { expr, inner } => {
            visit_pattern(inner, f);
            visit_expression(expr, f);
        }
        GraphPattern::Graph { inner, .. } | GraphPattern::Service { inner, .. } => {
            visit_pattern(inner, f);
        }
        GraphPattern::Extend {
            inner, expression, ..
        } => {
            visit_pattern(inner, f);
            visit_expression(expression, f);
        }
        GraphPattern::OrderBy { inner, expression } => {
            visit_pattern(inner, f);
            for order in expression {
                let (OrderExpression::Asc(expr) | OrderExpression::Desc(expr)) = order;
                visit_expression(expr, f);
            }
        }
        GraphPattern::Project { inner, .. }
        | GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::Group { inner, .. } => visit_pattern(inner, f),
        // feature-gated containers (LATERAL under sep-0006) are not descended into
        #[allow(unreachable_patterns)]
        _ => {}
    }
}

fn visit_expression<'a>(expr: &'a Expression, f: &mut impl FnMut(&'a GraphPattern)) {
    match expr {
        Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::Variable(_)
        | Expression::Bound(_) => {}
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            visit_expression(a, f);
            visit_expression(b, f);
        }
        Expression::In(head, rest) => {
            visit_expression(head, f);
            for e in rest {
                visit_expression(e, f);
            }
        }
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            visit_expression(e, f);
        }
        Expression::Exists(pattern) => visit_pattern(pattern, f),
        Expression::If(a, b, c) => {
            visit_expression(a, f);
            visit_expression(b, f);
            visit_expression(c, f);
        }
        Expression::Coalesce(list) => {
            for e in list {
                visit_expression(e, f);
            }
        }
        Expression::FunctionCall(_, args) => {
            for e in args {
                visit_expression(e, f);
            }
        }
    }
}

pub(crate) fn visit_operation_mut(
    op: &mut SparqlOperation,
    f: &mut impl FnMut(&mut GraphPattern),
) {
    match op {
        SparqlOperation::Query(query) => {
            let (Query::Select { pattern, .. }
            | Query::Construct { pattern, .. }
            | Query::Describe { pattern, .. }
            | Query::Ask { pattern, .. }) = query;
            visit_pattern_mut(pattern, f);
        }
        SparqlOperation::Update(update) => {
            for operation in &mut update.operations {
                if let GraphUpdateOperation::DeleteInsert { pattern, .. } = operation {
                    visit_pattern_mut(pattern, f);
                }
            }
        }
    }
}

fn visit_pattern_mut(pattern: &mut GraphPattern, f: &mut impl FnMut(&mut GraphPattern)) {
    f(pattern);
    match pattern {
        GraphPattern::Bgp { .. } | GraphPattern::Path { .. } | GraphPattern::Values { .. } => {}
        GraphPattern::Join { left, right }
        | GraphPattern::Union { left, right }
        | GraphPattern::Minus { left, right } => {
            visit_pattern_mut(left, f);
            visit_pattern_mut(right, f);
        }
        GraphPattern::LeftJoin {
            left,
            right,
            expression,
        } => {
            visit_pattern_mut(left, f);
            visit_pattern_mut(right, f);
            if let Some(expr) = expression {
                visit_expression_mut(expr, f);
            }
        }
        GraphPattern::Filter { expr, inner } => {
            visit_pattern_mut(inner, f);
            visit_expression_mut(expr, f);
        }
        GraphPattern::Graph { inner, .. } | GraphPattern::Service { inner, .. } => {
            visit_pattern_mut(inner, f);
        }
        GraphPattern::Extend {
            inner, expression, ..
        } => {
            visit_pattern_mut(inner, f);
            visit_expression_mut(expression, f);
        }
        GraphPattern::OrderBy { inner, expression } => {
            visit_pattern_mut(inner, f);
            for order in expression {
                let (OrderExpression::Asc(expr) | OrderExpression::Desc(expr)) = order;
                visit_expression_mut(expr, f);
            }
        }
        GraphPattern::Project { inner, .. }
        | GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::Group { inner, .. } => visit_pattern_mut(inner, f),
        #[allow(unreachable_patterns)]
        _ => {}
    }
}

fn visit_expression_mut(expr: &mut Expression, f: &mut impl FnMut(&mut GraphPattern)) {
    match expr {
        Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::Variable(_)
        | Expression::Bound(_) => {}
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            visit_expression_mut(a, f);
            visit_expression_mut(b, f);
        }
        Expression::In(head, rest) => {
            visit_expression_mut(head, f);
            for e in rest {
                visit_expression_mut(e, f);
            }
        }
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) | Expression::Not(e) => {
            visit_expression_mut(e, f);
        }
        Expression::Exists(pattern) => visit_pattern_mut(pattern, f),
        Expression::If(a, b, c) => {
            visit_expression_mut(a, f);
            visit_expression_mut(b, f);
            visit_expression_mut(c, f);
        }
        Expression::Coalesce(list) => {
            for e in list {
                visit_expression_mut(e, f);
            }
        }
        Expression::FunctionCall(_, args) => {
            for e in args {
                visit_expression_mut(e, f);
            }
        }
    }
}
