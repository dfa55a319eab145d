use std::ops::ControlFlow;

use sqlparser::ast::{Query, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::core::ValidationError::{self, InvalidQuery, UnknownStatement, UnsupportedStatement};

/// Accepts exactly one read-only statement.
///
/// This is the only check standing between a caller and the backend, so
/// everything that is not a plain query is refused: mutations and schema
/// changes by name, anything else as unknown.
pub fn validate(query: &str) -> Result<(), ValidationError> {
    let statements =
        Parser::parse_sql(&GenericDialect {}, query).map_err(|e| InvalidQuery(e.to_string()))?;
    let stmt = match statements.as_slice() {
        [] => return Err(InvalidQuery("empty statement".to_string())),
        [stmt] => stmt,
        _ => {
            return Err(InvalidQuery(
                "multiple statements are not supported".to_string(),
            ));
        }
    };

    match stmt {
        Statement::Query(query) => match mutating_query(query) {
            Some(kind) => Err(UnsupportedStatement(kind.to_string())),
            None => Ok(()),
        },
        Statement::Insert { .. } => Err(UnsupportedStatement("Insert".to_string())),
        Statement::Update { .. } => Err(UnsupportedStatement("Update".to_string())),
        Statement::Delete { .. } => Err(UnsupportedStatement("Delete".to_string())),
        Statement::Merge { .. } => Err(UnsupportedStatement("Merge".to_string())),
        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. } => Err(UnsupportedStatement("DDL".to_string())),
        other => Err(UnknownStatement(statement_kind(other))),
    }
}

/// Finds data-modifying parts anywhere in a query tree: `SELECT ... INTO`,
/// or INSERT/UPDATE/DELETE/MERGE used as a CTE, set operand or query body,
/// at any subquery depth.
struct WriteFinder;

impl Visitor for WriteFinder {
    type Break = &'static str;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        match mutating_set_expr(&query.body) {
            Some(kind) => ControlFlow::Break(kind),
            None => ControlFlow::Continue(()),
        }
    }

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Query(_) => ControlFlow::Continue(()),
            Statement::Insert { .. } => ControlFlow::Break("Insert"),
            Statement::Update { .. } => ControlFlow::Break("Update"),
            Statement::Delete { .. } => ControlFlow::Break("Delete"),
            Statement::Merge { .. } => ControlFlow::Break("Merge"),
            _ => ControlFlow::Break("Statement"),
        }
    }
}

fn mutating_query(query: &Query) -> Option<&'static str> {
    match query.visit(&mut WriteFinder) {
        ControlFlow::Break(kind) => Some(kind),
        ControlFlow::Continue(()) => None,
    }
}

/// Nested `Query` nodes are reached by the visitor; set operands are not.
fn mutating_set_expr(expr: &SetExpr) -> Option<&'static str> {
    match expr {
        SetExpr::Select(select) if select.into.is_some() => Some("SelectInto"),
        SetExpr::Select(_) | SetExpr::Query(_) | SetExpr::Values(_) | SetExpr::Table(_) => None,
        SetExpr::SetOperation { left, right, .. } => {
            mutating_set_expr(left).or_else(|| mutating_set_expr(right))
        }
        SetExpr::Insert(_) => Some("Insert"),
        SetExpr::Update(_) => Some("Update"),
        SetExpr::Delete(_) => Some("Delete"),
        SetExpr::Merge(_) => Some("Merge"),
    }
}

/// Variant name of the statement, e.g. `ShowTables`.
fn statement_kind(stmt: &Statement) -> String {
    let debug = format!("{stmt:?}");
    debug
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default()
        .to_string()
}
