//! SQL front end: statement AST, tokenizer, parser and formatter
//!
//! Only the subset the router needs to classify and rewrite statements is
//! supported: SELECT (with joins, filters, grouping, ordering and limits),
//! INSERT ... VALUES, UPDATE and DELETE.

mod ast;
mod errors;
mod lexer;
mod parser;

pub use ast::{
    and_filter, split_and, Assignment, BinaryOp, ColName, ComparisonOp, Delete, Expr, FuncArg,
    Insert, JoinKind, JoinTableExpr, Limit, Literal, OrderBy, Select, SelectExpr, Statement,
    TableExpr, TableName, Update,
};
pub use errors::{SqlError, SqlResult};
pub use parser::parse;
