//! Statement AST and its canonical SQL rendering
//!
//! Rendering is lower-case and single-spaced, e.g.
//! `select u1.id from user as u1 where u1.id = 1`. Queries the planner
//! generates for individual shards are produced by formatting these nodes.

use std::fmt;

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<Select>),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    /// Returns true for statements that may be streamed
    pub fn is_select(&self) -> bool {
        matches!(self, Statement::Select(_))
    }
}

/// SELECT statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub exprs: Vec<SelectExpr>,
    pub from: Vec<TableExpr>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    /// `*` or `t.*`
    Star(Option<String>),
    /// Expression with optional alias
    Expr { expr: Expr, alias: Option<String> },
}

/// A possibly keyspace-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub qualifier: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }
}

/// Element of a FROM clause
#[derive(Debug, Clone, PartialEq)]
pub enum TableExpr {
    /// `name [as alias]`
    Table {
        name: TableName,
        alias: Option<String>,
    },
    /// `left <kind> right [on expr]`
    Join(Box<JoinTableExpr>),
    /// `( table_exprs )`
    Paren(Vec<TableExpr>),
}

impl TableExpr {
    /// Name the table is referenced by in expressions: alias, else table name
    pub fn table_alias(&self) -> Option<&str> {
        match self {
            TableExpr::Table { name, alias } => Some(alias.as_deref().unwrap_or(&name.name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinTableExpr {
    pub left: TableExpr,
    pub kind: JoinKind,
    pub right: TableExpr,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Straight,
    Left,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "join",
            JoinKind::Straight => "straight_join",
            JoinKind::Left => "left join",
            JoinKind::Cross => "cross join",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub offset: Option<Expr>,
    pub rowcount: Expr,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: TableName,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
}

/// Single `column = expr` assignment of an UPDATE
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColName,
    pub value: Expr,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: TableName,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: TableName,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
}

/// Column reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColName {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColName {
    pub fn new(qualifier: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal, kept as written
    Integer(String),
    /// Floating point literal, kept as written
    Float(String),
    /// Unquoted string contents
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Like,
    NotLike,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
            ComparisonOp::In => "in",
            ComparisonOp::NotIn => "not in",
            ComparisonOp::Like => "like",
            ComparisonOp::NotLike => "not like",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FuncArg {
    Star,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColName),
    Literal(Literal),
    /// `:name`
    BindVar(String),
    /// `::name`, expands to a list
    ListArg(String),
    Tuple(Vec<Expr>),
    Subquery(Box<Select>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Comparison {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Func {
        name: String,
        distinct: bool,
        args: Vec<FuncArg>,
    },
    Paren(Box<Expr>),
}

impl Expr {
    pub fn column(qualifier: Option<&str>, name: &str) -> Self {
        Expr::Column(ColName::new(qualifier, name))
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(Literal::Integer(v.to_string()))
    }

    pub fn comparison(left: Expr, op: ComparisonOp, right: Expr) -> Self {
        Expr::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// The always-false predicate used for fields-only queries
    pub fn impossible() -> Self {
        Expr::comparison(Expr::int(1), ComparisonOp::NotEq, Expr::int(1))
    }

    /// Visits every column reference, not descending into subqueries
    pub fn visit_columns<'a>(&'a self, f: &mut dyn FnMut(&'a ColName)) {
        match self {
            Expr::Column(col) => f(col),
            Expr::Literal(_) | Expr::BindVar(_) | Expr::ListArg(_) | Expr::Subquery(_) => {}
            Expr::Tuple(items) => items.iter().for_each(|e| e.visit_columns(f)),
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.visit_columns(f);
                r.visit_columns(f);
            }
            Expr::Comparison { left, right, .. } | Expr::Binary { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Expr::Not(e) | Expr::Neg(e) | Expr::Paren(e) => e.visit_columns(f),
            Expr::IsNull { expr, .. } => expr.visit_columns(f),
            Expr::Func { args, .. } => {
                for arg in args {
                    if let FuncArg::Expr(e) = arg {
                        e.visit_columns(f);
                    }
                }
            }
        }
    }

    /// Rewrites every column reference in place
    pub fn rewrite_columns(&mut self, f: &mut dyn FnMut(&ColName) -> Option<Expr>) {
        match self {
            Expr::Column(col) => {
                if let Some(replacement) = f(col) {
                    *self = replacement;
                }
            }
            Expr::Literal(_) | Expr::BindVar(_) | Expr::ListArg(_) | Expr::Subquery(_) => {}
            Expr::Tuple(items) => items.iter_mut().for_each(|e| e.rewrite_columns(f)),
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.rewrite_columns(f);
                r.rewrite_columns(f);
            }
            Expr::Comparison { left, right, .. } | Expr::Binary { left, right, .. } => {
                left.rewrite_columns(f);
                right.rewrite_columns(f);
            }
            Expr::Not(e) | Expr::Neg(e) | Expr::Paren(e) => e.rewrite_columns(f),
            Expr::IsNull { expr, .. } => expr.rewrite_columns(f),
            Expr::Func { args, .. } => {
                for arg in args {
                    if let FuncArg::Expr(e) = arg {
                        e.rewrite_columns(f);
                    }
                }
            }
        }
    }

    /// Returns true if a subquery appears anywhere in the expression
    pub fn contains_subquery(&self) -> bool {
        match self {
            Expr::Subquery(_) => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::BindVar(_) | Expr::ListArg(_) => false,
            Expr::Tuple(items) => items.iter().any(Expr::contains_subquery),
            Expr::And(l, r) | Expr::Or(l, r) => l.contains_subquery() || r.contains_subquery(),
            Expr::Comparison { left, right, .. } | Expr::Binary { left, right, .. } => {
                left.contains_subquery() || right.contains_subquery()
            }
            Expr::Not(e) | Expr::Neg(e) | Expr::Paren(e) => e.contains_subquery(),
            Expr::IsNull { expr, .. } => expr.contains_subquery(),
            Expr::Func { args, .. } => args.iter().any(|a| match a {
                FuncArg::Star => false,
                FuncArg::Expr(e) => e.contains_subquery(),
            }),
        }
    }

    /// Returns true for aggregate function calls at the top of the expression
    pub fn is_aggregate(&self) -> bool {
        match self {
            Expr::Func { name, .. } => matches!(
                name.to_ascii_lowercase().as_str(),
                "count" | "sum" | "min" | "max" | "avg" | "group_concat"
            ),
            _ => false,
        }
    }
}

/// Splits a predicate into its top-level AND conjuncts
pub fn split_and(expr: Expr) -> Vec<Expr> {
    let mut out = Vec::new();
    collect_and(expr, &mut out);
    out
}

fn collect_and(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::And(l, r) => {
            collect_and(*l, out);
            collect_and(*r, out);
        }
        Expr::Paren(inner) if matches!(*inner, Expr::And(..)) => collect_and(*inner, out),
        other => out.push(other),
    }
}

/// AND-combines an existing filter with a new conjunct.
///
/// OR conjuncts are parenthesised so the rendered SQL keeps its meaning.
pub fn and_filter(existing: Option<Expr>, conjunct: Expr) -> Expr {
    let conjunct = match conjunct {
        or @ Expr::Or(..) => Expr::Paren(Box::new(or)),
        other => other,
    };
    match existing {
        None => conjunct,
        Some(Expr::Or(l, r)) => Expr::And(
            Box::new(Expr::Paren(Box::new(Expr::Or(l, r)))),
            Box::new(conjunct),
        ),
        Some(prev) => Expr::And(Box::new(prev), Box::new(conjunct)),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_order_limit(
    f: &mut fmt::Formatter<'_>,
    order_by: &[OrderBy],
    limit: &Option<Limit>,
) -> fmt::Result {
    if !order_by.is_empty() {
        write!(f, " order by ")?;
        write_list(f, order_by)?;
    }
    if let Some(limit) = limit {
        write!(f, "{}", limit)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(s) => write!(f, "{}", s),
            Statement::Insert(s) => write!(f, "{}", s),
            Statement::Update(s) => write!(f, "{}", s),
            Statement::Delete(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select ")?;
        if self.distinct {
            write!(f, "distinct ")?;
        }
        write_list(f, &self.exprs)?;
        if !self.from.is_empty() {
            write!(f, " from ")?;
            write_list(f, &self.from)?;
        }
        if let Some(filter) = &self.where_clause {
            write!(f, " where {}", filter)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " group by ")?;
            write_list(f, &self.group_by)?;
        }
        if let Some(having) = &self.having {
            write!(f, " having {}", having)?;
        }
        write_order_limit(f, &self.order_by, &self.limit)
    }
}

impl fmt::Display for SelectExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectExpr::Star(None) => write!(f, "*"),
            SelectExpr::Star(Some(q)) => write!(f, "{}.*", q),
            SelectExpr::Expr { expr, alias: None } => write!(f, "{}", expr),
            SelectExpr::Expr {
                expr,
                alias: Some(alias),
            } => write!(f, "{} as {}", expr, alias),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Display for TableExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableExpr::Table { name, alias: None } => write!(f, "{}", name),
            TableExpr::Table {
                name,
                alias: Some(alias),
            } => write!(f, "{} as {}", name, alias),
            TableExpr::Join(join) => {
                write!(f, "{} {} {}", join.left, join.kind.as_str(), join.right)?;
                if let Some(on) = &join.on {
                    write!(f, " on {}", on)?;
                }
                Ok(())
            }
            TableExpr::Paren(inner) => {
                write!(f, "(")?;
                write_list(f, inner)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.desc {
            write!(f, "{} desc", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.offset {
            Some(offset) => write!(f, " limit {}, {}", offset, self.rowcount),
            None => write!(f, " limit {}", self.rowcount),
        }
    }
}

impl fmt::Display for Insert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insert into {}", self.table)?;
        if !self.columns.is_empty() {
            write!(f, "(")?;
            write_list(f, &self.columns)?;
            write!(f, ")")?;
        }
        write!(f, " values ")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "(")?;
            write_list(f, row)?;
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update {} set ", self.table)?;
        write_list(f, &self.assignments)?;
        if let Some(filter) = &self.where_clause {
            write!(f, " where {}", filter)?;
        }
        write_order_limit(f, &self.order_by, &self.limit)
    }
}

impl fmt::Display for Delete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delete from {}", self.table)?;
        if let Some(filter) = &self.where_clause {
            write!(f, " where {}", filter)?;
        }
        write_order_limit(f, &self.order_by, &self.limit)
    }
}

impl fmt::Display for ColName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(s) | Literal::Float(s) => write!(f, "{}", s),
            Literal::String(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
            Literal::Bool(true) => write!(f, "true"),
            Literal::Bool(false) => write!(f, "false"),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for FuncArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncArg::Star => write!(f, "*"),
            FuncArg::Expr(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::BindVar(name) => write!(f, ":{}", name),
            Expr::ListArg(name) => write!(f, "::{}", name),
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Subquery(select) => write!(f, "({})", select),
            Expr::And(l, r) => write!(f, "{} and {}", l, r),
            Expr::Or(l, r) => write!(f, "{} or {}", l, r),
            Expr::Not(e) => write!(f, "not {}", e),
            Expr::Comparison { left, op, right } => {
                write!(f, "{} {} {}", left, op.as_str(), right)
            }
            Expr::IsNull {
                expr,
                negated: false,
            } => write!(f, "{} is null", expr),
            Expr::IsNull {
                expr,
                negated: true,
            } => write!(f, "{} is not null", expr),
            Expr::Binary { left, op, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::Neg(e) => write!(f, "-{}", e),
            Expr::Func {
                name,
                distinct,
                args,
            } => {
                write!(f, "{}(", name)?;
                if *distinct {
                    write!(f, "distinct ")?;
                }
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Paren(e) => write!(f, "({})", e),
        }
    }
}
