//! Plans SELECT statements
//!
//! The FROM clause is turned into a tree of routes joined left to right.
//! Tables of one unsharded keyspace that are joined directly collapse into
//! a single route. Select expressions, filters and ordering are then pushed
//! into the routes that can evaluate them; a filter that references an
//! earlier route is rewritten to read that value from a join variable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::errors::{PlanError, PlanResult};
use super::plan::{Join, JoinColumn, Plan, Route, RouteOpcode};
use super::routing::{choose_routing, rewrite_in_list, Routing};
use crate::sql::{
    and_filter, split_and, ColName, Expr, JoinKind, JoinTableExpr, OrderBy, Select, SelectExpr,
    TableExpr, TableName,
};
use crate::vschema::{Table, VSchema};

struct RouteBuilder {
    keyspace: String,
    sharded: bool,
    /// Tables by the alias expressions refer to them with
    tables: Vec<(String, Arc<Table>)>,
    from: Vec<TableExpr>,
    /// A keyspace qualifier was removed from a table name
    rewritten: bool,
    exprs: Vec<SelectExpr>,
    filters: Vec<Expr>,
    order_by: Vec<OrderBy>,
    /// First route of every left join whose right side contains this route
    outer_joins: Vec<usize>,
}

enum Node {
    Route(usize),
    Join(Box<JoinNode>),
}

struct JoinNode {
    left: Node,
    right: Node,
    is_left: bool,
    /// Routes below `mid` are on the left side
    mid: usize,
    vars: BTreeMap<String, usize>,
    cols: Vec<JoinColumn>,
}

/// ON conjunct waiting to be pushed once the select list is placed
struct PendingOn {
    expr: Expr,
    /// First route of the join's subtree
    start: usize,
    /// Set for left joins: first route of the right side
    outer: Option<usize>,
}

pub(super) struct SelectPlanner<'a> {
    vschema: &'a VSchema,
    routes: Vec<RouteBuilder>,
    symbols: HashMap<String, usize>,
    pending_on: Vec<PendingOn>,
}

/// Plans a SELECT. `sql` is the caller's text, reused verbatim where the
/// statement needs no rewriting.
pub(super) fn plan_select(vschema: &VSchema, sql: &str, select: &Select) -> PlanResult<Plan> {
    if select.from.is_empty() {
        return Err(PlanError::unsupported("select without a table reference"));
    }
    let mut planner = SelectPlanner {
        vschema,
        routes: Vec::new(),
        symbols: HashMap::new(),
        pending_on: Vec::new(),
    };
    let root = planner.table_exprs(&select.from)?;
    if planner.routes.len() == 1 {
        planner.single_route(sql, select)
    } else {
        planner.join_plan(root, select)
    }
}

impl<'a> SelectPlanner<'a> {
    fn table_exprs(&mut self, exprs: &[TableExpr]) -> PlanResult<Node> {
        let start = self.routes.len();
        let mut iter = exprs.iter();
        let first = iter
            .next()
            .ok_or_else(|| PlanError::unsupported("empty table list"))?;
        let mut node = self.table_expr(first)?;
        for expr in iter {
            let mid = self.routes.len();
            let right = self.table_expr(expr)?;
            node = self.join(node, right, None, None, start, mid)?;
        }
        Ok(node)
    }

    fn table_expr(&mut self, expr: &TableExpr) -> PlanResult<Node> {
        match expr {
            TableExpr::Table { name, alias } => self.table(name, alias.as_deref()),
            TableExpr::Paren(inner) => {
                let node = self.table_exprs(inner)?;
                if let Node::Route(idx) = node {
                    let route = &mut self.routes[idx];
                    if route.from.len() > 1 || matches!(route.from[0], TableExpr::Join(_)) {
                        let from = std::mem::take(&mut route.from);
                        route.from = vec![TableExpr::Paren(from)];
                    }
                }
                Ok(node)
            }
            TableExpr::Join(join) => {
                let start = self.routes.len();
                let left = self.table_expr(&join.left)?;
                let mid = self.routes.len();
                let right = self.table_expr(&join.right)?;
                self.join(left, right, Some(join.kind), join.on.clone(), start, mid)
            }
        }
    }

    fn table(&mut self, name: &TableName, alias: Option<&str>) -> PlanResult<Node> {
        let table = self
            .vschema
            .find_table(name.qualifier.as_deref(), &name.name)?;
        let symbol = alias.unwrap_or(&name.name).to_string();
        if self.symbols.contains_key(&symbol) {
            return Err(PlanError::unsupported(format!(
                "not unique table/alias: {}",
                symbol
            )));
        }

        let idx = self.routes.len();
        self.routes.push(RouteBuilder {
            keyspace: table.keyspace.clone(),
            sharded: table.sharded,
            tables: vec![(symbol.clone(), table)],
            from: vec![TableExpr::Table {
                name: TableName::new(name.name.clone()),
                alias: alias.map(str::to_string),
            }],
            rewritten: name.qualifier.is_some(),
            exprs: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            outer_joins: Vec::new(),
        });
        self.symbols.insert(symbol, idx);
        Ok(Node::Route(idx))
    }

    /// Joins two subtrees covering routes `start..mid` and `mid..`.
    /// `kind` is `None` for comma joins.
    fn join(
        &mut self,
        left: Node,
        right: Node,
        kind: Option<JoinKind>,
        on: Option<Expr>,
        start: usize,
        mid: usize,
    ) -> PlanResult<Node> {
        if let (Node::Route(l), Node::Route(r)) = (&left, &right) {
            if self.can_merge(*l, *r) {
                return Ok(self.merge(*l, kind, on));
            }
        }

        let is_left = kind == Some(JoinKind::Left);
        if is_left {
            for route in &mut self.routes[mid..] {
                route.outer_joins.push(mid);
            }
        }
        if let Some(on) = on {
            for expr in split_and(on) {
                self.pending_on.push(PendingOn {
                    expr,
                    start,
                    outer: is_left.then_some(mid),
                });
            }
        }
        Ok(Node::Join(Box::new(JoinNode {
            left,
            right,
            is_left,
            mid,
            vars: BTreeMap::new(),
            cols: Vec::new(),
        })))
    }

    fn can_merge(&self, left: usize, right: usize) -> bool {
        let (l, r) = (&self.routes[left], &self.routes[right]);
        !l.sharded && !r.sharded && l.keyspace == r.keyspace
    }

    /// Folds the most recent route into `left`
    fn merge(&mut self, left: usize, kind: Option<JoinKind>, on: Option<Expr>) -> Node {
        let Some(right) = self.routes.pop() else {
            return Node::Route(left);
        };
        for (alias, _) in &right.tables {
            self.symbols.insert(alias.clone(), left);
        }
        let route = &mut self.routes[left];
        route.tables.extend(right.tables);
        route.rewritten |= right.rewritten;
        match kind {
            None => route.from.extend(right.from),
            Some(kind) => {
                let left_from = single_table_expr(std::mem::take(&mut route.from));
                route.from = vec![TableExpr::Join(Box::new(JoinTableExpr {
                    left: left_from,
                    kind,
                    right: single_table_expr(right.from),
                    on,
                }))];
            }
        }
        Node::Route(left)
    }

    fn single_route(mut self, sql: &str, select: &Select) -> PlanResult<Plan> {
        let Some(rb) = self.routes.pop() else {
            return Err(PlanError::unsupported("select without a table reference"));
        };
        let mut filters = select
            .where_clause
            .clone()
            .map(split_and)
            .unwrap_or_default();

        let routing = if rb.sharded {
            let (alias, table) = &rb.tables[0];
            let routing = choose_routing(alias, table, &filters)?;
            if select_has_subquery(select) {
                return Err(PlanError::unsupported("subquery in sharded query"));
            }
            if routing.opcode != RouteOpcode::SelectEqual
                && select.group_by.is_empty()
                && select.exprs.iter().any(|e| match e {
                    SelectExpr::Expr { expr, .. } => expr.is_aggregate(),
                    SelectExpr::Star(_) => false,
                })
            {
                return Err(PlanError::unsupported("cross-shard aggregation"));
            }
            routing
        } else {
            Routing::new(RouteOpcode::Unsharded)
        };

        let mut stmt = select.clone();
        stmt.from = rb.from;
        let query = if routing.opcode == RouteOpcode::SelectIN {
            rewrite_in_list(&mut filters, &routing);
            stmt.where_clause = fold_filters(filters);
            stmt.to_string()
        } else if rb.rewritten {
            stmt.to_string()
        } else {
            sql.to_string()
        };

        Ok(Plan::Route(Route {
            opcode: routing.opcode,
            keyspace: rb.keyspace,
            query,
            field_query: Some(field_query(&stmt)),
            vindex: routing.vindex,
            values: routing.values,
            tables: rb.tables.iter().map(|(_, t)| t.name.clone()).collect(),
        }))
    }

    fn join_plan(mut self, mut root: Node, select: &Select) -> PlanResult<Plan> {
        if select.distinct {
            return Err(PlanError::unsupported("distinct in cross-shard join"));
        }
        if !select.group_by.is_empty() || select.having.is_some() {
            return Err(PlanError::unsupported("group by in cross-shard join"));
        }
        if select.limit.is_some() {
            return Err(PlanError::unsupported("limit in cross-shard join"));
        }

        for sel in &select.exprs {
            let expr = match sel {
                SelectExpr::Star(_) => {
                    return Err(PlanError::unsupported("'*' expression in cross-shard query"))
                }
                SelectExpr::Expr { expr, .. } => expr,
            };
            if expr.is_aggregate() {
                return Err(PlanError::unsupported(format!(
                    "aggregate {} in cross-shard join",
                    expr
                )));
            }
            if expr.contains_subquery() {
                return Err(PlanError::unsupported("subquery in cross-shard query"));
            }
            let refs = self.column_routes(expr)?;
            let target = refs.first().map_or(0, |(_, r)| *r);
            if refs.iter().any(|(_, r)| *r != target) {
                return Err(PlanError::unsupported(format!(
                    "expression {} spans multiple routes",
                    expr
                )));
            }
            self.add_column(&mut root, target, sel.clone(), false);
        }

        for pending in std::mem::take(&mut self.pending_on) {
            let min_target = pending.outer.unwrap_or(pending.start);
            self.push_filter(&mut root, pending.expr, min_target, pending.start, pending.outer)?;
        }
        if let Some(filter) = &select.where_clause {
            for expr in split_and(filter.clone()) {
                self.push_filter(&mut root, expr, 0, 0, None)?;
            }
        }

        let mut last = 0;
        for order in &select.order_by {
            let refs = self.column_routes(&order.expr)?;
            let target = match refs.first() {
                Some((_, r)) if refs.iter().all(|(_, other)| other == r) => *r,
                _ => {
                    return Err(PlanError::unsupported(format!(
                        "order by {} must reference exactly one table in cross-shard join",
                        order.expr
                    )))
                }
            };
            if target < last {
                return Err(PlanError::unsupported(
                    "order by does not follow join order in cross-shard join",
                ));
            }
            last = target;
            self.routes[target].order_by.push(order.clone());
        }

        let mut routes = self
            .routes
            .into_iter()
            .map(|rb| build_route(rb).map(Some))
            .collect::<PlanResult<Vec<_>>>()?;
        into_plan(root, &mut routes)
            .ok_or_else(|| PlanError::unsupported("join tree references a merged route"))
    }

    /// Routes of every column in `expr`, not descending into subqueries
    fn column_routes(&self, expr: &Expr) -> PlanResult<Vec<(ColName, usize)>> {
        let mut cols = Vec::new();
        expr.visit_columns(&mut |col| cols.push(col.clone()));
        cols.into_iter()
            .map(|col| self.resolve(&col).map(|r| (col, r)))
            .collect()
    }

    fn resolve(&self, col: &ColName) -> PlanResult<usize> {
        match &col.qualifier {
            Some(q) => self
                .symbols
                .get(q)
                .copied()
                .ok_or_else(|| PlanError::unknown_symbol(col)),
            None if self.routes.len() == 1 => Ok(0),
            None => Err(PlanError::unsupported(format!(
                "unqualified column {} in cross-shard join",
                col.name
            ))),
        }
    }

    /// Pushes one conjunct into the last route it references, no earlier
    /// than `min_target`.
    ///
    /// `start` is the first route of the join the conjunct belongs to (0 for
    /// WHERE) and `outer` is set when it came from a left join's ON clause.
    /// Left joins enclosing that join do not restrict the push; left joins
    /// nested inside it do.
    fn push_filter(
        &mut self,
        root: &mut Node,
        mut expr: Expr,
        min_target: usize,
        start: usize,
        outer: Option<usize>,
    ) -> PlanResult<()> {
        if expr.contains_subquery() {
            return Err(PlanError::unsupported("subquery in cross-shard query"));
        }
        let refs = self.column_routes(&expr)?;
        let target = refs
            .iter()
            .map(|(_, r)| *r)
            .max()
            .unwrap_or(0)
            .max(min_target);

        if self.routes[target]
            .outer_joins
            .iter()
            .any(|mid| *mid > start && Some(*mid) != outer)
        {
            return Err(PlanError::unsupported(format!(
                "filter {} on the right side of a cross-shard left join",
                expr
            )));
        }

        let mut replacements: HashMap<ColName, String> = HashMap::new();
        for (col, source) in refs {
            if source == target || replacements.contains_key(&col) {
                continue;
            }
            let var = join_var_name(&col);
            self.bind_join_var(root, source, target, &col, &var);
            replacements.insert(col, var);
        }
        if !replacements.is_empty() {
            expr.rewrite_columns(&mut |col| replacements.get(col).cloned().map(Expr::BindVar));
        }
        self.routes[target].filters.push(expr);
        Ok(())
    }

    /// Registers `var` on the join that separates `source` from `target`
    fn bind_join_var(
        &mut self,
        node: &mut Node,
        source: usize,
        target: usize,
        col: &ColName,
        var: &str,
    ) {
        let Node::Join(join) = node else {
            return;
        };
        if source < join.mid && target >= join.mid {
            let sel = SelectExpr::Expr {
                expr: Expr::Column(col.clone()),
                alias: None,
            };
            let idx = self.add_column(&mut join.left, source, sel, true);
            join.vars.insert(var.to_string(), idx);
        } else if target < join.mid {
            self.bind_join_var(&mut join.left, source, target, col, var);
        } else {
            self.bind_join_var(&mut join.right, source, target, col, var);
        }
    }

    /// Adds `sel` to route `target` and exposes it through every join
    /// between `node` and the route. Returns its index in `node`'s output.
    fn add_column(&mut self, node: &mut Node, target: usize, sel: SelectExpr, reuse: bool) -> usize {
        match node {
            Node::Route(idx) => {
                let exprs = &mut self.routes[*idx].exprs;
                if reuse {
                    if let Some(i) = exprs.iter().position(|e| same_expr(e, &sel)) {
                        return i;
                    }
                }
                exprs.push(sel);
                exprs.len() - 1
            }
            Node::Join(join) => {
                let col = if target < join.mid {
                    JoinColumn::Left(self.add_column(&mut join.left, target, sel, reuse))
                } else {
                    JoinColumn::Right(self.add_column(&mut join.right, target, sel, reuse))
                };
                if reuse {
                    if let Some(i) = join.cols.iter().position(|c| *c == col) {
                        return i;
                    }
                }
                join.cols.push(col);
                join.cols.len() - 1
            }
        }
    }
}

fn same_expr(a: &SelectExpr, b: &SelectExpr) -> bool {
    match (a, b) {
        (SelectExpr::Expr { expr: x, .. }, SelectExpr::Expr { expr: y, .. }) => x == y,
        _ => false,
    }
}

fn join_var_name(col: &ColName) -> String {
    match &col.qualifier {
        Some(q) => format!("{}_{}", q, col.name),
        None => col.name.clone(),
    }
}

fn single_table_expr(mut from: Vec<TableExpr>) -> TableExpr {
    if from.len() == 1 {
        if let Some(expr) = from.pop() {
            return expr;
        }
    }
    TableExpr::Paren(from)
}

fn fold_filters(filters: Vec<Expr>) -> Option<Expr> {
    filters
        .into_iter()
        .fold(None, |acc, f| Some(and_filter(acc, f)))
}

fn select_has_subquery(select: &Select) -> bool {
    let in_exprs = select.exprs.iter().any(|e| match e {
        SelectExpr::Expr { expr, .. } => expr.contains_subquery(),
        SelectExpr::Star(_) => false,
    });
    in_exprs
        || select.where_clause.as_ref().is_some_and(Expr::contains_subquery)
        || select.having.as_ref().is_some_and(Expr::contains_subquery)
        || select.group_by.iter().any(Expr::contains_subquery)
        || select.order_by.iter().any(|o| o.expr.contains_subquery())
}

/// The statement with an always-false filter, used to learn result fields
fn field_query(select: &Select) -> String {
    Select {
        where_clause: Some(Expr::impossible()),
        group_by: Vec::new(),
        having: None,
        order_by: Vec::new(),
        limit: None,
        ..select.clone()
    }
    .to_string()
}

fn build_route(rb: RouteBuilder) -> PlanResult<Route> {
    let mut filters = rb.filters;
    let routing = if rb.sharded {
        let (alias, table) = &rb.tables[0];
        choose_routing(alias, table, &filters)?
    } else {
        Routing::new(RouteOpcode::Unsharded)
    };
    rewrite_in_list(&mut filters, &routing);

    let mut exprs = rb.exprs;
    if exprs.is_empty() {
        exprs.push(SelectExpr::Expr {
            expr: Expr::int(1),
            alias: None,
        });
    }
    let select = Select {
        exprs,
        from: rb.from,
        where_clause: fold_filters(filters),
        order_by: rb.order_by,
        ..Select::default()
    };

    Ok(Route {
        opcode: routing.opcode,
        keyspace: rb.keyspace,
        query: select.to_string(),
        field_query: Some(field_query(&select)),
        vindex: routing.vindex,
        values: routing.values,
        tables: rb.tables.iter().map(|(_, t)| t.name.clone()).collect(),
    })
}

fn into_plan(node: Node, routes: &mut [Option<Route>]) -> Option<Plan> {
    match node {
        Node::Route(idx) => routes.get_mut(idx).and_then(Option::take).map(Plan::Route),
        Node::Join(join) => {
            let JoinNode {
                left,
                right,
                is_left,
                vars,
                cols,
                ..
            } = *join;
            Some(Plan::Join(Box::new(Join {
                left: into_plan(left, routes)?,
                right: into_plan(right, routes)?,
                is_left,
                vars,
                cols,
            })))
        }
    }
}
