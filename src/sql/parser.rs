//! Recursive-descent parser for the supported SQL subset

use super::ast::{
    Assignment, BinaryOp, ColName, ComparisonOp, Delete, Expr, FuncArg, Insert, JoinKind,
    JoinTableExpr, Limit, Literal, OrderBy, Select, SelectExpr, Statement, TableExpr, TableName,
    Update,
};
use super::errors::{SqlError, SqlResult};
use super::lexer::{tokenize, Spanned, Token};

/// Words that terminate an implicit alias position
const RESERVED: &[&str] = &[
    "select", "from", "where", "group", "having", "order", "limit", "offset", "join", "inner",
    "cross", "straight_join", "left", "right", "outer", "on", "using", "as", "and", "or", "not",
    "in", "is", "like", "null", "union", "set", "values", "into", "by", "asc", "desc", "for",
    "distinct",
];

/// Parses a single statement
pub fn parse(sql: &str) -> SqlResult<Statement> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmt = parser.statement()?;
    parser.eat(&Token::Semicolon);
    parser.expect_eof()?;
    Ok(stmt)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn position(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].position
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> SqlResult<T> {
        Err(SqlError::new(self.position(), message))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> SqlResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            self.error(format!("expected {:?}, found {:?}", token, self.peek()))
        }
    }

    fn expect_eof(&self) -> SqlResult<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => self.error(format!("unexpected trailing input {:?}", other)),
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn is_keyword_at(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_at(offset), Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> SqlResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.error(format!("expected '{}', found {:?}", kw, self.peek()))
        }
    }

    fn identifier(&mut self) -> SqlResult<String> {
        match self.advance() {
            Token::Ident(s) | Token::QuotedIdent(s) => Ok(s),
            other => Err(SqlError::new(
                self.tokens[self.pos.saturating_sub(1)].position,
                format!("identifier expected, found {:?}", other),
            )),
        }
    }

    /// Identifier that may serve as an implicit alias
    fn alias_candidate(&self) -> bool {
        match self.peek() {
            Token::QuotedIdent(_) => true,
            Token::Ident(s) => !RESERVED.iter().any(|kw| s.eq_ignore_ascii_case(kw)),
            _ => false,
        }
    }

    fn optional_alias(&mut self) -> SqlResult<Option<String>> {
        if self.eat_keyword("as") {
            return self.identifier().map(Some);
        }
        if self.alias_candidate() {
            return self.identifier().map(Some);
        }
        Ok(None)
    }

    fn statement(&mut self) -> SqlResult<Statement> {
        if self.is_keyword("select") {
            Ok(Statement::Select(Box::new(self.select()?)))
        } else if self.is_keyword("insert") {
            self.insert().map(Statement::Insert)
        } else if self.is_keyword("update") {
            self.update().map(Statement::Update)
        } else if self.is_keyword("delete") {
            self.delete().map(Statement::Delete)
        } else {
            self.error(format!("unsupported statement starting with {:?}", self.peek()))
        }
    }

    fn select(&mut self) -> SqlResult<Select> {
        self.expect_keyword("select")?;
        let mut select = Select {
            distinct: self.eat_keyword("distinct"),
            ..Select::default()
        };

        loop {
            select.exprs.push(self.select_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        if self.eat_keyword("from") {
            select.from = self.table_exprs()?;
        }
        if self.eat_keyword("where") {
            select.where_clause = Some(self.expr()?);
        }
        if self.eat_keyword("group") {
            self.expect_keyword("by")?;
            select.group_by = self.expr_list()?;
        }
        if self.eat_keyword("having") {
            select.having = Some(self.expr()?);
        }
        select.order_by = self.order_by()?;
        select.limit = self.limit()?;
        Ok(select)
    }

    fn select_expr(&mut self) -> SqlResult<SelectExpr> {
        if self.eat(&Token::Star) {
            return Ok(SelectExpr::Star(None));
        }
        let qualified_star = matches!(self.peek(), Token::Ident(_) | Token::QuotedIdent(_))
            && self.peek_at(1) == &Token::Dot
            && self.peek_at(2) == &Token::Star;
        if qualified_star {
            let qualifier = self.identifier()?;
            self.advance();
            self.advance();
            return Ok(SelectExpr::Star(Some(qualifier)));
        }
        let expr = self.expr()?;
        let alias = self.optional_alias()?;
        Ok(SelectExpr::Expr { expr, alias })
    }

    fn table_exprs(&mut self) -> SqlResult<Vec<TableExpr>> {
        let mut exprs = vec![self.table_expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.table_expr()?);
        }
        Ok(exprs)
    }

    fn table_expr(&mut self) -> SqlResult<TableExpr> {
        let mut left = self.table_factor()?;
        while let Some(kind) = self.join_kind()? {
            let right = self.table_factor()?;
            let on = if self.eat_keyword("on") {
                Some(self.expr()?)
            } else {
                None
            };
            if kind == JoinKind::Left && on.is_none() {
                return self.error("left join requires an on clause");
            }
            left = TableExpr::Join(Box::new(JoinTableExpr {
                left,
                kind,
                right,
                on,
            }));
        }
        Ok(left)
    }

    fn join_kind(&mut self) -> SqlResult<Option<JoinKind>> {
        if self.eat_keyword("join") {
            return Ok(Some(JoinKind::Inner));
        }
        if self.eat_keyword("straight_join") {
            return Ok(Some(JoinKind::Straight));
        }
        if self.is_keyword("inner") && self.is_keyword_at(1, "join") {
            self.advance();
            self.advance();
            return Ok(Some(JoinKind::Inner));
        }
        if self.is_keyword("cross") && self.is_keyword_at(1, "join") {
            self.advance();
            self.advance();
            return Ok(Some(JoinKind::Cross));
        }
        if self.eat_keyword("left") {
            self.eat_keyword("outer");
            self.expect_keyword("join")?;
            return Ok(Some(JoinKind::Left));
        }
        if self.is_keyword("right") {
            return self.error("right join is not supported");
        }
        Ok(None)
    }

    fn table_factor(&mut self) -> SqlResult<TableExpr> {
        if self.eat(&Token::LParen) {
            if self.is_keyword("select") {
                return self.error("derived tables are not supported");
            }
            let inner = self.table_exprs()?;
            self.expect(&Token::RParen)?;
            return Ok(TableExpr::Paren(inner));
        }
        let name = self.table_name()?;
        let alias = self.optional_alias()?;
        Ok(TableExpr::Table { name, alias })
    }

    fn table_name(&mut self) -> SqlResult<TableName> {
        let first = self.identifier()?;
        if self.eat(&Token::Dot) {
            let name = self.identifier()?;
            return Ok(TableName {
                qualifier: Some(first),
                name,
            });
        }
        Ok(TableName::new(first))
    }

    fn order_by(&mut self) -> SqlResult<Vec<OrderBy>> {
        let mut order = Vec::new();
        if !self.eat_keyword("order") {
            return Ok(order);
        }
        self.expect_keyword("by")?;
        loop {
            let expr = self.expr()?;
            let desc = if self.eat_keyword("desc") {
                true
            } else {
                self.eat_keyword("asc");
                false
            };
            order.push(OrderBy { expr, desc });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(order)
    }

    fn limit(&mut self) -> SqlResult<Option<Limit>> {
        if !self.eat_keyword("limit") {
            return Ok(None);
        }
        let first = self.primary()?;
        if self.eat(&Token::Comma) {
            let rowcount = self.primary()?;
            return Ok(Some(Limit {
                offset: Some(first),
                rowcount,
            }));
        }
        if self.eat_keyword("offset") {
            let offset = self.primary()?;
            return Ok(Some(Limit {
                offset: Some(offset),
                rowcount: first,
            }));
        }
        Ok(Some(Limit {
            offset: None,
            rowcount: first,
        }))
    }

    fn insert(&mut self) -> SqlResult<Insert> {
        self.expect_keyword("insert")?;
        self.expect_keyword("into")?;
        let table = self.table_name()?;

        let mut columns = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                columns.push(self.identifier()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }

        self.expect_keyword("values")?;
        let mut rows = Vec::new();
        loop {
            self.expect(&Token::LParen)?;
            let row = self.expr_list()?;
            self.expect(&Token::RParen)?;
            if !columns.is_empty() && row.len() != columns.len() {
                return self.error(format!(
                    "column count {} does not match value count {}",
                    columns.len(),
                    row.len()
                ));
            }
            rows.push(row);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(Insert {
            table,
            columns,
            rows,
        })
    }

    fn update(&mut self) -> SqlResult<Update> {
        self.expect_keyword("update")?;
        let table = self.table_name()?;
        self.expect_keyword("set")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.column_name()?;
            self.expect(&Token::Eq)?;
            let value = self.expr()?;
            assignments.push(Assignment { column, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        let where_clause = if self.eat_keyword("where") {
            Some(self.expr()?)
        } else {
            None
        };
        let order_by = self.order_by()?;
        let limit = self.limit()?;

        Ok(Update {
            table,
            assignments,
            where_clause,
            order_by,
            limit,
        })
    }

    fn delete(&mut self) -> SqlResult<Delete> {
        self.expect_keyword("delete")?;
        self.expect_keyword("from")?;
        let table = self.table_name()?;
        let where_clause = if self.eat_keyword("where") {
            Some(self.expr()?)
        } else {
            None
        };
        let order_by = self.order_by()?;
        let limit = self.limit()?;

        Ok(Delete {
            table,
            where_clause,
            order_by,
            limit,
        })
    }

    fn column_name(&mut self) -> SqlResult<ColName> {
        let first = self.identifier()?;
        if self.eat(&Token::Dot) {
            let name = self.identifier()?;
            return Ok(ColName {
                qualifier: Some(first),
                name,
            });
        }
        Ok(ColName {
            qualifier: None,
            name: first,
        })
    }

    fn expr_list(&mut self) -> SqlResult<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr(&mut self) -> SqlResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> SqlResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> SqlResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> SqlResult<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> SqlResult<Expr> {
        let left = self.additive()?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            self.expect_keyword("null")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = self.is_keyword("not")
            && (self.is_keyword_at(1, "in") || self.is_keyword_at(1, "like"));
        if negated {
            self.advance();
        }
        if self.eat_keyword("in") {
            let right = self.in_list()?;
            let op = if negated {
                ComparisonOp::NotIn
            } else {
                ComparisonOp::In
            };
            return Ok(Expr::comparison(left, op, right));
        }
        if self.eat_keyword("like") {
            let right = self.additive()?;
            let op = if negated {
                ComparisonOp::NotLike
            } else {
                ComparisonOp::Like
            };
            return Ok(Expr::comparison(left, op, right));
        }

        let op = match self.peek() {
            Token::Eq => ComparisonOp::Eq,
            Token::NotEq => ComparisonOp::NotEq,
            Token::Lt => ComparisonOp::Lt,
            Token::LtEq => ComparisonOp::LtEq,
            Token::Gt => ComparisonOp::Gt,
            Token::GtEq => ComparisonOp::GtEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expr::comparison(left, op, right))
    }

    /// Right-hand side of IN: a tuple, a subquery or a list argument
    fn in_list(&mut self) -> SqlResult<Expr> {
        if let Token::ListArg(name) = self.peek().clone() {
            self.advance();
            return Ok(Expr::ListArg(name));
        }
        self.expect(&Token::LParen)?;
        if self.is_keyword("select") {
            let select = self.select()?;
            self.expect(&Token::RParen)?;
            return Ok(Expr::Subquery(Box::new(select)));
        }
        let items = self.expr_list()?;
        self.expect(&Token::RParen)?;
        Ok(Expr::Tuple(items))
    }

    fn additive(&mut self) -> SqlResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Plus,
                Token::Minus => BinaryOp::Minus,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn multiplicative(&mut self) -> SqlResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> SqlResult<Expr> {
        if self.eat(&Token::Minus) {
            return match self.peek().clone() {
                Token::Integer(s) => {
                    self.advance();
                    Ok(Expr::Literal(Literal::Integer(format!("-{}", s))))
                }
                Token::Float(s) => {
                    self.advance();
                    Ok(Expr::Literal(Literal::Float(format!("-{}", s))))
                }
                _ => Ok(Expr::Neg(Box::new(self.unary()?))),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> SqlResult<Expr> {
        let position = self.position();
        match self.advance() {
            Token::Integer(s) => Ok(Expr::Literal(Literal::Integer(s))),
            Token::Float(s) => Ok(Expr::Literal(Literal::Float(s))),
            Token::String(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::BindVar(name) => Ok(Expr::BindVar(name)),
            Token::ListArg(name) => Ok(Expr::ListArg(name)),
            Token::LParen => {
                if self.is_keyword("select") {
                    let select = self.select()?;
                    self.expect(&Token::RParen)?;
                    return Ok(Expr::Subquery(Box::new(select)));
                }
                let mut items = self.expr_list()?;
                self.expect(&Token::RParen)?;
                if items.len() == 1 {
                    Ok(Expr::Paren(Box::new(items.remove(0))))
                } else {
                    Ok(Expr::Tuple(items))
                }
            }
            Token::Ident(word) => {
                if word.eq_ignore_ascii_case("null") {
                    return Ok(Expr::Literal(Literal::Null));
                }
                if word.eq_ignore_ascii_case("true") {
                    return Ok(Expr::Literal(Literal::Bool(true)));
                }
                if word.eq_ignore_ascii_case("false") {
                    return Ok(Expr::Literal(Literal::Bool(false)));
                }
                if RESERVED.iter().any(|kw| word.eq_ignore_ascii_case(kw)) {
                    return Err(SqlError::new(
                        position,
                        format!("unexpected keyword '{}'", word),
                    ));
                }
                self.identifier_expr(word)
            }
            Token::QuotedIdent(word) => self.identifier_expr(word),
            other => Err(SqlError::new(
                position,
                format!("expression expected, found {:?}", other),
            )),
        }
    }

    /// Column reference or function call whose first identifier was consumed
    fn identifier_expr(&mut self, first: String) -> SqlResult<Expr> {
        if self.eat(&Token::LParen) {
            return self.function_call(first);
        }
        if self.eat(&Token::Dot) {
            let name = self.identifier()?;
            return Ok(Expr::Column(ColName {
                qualifier: Some(first),
                name,
            }));
        }
        Ok(Expr::Column(ColName {
            qualifier: None,
            name: first,
        }))
    }

    fn function_call(&mut self, name: String) -> SqlResult<Expr> {
        let distinct = self.eat_keyword("distinct");
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                if self.eat(&Token::Star) {
                    args.push(FuncArg::Star);
                } else {
                    args.push(FuncArg::Expr(self.expr()?));
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        Ok(Expr::Func {
            name: name.to_ascii_lowercase(),
            distinct,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(sql: &str) -> String {
        parse(sql).unwrap().to_string()
    }

    #[test]
    fn test_simple_select() {
        assert_eq!(
            roundtrip("select id from user where id = 1"),
            "select id from user where id = 1"
        );
    }

    #[test]
    fn test_aliases_are_normalised() {
        assert_eq!(
            roundtrip("SELECT u1.id FROM user u1 WHERE u1.id = 1"),
            "select u1.id from user as u1 where u1.id = 1"
        );
    }

    #[test]
    fn test_join_shapes() {
        assert_eq!(
            roundtrip("select u1.id, u2.id from user u1 join user u2 on u2.id = u1.col where u1.id = 1"),
            "select u1.id, u2.id from user as u1 join user as u2 on u2.id = u1.col where u1.id = 1"
        );
        assert_eq!(
            roundtrip("select a.id from t1 a left outer join t2 b on b.x = a.x"),
            "select a.id from t1 as a left join t2 as b on b.x = a.x"
        );
        assert_eq!(
            roundtrip("select u1.id from user u1 join (user u2 join user u3 on u3.id = u2.col)"),
            "select u1.id from user as u1 join (user as u2 join user as u3 on u3.id = u2.col)"
        );
    }

    #[test]
    fn test_in_list_and_list_arg() {
        let stmt = parse("select id from user where id in (1)").unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected select");
        };
        match select.where_clause.unwrap() {
            Expr::Comparison { op, right, .. } => {
                assert_eq!(op, ComparisonOp::In);
                assert_eq!(*right, Expr::Tuple(vec![Expr::int(1)]));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            roundtrip("select id from user where id in ::__vals"),
            "select id from user where id in ::__vals"
        );
    }

    #[test]
    fn test_subquery_and_functions() {
        assert_eq!(
            roundtrip("select id from user where id = (select count(*) from music)"),
            "select id from user where id = (select count(*) from music)"
        );
        assert_eq!(
            roundtrip("select count(distinct col) from t group by a having count(*) > 1 order by a desc limit 10"),
            "select count(distinct col) from t group by a having count(*) > 1 order by a desc limit 10"
        );
    }

    #[test]
    fn test_dml() {
        assert_eq!(
            roundtrip("insert into music_user_map values (1)"),
            "insert into music_user_map values (1)"
        );
        assert_eq!(
            roundtrip("insert into user(id, name) values (:id, 'x'), (2, 'y')"),
            "insert into user(id, name) values (:id, 'x'), (2, 'y')"
        );
        assert_eq!(
            roundtrip("update music_user_map set a = 1 where id = 1"),
            "update music_user_map set a = 1 where id = 1"
        );
        assert_eq!(
            roundtrip("delete from music_user_map"),
            "delete from music_user_map"
        );
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            roundtrip("select a from t where a = 1 or b = 2 and c = 3"),
            "select a from t where a = 1 or b = 2 and c = 3"
        );
        let stmt = parse("select a from t where a = 1 or b = 2 and c = 3").unwrap();
        let Statement::Select(select) = stmt else {
            panic!("expected select");
        };
        assert!(matches!(select.where_clause, Some(Expr::Or(..))));
    }

    #[test]
    fn test_negative_literals_and_is_null() {
        assert_eq!(
            roundtrip("select a from t where a = -5 and b is not null"),
            "select a from t where a = -5 and b is not null"
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("show tables").is_err());
        assert!(parse("select from").is_err());
        assert!(parse("select a from t where").is_err());
        let err = parse("select a from t t2 t3").unwrap_err();
        assert!(err.to_string().starts_with("syntax error at position"));
    }
}
