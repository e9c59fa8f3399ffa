//! Query planner
//!
//! Turns a parsed statement into a [`Plan`]: a single [`Route`] or a tree
//! of [`Join`]s over routes. Plans are deterministic for a given statement
//! and VSchema snapshot and carry no runtime state.
//!
//! # Route selection priority
//!
//! 1. Vindex equality (`SelectEqual`)
//! 2. Vindex IN list (`SelectIN`)
//! 3. Scatter to every shard (`SelectScatter`)
//!
//! Ties broken by lower vindex cost.

mod builder;
mod dml;
mod errors;
mod explain;
mod plan;
mod routing;

pub use errors::{PlanError, PlanErrorCode, PlanResult};
pub use explain::ExplainPlan;
pub use plan::{Join, JoinColumn, Plan, Route, RouteOpcode, RouteValue};
pub use routing::LIST_VAR;

use crate::sql::Statement;
use crate::vschema::VSchema;

/// Builds the plan for `stmt`, whose original text is `sql`.
pub fn build_plan(vschema: &VSchema, sql: &str, stmt: &Statement) -> PlanResult<Plan> {
    match stmt {
        Statement::Select(select) => builder::plan_select(vschema, sql, select),
        Statement::Insert(insert) => dml::plan_insert(vschema, sql, insert),
        Statement::Update(update) => dml::plan_update(vschema, sql, update),
        Statement::Delete(delete) => dml::plan_delete(vschema, sql, delete),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sql::parse;
    use crate::sqltypes::Value;
    use crate::vschema::{VSchema, VSchemaSource};

    pub(crate) const TEST_VSCHEMA: &str = r#"{
        "keyspaces": {
            "TestRouter": {
                "sharded": true,
                "vindexes": {
                    "user_index": {"type": "hash"},
                    "music_user_map": {
                        "type": "lookup_hash_unique",
                        "params": {"table": "music_user_map", "from": "music_id", "to": "user_id"},
                        "owner": "music"
                    },
                    "name_user_map": {
                        "type": "lookup_hash",
                        "params": {"table": "name_user_map", "from": "name", "to": "user_id"},
                        "owner": "user"
                    }
                },
                "tables": {
                    "user": {"column_vindexes": [
                        {"column": "id", "name": "user_index"},
                        {"column": "name", "name": "name_user_map"}
                    ]},
                    "user_extra": {"column_vindexes": [
                        {"column": "user_id", "name": "user_index"}
                    ]},
                    "music": {"column_vindexes": [
                        {"column": "id", "name": "music_user_map"}
                    ]}
                }
            },
            "TestUnsharded": {
                "tables": {
                    "music_user_map": {},
                    "name_user_map": {},
                    "main1": {},
                    "main2": {}
                }
            }
        }
    }"#;

    pub(crate) fn test_vschema() -> VSchema {
        let source: VSchemaSource = serde_json::from_str(TEST_VSCHEMA).unwrap();
        VSchema::build(&source).unwrap()
    }

    fn plan(sql: &str) -> PlanResult<Plan> {
        let stmt = parse(sql).unwrap();
        build_plan(&test_vschema(), sql, &stmt)
    }

    fn route(plan: &Plan) -> &Route {
        match plan {
            Plan::Route(route) => route,
            Plan::Join(_) => panic!("expected a route, got {:?}", plan),
        }
    }

    fn join(plan: &Plan) -> &Join {
        match plan {
            Plan::Join(join) => join,
            Plan::Route(_) => panic!("expected a join, got {:?}", plan),
        }
    }

    #[test]
    fn test_unsharded_keeps_sql_verbatim() {
        let sql = "select id from music_user_map where id = 1";
        let p = plan(sql).unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::Unsharded);
        assert_eq!(r.keyspace, "TestUnsharded");
        assert_eq!(r.query, sql);
    }

    #[test]
    fn test_select_equal() {
        let sql = "select id from user where id = 1";
        let p = plan(sql).unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::SelectEqual);
        assert_eq!(r.query, sql);
        assert_eq!(r.vindex.as_ref().unwrap().name(), "user_index");
        assert_eq!(r.values, vec![RouteValue::Literal(Value::Int64(1))]);
    }

    #[test]
    fn test_select_equal_prefers_cheaper_vindex() {
        let p = plan("select id from user where name = 'foo' and id = :id").unwrap();
        let r = route(&p);
        assert_eq!(r.vindex.as_ref().unwrap().name(), "user_index");
        assert_eq!(r.values, vec![RouteValue::BindVar("id".into())]);

        let p = plan("select id from user where name = 'foo'").unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::SelectEqual);
        assert_eq!(r.vindex.as_ref().unwrap().name(), "name_user_map");
    }

    #[test]
    fn test_equal_beats_in() {
        let p = plan("select id from user where id in (1, 2) and name = 'foo'").unwrap();
        assert_eq!(route(&p).opcode, RouteOpcode::SelectEqual);
    }

    #[test]
    fn test_select_in_rewrites_list() {
        let p = plan("select id from user where id in (1, 3)").unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::SelectIN);
        assert_eq!(r.query, "select id from user where id in ::__vals");
        assert_eq!(r.values.len(), 2);

        let p = plan("select id from user where name in (:name1, :name2)").unwrap();
        assert_eq!(route(&p).query, "select id from user where name in ::__vals");
    }

    #[test]
    fn test_scatter() {
        let sql = "select id from user where col = 2";
        let p = plan(sql).unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::SelectScatter);
        assert_eq!(r.query, sql);
        assert!(r.vindex.is_none());
    }

    #[test]
    fn test_subquery_as_vindex_value_rejected() {
        let err = plan("select id from user where id = (select count(*) from music)").unwrap_err();
        assert!(err.to_string().starts_with("unsupported"));
    }

    #[test]
    fn test_scatter_aggregate_rejected() {
        let err = plan("select count(*) from user").unwrap_err();
        assert_eq!(err.to_string(), "unsupported: cross-shard aggregation");
        assert!(plan("select count(*) from user where id = 1").is_ok());
        assert!(plan("select col, count(*) from user group by col").is_ok());
    }

    #[test]
    fn test_keyspace_qualifier_is_stripped() {
        let p = plan("select id from TestRouter.user where id = 1").unwrap();
        assert_eq!(route(&p).query, "select id from user where id = 1");
    }

    #[test]
    fn test_unsharded_tables_merge() {
        let sql = "select m1.id from main1 as m1 join main2 as m2 on m1.id = m2.id";
        let p = plan(sql).unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::Unsharded);
        assert_eq!(r.query, sql);
        assert_eq!(r.tables, vec!["main1", "main2"]);
    }

    #[test]
    fn test_simple_join() {
        let p = plan("select u1.id, u2.id from user u1 join user u2 where u1.id = 1 and u2.id = 3")
            .unwrap();
        let j = join(&p);
        assert!(!j.is_left);
        assert!(j.vars.is_empty());
        assert_eq!(j.cols, vec![JoinColumn::Left(0), JoinColumn::Right(0)]);
        assert_eq!(route(&j.left).query, "select u1.id from user as u1 where u1.id = 1");
        assert_eq!(route(&j.right).query, "select u2.id from user as u2 where u2.id = 3");
        assert_eq!(route(&j.right).opcode, RouteOpcode::SelectEqual);
    }

    #[test]
    fn test_var_join() {
        let p = plan("select u1.id, u2.id from user u1 join user u2 on u2.id = u1.col where u1.id = 1")
            .unwrap();
        let j = join(&p);
        assert_eq!(j.vars.get("u1_col"), Some(&1));
        let left = route(&j.left);
        let right = route(&j.right);
        assert_eq!(left.query, "select u1.id, u1.col from user as u1 where u1.id = 1");
        assert_eq!(right.query, "select u2.id from user as u2 where u2.id = :u1_col");
        assert_eq!(right.opcode, RouteOpcode::SelectEqual);
        assert_eq!(right.values, vec![RouteValue::BindVar("u1_col".into())]);
        assert_eq!(
            right.field_query.as_deref(),
            Some("select u2.id from user as u2 where 1 != 1")
        );
    }

    #[test]
    fn test_join_var_reuses_selected_column() {
        let p = plan("select u1.col, u2.id from user u1 join user u2 on u2.id = u1.col").unwrap();
        let j = join(&p);
        assert_eq!(j.vars.get("u1_col"), Some(&0));
        assert_eq!(route(&j.left).query, "select u1.col from user as u1");
    }

    #[test]
    fn test_nested_join() {
        let p = plan(
            "select u1.id, u2.id, u3.id from user u1 join (user u2 join user u3 on u3.id = u2.col) where u1.id = 1",
        )
        .unwrap();
        let outer = join(&p);
        assert_eq!(outer.cols, vec![JoinColumn::Left(0), JoinColumn::Right(0), JoinColumn::Right(1)]);
        let inner = join(&outer.right);
        assert_eq!(inner.vars.get("u2_col"), Some(&1));
        assert_eq!(inner.cols, vec![JoinColumn::Left(0), JoinColumn::Right(0)]);
        assert_eq!(route(&inner.left).query, "select u2.id, u2.col from user as u2");
        assert_eq!(
            route(&inner.left).field_query.as_deref(),
            Some("select u2.id, u2.col from user as u2 where 1 != 1")
        );
        assert_eq!(route(&inner.right).query, "select u3.id from user as u3 where u3.id = :u2_col");
        assert_eq!(p.route_count(), 3);
    }

    #[test]
    fn test_join_var_through_nested_left_side() {
        let p = plan(
            "select u1.id from user u1 join user u2 on u2.id = u1.id join user_extra e on e.user_id = u1.col",
        )
        .unwrap();
        let outer = join(&p);
        let inner = join(&outer.left);
        // u1.col is exposed through the inner join as its second column
        assert_eq!(inner.cols, vec![JoinColumn::Left(0), JoinColumn::Left(1)]);
        assert_eq!(outer.vars.get("u1_col"), Some(&1));
        assert_eq!(route(&inner.left).query, "select u1.id, u1.col from user as u1");
        assert_eq!(route(&inner.right).query, "select 1 from user as u2 where u2.id = :u1_id");
        assert_eq!(
            route(&outer.right).query,
            "select 1 from user_extra as e where e.user_id = :u1_col"
        );
    }

    #[test]
    fn test_left_join() {
        let p = plan(
            "select u1.id, u2.id from user u1 left join user u2 on u2.id = u1.col where u1.id = 1",
        )
        .unwrap();
        let j = join(&p);
        assert!(j.is_left);
        assert_eq!(route(&j.right).query, "select u2.id from user as u2 where u2.id = :u1_col");
    }

    #[test]
    fn test_left_join_on_left_only_condition_goes_right() {
        let p = plan("select u1.id, u2.id from user u1 left join user u2 on u1.col = 5").unwrap();
        let j = join(&p);
        assert_eq!(route(&j.right).query, "select u2.id from user as u2 where :u1_col = 5");
    }

    #[test]
    fn test_join_rejections() {
        let cases = [
            ("select * from user u1 join user u2", "'*' expression"),
            ("select u1.id + u2.id from user u1 join user u2", "spans multiple routes"),
            ("select u1.id from user u1 join user u2 group by u1.id", "group by"),
            ("select u1.id from user u1 join user u2 limit 1", "limit"),
            ("select count(*) from user u1 join user u2", "aggregate"),
            ("select u1.id from user u1 join user u2 order by u2.id, u1.id", "join order"),
            (
                "select u1.id from user u1 left join user u2 on u2.id = u1.col where u2.x = 1",
                "left join",
            ),
            ("select id from user u1 join user u2", "unqualified column"),
            (
                "select u1.id from user u1 join user u2 where u1.id in (select id from music)",
                "subquery",
            ),
        ];
        for (sql, fragment) in cases {
            let err = plan(sql).unwrap_err();
            assert!(
                err.to_string().starts_with("unsupported: ") && err.to_string().contains(fragment),
                "{}: {}",
                sql,
                err
            );
        }
    }

    #[test]
    fn test_order_by_pushed_in_route_order() {
        let p = plan("select u1.id, u2.id from user u1 join user u2 order by u1.id, u2.id desc").unwrap();
        let j = join(&p);
        assert_eq!(route(&j.left).query, "select u1.id from user as u1 order by u1.id");
        assert_eq!(route(&j.right).query, "select u2.id from user as u2 order by u2.id desc");
    }

    #[test]
    fn test_unknown_symbol_and_table() {
        let err = plan("select u3.id from user u1 join user u2").unwrap_err();
        assert_eq!(err.to_string(), "symbol u3.id not found");
        assert_eq!(err.code(), PlanErrorCode::UnknownSymbol);

        let err = plan("select id from nope").unwrap_err();
        assert_eq!(err.code(), PlanErrorCode::UnknownTable);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = plan("select user.id from user join user").unwrap_err();
        assert!(err.to_string().contains("not unique table/alias"));
    }

    #[test]
    fn test_dml_plans() {
        let p = plan("update user set col = 2 where id = 1").unwrap();
        assert_eq!(route(&p).opcode, RouteOpcode::UpdateEqual);
        let p = plan("delete from user where id = :id").unwrap();
        assert_eq!(route(&p).opcode, RouteOpcode::DeleteEqual);
        let p = plan("insert into user(id, name) values (5, 'x')").unwrap();
        let r = route(&p);
        assert_eq!(r.opcode, RouteOpcode::InsertSharded);
        assert_eq!(r.values, vec![RouteValue::Literal(Value::Int64(5))]);
        let p = plan("update music_user_map set id = 1").unwrap();
        assert_eq!(route(&p).opcode, RouteOpcode::Unsharded);
    }

    #[test]
    fn test_dml_rejections() {
        let cases = [
            ("update user set col = 2", "multi-shard update"),
            ("update user set col = 2 where name = 'foo'", "multi-shard update"),
            ("update user set id = 2 where id = 1", "vindex column"),
            ("delete from user where col = 1", "multi-shard delete"),
            ("insert into user(id) values (1), (2)", "multi-row insert"),
            ("insert into user(name) values ('x')", "primary vindex column id"),
        ];
        for (sql, fragment) in cases {
            let err = plan(sql).unwrap_err();
            assert!(err.to_string().contains(fragment), "{}: {}", sql, err);
        }
    }

    #[test]
    fn test_explain_shape() {
        let p = plan("select u1.id, u2.id from user u1 join user u2 on u2.id = u1.col").unwrap();
        let explained = p.explain();
        assert_eq!(explained["kind"], "join");
        assert_eq!(explained["vars"]["u1_col"], 1);
        assert_eq!(explained["cols"][1], "R0");
        assert_eq!(explained["right"]["opcode"], "SelectEqual");

        let rendered = ExplainPlan::from_plan(&p).to_string();
        assert!(rendered.contains("ACCEPTED"));
        assert!(rendered.contains("Route SelectScatter TestRouter"));

        let err = plan("select * from user u1 join user u2").unwrap_err();
        let rendered = ExplainPlan::from_error(&err).to_string();
        assert!(rendered.contains("SHARDGATE_PLAN_UNSUPPORTED"));
    }
}
