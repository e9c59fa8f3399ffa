//! Lookup vindexes backed by a mapping table
//!
//! The mapping table translates an indirect column (such as a user name)
//! into the value the table's primary vindex understands. That value is
//! then hashed exactly like [`HashVindex`](super::HashVindex) does.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;

use super::errors::{VindexError, VindexResult};
use super::hash::hash_value;
use super::{VCursor, Vindex};
use crate::sqltypes::{BindVars, BoundQuery, Value};
use crate::topology::KeyspaceId;

#[derive(Debug, Clone)]
pub struct LookupHashVindex {
    name: String,
    table: String,
    from: String,
    to: String,
    unique: bool,
}

impl LookupHashVindex {
    /// Builds from `table`, `from` and `to` params
    pub fn new(name: &str, params: &BTreeMap<String, String>, unique: bool) -> VindexResult<Self> {
        let param = |key: &'static str| {
            params
                .get(key)
                .cloned()
                .ok_or_else(|| VindexError::MissingParam {
                    vindex: name.to_string(),
                    param: key,
                })
        };
        Ok(Self {
            name: name.to_string(),
            table: param("table")?,
            from: param("from")?,
            to: param("to")?,
            unique,
        })
    }

    /// Backing query for one input value
    pub fn lookup_query(&self, value: &Value) -> BoundQuery {
        let mut bind_vars = BindVars::new();
        bind_vars.insert(self.from.clone(), value.clone());
        BoundQuery::new(
            format!(
                "select {} from {} where {} = :{}",
                self.to, self.table, self.from, self.from
            ),
            bind_vars,
        )
    }
}

impl Vindex for LookupHashVindex {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        if self.unique {
            "lookup_hash_unique"
        } else {
            "lookup_hash"
        }
    }

    fn cost(&self) -> u32 {
        if self.unique {
            10
        } else {
            20
        }
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn map<'a>(
        &'a self,
        cursor: &'a dyn VCursor,
        values: &'a [Value],
    ) -> BoxFuture<'a, VindexResult<Vec<Vec<KeyspaceId>>>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                let result = cursor
                    .execute_lookup(self.lookup_query(value))
                    .await
                    .map_err(|e| VindexError::Lookup(Box::new(e)))?;
                if self.unique && result.rows.len() > 1 {
                    return Err(VindexError::MultipleResults {
                        vindex: self.name.clone(),
                        value: value.to_string(),
                    });
                }
                let ksids = result
                    .rows
                    .iter()
                    .filter_map(|row| row.first())
                    .map(hash_value)
                    .collect::<VindexResult<Vec<_>>>()?;
                out.push(ksids);
            }
            Ok(out)
        })
    }
}
