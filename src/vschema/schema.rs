//! Validated, immutable VSchema snapshot

use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::{VSchemaError, VSchemaResult};
use super::source::VSchemaSource;
use crate::vindex::{self, Vindex};

/// A column governed by a vindex
#[derive(Debug, Clone)]
pub struct ColumnVindex {
    pub column: String,
    pub vindex: Arc<dyn Vindex>,
    /// True if this table owns the lookup entries of the vindex
    pub owned: bool,
}

#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub keyspace: String,
    pub sharded: bool,
    /// First entry is the primary vindex
    pub column_vindexes: Vec<ColumnVindex>,
}

impl Table {
    pub fn primary(&self) -> Option<&ColumnVindex> {
        self.column_vindexes.first()
    }

    /// Vindex bindings on `column`, cheapest first
    pub fn vindexes_for_column(&self, column: &str) -> Vec<&ColumnVindex> {
        let mut found: Vec<&ColumnVindex> = self
            .column_vindexes
            .iter()
            .filter(|cv| cv.column.eq_ignore_ascii_case(column))
            .collect();
        found.sort_by_key(|cv| cv.vindex.cost());
        found
    }
}

#[derive(Debug)]
pub struct Keyspace {
    pub name: String,
    pub sharded: bool,
    pub tables: BTreeMap<String, Arc<Table>>,
}

/// Routing schema for every keyspace the router serves
#[derive(Debug, Default)]
pub struct VSchema {
    keyspaces: BTreeMap<String, Keyspace>,
}

impl VSchema {
    /// Validates `source` and instantiates its vindexes.
    pub fn build(source: &VSchemaSource) -> VSchemaResult<Self> {
        let mut keyspaces = BTreeMap::new();

        for (ks_name, ks) in &source.keyspaces {
            if !ks.sharded
                && (!ks.vindexes.is_empty()
                    || ks.tables.values().any(|t| !t.column_vindexes.is_empty()))
            {
                return Err(VSchemaError::VindexInUnsharded {
                    keyspace: ks_name.clone(),
                });
            }

            let mut vindexes = BTreeMap::new();
            for (vname, vsrc) in &ks.vindexes {
                let v = vindex::create(&vsrc.vindex_type, vname, &vsrc.params).map_err(|source| {
                    VSchemaError::Vindex {
                        keyspace: ks_name.clone(),
                        vindex: vname.clone(),
                        source,
                    }
                })?;
                vindexes.insert(vname.clone(), (v, vsrc.owner.clone()));
            }

            let mut tables = BTreeMap::new();
            for (tname, tsrc) in &ks.tables {
                let mut column_vindexes = Vec::with_capacity(tsrc.column_vindexes.len());
                for cv in &tsrc.column_vindexes {
                    let (v, owner) =
                        vindexes
                            .get(&cv.name)
                            .ok_or_else(|| VSchemaError::UnknownVindex {
                                keyspace: ks_name.clone(),
                                table: tname.clone(),
                                vindex: cv.name.clone(),
                            })?;
                    column_vindexes.push(ColumnVindex {
                        column: cv.column.clone(),
                        vindex: Arc::clone(v),
                        owned: owner.as_deref() == Some(tname.as_str()),
                    });
                }

                if ks.sharded {
                    let primary =
                        column_vindexes
                            .first()
                            .ok_or_else(|| VSchemaError::MissingPrimaryVindex {
                                keyspace: ks_name.clone(),
                                table: tname.clone(),
                            })?;
                    if !primary.vindex.is_unique() {
                        return Err(VSchemaError::NonUniquePrimary {
                            keyspace: ks_name.clone(),
                            table: tname.clone(),
                            vindex: primary.vindex.name().to_string(),
                        });
                    }
                }

                tables.insert(
                    tname.clone(),
                    Arc::new(Table {
                        name: tname.clone(),
                        keyspace: ks_name.clone(),
                        sharded: ks.sharded,
                        column_vindexes,
                    }),
                );
            }

            keyspaces.insert(
                ks_name.clone(),
                Keyspace {
                    name: ks_name.clone(),
                    sharded: ks.sharded,
                    tables,
                },
            );
        }

        Ok(Self { keyspaces })
    }

    pub fn keyspace(&self, name: &str) -> Option<&Keyspace> {
        self.keyspaces.get(name)
    }

    pub fn keyspaces(&self) -> impl Iterator<Item = &Keyspace> {
        self.keyspaces.values()
    }

    /// Resolves a table reference. Unqualified names must be unique across
    /// keyspaces.
    pub fn find_table(&self, qualifier: Option<&str>, name: &str) -> VSchemaResult<Arc<Table>> {
        if let Some(ks_name) = qualifier {
            let ks = self
                .keyspaces
                .get(ks_name)
                .ok_or_else(|| VSchemaError::KeyspaceNotFound(ks_name.to_string()))?;
            return ks
                .tables
                .get(name)
                .cloned()
                .ok_or_else(|| VSchemaError::TableNotFound(format!("{}.{}", ks_name, name)));
        }

        let mut found = self.keyspaces.values().filter_map(|ks| ks.tables.get(name));
        match (found.next(), found.next()) {
            (Some(table), None) => Ok(Arc::clone(table)),
            (None, _) => Err(VSchemaError::TableNotFound(name.to_string())),
            (Some(_), Some(_)) => Err(VSchemaError::AmbiguousTable(name.to_string())),
        }
    }
}
