//! JSON form of the VSchema as it appears in configuration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VSchemaSource {
    #[serde(default)]
    pub keyspaces: BTreeMap<String, KeyspaceSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceSource {
    #[serde(default)]
    pub sharded: bool,
    #[serde(default)]
    pub vindexes: BTreeMap<String, VindexSource>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VindexSource {
    #[serde(rename = "type")]
    pub vindex_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Table whose rows own the lookup entries, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSource {
    /// First entry is the primary vindex
    #[serde(default)]
    pub column_vindexes: Vec<ColumnVindexSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnVindexSource {
    pub column: String,
    pub name: String,
}
