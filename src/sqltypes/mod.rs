//! SQL value and result types shared by every layer of the router

mod query;
mod result;
mod value;

pub use query::{bind_vars, BindVars, BoundQuery};
pub use result::{Field, FieldType, QueryResult, Row};
pub use value::Value;
