mod execute;
mod types;
mod validate;

pub use execute::execute;
pub use types::{QueryRequest, QueryResult, QueryResultWithTypes, Row, normalize_query};
pub use validate::validate;
