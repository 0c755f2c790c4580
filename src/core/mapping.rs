use serde::{Deserialize, Serialize};

/// One row of the alias table: a public alias and the sub indexes its
/// documents land in. Built by the mapping layer, consumed read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub alias: String,
    pub sub_indexes: Vec<String>,
}

impl MappingEntry {
    pub fn new(alias: impl Into<String>, sub_indexes: &[&str]) -> Self {
        MappingEntry {
            alias: alias.into(),
            sub_indexes: sub_indexes.iter().map(|s| s.to_string()).collect(),
        }
    }
}
