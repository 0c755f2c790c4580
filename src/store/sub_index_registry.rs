use std::collections::{BTreeSet, HashMap};
use crate::core::error::{Result, StoreError};
use crate::core::mapping::MappingEntry;

/// Alias to sub index mapping, resolved once at store build time.
pub struct SubIndexRegistry {
    sub_indexes: Vec<String>,
    by_alias: HashMap<String, Vec<String>>,
    aliases_by_sub_index: HashMap<String, Vec<String>>,
}

impl SubIndexRegistry {
    pub fn new(mappings: &[MappingEntry]) -> Self {
        let mut all = BTreeSet::new();
        let mut by_alias: HashMap<String, Vec<String>> = HashMap::new();
        let mut aliases_by_sub_index: HashMap<String, Vec<String>> = HashMap::new();

        for entry in mappings {
            let list = by_alias.entry(entry.alias.clone()).or_default();
            for sub_index in &entry.sub_indexes {
                all.insert(sub_index.clone());
                if !list.contains(sub_index) {
                    list.push(sub_index.clone());
                }
                let aliases = aliases_by_sub_index.entry(sub_index.clone()).or_default();
                if !aliases.contains(&entry.alias) {
                    aliases.push(entry.alias.clone());
                }
            }
        }

        SubIndexRegistry {
            sub_indexes: all.into_iter().collect(),
            by_alias,
            aliases_by_sub_index,
        }
    }

    /// Every known sub index, sorted.
    pub fn sub_indexes(&self) -> &[String] {
        &self.sub_indexes
    }

    pub fn sub_indexes_for_alias(&self, alias: &str) -> Option<&[String]> {
        self.by_alias.get(alias).map(|v| v.as_slice())
    }

    pub fn aliases_for(&self, sub_index: &str) -> &[String] {
        self.aliases_by_sub_index
            .get(sub_index)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn number_of_aliases_for(&self, sub_index: &str) -> usize {
        self.aliases_for(sub_index).len()
    }

    /// Expands aliases and merges in explicitly named sub indexes. With
    /// neither given, the full set comes back. Explicit names pass through
    /// unvalidated; unknown aliases fail.
    pub fn calc_sub_indexes(
        &self,
        sub_indexes: Option<&[&str]>,
        aliases: Option<&[&str]>,
    ) -> Result<Vec<String>> {
        let Some(aliases) = aliases else {
            return Ok(match sub_indexes {
                Some(names) => names.iter().map(|s| s.to_string()).collect(),
                None => self.sub_indexes.clone(),
            });
        };

        let mut merged = BTreeSet::new();
        for alias in aliases {
            let mapped = self
                .by_alias
                .get(*alias)
                .ok_or_else(|| StoreError::unknown_alias(*alias))?;
            for sub_index in mapped {
                merged.insert(sub_index.clone());
            }
        }
        if let Some(names) = sub_indexes {
            for name in names {
                merged.insert(name.to_string());
            }
        }
        Ok(merged.into_iter().collect())
    }
}
