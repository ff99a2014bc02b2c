//! Alias resolution: collapsing column names into identifier domains.
//!
//! Resolution runs once, before any file is opened, and produces a
//! pre-validated column-name -> domain mapping. The pipeline then does plain
//! index lookups per row instead of scanning alias groups per value.

use std::collections::{BTreeMap, BTreeSet};

use veil_model::{Result, VeilConfig, VeilError};

/// A named equivalence class of column names sharing one substitution table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierDomain {
    pub name: String,
    /// Member column names across all declared files.
    pub columns: BTreeSet<String>,
    /// Column name under which surrogates are persisted.
    pub surrogate_column: String,
}

/// The resolved set of identifier domains for a run.
#[derive(Debug, Clone, Default)]
pub struct DomainPlan {
    domains: Vec<IdentifierDomain>,
    by_column: BTreeMap<String, usize>,
}

impl DomainPlan {
    /// Builds the plan from the declarative config: one domain per alias
    /// group, then one singleton domain per remaining un-aliased identifier
    /// column. A column claimed by two alias groups is a config error;
    /// membership must be unambiguous. Each domain's derived surrogate
    /// column name is checked against every declared column so persisted
    /// maps never shadow a real header.
    pub fn resolve(config: &VeilConfig) -> Result<Self> {
        let mut plan = Self::default();
        for (group, members) in &config.aliases {
            let idx = plan.push_domain(group, members.iter().cloned());
            for member in members {
                if let Some(previous) = plan.by_column.insert(member.clone(), idx)
                    && previous != idx
                {
                    return Err(VeilError::Config(format!(
                        "column '{member}' belongs to alias groups '{}' and '{group}'",
                        plan.domains[previous].name
                    )));
                }
            }
        }
        for decl in config.files.values() {
            for column in &decl.id {
                if plan.by_column.contains_key(column) {
                    // Aliased, or a singleton already created for an
                    // earlier file.
                    let idx = plan.by_column[column];
                    plan.domains[idx].columns.insert(column.clone());
                    continue;
                }
                let idx = plan.push_domain(column, [column.clone()]);
                plan.by_column.insert(column.clone(), idx);
            }
        }
        let declared: BTreeSet<&str> = config
            .files
            .values()
            .flat_map(|decl| {
                decl.id
                    .iter()
                    .chain(&decl.datetime)
                    .chain(decl.exclude.iter().flatten())
            })
            .map(String::as_str)
            .collect();
        for domain in &plan.domains {
            if declared.contains(domain.surrogate_column.as_str()) {
                return Err(VeilError::NameCollision(domain.surrogate_column.clone()));
            }
        }
        Ok(plan)
    }

    fn push_domain(&mut self, name: &str, columns: impl IntoIterator<Item = String>) -> usize {
        self.domains.push(IdentifierDomain {
            name: name.to_string(),
            columns: columns.into_iter().collect(),
            surrogate_column: format!("{name}_surrogate"),
        });
        self.domains.len() - 1
    }

    pub fn domains(&self) -> &[IdentifierDomain] {
        &self.domains
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Domain index for a declared identifier column.
    pub fn domain_of(&self, column: &str) -> Option<usize> {
        self.by_column.get(column).copied()
    }

    pub fn domain(&self, idx: usize) -> &IdentifierDomain {
        &self.domains[idx]
    }

    pub fn index_by_name(&self, name: &str) -> Option<usize> {
        self.domains.iter().position(|d| d.name == name)
    }

    /// Finds the column that carries the anchor id in a file with the given
    /// headers. The anchor may be a plain column name or an alias-group
    /// name, in which case any member present in the file qualifies.
    pub fn anchor_column_in<'a>(
        &self,
        datetime_base: &str,
        headers: &'a [String],
    ) -> Option<&'a str> {
        if let Some(header) = headers.iter().find(|h| h.as_str() == datetime_base) {
            return Some(header);
        }
        let idx = self.index_by_name(datetime_base)?;
        headers
            .iter()
            .find(|h| self.domains[idx].columns.contains(h.as_str()))
            .map(String::as_str)
    }
}
