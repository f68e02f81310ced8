use serde_json::{Map, Value};

/// A fully materialized matrix entry.
pub type Record = Map<String, Value>;

/// Value of one field in a partial record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Resolved(Value),
    /// Expression text, evaluated lazily once the record is complete.
    Deferred(String),
}

/// A flat record under construction: fields in first-insertion order plus the
/// `$if` predicates collected on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    fields: Vec<(String, Field)>,
    conditions: Vec<String>,
}

impl PartialRecord {
    pub fn with_field(name: impl Into<String>, field: Field) -> Self {
        let mut rec = PartialRecord::default();
        rec.set(name, field);
        rec
    }

    pub fn with_conditions(conditions: Vec<String>) -> Self {
        PartialRecord {
            conditions,
            ..Default::default()
        }
    }

    /// Overwrites in place when the field exists, appends otherwise.
    pub fn set(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, f)| f)
    }

    pub fn fields(&self) -> &[(String, Field)] {
        &self.fields
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.conditions.is_empty()
    }

    pub fn into_parts(self) -> (Vec<(String, Field)>, Vec<String>) {
        (self.fields, self.conditions)
    }

    /// Folds `other` into `self`: later fields win, predicates accumulate.
    pub fn absorb(&mut self, other: &PartialRecord) {
        for (name, field) in &other.fields {
            self.set(name.clone(), field.clone());
        }
        self.conditions.extend(other.conditions.iter().cloned());
    }
}

/// Merges one chosen partial per axis into a single record, left to right.
pub fn merge<'a, I>(parts: I) -> PartialRecord
where
    I: IntoIterator<Item = &'a PartialRecord>,
{
    let mut out = PartialRecord::default();
    for part in parts {
        out.absorb(part);
    }
    out
}
