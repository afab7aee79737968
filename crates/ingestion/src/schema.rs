//! Structural shapes and the comparator that diffs them.
//!
//! A shape is the ordered list of named, typed fields that describes an
//! entity's internal structure: the columns of a table, the features of a
//! model. Comparison is purely structural. Field order is ignored, renames
//! show up as one removal plus one addition, and type strings are compared
//! verbatim (`INT` and `BIGINT` differ).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "dataType")]
    pub data_type: String,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Ordered list of fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuralShape {
    fields: Vec<Field>,
}

impl StructuralShape {
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, data_type: impl Into<String>) {
        self.fields.push(Field::new(name, data_type));
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.push(name, data_type);
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field name to declared type. A repeated name keeps its last type.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&str, &str> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.data_type.as_str()))
            .collect()
    }

    /// Read a shape out of a catalog payload list such as `columns`.
    ///
    /// Entries without a string `name` and `dataType` are skipped; this is
    /// for catalog responses, which are trusted, not for user input.
    #[must_use]
    pub fn from_json_list(value: Option<&Value>) -> Self {
        let Some(Value::Array(items)) = value else {
            return Self::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let data_type = item.get("dataType")?.as_str()?;
                Some(Field::new(name, data_type))
            })
            .collect()
    }
}

impl FromIterator<Field> for StructuralShape {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl<N: Into<String>, T: Into<String>> FromIterator<(N, T)> for StructuralShape {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        iter.into_iter().map(|(n, t)| Field::new(n, t)).collect()
    }
}

/// A field present in both shapes with a different declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeChange {
    pub name: String,
    pub old_type: String,
    pub new_type: String,
}

/// Difference between two structural shapes of the same entity.
///
/// All three lists are sorted by field name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<TypeChange>,
}

impl SchemaDelta {
    /// Compare the catalog's current shape against a candidate.
    #[must_use]
    pub fn compare(previous: &StructuralShape, candidate: &StructuralShape) -> Self {
        let old = previous.to_map();
        let new = candidate.to_map();

        let mut delta = Self::default();
        for (name, new_type) in &new {
            match old.get(name) {
                None => delta.added.push((*name).to_string()),
                Some(old_type) if old_type != new_type => delta.changed.push(TypeChange {
                    name: (*name).to_string(),
                    old_type: (*old_type).to_string(),
                    new_type: (*new_type).to_string(),
                }),
                Some(_) => {}
            }
        }
        delta.removed = old
            .keys()
            .filter(|name| !new.contains_key(*name))
            .map(|name| (*name).to_string())
            .collect();
        delta
    }

    /// True when no catalog write is needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    #[must_use]
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }

    /// One-line description, e.g. `+1 added, -2 removed`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no structural changes".to_string();
        }
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("+{} added", self.added.len()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("-{} removed", self.removed.len()));
        }
        if !self.changed.is_empty() {
            parts.push(format!("~{} changed", self.changed.len()));
        }
        parts.join(", ")
    }
}

impl fmt::Display for SchemaDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.added {
            writeln!(f, "+ {name}")?;
        }
        for name in &self.removed {
            writeln!(f, "- {name}")?;
        }
        for change in &self.changed {
            writeln!(f, "~ {}: {} -> {}", change.name, change.old_type, change.new_type)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(fields: &[(&str, &str)]) -> StructuralShape {
        fields.iter().copied().collect()
    }

    #[test]
    fn test_added_field() {
        let previous = shape(&[("id", "BIGINT")]);
        let candidate = shape(&[("id", "BIGINT"), ("name", "STRING")]);

        let delta = SchemaDelta::compare(&previous, &candidate);
        assert_eq!(delta.added, vec!["name"]);
        assert!(delta.removed.is_empty());
        assert!(delta.changed.is_empty());
        assert_eq!(delta.summary(), "+1 added");
    }

    #[test]
    fn test_rename_is_remove_plus_add() {
        let previous = shape(&[("id", "INT"), ("user_name", "STRING")]);
        let candidate = shape(&[("id", "INT"), ("username", "STRING")]);

        let delta = SchemaDelta::compare(&previous, &candidate);
        assert_eq!(delta.added, vec!["username"]);
        assert_eq!(delta.removed, vec!["user_name"]);
        assert_eq!(delta.change_count(), 2);
    }

    #[test]
    fn test_type_change_has_no_coercion() {
        let previous = shape(&[("id", "INT")]);
        let candidate = shape(&[("id", "BIGINT")]);

        let delta = SchemaDelta::compare(&previous, &candidate);
        assert_eq!(
            delta.changed,
            vec![TypeChange {
                name: "id".into(),
                old_type: "INT".into(),
                new_type: "BIGINT".into(),
            }]
        );
    }

    #[test]
    fn test_field_order_is_ignored() {
        let previous = shape(&[("a", "INT"), ("b", "STRING")]);
        let candidate = shape(&[("b", "STRING"), ("a", "INT")]);
        assert!(SchemaDelta::compare(&previous, &candidate).is_empty());
    }

    #[test]
    fn test_self_comparison_is_empty() {
        let s = shape(&[("id", "BIGINT"), ("ts", "TIMESTAMP"), ("tags", "ARRAY")]);
        let delta = SchemaDelta::compare(&s, &s);
        assert!(delta.is_empty());
        assert_eq!(delta.summary(), "no structural changes");
    }

    #[test]
    fn test_delta_lists_are_sorted() {
        let previous = StructuralShape::new();
        let candidate = shape(&[("zeta", "INT"), ("alpha", "INT"), ("mid", "INT")]);
        let delta = SchemaDelta::compare(&previous, &candidate);
        assert_eq!(delta.added, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_display_lists_every_change() {
        let previous = shape(&[("a", "INT"), ("b", "INT")]);
        let candidate = shape(&[("a", "BIGINT"), ("c", "INT")]);
        let rendered = SchemaDelta::compare(&previous, &candidate).to_string();
        assert_eq!(rendered, "+ c\n- b\n~ a: INT -> BIGINT\n");
    }

    #[test]
    fn test_from_json_list_skips_malformed_entries() {
        let value = serde_json::json!([
            { "name": "id", "dataType": "BIGINT" },
            { "name": "broken" },
            { "name": "email", "dataType": "STRING", "description": "contact" }
        ]);
        let s = StructuralShape::from_json_list(Some(&value));
        assert_eq!(s, shape(&[("id", "BIGINT"), ("email", "STRING")]));
        assert!(StructuralShape::from_json_list(None).is_empty());
    }

    #[test]
    fn test_shape_serializes_as_list() {
        let s = shape(&[("id", "INT")]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json, serde_json::json!([{ "name": "id", "dataType": "INT" }]));
    }
}
