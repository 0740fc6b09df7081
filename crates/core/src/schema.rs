//! Glue-compatible schema inference over exported items.
//!
//! Nested maps are flattened into dotted column names. Each column gets the
//! narrowest type that fits every non-null value seen for it. A column that is
//! null or absent in some items widens `int` to `double` and `boolean` to
//! `string`, and a column holding only nulls is `double`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::item::{Item, Value};

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Double,
    Boolean,
    String,
    /// Only nulls seen so far.
    Unknown,
}

impl ColumnType {
    /// Name of the type in a Glue table definition.
    pub fn glue_name(&self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::String | ColumnType::Unknown => "string",
        }
    }

    fn of(value: &Value) -> ColumnType {
        match value {
            Value::Null => ColumnType::Unknown,
            Value::Bool(_) => ColumnType::Boolean,
            Value::N(n) if is_integer(n) => ColumnType::Int,
            Value::N(_) => ColumnType::Double,
            _ => ColumnType::String,
        }
    }

    fn merge(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (a, b) if a == b => a,
            (Int, Double) | (Double, Int) => Double,
            _ => String,
        }
    }
}

fn is_integer(n: &str) -> bool {
    !n.contains(['.', 'e', 'E']) && n.parse::<i64>().is_ok()
}

/// One column of a Glue table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlueColumn {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub column_type: String,
}

#[derive(Debug, Clone, Copy)]
struct ColumnStats {
    column_type: ColumnType,
    /// Items holding a non-null value for the column.
    present: u64,
}

/// Accumulates column types over a stream of items.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    order: Vec<String>,
    columns: HashMap<String, ColumnStats>,
    items: u64,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, item: &Item) {
        self.items += 1;
        for (name, value) in item.iter() {
            self.observe_value(name.clone(), value);
        }
    }

    fn observe_value(&mut self, column: String, value: &Value) {
        if let Value::M(map) = value {
            for (name, nested) in map {
                self.observe_value(format!("{column}.{name}"), nested);
            }
            return;
        }

        let observed = ColumnType::of(value);
        let present = u64::from(!matches!(value, Value::Null));
        match self.columns.get_mut(&column) {
            Some(stats) => {
                stats.column_type = stats.column_type.merge(observed);
                stats.present += present;
            }
            None => {
                self.order.push(column.clone());
                self.columns.insert(
                    column,
                    ColumnStats {
                        column_type: observed,
                        present,
                    },
                );
            }
        }
    }

    /// Columns in first-seen order with their final type.
    pub fn columns(&self) -> Vec<(String, ColumnType)> {
        self.order
            .iter()
            .map(|name| {
                let column_type = self
                    .columns
                    .get(name)
                    .map_or(ColumnType::Unknown, |stats| self.resolve(stats));
                (name.clone(), column_type)
            })
            .collect()
    }

    fn resolve(&self, stats: &ColumnStats) -> ColumnType {
        let sparse = stats.present < self.items;
        match (stats.column_type, sparse) {
            (ColumnType::Int, true) => ColumnType::Double,
            (ColumnType::Boolean, true) => ColumnType::String,
            (ColumnType::Unknown, _) => ColumnType::Double,
            (column_type, _) => column_type,
        }
    }

    pub fn build(&self) -> Vec<GlueColumn> {
        self.columns()
            .into_iter()
            .map(|(name, t)| GlueColumn {
                name,
                column_type: t.glue_name().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn types(builder: &SchemaBuilder) -> Vec<(String, String)> {
        builder
            .build()
            .into_iter()
            .map(|c| (c.name, c.column_type))
            .collect()
    }

    fn col(name: &str, glue_type: &str) -> (String, String) {
        (name.to_string(), glue_type.to_string())
    }

    #[test]
    fn test_scalar_inference() {
        let mut builder = SchemaBuilder::new();
        builder.observe(
            &Item::new()
                .with("id", "u1")
                .with("age", 30)
                .with("score", Value::N("4.5".to_string()))
                .with("active", true),
        );

        assert_eq!(
            types(&builder),
            vec![
                col("active", "boolean"),
                col("age", "int"),
                col("id", "string"),
                col("score", "double"),
            ]
        );
    }

    #[test]
    fn test_types_widen_across_items() {
        let mut builder = SchemaBuilder::new();
        builder.observe(&Item::new().with("n", 1).with("x", true).with("z", Value::Null));
        builder.observe(
            &Item::new()
                .with("n", Value::N("2.5".to_string()))
                .with("x", "yes")
                .with("z", 3),
        );

        assert_eq!(
            types(&builder),
            vec![
                col("n", "double"),
                col("x", "string"),
                col("z", "double"),
            ]
        );
    }

    #[test]
    fn test_nested_maps_are_flattened() {
        let mut inner = BTreeMap::new();
        inner.insert("city".to_string(), Value::from("Lima"));
        inner.insert("zip".to_string(), Value::from(15001));
        let mut builder = SchemaBuilder::new();
        builder.observe(
            &Item::new()
                .with("address", Value::M(inner))
                .with("tags", Value::Ss(vec!["a".to_string()])),
        );

        assert_eq!(
            types(&builder),
            vec![
                col("address.city", "string"),
                col("address.zip", "int"),
                col("tags", "string"),
            ]
        );
    }

    #[test]
    fn test_null_only_column_is_double() {
        let mut builder = SchemaBuilder::new();
        builder.observe(&Item::new().with("gone", Value::Null));
        assert_eq!(builder.build()[0].column_type, "double");
    }

    #[test]
    fn test_sparse_columns_widen() {
        let mut builder = SchemaBuilder::new();
        builder.observe(
            &Item::new()
                .with("pk", "a")
                .with("age", 30)
                .with("score", Value::N("1.5".to_string()))
                .with("active", true),
        );
        builder.observe(&Item::new().with("pk", "b").with("active", Value::Null));

        assert_eq!(
            types(&builder),
            vec![
                col("active", "string"),
                col("age", "double"),
                col("pk", "string"),
                col("score", "double"),
            ]
        );
    }

    #[test]
    fn test_glue_column_serialization() {
        let column = GlueColumn {
            name: "id".to_string(),
            column_type: "string".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&column).unwrap(),
            r#"{"Name":"id","Type":"string"}"#
        );
    }

    #[test]
    fn test_large_integers_are_double() {
        assert_eq!(
            ColumnType::of(&Value::N("99999999999999999999".to_string())),
            ColumnType::Double
        );
    }
}
