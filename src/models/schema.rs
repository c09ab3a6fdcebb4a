//! Schema-related data models.
//!
//! This module defines the table and column shapes used by the schema and DDL
//! tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A column as reported by `describe_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableColumn {
    pub name: String,
    /// SQL Server data type (e.g. "int", "nvarchar")
    #[serde(rename = "type")]
    pub data_type: String,
}

impl TableColumn {
    /// Create a new column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A column to create with `create_table`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    /// Column name (letters, digits and underscores)
    pub name: String,
    /// Column type and modifiers, e.g. "INT PRIMARY KEY" or "NVARCHAR(255) NOT NULL"
    #[serde(rename = "type")]
    pub data_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_column_serializes_type_key() {
        let col = TableColumn::new("id", "int");
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["name"], "id");
        assert_eq!(json["type"], "int");
    }

    #[test]
    fn test_column_definition_deserializes_type_key() {
        let def: ColumnDefinition =
            serde_json::from_str(r#"{"name":"email","type":"NVARCHAR(255) NOT NULL"}"#).unwrap();
        assert_eq!(def.name, "email");
        assert_eq!(def.data_type, "NVARCHAR(255) NOT NULL");
    }
}
