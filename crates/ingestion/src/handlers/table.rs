//! Table handler.
//!
//! A table's structural shape is its column list. Columns come from the
//! `columns` property when one is declared, otherwise from the shape a
//! source connector attached during discovery. Column types are
//! upper-cased, a few common aliases are folded, and anything outside the
//! catalog's type set is rejected.

use serde_json::{Value, json};

use super::{EntityHandler, base_payload, join_fqn, parse_field_list};
use crate::error::{Error, Result};
use crate::schema::StructuralShape;
use crate::types::{CatalogEntity, EntityDeclaration, EntityKey, EntityType};

const DATA_TYPES: &[&str] = &[
    "NUMBER", "TINYINT", "SMALLINT", "INT", "BIGINT", "BYTEINT", "BYTES", "FLOAT", "DOUBLE",
    "DECIMAL", "NUMERIC", "TIMESTAMP", "TIMESTAMPZ", "TIME", "DATE", "DATETIME", "INTERVAL",
    "STRING", "MEDIUMTEXT", "TEXT", "CHAR", "LONG", "VARCHAR", "BOOLEAN", "BINARY", "VARBINARY",
    "ARRAY", "BLOB", "LONGBLOB", "MEDIUMBLOB", "MAP", "STRUCT", "UNION", "SET", "GEOGRAPHY",
    "ENUM", "JSON", "UUID", "VARIANT", "GEOMETRY", "BYTEA", "AGGREGATEFUNCTION", "ERROR",
    "FIXED", "RECORD", "NULL", "SUPER", "HLLSKETCH", "PG_LSN", "PG_SNAPSHOT", "TSQUERY",
    "TXID_SNAPSHOT", "XML", "MACADDR", "TSVECTOR", "UNKNOWN", "CIDR", "INET", "CLOB",
    "ROWID", "LOWCARDINALITY", "YEAR", "POINT", "POLYGON", "TUPLE", "SPATIAL", "TABLE",
    "NTEXT", "IMAGE", "IPV4", "IPV6", "DATETIMERANGE", "HIERARCHYID", "LARGEINT", "QUANTILE_STATE",
    "AGG_STATE", "BITMAP", "UINT", "BIT", "MONEY",
];

const TABLE_TYPES: &[&str] = &[
    "Regular",
    "External",
    "View",
    "SecureView",
    "MaterializedView",
    "Iceberg",
    "Local",
    "Partitioned",
    "Foreign",
    "Transient",
    "Dynamic",
    "Stream",
];

/// Normalize a declared column type to the catalog's spelling.
///
/// Returns `None` for types the catalog does not know.
#[must_use]
pub fn normalize_data_type(raw: &str) -> Option<String> {
    let upper = raw.trim().to_ascii_uppercase();
    let folded = match upper.as_str() {
        "TEXT" => "STRING",
        "INTEGER" => "INT",
        "BOOL" => "BOOLEAN",
        other => other,
    };
    DATA_TYPES.contains(&folded).then(|| folded.to_string())
}

fn column_type(declared: Option<&str>) -> std::result::Result<String, String> {
    let declared = declared.ok_or("missing 'dataType'")?;
    normalize_data_type(declared).ok_or_else(|| format!("invalid data type '{declared}'"))
}

/// Table, parented by its database and schema.
#[derive(Debug)]
pub struct TableHandler;

impl TableHandler {
    fn schema_fqn(decl: &EntityDeclaration) -> Result<String> {
        Ok(join_fqn(&[
            decl.require_str("service")?,
            decl.require_str("database")?,
            decl.require_str("database_schema")?,
        ]))
    }

    fn columns(decl: &EntityDeclaration) -> Result<(StructuralShape, Vec<Value>)> {
        if let Some(declared) = parse_field_list(decl, "columns", column_type)? {
            return Ok(declared);
        }

        let Some(discovered) = &decl.shape else {
            return Ok((StructuralShape::new(), Vec::new()));
        };
        let mut shape = StructuralShape::new();
        let mut entries = Vec::with_capacity(discovered.len());
        for field in discovered.fields() {
            let data_type = column_type(Some(&field.data_type)).map_err(|msg| {
                Error::validation(decl.label(), format!("'{}': {msg}", field.name))
            })?;
            entries.push(json!({ "name": field.name, "dataType": data_type }));
            shape.push(field.name.clone(), data_type);
        }
        Ok((shape, entries))
    }
}

impl EntityHandler for TableHandler {
    fn entity_type(&self) -> EntityType {
        EntityType::Table
    }

    fn fqn(&self, decl: &EntityDeclaration) -> Result<String> {
        Ok(join_fqn(&[&Self::schema_fqn(decl)?, decl.require_name()?]))
    }

    fn dependencies(&self, decl: &EntityDeclaration) -> Result<Vec<EntityKey>> {
        let database = join_fqn(&[decl.require_str("service")?, decl.require_str("database")?]);
        Ok(vec![
            EntityKey::new(EntityType::Database, database),
            EntityKey::new(EntityType::DatabaseSchema, Self::schema_fqn(decl)?),
        ])
    }

    fn validate(&self, decl: &EntityDeclaration) -> Result<()> {
        self.fqn(decl)?;
        Self::columns(decl).map(|_| ())
    }

    fn build(&self, decl: &EntityDeclaration) -> Result<CatalogEntity> {
        let fqn = self.fqn(decl)?;
        let (shape, columns) = Self::columns(decl)?;

        let table_type = decl
            .property_str("table_type")?
            .filter(|t| TABLE_TYPES.contains(t))
            .unwrap_or("Regular");

        let mut payload = base_payload(decl)?;
        payload.insert("databaseSchema".into(), Value::String(Self::schema_fqn(decl)?));
        payload.insert("tableType".into(), Value::String(table_type.to_string()));
        payload.insert("columns".into(), Value::Array(columns));

        Ok(CatalogEntity {
            entity_type: EntityType::Table,
            fqn,
            name: decl.require_name()?.to_string(),
            payload: Value::Object(payload),
            shape,
        })
    }

    fn supports_schema(&self) -> bool {
        true
    }
}
