//! Startup schema introspection.
//!
//! The catalog is loaded once, before the gateway serves traffic, and is
//! immutable afterwards. Every request consults it through plain reads on a
//! shared `Arc<Catalog>`; a schema change requires a restart.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::mysql::MySqlPool;
use sqlx::Row as SqlxRow;
use tracing::{info, instrument, warn};

use crate::policy::POLICY_TABLE;
use crate::{GatewayError, Result};

/// Declared column type, reduced to the classes the compiler cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Signed or unsigned integer family (TINYINT..BIGINT, YEAR)
    Int,
    /// FLOAT / DOUBLE
    Float,
    /// DECIMAL / NUMERIC
    Decimal,
    /// Character data (CHAR, VARCHAR, TEXT, ENUM, SET)
    String,
    /// DATE
    Date,
    /// DATETIME / TIMESTAMP
    DateTime,
    /// TIME
    Time,
    /// JSON
    Json,
    /// BINARY / VARBINARY / BLOB family
    Binary,
    /// Anything else (GEOMETRY, BIT, ...)
    Other,
}

impl ColumnType {
    /// Maps an information_schema DATA_TYPE to a [`ColumnType`].
    pub fn from_data_type(data_type: &str) -> ColumnType {
        match data_type.to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                ColumnType::Int
            }
            "float" | "double" | "real" => ColumnType::Float,
            "decimal" | "numeric" => ColumnType::Decimal,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" => ColumnType::String,
            "date" => ColumnType::Date,
            "datetime" | "timestamp" => ColumnType::DateTime,
            "time" => ColumnType::Time,
            "json" => ColumnType::Json,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                ColumnType::Binary
            }
            _ => ColumnType::Other,
        }
    }
}

/// Whether a column participates in the table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Primary,
    None,
}

/// A single table column.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub ordinal: u32,
    pub data_type: ColumnType,
    pub key: KeyRole,
    pub nullable: bool,
    pub default: Option<String>,
    /// Full declared type text, e.g. `varchar(50)` or `int(11) unsigned`
    pub raw_type: String,
    pub auto_increment: bool,
}

impl Column {
    /// True when values for this column must be JSON-encoded before binding.
    pub fn needs_json_encoding(&self) -> bool {
        self.data_type == ColumnType::Json
    }
}

/// A foreign key edge between two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    /// Owning table (the table that declares the constraint)
    pub table: String,
    /// Owning column
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub column_type: ColumnType,
}

/// A table or view.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// Primary-key column names in ordinal order
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True when the primary key is a single integer column, the shape an
    /// auto-increment follow-up select can range over.
    pub fn has_single_int_pk(&self) -> bool {
        self.primary_key.len() == 1
            && self
                .column(&self.primary_key[0])
                .map(|c| c.data_type == ColumnType::Int)
                .unwrap_or(false)
    }

    /// True when the primary key is a single auto-incrementing column.
    pub fn has_auto_increment_pk(&self) -> bool {
        self.primary_key.len() == 1
            && self
                .column(&self.primary_key[0])
                .map(|c| c.auto_increment)
                .unwrap_or(false)
    }
}

/// Routine kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Procedure,
    Function,
}

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

/// A stored routine parameter.
#[derive(Debug, Clone, Serialize)]
pub struct RoutineParam {
    pub name: String,
    pub data_type: String,
    pub mode: ParamMode,
    pub position: u32,
}

/// A stored procedure or function.
#[derive(Debug, Clone, Serialize)]
pub struct Routine {
    pub name: String,
    pub kind: RoutineKind,
    /// Parameters in declared order
    pub params: Vec<RoutineParam>,
}

/// The authoritative read-only picture of the database schema.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, Table>,
    routines: BTreeMap<String, Routine>,
}

impl Catalog {
    /// Introspects the given database and builds the catalog.
    ///
    /// Runs two information_schema queries: one for tables, columns, key
    /// roles, and foreign keys; one for routines and their parameters. The
    /// first failing (or returning nothing) is fatal; a routine query
    /// failure is logged and leaves routines empty.
    #[instrument(skip(pool))]
    pub async fn load(pool: &MySqlPool, database: &str) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        catalog.load_tables(pool, database).await?;

        if catalog.tables.is_empty() {
            return Err(GatewayError::Catalog(format!(
                "database '{}' has no tables",
                database
            )));
        }

        if let Err(e) = catalog.load_routines(pool, database).await {
            warn!(error = %e, "Routine introspection failed, routines unavailable");
        }

        info!(
            tables = catalog.tables.len(),
            routines = catalog.routines.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    async fn load_tables(&mut self, pool: &MySqlPool, database: &str) -> Result<()> {
        let sql = "SELECT c.TABLE_NAME AS table_name, c.COLUMN_NAME AS column_name, \
                   c.ORDINAL_POSITION AS ordinal_position, c.DATA_TYPE AS data_type, \
                   c.COLUMN_TYPE AS column_type, c.COLUMN_KEY AS column_key, \
                   c.IS_NULLABLE AS is_nullable, c.COLUMN_DEFAULT AS column_default, \
                   c.EXTRA AS extra, \
                   k.REFERENCED_TABLE_NAME AS referenced_table, \
                   k.REFERENCED_COLUMN_NAME AS referenced_column \
                   FROM information_schema.COLUMNS c \
                   LEFT JOIN information_schema.KEY_COLUMN_USAGE k \
                     ON k.TABLE_SCHEMA = c.TABLE_SCHEMA \
                    AND k.TABLE_NAME = c.TABLE_NAME \
                    AND k.COLUMN_NAME = c.COLUMN_NAME \
                    AND k.REFERENCED_TABLE_NAME IS NOT NULL \
                   WHERE c.TABLE_SCHEMA = ? \
                   ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

        let rows = sqlx::query(sql)
            .bind(database)
            .fetch_all(pool)
            .await
            .map_err(|e| GatewayError::Catalog(format!("schema introspection failed: {}", e)))?;

        for row in &rows {
            let table_name: String = row
                .try_get("table_name")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let column_name: String = row
                .try_get("column_name")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let ordinal: u64 = row
                .try_get("ordinal_position")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let data_type: String = row
                .try_get("data_type")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let raw_type: String = row
                .try_get("column_type")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let column_key: String = row.try_get("column_key").unwrap_or_default();
            let is_nullable: String = row.try_get("is_nullable").unwrap_or_default();
            let default: Option<String> = row.try_get("column_default").unwrap_or(None);
            let extra: String = row.try_get("extra").unwrap_or_default();
            let referenced_table: Option<String> = row.try_get("referenced_table").unwrap_or(None);
            let referenced_column: Option<String> =
                row.try_get("referenced_column").unwrap_or(None);

            let column_type = ColumnType::from_data_type(&data_type);
            let table = self.tables.entry(table_name.clone()).or_insert_with(|| Table {
                name: table_name.clone(),
                columns: Vec::new(),
                primary_key: Vec::new(),
                foreign_keys: Vec::new(),
            });

            // A column with several FK constraints repeats in the join;
            // only the first occurrence adds the column itself.
            if table.column(&column_name).is_none() {
                let key = if column_key == "PRI" {
                    KeyRole::Primary
                } else {
                    KeyRole::None
                };
                if key == KeyRole::Primary {
                    table.primary_key.push(column_name.clone());
                }
                table.columns.push(Column {
                    name: column_name.clone(),
                    ordinal: ordinal as u32,
                    data_type: column_type,
                    key,
                    nullable: is_nullable == "YES",
                    default,
                    raw_type,
                    auto_increment: extra.contains("auto_increment"),
                });
            }

            if let (Some(ref_table), Some(ref_column)) = (referenced_table, referenced_column) {
                table.foreign_keys.push(ForeignKey {
                    table: table_name.clone(),
                    column: column_name,
                    referenced_table: ref_table,
                    referenced_column: ref_column,
                    column_type,
                });
            }
        }

        Ok(())
    }

    async fn load_routines(&mut self, pool: &MySqlPool, database: &str) -> Result<()> {
        let sql = "SELECT r.ROUTINE_NAME AS routine_name, r.ROUTINE_TYPE AS routine_type, \
                   p.PARAMETER_NAME AS parameter_name, p.DATA_TYPE AS data_type, \
                   p.PARAMETER_MODE AS parameter_mode, p.ORDINAL_POSITION AS ordinal_position \
                   FROM information_schema.ROUTINES r \
                   LEFT JOIN information_schema.PARAMETERS p \
                     ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA \
                    AND p.SPECIFIC_NAME = r.SPECIFIC_NAME \
                   WHERE r.ROUTINE_SCHEMA = ? \
                   ORDER BY r.ROUTINE_NAME, p.ORDINAL_POSITION";

        let rows = sqlx::query(sql)
            .bind(database)
            .fetch_all(pool)
            .await
            .map_err(|e| GatewayError::Catalog(format!("routine introspection failed: {}", e)))?;

        for row in &rows {
            let routine_name: String = row
                .try_get("routine_name")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let routine_type: String = row
                .try_get("routine_type")
                .map_err(|e| GatewayError::Catalog(e.to_string()))?;
            let parameter_name: Option<String> = row.try_get("parameter_name").unwrap_or(None);
            let data_type: Option<String> = row.try_get("data_type").unwrap_or(None);
            let parameter_mode: Option<String> = row.try_get("parameter_mode").unwrap_or(None);
            let position: Option<u64> = row.try_get("ordinal_position").unwrap_or(None);

            let kind = if routine_type == "FUNCTION" {
                RoutineKind::Function
            } else {
                RoutineKind::Procedure
            };

            let routine = self
                .routines
                .entry(routine_name.clone())
                .or_insert_with(|| Routine {
                    name: routine_name.clone(),
                    kind,
                    params: Vec::new(),
                });

            // Position 0 is a function's return value; it has no name and is
            // not a bindable parameter.
            if let (Some(name), Some(position)) = (parameter_name, position) {
                if position > 0 {
                    let mode = match parameter_mode.as_deref() {
                        Some("OUT") => ParamMode::Out,
                        Some("INOUT") => ParamMode::InOut,
                        _ => ParamMode::In,
                    };
                    routine.params.push(RoutineParam {
                        name,
                        data_type: data_type.unwrap_or_default(),
                        mode,
                        position: position as u32,
                    });
                }
            }
        }

        Ok(())
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Public table names, excluding the policy store.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables
            .keys()
            .map(String::as_str)
            .filter(|name| *name != POLICY_TABLE)
            .collect()
    }

    /// Looks up a routine by name.
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.get(name)
    }

    /// Test-only constructor building a catalog from prepared tables.
    pub fn from_tables(tables: Vec<Table>) -> Catalog {
        Catalog {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
            routines: BTreeMap::new(),
        }
    }

    /// Test-only: registers a routine.
    pub fn insert_routine(&mut self, routine: Routine) {
        self.routines.insert(routine.name.clone(), routine);
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub fn column(name: &str, data_type: ColumnType, key: KeyRole) -> Column {
        Column {
            name: name.to_string(),
            ordinal: 0,
            data_type,
            key,
            nullable: key != KeyRole::Primary,
            default: None,
            raw_type: String::new(),
            auto_increment: key == KeyRole::Primary && data_type == ColumnType::Int,
        }
    }

    /// Catalog with `customers (customerNumber pk)`, `orders (orderNumber pk,
    /// customerNumber fk -> customers)`, and `orderdetails` keyed by the
    /// composite (orderNumber, productCode).
    pub fn sample_catalog() -> Catalog {
        let customers = Table {
            name: "customers".to_string(),
            columns: vec![
                column("customerNumber", ColumnType::Int, KeyRole::Primary),
                column("customerName", ColumnType::String, KeyRole::None),
                column("creditLimit", ColumnType::Decimal, KeyRole::None),
            ],
            primary_key: vec!["customerNumber".to_string()],
            foreign_keys: vec![],
        };
        let orders = Table {
            name: "orders".to_string(),
            columns: vec![
                column("orderNumber", ColumnType::Int, KeyRole::Primary),
                column("status", ColumnType::String, KeyRole::None),
                column("customerNumber", ColumnType::Int, KeyRole::None),
            ],
            primary_key: vec!["orderNumber".to_string()],
            foreign_keys: vec![ForeignKey {
                table: "orders".to_string(),
                column: "customerNumber".to_string(),
                referenced_table: "customers".to_string(),
                referenced_column: "customerNumber".to_string(),
                column_type: ColumnType::Int,
            }],
        };
        let orderdetails = Table {
            name: "orderdetails".to_string(),
            columns: vec![
                column("orderNumber", ColumnType::Int, KeyRole::Primary),
                column("productCode", ColumnType::String, KeyRole::Primary),
                column("quantityOrdered", ColumnType::Int, KeyRole::None),
            ],
            primary_key: vec!["orderNumber".to_string(), "productCode".to_string()],
            foreign_keys: vec![ForeignKey {
                table: "orderdetails".to_string(),
                column: "orderNumber".to_string(),
                referenced_table: "orders".to_string(),
                referenced_column: "orderNumber".to_string(),
                column_type: ColumnType::Int,
            }],
        };
        let events = Table {
            name: "events".to_string(),
            columns: vec![
                column("id", ColumnType::Int, KeyRole::Primary),
                column("payload", ColumnType::Json, KeyRole::None),
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
        };
        Catalog::from_tables(vec![customers, orders, orderdetails, events])
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::sample_catalog;
    use super::*;

    #[test]
    fn test_column_type_mapping() {
        assert_eq!(ColumnType::from_data_type("int"), ColumnType::Int);
        assert_eq!(ColumnType::from_data_type("BIGINT"), ColumnType::Int);
        assert_eq!(ColumnType::from_data_type("varchar"), ColumnType::String);
        assert_eq!(ColumnType::from_data_type("decimal"), ColumnType::Decimal);
        assert_eq!(ColumnType::from_data_type("json"), ColumnType::Json);
        assert_eq!(ColumnType::from_data_type("datetime"), ColumnType::DateTime);
        assert_eq!(ColumnType::from_data_type("geometry"), ColumnType::Other);
    }

    #[test]
    fn test_table_lookup() {
        let catalog = sample_catalog();
        assert!(catalog.table("orders").is_some());
        assert!(catalog.table("missing").is_none());
        assert_eq!(
            catalog.table("orders").unwrap().primary_key,
            vec!["orderNumber"]
        );
    }

    #[test]
    fn test_table_names_excludes_policy_store() {
        let mut tables = vec![];
        let catalog = sample_catalog();
        for name in catalog.table_names() {
            tables.push(name.to_string());
        }
        assert!(tables.contains(&"customers".to_string()));
        assert!(!tables.contains(&POLICY_TABLE.to_string()));
    }

    #[test]
    fn test_single_int_pk_detection() {
        let catalog = sample_catalog();
        assert!(catalog.table("orders").unwrap().has_single_int_pk());
        assert!(!catalog.table("orderdetails").unwrap().has_single_int_pk());
    }

    #[test]
    fn test_json_column_serialization_flag() {
        use super::test_fixtures::column;
        let json_col = column("payload", ColumnType::Json, KeyRole::None);
        let text_col = column("label", ColumnType::String, KeyRole::None);
        assert!(json_col.needs_json_encoding());
        assert!(!text_col.needs_json_encoding());
    }
}
