//! Schema description providers
//!
//! Produce the grounding text the SQL generator sees. Two interchangeable
//! strategies behind one trait: live catalog introspection, and a curated
//! hand-authored block for stores whose business semantics cannot be read
//! from column types. Neither strategy fails outward: introspection errors
//! degrade to an explanatory fallback string so prompt construction can
//! always proceed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::executor::{QueryExecutor, RowMap, StructuredError};

/// Grounding text source for the generator prompt.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Produce the schema text. Never fails; implementations return an
    /// explanatory fallback string instead.
    async fn schema_text(&self) -> String;
}

/// Default curated description of the HR snapshot table.
pub const DEFAULT_CURATED_SCHEMA: &str = "\
TABLE: EMPLOYEES (current workforce snapshot, one row per person)
  - EMPLOYEE_ID    number   (Primary Key) COUNT(EMPLOYEE_ID) gives headcount
  - FULL_NAME      text     avoid listing names; aggregate instead
  - ACTIVE_FLAG    number   1 = currently employed, 0 = left; SUM(ACTIVE_FLAG) yields active headcount
  - DEPARTMENT     text     organizational unit name
  - POSITION       text     job title
  - GENDER         text     'MALE' or 'FEMALE'
  - AGE            number   AVG(AGE) for average age
  - EDUCATION      text     highest completed level
  - CITY           text     city of residence
  - HIRE_DATE      date     employment start date
";

/// Hand-authored schema text, used when introspection is unreliable or when
/// column meaning cannot be inferred from types alone.
pub struct CuratedSchemaProvider {
    text: String,
}

impl CuratedSchemaProvider {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for CuratedSchemaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CURATED_SCHEMA)
    }
}

#[async_trait]
impl SchemaProvider for CuratedSchemaProvider {
    async fn schema_text(&self) -> String {
        self.text.clone()
    }
}

/// Builds schema text from the store's own catalog views.
///
/// Columns come from `information_schema.columns`, key annotations from the
/// constraint views. System schemas are denylisted; an optional allow-list
/// narrows both queries to named tables.
pub struct IntrospectedSchemaProvider {
    executor: Arc<dyn QueryExecutor>,
    allow_list: Option<Vec<String>>,
}

impl IntrospectedSchemaProvider {
    pub fn new(executor: Arc<dyn QueryExecutor>, allow_list: Option<Vec<String>>) -> Self {
        Self {
            executor,
            allow_list,
        }
    }

    async fn introspect(&self) -> Result<String, StructuredError> {
        let filter = self.allow_list_filter();

        let columns_sql = format!(
            "SELECT table_name, column_name, data_type \
             FROM information_schema.columns \
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema'){filter} \
             ORDER BY table_name, ordinal_position",
            filter = filter_clause("table_name", &filter),
        );
        let columns = self.executor.execute_query(&columns_sql).await?;

        let relations_sql = format!(
            "SELECT tc.table_name, kcu.column_name, ccu.table_name AS target_table, tc.constraint_type \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             LEFT JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema \
             WHERE tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY') \
               AND tc.table_schema NOT IN ('pg_catalog', 'information_schema'){filter} \
             ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position",
            filter = filter_clause("tc.table_name", &filter),
        );
        let relations = self.executor.execute_query(&relations_sql).await?;

        Ok(render_schema(&columns, &relations))
    }

    /// Sanitized lowercase allow-list entries, ready for an IN clause.
    /// Catalog table names are stored lowercase for unquoted identifiers.
    fn allow_list_filter(&self) -> Vec<String> {
        self.allow_list
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|name| sanitize_identifier(name))
            .filter(|name| !name.is_empty())
            .collect()
    }
}

#[async_trait]
impl SchemaProvider for IntrospectedSchemaProvider {
    async fn schema_text(&self) -> String {
        match self.introspect().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "schema introspection failed");
                format!(
                    "Schema introspection failed: {}. No table metadata is \
                     available; answer using standard SQL against the tables \
                     the user names.",
                    e.message
                )
            }
        }
    }
}

fn sanitize_identifier(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

fn filter_clause(column: &str, names: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    format!(" AND {column} IN ({})", quoted.join(", "))
}

fn text_field<'a>(row: &'a RowMap, key: &str) -> &'a str {
    row.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Join column rows with constraint rows into one text block.
///
/// Table names are rendered unqualified and uppercased so JOIN hints in the
/// generated SQL stay consistent within one schema text. A column referenced
/// by multiple constraints keeps the first annotation in catalog order; the
/// rest are dropped.
fn render_schema(columns: &[RowMap], relations: &[RowMap]) -> String {
    let mut annotations: HashMap<String, String> = HashMap::new();
    for rel in relations {
        let table = text_field(rel, "table_name");
        let column = text_field(rel, "column_name");
        let key = format!("{table}.{column}").to_lowercase();
        if annotations.contains_key(&key) {
            continue;
        }
        match text_field(rel, "constraint_type") {
            "PRIMARY KEY" => {
                annotations.insert(key, "(Primary Key)".to_string());
            }
            "FOREIGN KEY" => {
                let target = text_field(rel, "target_table");
                if !target.is_empty() {
                    annotations.insert(
                        key,
                        format!("(Foreign Key -> {})", target.to_uppercase()),
                    );
                }
            }
            _ => {}
        }
    }

    let mut text = String::new();
    let mut current_table = String::new();
    for col in columns {
        let table = text_field(col, "table_name");
        let column = text_field(col, "column_name");
        let data_type = text_field(col, "data_type");

        if table != current_table {
            if !current_table.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("TABLE: {}\n", table.to_uppercase()));
            current_table = table.to_string();
        }

        let annotation = annotations
            .get(&format!("{table}.{column}").to_lowercase())
            .map(String::as_str)
            .unwrap_or_default();
        text.push_str(&format!(
            "  - {:<24} {:<16} {}\n",
            column.to_uppercase(),
            data_type,
            annotation
        ));
    }

    if text.is_empty() {
        text.push_str("No user tables found in the store catalog.\n");
    }
    text
}
