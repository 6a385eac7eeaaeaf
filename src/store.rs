//! Record-store update plumbing: the field-level update description produced
//! by the engine and the placeholder-based update expression sent to the
//! store.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field-level update applied atomically to one record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub table: String,
    pub key_field: String,
    pub key_value: String,
    pub set: BTreeMap<String, Value>,
    pub remove: Option<String>,
}

impl RecordUpdate {
    pub fn new(
        table: impl Into<String>,
        key_field: impl Into<String>,
        key_value: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key_field: key_field.into(),
            key_value: key_value.into(),
            set: BTreeMap::new(),
            remove: None,
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.remove = Some(field.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.set.get(field)
    }

    pub fn expression(&self) -> UpdateExpression {
        UpdateExpression::build(&self.set, self.remove.as_deref())
    }
}

/// Update expression with generated attribute-name and value placeholders so
/// reserved words in field names never collide with the expression grammar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateExpression {
    pub update_expression: String,
    pub expression_attribute_names: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub expression_attribute_values: Map<String, Value>,
}

impl UpdateExpression {
    pub fn build(set: &BTreeMap<String, Value>, remove: Option<&str>) -> Self {
        let mut names = BTreeMap::new();
        let mut values = Map::new();
        let mut clauses = Vec::new();

        if let Some(field) = remove {
            names.insert("#rm".to_owned(), field.to_owned());
            clauses.push("REMOVE #rm".to_owned());
        }

        let mut assignments = Vec::with_capacity(set.len());
        for (idx, (field, value)) in set.iter().enumerate() {
            let name = format!("#f{idx}");
            let placeholder = format!(":v{idx}");
            assignments.push(format!("{name} = {placeholder}"));
            names.insert(name, field.clone());
            values.insert(placeholder, value.clone());
        }
        if !assignments.is_empty() {
            clauses.push(format!("SET {}", assignments.join(", ")));
        }

        Self {
            update_expression: clauses.join(" "),
            expression_attribute_names: names,
            expression_attribute_values: values,
        }
    }
}

/// Wire request for a single-record update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateItemRequest {
    pub table_name: String,
    pub key: Map<String, Value>,
    #[serde(flatten)]
    pub expression: UpdateExpression,
}

impl From<&RecordUpdate> for UpdateItemRequest {
    fn from(update: &RecordUpdate) -> Self {
        let mut key = Map::new();
        key.insert(
            update.key_field.clone(),
            Value::String(update.key_value.clone()),
        );
        Self {
            table_name: update.table.clone(),
            key,
            expression: update.expression(),
        }
    }
}
