use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toml_edit::{DocumentMut, Item, Table, Value};

use super::{ConfigTree, ConfigValue};

/// Reads a `spinfile.toml` into a configuration layer.
pub fn load_spinfile(path: &Path) -> Result<ConfigTree> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_spinfile(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_spinfile(contents: &str) -> Result<ConfigTree> {
    let doc: DocumentMut = contents.parse()?;
    Ok(table_to_tree(doc.as_table()))
}

fn table_to_tree(table: &Table) -> ConfigTree {
    let mut tree = ConfigTree::new();
    for (key, item) in table {
        if let Some(value) = item_to_value(item) {
            tree.set(key, value);
        }
    }
    tree
}

fn item_to_value(item: &Item) -> Option<ConfigValue> {
    match item {
        Item::None => None,
        Item::Value(value) => Some(value_to_config(value)),
        Item::Table(table) => Some(ConfigValue::Table(table_to_tree(table))),
        Item::ArrayOfTables(_) => None,
    }
}

fn value_to_config(value: &Value) -> ConfigValue {
    match value {
        Value::Boolean(flag) => ConfigValue::Bool(*flag.value()),
        Value::Array(items) => ConfigValue::List(items.iter().map(scalar_text).collect()),
        Value::InlineTable(inline) => {
            let mut tree = ConfigTree::new();
            for (key, value) in inline {
                tree.set(key, value_to_config(value));
            }
            ConfigValue::Table(tree)
        }
        other => ConfigValue::Str(scalar_text(other)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.value().clone(),
        Value::Integer(number) => number.value().to_string(),
        Value::Float(number) => number.value().to_string(),
        Value::Boolean(flag) => flag.value().to_string(),
        Value::Datetime(stamp) => stamp.value().to_string(),
        other => other.to_string().trim().to_string(),
    }
}
