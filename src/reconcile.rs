//! Table reconciliation.
//!
//! Merges per-target tables into one table whose columns are the
//! case-insensitive union of all source columns, each row tagged with the
//! name of the target it came from.

use std::collections::{HashMap, HashSet};

use crate::db::{column_key, next_free_name, Table, Value};

/// Name of the synthetic origin column.
pub const SERVER_NAME_COLUMN: &str = "ServerName";

/// Combines `(target name, table)` pairs, in the given order.
///
/// Columns keep the casing of their first occurrence. A source column that
/// collides with [`SERVER_NAME_COLUMN`] is carried under the first free
/// suffixed name (`ServerName1`, ...). Absent values are null.
pub fn combine<'a>(tables: impl IntoIterator<Item = (&'a str, &'a Table)>) -> Table {
    let tables: Vec<(&str, &Table)> = tables.into_iter().collect();

    let source_keys: HashSet<String> = tables
        .iter()
        .flat_map(|(_, table)| table.columns.iter().map(|c| column_key(c)))
        .collect();
    let origin_key = column_key(SERVER_NAME_COLUMN);
    let carried_origin = next_free_name(SERVER_NAME_COLUMN, |candidate| {
        source_keys.contains(&column_key(candidate))
    });

    let mut columns = vec![SERVER_NAME_COLUMN.to_string()];
    let mut positions: HashMap<String, usize> = HashMap::new();

    // Per table, the combined position of each source column
    let mut layouts: Vec<Vec<usize>> = Vec::with_capacity(tables.len());
    for (_, table) in &tables {
        let layout = table
            .columns
            .iter()
            .map(|column| {
                let name = if column_key(column) == origin_key {
                    carried_origin.as_str()
                } else {
                    column.as_str()
                };
                *positions.entry(column_key(name)).or_insert_with(|| {
                    columns.push(name.to_string());
                    columns.len() - 1
                })
            })
            .collect();
        layouts.push(layout);
    }

    let total_rows = tables.iter().map(|(_, t)| t.row_count()).sum();
    let mut rows = Vec::with_capacity(total_rows);
    for ((name, table), layout) in tables.iter().zip(&layouts) {
        for row in &table.rows {
            let mut combined = vec![Value::Null; columns.len()];
            combined[0] = Value::Text((*name).to_string());
            for (value, &position) in row.iter().zip(layout) {
                combined[position] = value.clone();
            }
            rows.push(combined);
        }
    }

    Table { columns, rows }
}
