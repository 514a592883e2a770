use anyhow::{Result, anyhow, bail};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Options for [`super::DocumentStore::find`]. Without a sort field, documents
/// come back in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub newest_by: Option<String>,
}

impl FindOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Highest `field` first; ties fall back to the latest insert.
    pub fn newest_first(mut self, field: &str) -> Self {
        self.newest_by = Some(field.to_string());
        self
    }
}

/// `$.field` path for a top-level document field. Field names are restricted
/// to identifier characters so they can never alter the JSON path.
pub(super) fn json_path(field: &str) -> Result<String> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("invalid document field name '{}'", field);
    }
    Ok(format!("$.{}", field))
}

/// A prepared `find`, owned so it can move onto the blocking pool.
pub(super) struct FindPlan {
    sql: String,
    params: Vec<SqlValue>,
}

pub(super) fn build_find(collection: &str, filter: &Value, options: &FindOptions) -> Result<FindPlan> {
    let mut sql = String::from("SELECT doc_id, body FROM documents WHERE collection = ?");
    let mut params = vec![SqlValue::Text(collection.to_string())];

    match filter {
        Value::Null => {}
        Value::Object(fields) => {
            for (field, expected) in fields {
                sql.push_str(" AND json_extract(body, ?) = ?");
                params.push(SqlValue::Text(json_path(field)?));
                params.push(to_sql(expected)?);
            }
        }
        other => return Err(anyhow!("filter must be a JSON object, got {}", other)),
    }

    match &options.newest_by {
        Some(field) => {
            sql.push_str(" ORDER BY json_extract(body, ?) DESC, rowid DESC");
            params.push(SqlValue::Text(json_path(field)?));
        }
        None => sql.push_str(" ORDER BY rowid ASC"),
    }

    if let Some(limit) = options.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(limit as i64));
    }

    Ok(FindPlan { sql, params })
}

fn to_sql(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, Some(f)) => SqlValue::Real(f),
            _ => bail!("unsupported number in filter: {}", n),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => bail!("filter values must be scalars, got {}", other),
    })
}

impl FindPlan {
    pub(super) fn run(self, db: &Connection) -> Result<Vec<Value>> {
        let mut stmt = db.prepare(&self.sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(self.params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (doc_id, body) = row?;
            let mut doc: Value = serde_json::from_str(&body)?;
            if let Value::Object(map) = &mut doc {
                map.insert("_id".to_string(), Value::String(doc_id));
            }
            results.push(doc);
        }
        Ok(results)
    }
}
