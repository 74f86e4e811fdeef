use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{Query, QueryAs, QueryScalar};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl SqlValue {
    pub fn bind<'q>(
        self,
        query: Query<'q, sqlx::MySql, MySqlArguments>,
    ) -> Query<'q, sqlx::MySql, MySqlArguments> {
        match self {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn json_to_sql(value: &Value) -> Result<SqlValue, AppError> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(f) = n.as_f64() {
                SqlValue::F64(f)
            } else {
                return Err(AppError::bad_request("Unsupported number"));
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => return Err(AppError::bad_request("Unsupported JSON value type")),
    })
}

/// Reads a date key of a partial-update payload.
///
/// `None` when the key is absent, `Some(None)` when it is explicitly null.
pub fn patched_date(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<Option<NaiveDate>>, AppError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|d| Some(Some(d)))
            .map_err(|_| AppError::bad_request(format!("{key} must be YYYY-MM-DD"))),
        Some(_) => Err(AppError::bad_request(format!("{key} must be YYYY-MM-DD"))),
    }
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only keys listed in `allowed` may be updated; the column names are taken
/// from the allow-list, never from the payload.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&'static str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(AppError::bad_request("No fields provided for update"));
    }

    let mut columns = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = allowed
            .iter()
            .find(|c| **c == key.as_str())
            .ok_or_else(|| AppError::bad_request(format!("Field '{key}' cannot be updated")))?;
        columns.push(format!("{column} = ?"));
        values.push(json_to_sql(value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        columns.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = value.bind(query);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// ===============================
/// Dynamic WHERE clause
/// ===============================
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `condition` (containing exactly one `?`) bound to `value`.
    pub fn eq(&mut self, condition: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.values.push(value.into());
        self
    }

    /// Adds a condition with any number of placeholders.
    pub fn raw(&mut self, condition: &str, values: Vec<SqlValue>) -> &mut Self {
        self.conditions.push(condition.to_string());
        self.values.extend(values);
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    #[cfg(test)]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn bind_as<'q, O>(
        &self,
        mut query: QueryAs<'q, sqlx::MySql, O, MySqlArguments>,
    ) -> QueryAs<'q, sqlx::MySql, O, MySqlArguments> {
        for value in self.values.iter().cloned() {
            query = match value {
                SqlValue::String(v) => query.bind(v),
                SqlValue::I64(v) => query.bind(v),
                SqlValue::U64(v) => query.bind(v),
                SqlValue::F64(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
                SqlValue::DateTime(v) => query.bind(v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }

    pub fn bind_scalar<'q, O>(
        &self,
        mut query: QueryScalar<'q, sqlx::MySql, O, MySqlArguments>,
    ) -> QueryScalar<'q, sqlx::MySql, O, MySqlArguments> {
        for value in self.values.iter().cloned() {
            query = match value {
                SqlValue::String(v) => query.bind(v),
                SqlValue::I64(v) => query.bind(v),
                SqlValue::U64(v) => query.bind(v),
                SqlValue::F64(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::Date(v) => query.bind(v),
                SqlValue::DateTime(v) => query.bind(v),
                SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }
}

/// Expands to `?, ?, ?` for an `IN (...)` list.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Links every id in `user_ids` to `owner_id` in a membership table.
///
/// Unknown user ids are rejected; links that already exist are kept, so the
/// call is idempotent. Returns the number of new links.
pub async fn insert_members(
    pool: &MySqlPool,
    table: &str,
    owner_column: &str,
    owner_id: u64,
    user_ids: &[u64],
) -> Result<u64, AppError> {
    let mut ids = user_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    if ids.is_empty() {
        return Err(AppError::bad_request("user_ids cannot be empty"));
    }

    let count_sql = format!("SELECT COUNT(*) FROM users WHERE id IN ({})", placeholders(ids.len()));
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for id in &ids {
        count_query = count_query.bind(*id);
    }
    let found = count_query.fetch_one(pool).await?;
    if found != ids.len() as i64 {
        return Err(AppError::bad_request("One or more users do not exist"));
    }

    let rows = vec!["(?, ?)"; ids.len()].join(", ");
    let sql = format!("INSERT IGNORE INTO {table} ({owner_column}, user_id) VALUES {rows}");
    let mut query = sqlx::query(&sql);
    for id in &ids {
        query = query.bind(owner_id).bind(*id);
    }

    Ok(query.execute(pool).await?.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["name", "joining_date", "status"];

    #[test]
    fn builds_set_clause_from_allowed_columns() {
        let update = build_update_sql(
            "users",
            &json!({"name": "Jane", "joining_date": "2026-01-05"}),
            COLUMNS,
            "id",
            9,
        )
        .unwrap();

        assert!(update.sql.starts_with("UPDATE users SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("name = ?"));
        assert!(update.sql.contains("joining_date = ?"));
        assert_eq!(update.values.len(), 3);
        assert!(update
            .values
            .contains(&SqlValue::Date(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(9)));
    }

    #[test]
    fn rejects_unknown_columns() {
        let err = build_update_sql("users", &json!({"password": "x"}), COLUMNS, "id", 1).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("users", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("users", &json!([1, 2]), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("users", &json!({"name": {"x": 1}}), COLUMNS, "id", 1).is_err());
    }

    #[test]
    fn filters_render_where_clause_in_order() {
        let mut filters = Filters::new();
        assert_eq!(filters.where_clause(), "");

        filters
            .eq("user_id = ?", 4u64)
            .eq("status = ?", "pending")
            .raw("(name LIKE ? OR email LIKE ?)", vec!["%a%".into(), "%a%".into()]);
        assert_eq!(
            filters.where_clause(),
            " WHERE user_id = ? AND status = ? AND (name LIKE ? OR email LIKE ?)"
        );
        assert_eq!(filters.values().len(), 4);
        assert_eq!(filters.values()[0], SqlValue::U64(4));
    }

    #[test]
    fn patched_date_distinguishes_absent_and_null() {
        let obj = json!({"deadline": null, "start_date": "2026-04-01", "bad": 5});
        let obj = obj.as_object().unwrap();
        assert_eq!(patched_date(obj, "missing").unwrap(), None);
        assert_eq!(patched_date(obj, "deadline").unwrap(), Some(None));
        assert_eq!(
            patched_date(obj, "start_date").unwrap(),
            Some(NaiveDate::from_ymd_opt(2026, 4, 1))
        );
        assert!(patched_date(obj, "bad").is_err());
    }

    #[test]
    fn placeholder_lists() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
