// Persistence: SQLite meta.db and one stateless store per record type.

pub mod backup;
pub mod collections;
pub mod events;
pub mod kv;
pub mod meta_db;
pub mod roots;
pub mod rp_state;
pub mod sessions;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use pathways_common::types::UnknownVariant;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;

/// Fixed-width RFC 3339 so that text order equals time order.
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn opt_ts_to_sql(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(ts_to_sql)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_ts(idx, &value)).transpose()
}

pub(crate) fn parse_tag<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
