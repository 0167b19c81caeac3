//! Parameter binding: engine values to the binary wire format, driven by
//! the prepared statement's parameter types rather than the value's own
//! shape, so an `Int` binds cleanly to `INT2`/`INT4`/`INT8` alike.

use crate::numeric;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use relic_core::Value;
use std::error::Error;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {} as {}", value.as_display_string_truncated(40), ty).into()
}

#[derive(Debug)]
pub struct PgParam<'a>(pub &'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = self.0;
        match value {
            Value::Null => Ok(IsNull::Yes),

            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => b.to_string().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)
                    .map_err(|_| mismatch(value, ty))?
                    .to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)
                    .map_err(|_| mismatch(value, ty))?
                    .to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => {
                    numeric::encode(&i.to_string(), out).map_err(BoxError::from)?;
                    Ok(IsNull::No)
                }
                Type::TEXT | Type::VARCHAR => i.to_string().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::NUMERIC => {
                    numeric::encode(&f.to_string(), out).map_err(BoxError::from)?;
                    Ok(IsNull::No)
                }
                _ => Err(mismatch(value, ty)),
            },

            Value::Text(s) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                    s.as_str().to_sql(&Type::TEXT, out)
                }
                Type::UUID => uuid::Uuid::parse_str(s)
                    .map_err(|_| mismatch(value, ty))?
                    .to_sql(ty, out),
                Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)
                    .map_err(|_| mismatch(value, ty))?
                    .with_timezone(&Utc)
                    .to_sql(ty, out),
                Type::DATE => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|_| mismatch(value, ty))?
                    .to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
                    .map_err(|_| mismatch(value, ty))?
                    .to_sql(ty, out),
                Type::NUMERIC => {
                    numeric::encode(s, out).map_err(BoxError::from)?;
                    Ok(IsNull::No)
                }
                Type::BOOL => match s.as_str() {
                    "true" | "t" | "1" => true.to_sql(ty, out),
                    "false" | "f" | "0" => false.to_sql(ty, out),
                    _ => Err(mismatch(value, ty)),
                },
                Type::INT2 | Type::INT4 | Type::INT8 => s
                    .parse::<i64>()
                    .map_err(|_| mismatch(value, ty))
                    .and_then(|i| PgParam(&Value::Int(i)).to_sql(ty, out)),
                _ => Err(mismatch(value, ty)),
            },

            Value::Bytes(b) => match *ty {
                Type::BYTEA => b.as_slice().to_sql(ty, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => u.to_string().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Json(j) => match *ty {
                Type::JSON | Type::JSONB => j.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => j.to_string().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Decimal(s) => match *ty {
                Type::NUMERIC => {
                    numeric::encode(s, out).map_err(BoxError::from)?;
                    Ok(IsNull::No)
                }
                Type::FLOAT8 => s
                    .parse::<f64>()
                    .map_err(|_| mismatch(value, ty))?
                    .to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => s.as_str().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::DateTime(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.to_sql(ty, out),
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                Type::DATE => dt.date_naive().to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => dt.to_rfc3339().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Date(d) => match *ty {
                Type::DATE => d.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => d.format("%Y-%m-%d").to_string().to_sql(&Type::TEXT, out),
                _ => Err(mismatch(value, ty)),
            },

            Value::Time(t) => match *ty {
                Type::TIME => t.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => {
                    t.format("%H:%M:%S%.f").to_string().to_sql(&Type::TEXT, out)
                }
                _ => Err(mismatch(value, ty)),
            },

            Value::Array(items) => match *ty {
                Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
                    let strings: Result<Vec<String>, BoxError> = items
                        .iter()
                        .map(|item| match item {
                            Value::Text(s) => Ok(s.clone()),
                            Value::Uuid(u) => Ok(u.to_string()),
                            other => Err(mismatch(other, ty)),
                        })
                        .collect();
                    strings?.to_sql(&Type::TEXT_ARRAY, out)
                }
                Type::INT4_ARRAY => {
                    let ints: Result<Vec<i32>, BoxError> = items
                        .iter()
                        .map(|item| match item {
                            Value::Int(i) => i32::try_from(*i).map_err(|_| mismatch(item, ty)),
                            other => Err(mismatch(other, ty)),
                        })
                        .collect();
                    ints?.to_sql(ty, out)
                }
                Type::INT8_ARRAY => {
                    let ints: Result<Vec<i64>, BoxError> = items
                        .iter()
                        .map(|item| match item {
                            Value::Int(i) => Ok(*i),
                            other => Err(mismatch(other, ty)),
                        })
                        .collect();
                    ints?.to_sql(ty, out)
                }
                _ => Err(mismatch(value, ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Compatibility is decided per value inside to_sql.
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> Result<BytesMut, BoxError> {
        let mut out = BytesMut::new();
        match PgParam(value).to_sql(ty, &mut out)? {
            IsNull::Yes => Ok(BytesMut::new()),
            IsNull::No => Ok(out),
        }
    }

    #[test]
    fn test_int_binds_to_each_integer_width() {
        assert_eq!(encode(&Value::Int(5), &Type::INT2).unwrap().as_ref(), [0, 5]);
        assert_eq!(
            encode(&Value::Int(5), &Type::INT4).unwrap().as_ref(),
            [0, 0, 0, 5]
        );
        assert_eq!(
            encode(&Value::Int(5), &Type::INT8).unwrap().as_ref(),
            [0, 0, 0, 0, 0, 0, 0, 5]
        );
        assert!(encode(&Value::Int(i64::MAX), &Type::INT2).is_err());
    }

    #[test]
    fn test_text_coerces_to_uuid_and_json() {
        let id = uuid::Uuid::new_v4();
        let encoded = encode(&Value::Text(id.to_string()), &Type::UUID).unwrap();
        assert_eq!(encoded.len(), 16);
        assert!(encode(&Value::Text("not-a-uuid".into()), &Type::UUID).is_err());

        let encoded = encode(&Value::Text("{\"a\":1}".into()), &Type::JSONB).unwrap();
        assert!(!encoded.is_empty());
    }

    #[test]
    fn test_null_binds_everywhere() {
        let mut out = BytesMut::new();
        assert!(matches!(
            PgParam(&Value::Null).to_sql(&Type::INT4, &mut out).unwrap(),
            IsNull::Yes
        ));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        assert!(encode(&Value::Bool(true), &Type::INT4).is_err());
        assert!(encode(&Value::Bytes(vec![1]), &Type::TEXT).is_err());
    }
}
