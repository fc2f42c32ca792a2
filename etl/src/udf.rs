use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use datafusion::arrow::array::{Int64Array, TimestampMillisecondArray};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::common::{DataFusionError, ScalarValue};
use datafusion::execution::FunctionRegistry;
use datafusion::execution::context::SessionContext;
use datafusion::logical_expr::{ColumnarValue, Volatility, create_udf};
use datafusion::prelude::Expr;
use std::sync::Arc;

pub const LOCAL_DATETIME: &str = "local_datetime";

/// Registers all UDFs with the SessionContext
pub fn register_udfs(ctx: &SessionContext) {
    // Epoch millis -> naive wall-clock time in a named zone
    let local_datetime = create_udf(
        LOCAL_DATETIME,
        vec![DataType::Int64, DataType::Utf8],
        DataType::Timestamp(TimeUnit::Millisecond, None),
        Volatility::Immutable,
        Arc::new(convert_to_local_datetime),
    );

    ctx.register_udf(local_datetime);
}

/// Builds a `local_datetime(ts, tz)` call against the registered UDF.
pub fn local_datetime(ctx: &SessionContext, ts: Expr, timezone: &str) -> Result<Expr, DataFusionError> {
    let udf = ctx.udf(LOCAL_DATETIME)?;
    Ok(udf.call(vec![ts, datafusion::prelude::lit(timezone)]))
}

pub fn parse_timezone(name: &str) -> common::Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| common::Error::UnknownTimezone(name.to_string()))
}

/// Wall-clock milliseconds of `ts` (epoch millis) as seen in `tz`.
pub fn local_millis(ts: i64, tz: &Tz) -> Option<i64> {
    let instant: DateTime<Utc> = Utc.timestamp_millis_opt(ts).single()?;
    Some(
        instant
            .with_timezone(tz)
            .naive_local()
            .and_utc()
            .timestamp_millis(),
    )
}

fn timezone_arg(arg: &ColumnarValue) -> Result<Tz, DataFusionError> {
    let name = match arg {
        ColumnarValue::Scalar(
            ScalarValue::Utf8(Some(name))
            | ScalarValue::LargeUtf8(Some(name))
            | ScalarValue::Utf8View(Some(name)),
        ) => name,
        _ => {
            return Err(DataFusionError::Execution(format!(
                "{} expects a non-null timezone literal",
                LOCAL_DATETIME
            )));
        }
    };

    parse_timezone(name).map_err(|e| DataFusionError::Execution(e.to_string()))
}

fn convert_to_local_datetime(args: &[ColumnarValue]) -> Result<ColumnarValue, DataFusionError> {
    if args.len() != 2 {
        return Err(DataFusionError::Internal(format!(
            "{} expects 2 arguments, got {}",
            LOCAL_DATETIME,
            args.len()
        )));
    }
    let tz = timezone_arg(&args[1])?;

    match &args[0] {
        ColumnarValue::Array(array) => {
            let millis = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| DataFusionError::Internal("Expected int64 array".to_string()))?;

            let result: TimestampMillisecondArray = millis
                .iter()
                .map(|opt_ts| opt_ts.and_then(|ts| local_millis(ts, &tz)))
                .collect();

            Ok(ColumnarValue::Array(Arc::new(result)))
        }
        ColumnarValue::Scalar(ScalarValue::Int64(ts)) => Ok(ColumnarValue::Scalar(
            ScalarValue::TimestampMillisecond(ts.and_then(|ts| local_millis(ts, &tz)), None),
        )),
        ColumnarValue::Scalar(other) => Err(DataFusionError::Internal(format!(
            "Expected int64 scalar, got {:?}",
            other.data_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Array;
    use chrono::{Datelike, Timelike};

    fn tz_arg(name: &str) -> ColumnarValue {
        ColumnarValue::Scalar(ScalarValue::Utf8(Some(name.to_string())))
    }

    #[test]
    fn test_local_millis_new_york() {
        let tz = parse_timezone("America/New_York").unwrap();
        let local = local_millis(1541121934796, &tz).unwrap();
        let dt = DateTime::from_timestamp_millis(local).unwrap().naive_utc();

        assert_eq!((dt.year(), dt.month(), dt.day()), (2018, 11, 1));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (21, 25, 34));
    }

    #[test]
    fn test_local_millis_utc_is_identity() {
        let tz = parse_timezone("UTC").unwrap();
        assert_eq!(local_millis(1541121934796, &tz), Some(1541121934796));
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(matches!(
            parse_timezone("Mars/Olympus_Mons"),
            Err(common::Error::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_convert_array() {
        let input = Int64Array::from(vec![Some(1541121934796), None, Some(0)]);

        let result = convert_to_local_datetime(&[
            ColumnarValue::Array(Arc::new(input)),
            tz_arg("UTC"),
        ])
        .unwrap();

        if let ColumnarValue::Array(array) = result {
            let ts_array = array
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .unwrap();
            assert_eq!(ts_array.value(0), 1541121934796);
            assert!(ts_array.is_null(1));
            assert_eq!(ts_array.value(2), 0);
        } else {
            panic!("Expected Array result");
        }
    }

    #[test]
    fn test_convert_scalar() {
        let result = convert_to_local_datetime(&[
            ColumnarValue::Scalar(ScalarValue::Int64(Some(0))),
            tz_arg("America/New_York"),
        ])
        .unwrap();

        match result {
            ColumnarValue::Scalar(ScalarValue::TimestampMillisecond(Some(v), None)) => {
                assert_eq!(v, -5 * 3600 * 1000);
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_convert_rejects_bad_timezone() {
        let input = Int64Array::from(vec![Some(0)]);
        let result = convert_to_local_datetime(&[
            ColumnarValue::Array(Arc::new(input)),
            tz_arg("Nowhere/Special"),
        ]);
        assert!(result.is_err());
    }
}
