//! Cell coercion rules for the record contract.
//!
//! Identifier, sales code and order date are mandatory: a cell that cannot be coerced drops the
//! row. The amount is recoverable and defaults to `0.00`, but an amount too large for the target
//! column drops the row. Brand is optional and blank becomes null.

use calamine::Data;
use chrono::{Days, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{RowCoercionFailure, RowCoercionKind};
use crate::ingestion::excel::RawRow;
use crate::types::{RECORD_SCHEMA, SalesRecord};

/// Fractional digits kept for `totalsales`.
pub const AMOUNT_SCALE: u32 = 2;

// `NUMERIC(15,2)` leaves 13 digits before the point.
const AMOUNT_LIMIT_I64: i64 = 10_000_000_000_000;
const AMOUNT_LIMIT_F64: f64 = 1e13;

// Largest serial Excel can display (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Coerce one projected row into a [`SalesRecord`].
///
/// Checks run in column order, so the first failing mandatory column is reported.
pub fn coerce_row(raw: &RawRow) -> Result<SalesRecord, RowCoercionFailure> {
    let [id_col, code_col, date_col, amount_col, brand_col] = &RECORD_SCHEMA;

    let id_cell = raw.cell(id_col);
    let id = coerce_identifier(id_cell)
        .ok_or_else(|| failure(raw, id_col.source, RowCoercionKind::InvalidIdentifier, id_cell))?;

    let code_cell = raw.cell(code_col);
    let salescode = coerce_text(code_cell)
        .ok_or_else(|| failure(raw, code_col.source, RowCoercionKind::EmptySalesCode, code_cell))?;

    let date_cell = raw.cell(date_col);
    let dateorder = coerce_date(date_cell)
        .ok_or_else(|| failure(raw, date_col.source, RowCoercionKind::InvalidOrderDate, date_cell))?;

    let amount_cell = raw.cell(amount_col);
    let totalsales = coerce_amount(amount_cell)
        .ok_or_else(|| failure(raw, amount_col.source, RowCoercionKind::AmountOutOfRange, amount_cell))?;

    Ok(SalesRecord {
        id,
        salescode,
        dateorder,
        totalsales,
        brand: coerce_text(raw.cell(brand_col)),
    })
}

fn failure(raw: &RawRow, column: &'static str, kind: RowCoercionKind, cell: &Data) -> RowCoercionFailure {
    RowCoercionFailure {
        row: raw.row,
        column,
        kind,
        raw: cell.to_string(),
    }
}

/// Integer identifier. Integral floats and numeric strings are accepted.
pub fn coerce_identifier(c: &Data) -> Option<i64> {
    match c {
        Data::Int(i) => Some(*i),
        Data::Float(f) => integral_f64(*f),
        Data::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    }
}

fn integral_f64(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Trimmed text; `None` when absent or blank after trimming.
pub fn coerce_text(c: &Data) -> Option<String> {
    let s = match c {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => match integral_f64(*f) {
            Some(i) => i.to_string(),
            None => f.to_string(),
        },
        other => other.to_string().trim().to_string(),
    };
    (!s.is_empty()).then_some(s)
}

/// Calendar date from a native date cell, an ISO-like string, or an Excel serial number.
///
/// Any time component is discarded.
pub fn coerce_date(c: &Data) -> Option<NaiveDate> {
    match c {
        Data::DateTime(dt) => dt.as_datetime().map(|d| d.date()),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_str(s.trim()),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// 1900 date system: serial 1 is 1900-01-01 and serial 60 is Excel's phantom 1900-02-29.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let days = serial.trunc() as u64;
    let base = if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    base.checked_add_days(Days::new(days))
}

/// Two-digit decimal; blank or unparsable cells become `0.00`. Negative values are kept.
///
/// `None` when the rounded value does not fit `NUMERIC(15,2)`, i.e. its magnitude reaches
/// 10^13.
pub fn coerce_amount(c: &Data) -> Option<Decimal> {
    let parsed = match c {
        Data::Int(i) => Some(Decimal::from(*i)),
        Data::Float(f) => float_amount(*f)?,
        Data::String(s) => {
            let s = s.trim();
            match s
                .parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(s).ok())
            {
                Some(d) => Some(d),
                // Numeric text too large for `Decimal` is out of range, not unparsable.
                None => match s.parse::<f64>() {
                    Ok(f) => float_amount(f)?,
                    Err(_) => None,
                },
            }
        }
        _ => None,
    };
    let amount = to_amount_scale(parsed.unwrap_or(Decimal::ZERO));
    (amount.abs() < amount_limit()).then_some(amount)
}

/// `Some(None)` for NaN (unparsable), `None` for finite or infinite values past the limit.
fn float_amount(f: f64) -> Option<Option<Decimal>> {
    if f.is_nan() {
        return Some(None);
    }
    if f.abs() >= AMOUNT_LIMIT_F64 {
        return None;
    }
    Some(Decimal::from_f64(f))
}

fn amount_limit() -> Decimal {
    Decimal::from(AMOUNT_LIMIT_I64)
}

fn to_amount_scale(d: Decimal) -> Decimal {
    let mut out = d.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    out.rescale(AMOUNT_SCALE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: Vec<Data>) -> RawRow {
        RawRow { row: 2, cells }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn identifier_rules() {
        assert_eq!(coerce_identifier(&Data::Int(5)), Some(5));
        assert_eq!(coerce_identifier(&Data::Float(12.0)), Some(12));
        assert_eq!(coerce_identifier(&Data::String(" 42 ".into())), Some(42));
        assert_eq!(coerce_identifier(&Data::String("7.0".into())), Some(7));
        assert_eq!(coerce_identifier(&Data::Float(1.5)), None);
        assert_eq!(coerce_identifier(&Data::String("abc".into())), None);
        assert_eq!(coerce_identifier(&Data::Bool(true)), None);
        assert_eq!(coerce_identifier(&Data::Empty), None);
    }

    #[test]
    fn text_is_trimmed_and_blank_is_none() {
        assert_eq!(coerce_text(&Data::String(" SC001 ".into())), Some("SC001".to_string()));
        assert_eq!(coerce_text(&Data::String("   ".into())), None);
        assert_eq!(coerce_text(&Data::Empty), None);
        assert_eq!(coerce_text(&Data::Float(1001.0)), Some("1001".to_string()));
    }

    #[test]
    fn dates_from_strings_and_serials() {
        assert_eq!(coerce_date(&Data::String("2025-01-15".into())), Some(date(2025, 1, 15)));
        assert_eq!(
            coerce_date(&Data::DateTimeIso("2025-01-15T13:45:00".into())),
            Some(date(2025, 1, 15))
        );
        assert_eq!(coerce_date(&Data::String("15/01/2025".into())), Some(date(2025, 1, 15)));
        // 45672 is 2025-01-15 in the 1900 date system.
        assert_eq!(coerce_date(&Data::Float(45672.5)), Some(date(2025, 1, 15)));
        assert_eq!(coerce_date(&Data::Int(1)), Some(date(1900, 1, 1)));
        assert_eq!(coerce_date(&Data::String("not a date".into())), None);
        assert_eq!(coerce_date(&Data::Empty), None);
        assert_eq!(coerce_date(&Data::Float(-3.0)), None);
    }

    #[test]
    fn amounts_round_to_two_digits_and_default_to_zero() {
        assert_eq!(coerce_amount(&Data::Float(15000.5)).unwrap().to_string(), "15000.50");
        assert_eq!(coerce_amount(&Data::Int(22500)).unwrap().to_string(), "22500.00");
        assert_eq!(coerce_amount(&Data::String("-3.14159".into())).unwrap().to_string(), "-3.14");
        assert_eq!(coerce_amount(&Data::String("2.005".into())).unwrap().to_string(), "2.01");
        assert_eq!(coerce_amount(&Data::Empty).unwrap().to_string(), "0.00");
        assert_eq!(coerce_amount(&Data::String("n/a".into())).unwrap().to_string(), "0.00");
    }

    #[test]
    fn amounts_outside_numeric_15_2_are_rejected() {
        assert_eq!(coerce_amount(&Data::Float(1e15)), None);
        assert_eq!(coerce_amount(&Data::Int(10_000_000_000_000)), None);
        assert_eq!(coerce_amount(&Data::String("-1e13".into())), None);
        assert_eq!(coerce_amount(&Data::String("1e40".into())), None);
        assert_eq!(coerce_amount(&Data::Float(f64::INFINITY)), None);
        // Rounds up to 10^13.
        assert_eq!(coerce_amount(&Data::String("9999999999999.995".into())), None);
        assert_eq!(
            coerce_amount(&Data::String("9999999999999.99".into())).unwrap().to_string(),
            "9999999999999.99"
        );
        assert_eq!(coerce_amount(&Data::Float(f64::NAN)).unwrap().to_string(), "0.00");
    }

    #[test]
    fn out_of_range_amount_drops_only_that_row() {
        let err = coerce_row(&row(vec![
            Data::Int(4),
            Data::String("SC".into()),
            Data::String("2025-01-16".into()),
            Data::Float(1e15),
            Data::Empty,
        ]))
        .unwrap_err();
        assert_eq!(err.kind, RowCoercionKind::AmountOutOfRange);
        assert_eq!(err.column, "amount_total");
    }

    #[test]
    fn row_with_missing_amount_survives() {
        let rec = coerce_row(&row(vec![
            Data::Float(1.0),
            Data::String(" SC001 ".into()),
            Data::String("2025-01-15".into()),
            Data::Empty,
            Data::String("".into()),
        ]))
        .unwrap();
        assert_eq!(rec.id, 1);
        assert_eq!(rec.salescode, "SC001");
        assert_eq!(rec.dateorder, date(2025, 1, 15));
        assert_eq!(rec.totalsales.to_string(), "0.00");
        assert_eq!(rec.brand, None);
    }

    #[test]
    fn row_failures_name_the_first_bad_column() {
        let err = coerce_row(&row(vec![
            Data::String("x".into()),
            Data::Empty,
            Data::Empty,
            Data::Empty,
            Data::Empty,
        ]))
        .unwrap_err();
        assert_eq!(err.kind, RowCoercionKind::InvalidIdentifier);
        assert_eq!(err.column, "id");

        let err = coerce_row(&row(vec![
            Data::Int(2),
            Data::String("  ".into()),
            Data::String("2025-01-16".into()),
            Data::Int(22500),
            Data::Empty,
        ]))
        .unwrap_err();
        assert_eq!(err.kind, RowCoercionKind::EmptySalesCode);

        let err = coerce_row(&row(vec![
            Data::Int(3),
            Data::String("SC".into()),
            Data::String("31/31/2025".into()),
            Data::Empty,
            Data::Empty,
        ]))
        .unwrap_err();
        assert_eq!(err.kind, RowCoercionKind::InvalidOrderDate);
        assert_eq!(err.row, 2);
    }
}
