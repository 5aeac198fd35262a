//! Workbook sheet parsing
//!
//! Reads the weights and prices sheets out of an xlsx workbook into
//! typed rows. Both sheets are long format with a header row: the
//! weights sheet carries (date, asset, weight) and the prices sheet
//! (date, asset, price). Dates are day-month-year text or native Excel
//! datetimes. Any malformed cell aborts the parse with an `ImportError`
//! naming the sheet, row, and column.

use calamine::{Data, DataType, Range};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use crate::error::ImportError;

/// One parsed row of the weights sheet
#[derive(Debug, Clone)]
pub struct WeightRow {
    pub asset: String,
    pub date: NaiveDate,
    pub weight: Decimal,
}

/// One parsed row of the prices sheet
#[derive(Debug, Clone)]
pub struct PriceRow {
    pub asset: String,
    pub date: NaiveDate,
    pub price: Decimal,
}

/// Which value column a sheet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Weight,
    Price,
}

impl ValueKind {
    fn column_label(&self) -> &'static str {
        match self {
            ValueKind::Weight => "weight",
            ValueKind::Price => "price",
        }
    }

    /// Accepted header spellings, English and Spanish
    fn header_names(&self) -> &'static [&'static str] {
        match self {
            ValueKind::Weight => &["weight", "peso", "pesos"],
            ValueKind::Price => &["price", "precio", "precios"],
        }
    }
}

/// Column indexes resolved from the header row
#[derive(Debug, Clone)]
struct ColumnMapping {
    date: Option<usize>,
    asset: Option<usize>,
    value: Option<usize>,
}

impl ColumnMapping {
    fn from_header(header: &[Data], kind: ValueKind) -> Self {
        let mut mapping = ColumnMapping {
            date: None,
            asset: None,
            value: None,
        };

        for (idx, cell) in header.iter().enumerate() {
            let text = cell.to_string().trim().to_lowercase();

            if mapping.date.is_none() && (text == "date" || text == "fecha" || text == "dates") {
                mapping.date = Some(idx);
            }

            if mapping.asset.is_none()
                && matches!(text.as_str(), "asset" | "assets" | "activo" | "activos")
            {
                mapping.asset = Some(idx);
            }

            if mapping.value.is_none() && kind.header_names().contains(&text.as_str()) {
                mapping.value = Some(idx);
            }
        }

        mapping
    }

    fn missing_columns(&self, kind: ValueKind) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.date.is_none() {
            missing.push("date");
        }
        if self.asset.is_none() {
            missing.push("asset");
        }
        if self.value.is_none() {
            missing.push(kind.column_label());
        }
        missing
    }
}

/// Parse the weights sheet into typed rows
pub fn parse_weight_sheet(
    sheet_name: &str,
    range: &Range<Data>,
) -> Result<Vec<WeightRow>, ImportError> {
    let rows = parse_sheet(sheet_name, range, ValueKind::Weight)?;
    Ok(rows
        .into_iter()
        .map(|(asset, date, weight)| WeightRow {
            asset,
            date,
            weight,
        })
        .collect())
}

/// Parse the prices sheet into typed rows
pub fn parse_price_sheet(
    sheet_name: &str,
    range: &Range<Data>,
) -> Result<Vec<PriceRow>, ImportError> {
    let rows = parse_sheet(sheet_name, range, ValueKind::Price)?;
    Ok(rows
        .into_iter()
        .map(|(asset, date, price)| PriceRow { asset, date, price })
        .collect())
}

fn parse_sheet(
    sheet_name: &str,
    range: &Range<Data>,
    kind: ValueKind,
) -> Result<Vec<(String, NaiveDate, Decimal)>, ImportError> {
    let mut rows_iter = range.rows().enumerate();

    // Header is the first non-empty row
    let (header_idx, header) = rows_iter
        .find(|(_, row)| !row.iter().all(|cell| cell.is_empty()))
        .ok_or_else(|| ImportError::sheet(sheet_name, "sheet is empty"))?;

    let mapping = ColumnMapping::from_header(header, kind);
    let missing = mapping.missing_columns(kind);
    if !missing.is_empty() {
        return Err(ImportError::sheet(
            sheet_name,
            format!(
                "missing required column(s): {}. Found headers: {}",
                missing.join(", "),
                header
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }
    debug!("sheet '{}' column mapping: {:?}", sheet_name, mapping);

    let date_idx = mapping.date.expect("checked above");
    let asset_idx = mapping.asset.expect("checked above");
    let value_idx = mapping.value.expect("checked above");

    let mut parsed = Vec::new();
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();

    for (idx, row) in range.rows().enumerate() {
        if idx <= header_idx || row.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let display_row = idx + 1; // 1-indexed as shown in spreadsheet apps

        let asset_cell = row.get(asset_idx).cloned().unwrap_or(Data::Empty);
        let asset = asset_cell.to_string().trim().to_string();
        if asset.is_empty() {
            return Err(ImportError::cell(
                sheet_name,
                display_row,
                "asset",
                "empty asset name",
            ));
        }

        let date_cell = row.get(date_idx).cloned().unwrap_or(Data::Empty);
        let date = parse_date(&date_cell)
            .map_err(|reason| ImportError::cell(sheet_name, display_row, "date", reason))?;

        let value_cell = row.get(value_idx).cloned().unwrap_or(Data::Empty);
        let value = parse_value(&value_cell, kind)
            .map_err(|reason| ImportError::cell(sheet_name, display_row, kind.column_label(), reason))?;

        if !seen.insert((asset.clone(), date)) {
            return Err(ImportError::cell(
                sheet_name,
                display_row,
                "asset",
                format!("duplicate observation for asset '{}' on {}", asset, date),
            ));
        }

        parsed.push((asset, date, value));
    }

    Ok(parsed)
}

/// Parse a date cell: native Excel datetime or day-month-year text
fn parse_date(cell: &Data) -> Result<NaiveDate, String> {
    match cell {
        Data::DateTime(dt) => {
            let days_since_epoch = dt.as_f64().floor() as i64;
            let excel_epoch =
                NaiveDate::from_ymd_opt(1899, 12, 30).ok_or("invalid Excel epoch")?;
            excel_epoch
                .checked_add_signed(chrono::Duration::days(days_since_epoch))
                .ok_or_else(|| "date overflow".to_string())
        }
        Data::Empty => Err("empty date cell".to_string()),
        _ => {
            let text = cell.to_string();
            let text = text.trim();

            // dd-mm-yyyy is the documented input format; dd/mm/yyyy and
            // ISO are accepted as well.
            for fmt in ["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d"] {
                if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
                    return Ok(date);
                }
            }

            Err(format!("unparseable date: '{}'", text))
        }
    }
}

fn parse_value(cell: &Data, kind: ValueKind) -> Result<Decimal, String> {
    let raw = parse_decimal(cell, kind == ValueKind::Weight)?;
    match kind {
        ValueKind::Weight => {
            if raw < Decimal::ZERO {
                return Err(format!("weight cannot be negative: {}", raw));
            }
            Ok(raw)
        }
        ValueKind::Price => {
            if raw <= Decimal::ZERO {
                return Err(format!("price must be positive: {}", raw));
            }
            Ok(raw)
        }
    }
}

/// Parse a numeric cell (handles numbers, decimal-comma text, and for
/// weights a percent notation: '5%' and bare values in (1, 100] both
/// read as fractions of 1).
fn parse_decimal(cell: &Data, percent_as_fraction: bool) -> Result<Decimal, String> {
    let value = match cell {
        Data::Int(i) => Decimal::from(*i),
        // The shortest round-trip rendering, so 0.6 stays 0.6 instead of
        // picking up float noise
        Data::Float(f) => {
            Decimal::from_str(&f.to_string()).map_err(|_| format!("invalid number: {}", f))?
        }
        Data::Empty => return Err("empty cell".to_string()),
        _ => {
            let text = cell.to_string();
            let mut text = text.trim().to_string();

            let had_percent = text.ends_with('%');
            if had_percent {
                text.pop();
                text = text.trim_end().to_string();
            }

            // Decimal-comma input: '0,25' or '1.234,56'
            if text.contains(',') {
                text = text.replace('.', "").replace(',', ".");
            }

            let parsed = Decimal::from_str(&text)
                .map_err(|_| format!("not a number: '{}'", cell))?;

            if had_percent {
                return scale_percent(parsed, percent_as_fraction);
            }
            parsed
        }
    };

    if percent_as_fraction && value > Decimal::ONE && value <= Decimal::from(100) {
        return scale_percent(value, true);
    }

    Ok(value)
}

fn scale_percent(value: Decimal, percent_as_fraction: bool) -> Result<Decimal, String> {
    if percent_as_fraction {
        Ok(value / Decimal::from(100))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_date_day_month_year() {
        let result = parse_date(&Data::String("15-02-2022".to_string())).unwrap();
        assert_eq!(result, NaiveDate::from_ymd_opt(2022, 2, 15).unwrap());

        let result = parse_date(&Data::String("15/02/2022".to_string())).unwrap();
        assert_eq!(result, NaiveDate::from_ymd_opt(2022, 2, 15).unwrap());
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date(&Data::String("soon".to_string())).is_err());
        assert!(parse_date(&Data::Empty).is_err());
    }

    #[test]
    fn test_parse_decimal_comma_format() {
        // 1.234,56 reads as 1234.56
        let result = parse_decimal(&Data::String("1.234,56".to_string()), false).unwrap();
        assert_eq!(result, dec!(1234.56));

        let result = parse_decimal(&Data::String("0,25".to_string()), false).unwrap();
        assert_eq!(result, dec!(0.25));
    }

    #[test]
    fn test_weight_percent_notation() {
        let result = parse_value(&Data::String("5%".to_string()), ValueKind::Weight).unwrap();
        assert_eq!(result, dec!(0.05));

        // Bare magnitudes over 1 read as percents for weights
        let result = parse_value(&Data::Float(60.0), ValueKind::Weight).unwrap();
        assert_eq!(result, dec!(0.6));
    }

    #[test]
    fn test_price_keeps_magnitude() {
        let result = parse_value(&Data::Float(60.0), ValueKind::Price).unwrap();
        assert_eq!(result, dec!(60));
    }

    #[test]
    fn test_price_rejects_zero() {
        assert!(parse_value(&Data::Float(0.0), ValueKind::Price).is_err());
    }

    #[test]
    fn test_column_mapping_spanish_headers() {
        let header = vec![
            Data::String("Fecha".to_string()),
            Data::String("Activos".to_string()),
            Data::String("Peso".to_string()),
        ];
        let mapping = ColumnMapping::from_header(&header, ValueKind::Weight);
        assert_eq!(mapping.date, Some(0));
        assert_eq!(mapping.asset, Some(1));
        assert_eq!(mapping.value, Some(2));
    }

    #[test]
    fn test_column_mapping_reports_missing() {
        let header = vec![
            Data::String("date".to_string()),
            Data::String("asset".to_string()),
        ];
        let mapping = ColumnMapping::from_header(&header, ValueKind::Price);
        assert_eq!(mapping.missing_columns(ValueKind::Price), vec!["price"]);
    }
}
