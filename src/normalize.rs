use polars::datatypes::TimeUnit;
use polars::prelude::StrptimeOptions;
use polars::prelude::*;
use tracing::debug;

use crate::error::ShelfError;
use crate::schema::{own_brand_token, product};

/// The product table after projection and type normalization.
///
/// Columns, in order: supermarket (str), prices (f64), names (str), date,
/// own_brand (bool), category (str). `date` is datetime[us] when the lake
/// stores a temporal type or a date format is configured, raw text otherwise.
/// `prices`, `names`, `own_brand` and `category` hold no nulls.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDataset {
    frame: DataFrame,
}

impl NormalizedDataset {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Distinct categories, sorted ascending.
    pub fn categories(&self) -> Result<Vec<String>, ShelfError> {
        let mut categories: Vec<String> = self
            .frame
            .column(product::CATEGORY)?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// strftime format for a text `date` column; text is left as-is when `None`.
    pub date_format: Option<String>,
}

/// Project the raw table and normalize its types.
///
/// Steps run in a fixed order so the first defect reported is stable:
/// required columns, `prices`, `own_brand`, `date`, null checks.
pub fn normalize(raw: DataFrame, options: &NormalizeOptions) -> Result<NormalizedDataset, ShelfError> {
    require_columns(&raw, &product::ALL)?;

    let mut df = raw.select(product::ALL)?;
    debug!("Projected {} rows to {:?}", df.height(), df.get_column_names_str());

    df = cast_prices(df)?;
    df = cast_own_brand(df)?;
    df = parse_date(df, options.date_format.as_deref())?;
    require_non_null(&df, &product::NON_NULL)?;
    df = cast_text(df, &[product::SUPERMARKET, product::NAMES, product::CATEGORY])?;

    Ok(NormalizedDataset { frame: df })
}

fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), ShelfError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|&&c| df.column(c).is_err())
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ShelfError::SchemaMismatch { missing })
    }
}

fn require_non_null(df: &DataFrame, columns: &[&str]) -> Result<(), ShelfError> {
    for &name in columns {
        let count = df.column(name)?.null_count();
        if count > 0 {
            return Err(ShelfError::NullValues {
                column: name.to_string(),
                count,
            });
        }
    }
    Ok(())
}

/// Cast `prices` to Float64. Text that does not parse is a `CastFailure`.
fn cast_prices(df: DataFrame) -> Result<DataFrame, ShelfError> {
    let dtype = df.column(product::PRICES)?.dtype().clone();
    if !matches!(dtype, DataType::String) {
        return Ok(df
            .lazy()
            .with_columns([col(product::PRICES).strict_cast(DataType::Float64)])
            .collect()?);
    }

    let parsed = df
        .clone()
        .lazy()
        .with_columns([col(product::PRICES)
            .str()
            .strip_chars(lit(" \t\r\n"))
            .cast(DataType::Float64)])
        .collect()?;

    check_cast(&df, &parsed, product::PRICES)?;
    Ok(parsed)
}

/// Compare a text column before and after a lenient cast; any value that
/// was present but became null failed to convert.
fn check_cast(raw: &DataFrame, parsed: &DataFrame, column: &str) -> Result<(), ShelfError> {
    let before = raw.column(column)?.str()?;
    let after = parsed.column(column)?;

    let mut first: Option<(usize, String)> = None;
    let mut failures = 0;
    for (i, value) in before.into_iter().enumerate() {
        if let Some(value) = value {
            if after.get(i)?.is_null() {
                failures += 1;
                first.get_or_insert_with(|| (i, value.to_string()));
            }
        }
    }

    match first {
        Some((row, value)) => Err(ShelfError::CastFailure {
            column: column.to_string(),
            row,
            value,
            failures,
        }),
        None => Ok(()),
    }
}

/// Map the literal tokens "FALSE" / "True" to booleans.
///
/// Matching is exact and case-sensitive. Nulls pass through and are caught
/// by the null check. Native boolean columns are kept as they are.
fn cast_own_brand(mut df: DataFrame) -> Result<DataFrame, ShelfError> {
    let column = df.column(product::OWN_BRAND)?;
    match column.dtype() {
        DataType::Boolean => return Ok(df),
        DataType::String => {}
        other => {
            return Err(ShelfError::UnrecognizedBooleanToken {
                row: 0,
                token: format!("<{other}>"),
            })
        }
    }

    let flags = column
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, token)| token.map(|t| parse_own_brand(t, row)).transpose())
        .collect::<Result<Vec<Option<bool>>, ShelfError>>()?;

    df.with_column(Column::new(product::OWN_BRAND.into(), flags))?;
    Ok(df)
}

pub fn parse_own_brand(token: &str, row: usize) -> Result<bool, ShelfError> {
    match token {
        own_brand_token::TRUE => Ok(true),
        own_brand_token::FALSE => Ok(false),
        other => Err(ShelfError::UnrecognizedBooleanToken {
            row,
            token: other.to_string(),
        }),
    }
}

/// Normalize `date`.
///
/// Temporal columns become Datetime(us). Text is parsed only when a format
/// is configured; otherwise it is kept verbatim, since no chart reads it.
fn parse_date(df: DataFrame, format: Option<&str>) -> Result<DataFrame, ShelfError> {
    let dtype = df.column(product::DATE)?.dtype().clone();
    match (dtype, format) {
        (DataType::Date | DataType::Datetime(_, _), _) => Ok(df
            .lazy()
            .with_columns([col(product::DATE)
                .strict_cast(DataType::Datetime(TimeUnit::Microseconds, None))])
            .collect()?),
        (DataType::String, Some(format)) => parse_date_text(df, format),
        _ => Ok(df),
    }
}

fn parse_date_text(df: DataFrame, format: &str) -> Result<DataFrame, ShelfError> {
    let parsed = df
        .clone()
        .lazy()
        .with_columns([col(product::DATE)
            .str()
            .strip_chars(lit(" \t\r\n"))
            .str()
            .to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions {
                    format: Some(format.into()),
                    strict: false,
                    ..Default::default()
                },
                lit("raise"),
            )])
        .collect();

    match parsed {
        Ok(parsed) => {
            check_cast(&df, &parsed, product::DATE)?;
            Ok(parsed)
        }
        Err(e) => {
            debug!("Parsing {} with {format:?} failed: {e}", product::DATE);
            Err(whole_column_failure(&df, product::DATE)?)
        }
    }
}

/// A `CastFailure` covering every non-null value of a text column.
fn whole_column_failure(df: &DataFrame, column: &str) -> Result<ShelfError, ShelfError> {
    let values = df.column(column)?.str()?;
    let failures = values.len() - values.null_count();
    let (row, value) = values
        .into_iter()
        .enumerate()
        .find_map(|(i, v)| v.map(|v| (i, v.to_string())))
        .unwrap_or_default();
    Ok(ShelfError::CastFailure {
        column: column.to_string(),
        row,
        value,
        failures,
    })
}

fn cast_text(df: DataFrame, columns: &[&str]) -> Result<DataFrame, ShelfError> {
    let exprs: Vec<Expr> = columns
        .iter()
        .map(|&c| col(c).strict_cast(DataType::String))
        .collect();
    Ok(df.lazy().with_columns(exprs).collect()?)
}
