//! Pure aggregations over the normalized product table.
//!
//! Nothing here performs I/O; every function takes a frame with the
//! normalized schema and returns plain data ready for charting.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use polars::prelude::*;
use serde::Serialize;

use crate::error::ShelfError;
use crate::schema::{derived, diversity, product};

/// Count of distinct product names per category.
#[derive(Debug, Clone, PartialEq)]
pub struct DiversityAggregate {
    frame: DataFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub unique_products: u64,
}

impl DiversityAggregate {
    /// Project to (category, names), drop duplicate pairs, count per category.
    ///
    /// Rows come out sorted by category.
    pub fn compute(dataset: &DataFrame) -> Result<Self, ShelfError> {
        let frame = dataset
            .clone()
            .lazy()
            .select([col(product::CATEGORY), col(product::NAMES)])
            .unique(None, UniqueKeepStrategy::Any)
            .group_by([col(product::CATEGORY)])
            .agg([col(product::NAMES)
                .count()
                .cast(DataType::UInt64)
                .alias(diversity::UNIQUE_PRODUCTS)])
            .rename([product::CATEGORY], [diversity::CATEGORY], true)
            .sort([diversity::CATEGORY], SortMultipleOptions::default())
            .collect()?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn counts(&self) -> Result<Vec<CategoryCount>, ShelfError> {
        let categories = self.frame.column(diversity::CATEGORY)?.str()?;
        let counts = self.frame.column(diversity::UNIQUE_PRODUCTS)?.u64()?;
        Ok(categories
            .into_iter()
            .zip(counts)
            .filter_map(|(c, n)| {
                Some(CategoryCount {
                    category: c?.to_string(),
                    unique_products: n?,
                })
            })
            .collect())
    }

    pub fn get(&self, category: &str) -> Result<Option<u64>, ShelfError> {
        Ok(self
            .counts()?
            .into_iter()
            .find(|c| c.category == category)
            .map(|c| c.unique_products))
    }

    /// Rows whose category appears in `view`.
    pub fn restricted_to(&self, view: &DataFrame) -> Result<Vec<CategoryCount>, ShelfError> {
        let present = distinct_categories(view)?;
        Ok(self
            .counts()?
            .into_iter()
            .filter(|c| present.contains(&c.category))
            .collect())
    }
}

fn distinct_categories(df: &DataFrame) -> Result<HashSet<String>, ShelfError> {
    Ok(df
        .column(product::CATEGORY)?
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect())
}

/// Rows whose category is one of `categories` (exact match).
pub fn filter_categories(df: &DataFrame, categories: &[String]) -> Result<DataFrame, ShelfError> {
    let wanted = Series::new("wanted".into(), categories);
    Ok(df
        .clone()
        .lazy()
        .filter(col(product::CATEGORY).is_in(lit(wanted), false))
        .collect()?)
}

// ── Price distribution ──────────────────────────────────────────────────────

/// Box-plot summary of `prices` for one category.
///
/// Quartiles are linearly interpolated. Whiskers (`min`, `max`) reach the
/// most extreme prices within 1.5 IQR of the box; prices beyond are outliers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxStats {
    pub category: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub outliers: Vec<f64>,
}

pub fn price_distribution(view: &DataFrame) -> Result<Vec<BoxStats>, ShelfError> {
    let prices = view
        .clone()
        .lazy()
        .select([col(product::CATEGORY), col(product::PRICES)])
        .filter(col(product::PRICES).is_not_null().and(col(product::PRICES).is_not_nan()));

    let iqr = col(derived::Q3) - col(derived::Q1);
    let fences = prices
        .clone()
        .group_by([col(product::CATEGORY)])
        .agg([
            col(product::PRICES)
                .quantile(lit(0.25), QuantileMethod::Linear)
                .alias(derived::Q1),
            col(product::PRICES)
                .quantile(lit(0.5), QuantileMethod::Linear)
                .alias(derived::MEDIAN),
            col(product::PRICES)
                .quantile(lit(0.75), QuantileMethod::Linear)
                .alias(derived::Q3),
        ])
        .with_columns([
            (col(derived::Q1) - lit(1.5) * iqr.clone()).alias(derived::LOW_FENCE),
            (col(derived::Q3) + lit(1.5) * iqr).alias(derived::HIGH_FENCE),
        ]);

    let outside = col(product::PRICES)
        .lt(col(derived::LOW_FENCE))
        .or(col(product::PRICES).gt(col(derived::HIGH_FENCE)));
    let inside = col(derived::IS_OUTLIER).not();

    let summary = prices
        .join(
            fences,
            [col(product::CATEGORY)],
            [col(product::CATEGORY)],
            JoinArgs::new(JoinType::Inner),
        )
        .with_column(outside.alias(derived::IS_OUTLIER))
        .group_by([col(product::CATEGORY)])
        .agg([
            len().cast(DataType::UInt64).alias(derived::ROWS),
            col(derived::Q1).first(),
            col(derived::MEDIAN).first(),
            col(derived::Q3).first(),
            col(product::PRICES)
                .filter(inside.clone())
                .min()
                .alias(derived::WHISKER_LOW),
            col(product::PRICES)
                .filter(inside)
                .max()
                .alias(derived::WHISKER_HIGH),
            col(product::PRICES)
                .filter(col(derived::IS_OUTLIER))
                .sort(SortOptions::default())
                .alias(derived::OUTLIERS),
        ])
        .sort([product::CATEGORY], SortMultipleOptions::default())
        .collect()?;

    let categories = summary.column(product::CATEGORY)?.str()?;
    let counts = summary.column(derived::ROWS)?.u64()?;
    let q1 = summary.column(derived::Q1)?.f64()?;
    let median = summary.column(derived::MEDIAN)?.f64()?;
    let q3 = summary.column(derived::Q3)?.f64()?;
    let low = summary.column(derived::WHISKER_LOW)?.f64()?;
    let high = summary.column(derived::WHISKER_HIGH)?.f64()?;
    let outliers = summary.column(derived::OUTLIERS)?.list()?;

    let mut stats = Vec::with_capacity(summary.height());
    for i in 0..summary.height() {
        let (Some(category), Some(q1), Some(median), Some(q3)) =
            (categories.get(i), q1.get(i), median.get(i), q3.get(i))
        else {
            continue;
        };
        let outliers = match outliers.get_as_series(i) {
            Some(values) => values.f64()?.into_iter().flatten().collect(),
            None => Vec::new(),
        };
        stats.push(BoxStats {
            category: category.to_string(),
            count: counts.get(i).unwrap_or(0) as usize,
            min: low.get(i).unwrap_or(q1),
            q1,
            median,
            q3,
            max: high.get(i).unwrap_or(q3),
            outliers,
        });
    }
    Ok(stats)
}

// ── Own-brand share ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandShare {
    pub own_brand: bool,
    pub count: usize,
    pub proportion: f64,
}

/// Proportion of rows per `own_brand` value, largest share first.
///
/// Only brand types present in `view` appear. An empty view has no shares.
pub fn own_brand_share(view: &DataFrame) -> Result<Vec<BrandShare>, ShelfError> {
    let shares = view
        .clone()
        .lazy()
        .filter(col(product::OWN_BRAND).is_not_null())
        .group_by([col(product::OWN_BRAND)])
        .agg([len().cast(DataType::UInt64).alias(derived::ROWS)])
        .with_column(
            (col(derived::ROWS).cast(DataType::Float64)
                / col(derived::ROWS).sum().cast(DataType::Float64))
            .alias(derived::PROPORTION),
        )
        .sort(
            [derived::ROWS, product::OWN_BRAND],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;

    let flags = shares.column(product::OWN_BRAND)?.bool()?;
    let counts = shares.column(derived::ROWS)?.u64()?;
    let proportions = shares.column(derived::PROPORTION)?.f64()?;
    Ok(flags
        .into_iter()
        .zip(counts)
        .zip(proportions)
        .filter_map(|((flag, count), proportion)| {
            Some(BrandShare {
                own_brand: flag?,
                count: count? as usize,
                proportion: proportion?,
            })
        })
        .collect())
}

// ── Average price by brand type and category ────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandSeries {
    pub own_brand: bool,
    /// One mean per entry of `BrandCategoryPrices::categories`.
    pub mean_prices: Vec<f64>,
}

/// Mean price for every (own_brand, category) pair of a view.
///
/// Both brand types are always present; a pair with no rows is 0.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrandCategoryPrices {
    pub categories: Vec<String>,
    pub series: Vec<BrandSeries>,
}

impl BrandCategoryPrices {
    pub fn mean(&self, own_brand: bool, category: &str) -> f64 {
        let Some(idx) = self.categories.iter().position(|c| c == category) else {
            return 0.0;
        };
        self.series
            .iter()
            .find(|s| s.own_brand == own_brand)
            .and_then(|s| s.mean_prices.get(idx).copied())
            .unwrap_or(0.0)
    }
}

pub fn average_price_by_brand(view: &DataFrame) -> Result<BrandCategoryPrices, ShelfError> {
    let grouped = view
        .clone()
        .lazy()
        .group_by([col(product::OWN_BRAND), col(product::CATEGORY)])
        .agg([col(product::PRICES).mean().alias(derived::MEAN_PRICE)])
        .collect()?;

    let flags = grouped.column(product::OWN_BRAND)?.bool()?;
    let categories = grouped.column(product::CATEGORY)?.str()?;
    let means = grouped.column(derived::MEAN_PRICE)?.f64()?;

    let mut cells: BTreeMap<(bool, String), f64> = BTreeMap::new();
    let mut all_categories: BTreeSet<String> = BTreeSet::new();
    for i in 0..grouped.height() {
        if let (Some(flag), Some(category)) = (flags.get(i), categories.get(i)) {
            all_categories.insert(category.to_string());
            cells.insert((flag, category.to_string()), means.get(i).unwrap_or(0.0));
        }
    }

    let categories: Vec<String> = all_categories.into_iter().collect();
    let series = if categories.is_empty() {
        Vec::new()
    } else {
        [false, true]
            .into_iter()
            .map(|own_brand| BrandSeries {
                own_brand,
                mean_prices: categories
                    .iter()
                    .map(|c| cells.get(&(own_brand, c.clone())).copied().unwrap_or(0.0))
                    .collect(),
            })
            .collect()
    };

    Ok(BrandCategoryPrices { categories, series })
}
