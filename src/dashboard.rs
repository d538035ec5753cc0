//! The filter/render step: category selection in, four chart specifications out.

use std::collections::BTreeSet;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::aggregation::{
    average_price_by_brand, filter_categories, own_brand_share, price_distribution,
    BoxStats, BrandCategoryPrices, BrandShare, CategoryCount,
};
use crate::error::ShelfError;
use crate::loader::Snapshot;
use crate::normalize::NormalizedDataset;
use crate::schema::filter;

/// Categories picked in the multi-select.
///
/// Empty, or containing the "All" sentinel, means every category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySelection {
    #[serde(default)]
    pub categories: Vec<String>,
}

impl CategorySelection {
    pub fn all() -> Self {
        Self {
            categories: vec![filter::ALL.to_string()],
        }
    }

    pub fn of<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| c == filter::ALL)
    }

    /// Distinct selected categories, in sorted order.
    pub fn distinct(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.categories.iter().collect();
        set.into_iter().cloned().collect()
    }

    /// The rows of `dataset` this selection keeps.
    pub fn apply(&self, dataset: &NormalizedDataset) -> Result<DataFrame, ShelfError> {
        if self.is_all() {
            Ok(dataset.frame().clone())
        } else {
            filter_categories(dataset.frame(), &self.distinct())
        }
    }
}

/// Options for the multi-select: "All" followed by the sorted categories.
pub fn category_options(dataset: &NormalizedDataset) -> Result<Vec<String>, ShelfError> {
    let mut options = vec![filter::ALL.to_string()];
    options.extend(dataset.categories()?);
    Ok(options)
}

/// Everything the page needs to draw the four panels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSet {
    /// Rows in the filtered view.
    pub rows: usize,
    pub price_distribution: Vec<BoxStats>,
    pub product_variety: Vec<CategoryCount>,
    pub own_brand_share: Vec<BrandShare>,
    pub brand_category_prices: BrandCategoryPrices,
}

/// Derive the four charts for `selection`. Pure: no I/O, no caching.
pub fn render(snapshot: &Snapshot, selection: &CategorySelection) -> Result<ChartSet, ShelfError> {
    let view = selection.apply(&snapshot.dataset)?;

    Ok(ChartSet {
        rows: view.height(),
        price_distribution: price_distribution(&view)?,
        product_variety: snapshot.diversity.restricted_to(&view)?,
        own_brand_share: own_brand_share(&view)?,
        brand_category_prices: average_price_by_brand(&view)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    use crate::aggregation::DiversityAggregate;
    use crate::normalize::{normalize, NormalizeOptions};
    use crate::schema::product;

    fn snapshot() -> Snapshot {
        let raw = df!(
            product::SUPERMARKET => ["Tesco", "Aldi", "Tesco", "Lidl"],
            product::PRICES => ["2.0", "4.0", "10.0", "1.0"],
            product::NAMES => ["milk", "milk", "cheese", "bread"],
            product::DATE => ["2024-01-15", "2024-01-15", "2024-01-16", "2024-01-16"],
            product::OWN_BRAND => ["True", "True", "FALSE", "FALSE"],
            product::CATEGORY => ["dairy", "dairy", "dairy", "bakery"],
        )
        .unwrap();
        let dataset = normalize(raw, &NormalizeOptions::default()).unwrap();
        let diversity = DiversityAggregate::compute(dataset.frame()).unwrap();
        Snapshot {
            dataset,
            diversity,
            loaded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_selection_all_semantics() {
        assert!(CategorySelection::default().is_all());
        assert!(CategorySelection::all().is_all());
        assert!(CategorySelection::of(["dairy", "All"]).is_all());
        assert!(!CategorySelection::of(["dairy"]).is_all());
        assert!(!CategorySelection::of(["all"]).is_all());
    }

    #[test]
    fn test_all_selection_keeps_full_dataset() {
        let snap = snapshot();
        for selection in [
            CategorySelection::default(),
            CategorySelection::all(),
            CategorySelection::of(["bakery", "All"]),
        ] {
            let view = selection.apply(&snap.dataset).unwrap();
            assert!(view.equals_missing(snap.dataset.frame()));
        }
    }

    #[test]
    fn test_category_options() {
        let snap = snapshot();
        assert_eq!(
            category_options(&snap.dataset).unwrap(),
            vec!["All", "bakery", "dairy"]
        );
    }

    #[test]
    fn test_render_filtered() {
        let snap = snapshot();
        let charts = render(&snap, &CategorySelection::of(["dairy"])).unwrap();

        assert_eq!(charts.rows, 3);
        assert_eq!(charts.price_distribution.len(), 1);
        assert_eq!(charts.price_distribution[0].category, "dairy");
        assert_eq!(
            charts.product_variety,
            vec![CategoryCount {
                category: "dairy".into(),
                unique_products: 2
            }]
        );
        assert_eq!(charts.brand_category_prices.mean(true, "dairy"), 3.0);
        assert_eq!(charts.brand_category_prices.mean(false, "dairy"), 10.0);
        assert_eq!(charts.brand_category_prices.mean(true, "bakery"), 0.0);
    }

    #[test]
    fn test_render_unknown_category_is_empty_not_error() {
        let snap = snapshot();
        let charts = render(&snap, &CategorySelection::of(["frozen"])).unwrap();

        assert_eq!(charts.rows, 0);
        assert!(charts.price_distribution.is_empty());
        assert!(charts.product_variety.is_empty());
        assert!(charts.own_brand_share.is_empty());
        assert!(charts.brand_category_prices.categories.is_empty());
    }

    #[test]
    fn test_render_is_deterministic() {
        let snap = snapshot();
        let selection = CategorySelection::of(["dairy", "bakery"]);
        assert_eq!(render(&snap, &selection).unwrap(), render(&snap, &selection).unwrap());
    }

    #[test]
    fn test_selection_deserializes_from_json() {
        let selection: CategorySelection = serde_json::from_str(r#"{"categories":["dairy"]}"#).unwrap();
        assert_eq!(selection, CategorySelection::of(["dairy"]));

        let empty: CategorySelection = serde_json::from_str("{}").unwrap();
        assert!(empty.is_all());
    }
}
