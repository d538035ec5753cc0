/// Column-name constants for the shelfwatch schema.
/// Single source of truth for the loader, the aggregations and the page.

// ── Product table columns ───────────────────────────────────────────────────
pub mod product {
    pub const SUPERMARKET: &str = "supermarket";
    pub const PRICES: &str = "prices";
    pub const NAMES: &str = "names";
    pub const DATE: &str = "date";
    pub const OWN_BRAND: &str = "own_brand";
    pub const CATEGORY: &str = "category";

    /// Projection applied to the lake table, in output order.
    pub const ALL: [&str; 6] = [SUPERMARKET, PRICES, NAMES, DATE, OWN_BRAND, CATEGORY];

    /// Columns that must not hold nulls once normalized.
    pub const NON_NULL: [&str; 4] = [PRICES, NAMES, OWN_BRAND, CATEGORY];
}

// ── Diversity aggregate columns ─────────────────────────────────────────────
pub mod diversity {
    pub const CATEGORY: &str = "Category";
    pub const UNIQUE_PRODUCTS: &str = "Number of Unique Products";
}

// ── Intermediate aggregation columns ────────────────────────────────────────
pub mod derived {
    pub const MEAN_PRICE: &str = "mean_price";
    pub const ROWS: &str = "rows";
    pub const PROPORTION: &str = "proportion";

    // Box plot
    pub const Q1: &str = "q1";
    pub const MEDIAN: &str = "median";
    pub const Q3: &str = "q3";
    pub const LOW_FENCE: &str = "low_fence";
    pub const HIGH_FENCE: &str = "high_fence";
    pub const IS_OUTLIER: &str = "is_outlier";
    pub const WHISKER_LOW: &str = "whisker_low";
    pub const WHISKER_HIGH: &str = "whisker_high";
    pub const OUTLIERS: &str = "outliers";
}

// ── Raw own_brand tokens (case-sensitive) ───────────────────────────────────
pub mod own_brand_token {
    pub const FALSE: &str = "FALSE";
    pub const TRUE: &str = "True";
}

// ── Category filter ─────────────────────────────────────────────────────────
pub mod filter {
    /// Sentinel that selects every category.
    pub const ALL: &str = "All";
}
