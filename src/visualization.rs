/// Visualization module: the dashboard page.
///
/// Produces a self-contained HTML string with:
/// - the page title and a category multi-select ("All" + sorted categories)
/// - four chart panels in two rows of two columns
/// - the initial chart data inlined as JSON
///
/// All chart drawing is done client-side by dashboard.js with Plotly.
/// This module serializes the chart specifications and emits the HTML shell.
use serde::Serialize;

use crate::config::PageConfig;
use crate::dashboard::ChartSet;
use crate::error::ShelfError;

const DASHBOARD_JS: &str = include_str!("dashboard.js");
const PLOTLY_SRC: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Route the page posts selections to.
pub const CHARTS_URL: &str = "/api/charts";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfig<'a> {
    charts_url: &'a str,
    palette: &'a [String],
    charts: &'a ChartSet,
}

// ── HTML generation ─────────────────────────────────────────────────────────

/// Main entry point: the full dashboard page for the initial selection.
pub fn render_page(
    page: &PageConfig,
    options: &[String],
    charts: &ChartSet,
    loaded_at: &str,
) -> Result<String, ShelfError> {
    let client = ClientConfig {
        charts_url: CHARTS_URL,
        palette: &page.palette,
        charts,
    };
    let config_json = script_json(&client)?;

    let options_html: String = options
        .iter()
        .enumerate()
        .map(|(i, o)| {
            // the first option is the "All" sentinel and starts selected
            let selected = if i == 0 { " selected" } else { "" };
            format!(
                r#"<option value="{v}"{selected}>{v}</option>"#,
                v = escape_html(o)
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");

    let html = format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{browser_title}</title>
  <script src="{plotly_src}"></script>
  <style>
    body {{ font-family: sans-serif; margin: 0 2rem 2rem; color: #212529; }}
    h1 {{ font-weight: 600; }}
    h3 {{ font-weight: 500; margin: 0.5rem 0; }}
    .filter {{ display: flex; align-items: center; gap: 1rem; margin-bottom: 1rem; }}
    .filter select {{ min-width: 16rem; min-height: 6rem; }}
    .meta {{ color: #868e96; font-size: 12px; }}
    .row {{ display: grid; grid-template-columns: 1fr 1fr; gap: 3rem; margin-bottom: 2rem; }}
    .chart {{ width: 100%; height: 420px; }}
    #load-error {{ display: none; color: #c0392b; border: 1px solid #c0392b; padding: 0.5rem; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <div class="filter">
    <label for="category-select">Select Categories</label>
    <select id="category-select" multiple>
        {options_html}
    </select>
    <span class="meta"><span id="row-count"></span> &middot; loaded {loaded_at}</span>
  </div>
  <div id="load-error"></div>
  <div class="row">
    <div><h3>Price Distribution by Category</h3><div id="chart-price" class="chart"></div></div>
    <div><h3>Product Variety per Category</h3><div id="chart-variety" class="chart"></div></div>
  </div>
  <div class="row">
    <div><h3>Share of Own Brand Products</h3><div id="chart-share" class="chart"></div></div>
    <div><h3>Average Price by Brand Type and Category</h3><div id="chart-brand-price" class="chart"></div></div>
  </div>
<script>
{dashboard_js}
Shelfwatch.create({config_json});
</script>
</body>
</html>"##,
        browser_title = escape_html(&page.browser_title),
        title = escape_html(&page.title),
        plotly_src = PLOTLY_SRC,
        options_html = options_html,
        loaded_at = escape_html(loaded_at),
        dashboard_js = DASHBOARD_JS,
        config_json = config_json,
    );

    Ok(html)
}

/// Page shown instead of the dashboard when the data could not be loaded.
pub fn render_error_page(page: &PageConfig, error: &ShelfError) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{browser_title}</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; color: #212529; }}
    .error {{ border: 1px solid #c0392b; border-radius: 4px; padding: 1rem; background: #fdf2f2; }}
    code {{ color: #c0392b; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <div class="error">
    <p><strong>The product table could not be loaded.</strong></p>
    <p><code>{kind}</code></p>
    <p>{message}</p>
  </div>
</body>
</html>"##,
        browser_title = escape_html(&page.browser_title),
        title = escape_html(&page.title),
        kind = error.kind(),
        message = escape_html(&error.to_string()),
    )
}

// ── Escaping helpers ────────────────────────────────────────────────────────

/// JSON safe to inline inside a <script> element.
fn script_json<T: Serialize>(value: &T) -> Result<String, ShelfError> {
    let json = serde_json::to_string(value)
        .map_err(|e| ShelfError::Config(format!("serialize chart data: {e}")))?;
    Ok(json.replace('<', "\\u003c"))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
