//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use comrak::{Options, markdown_to_html};

/// Render assistant markdown to HTML.
///
/// GitHub-flavoured extensions are enabled. Raw HTML in the input is
/// escaped, never passed through. Mark the result `|safe` in templates.
///
/// Usage in templates: `{{ text|markdown|safe }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn markdown(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(render_markdown(&value.to_string()))
}

/// Format an area in square meters.
///
/// Usage in templates: `{{ house.total_area_m2|area }}` gives `76 m2`.
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn area(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format!("{value} m2"))
}

fn render_markdown(source: &str) -> String {
    let mut options = Options::default();

    // GFM extensions
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;

    options.render.escape = true;

    markdown_to_html(source, &options)
}
