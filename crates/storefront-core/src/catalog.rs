use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, StoreError};

/// Generate a URL-safe slug from a display name.
///
/// Lowercases, turns spaces into dashes, drops everything that is not an
/// ASCII alphanumeric or dash, and collapses runs of dashes.
#[must_use]
pub fn slug_from_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                Some(c)
            } else if c.is_whitespace() || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// A single catalog filter. Filters compose with AND semantics in the order
/// they appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductFilter {
    /// Products in the category with this slug.
    Category(String),
    /// Case-insensitive substring match on name or description.
    Search(String),
    /// Case-insensitive exact color match.
    Color(String),
    MinPrice(Decimal),
    MaxPrice(Decimal),
    /// Products offered in a size with this label.
    Size(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    PriceLow,
    PriceHigh,
    #[default]
    Newest,
}

impl ProductSort {
    /// Unknown or missing values sort newest first.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("price_low") => Self::PriceLow,
            Some("price_high") => Self::PriceHigh,
            _ => Self::Newest,
        }
    }
}

/// Raw catalog query parameters as they arrive from the storefront.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogParams {
    pub q: Option<String>,
    pub color: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub size: Option<String>,
    pub sort: Option<String>,
}

/// Parsed catalog query: ordered filters plus sort.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogQuery {
    pub filters: Vec<ProductFilter>,
    pub sort: ProductSort,
}

impl CatalogQuery {
    /// Build the filter chain. Blank values are skipped.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidInput`] when a price bound is not a decimal number.
    pub fn from_params(
        category_slug: Option<&str>,
        params: &CatalogParams,
    ) -> Result<Self, StoreError> {
        let mut filters = Vec::new();

        if let Some(slug) = non_blank(category_slug) {
            filters.push(ProductFilter::Category(slug.to_string()));
        }
        if let Some(q) = non_blank(params.q.as_deref()) {
            filters.push(ProductFilter::Search(q.to_string()));
        }
        if let Some(color) = non_blank(params.color.as_deref()) {
            filters.push(ProductFilter::Color(color.to_string()));
        }
        if let Some(raw) = non_blank(params.min_price.as_deref()) {
            filters.push(ProductFilter::MinPrice(parse_price("min_price", raw)?));
        }
        if let Some(raw) = non_blank(params.max_price.as_deref()) {
            filters.push(ProductFilter::MaxPrice(parse_price("max_price", raw)?));
        }
        if let Some(size) = non_blank(params.size.as_deref()) {
            filters.push(ProductFilter::Size(size.to_string()));
        }

        Ok(Self {
            filters,
            sort: ProductSort::parse(params.sort.as_deref()),
        })
    }

    /// The category slug filter, if one was requested.
    #[must_use]
    pub fn category_slug(&self) -> Option<&str> {
        self.filters.iter().find_map(|f| match f {
            ProductFilter::Category(slug) => Some(slug.as_str()),
            _ => None,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_price(field: &str, raw: &str) -> Result<Decimal, StoreError> {
    raw.parse::<Decimal>()
        .map_err(|_| StoreError::InvalidInput(format!("{field} must be a number, got '{raw}'")))
}

// ---------------------------------------------------------------------------
// Catalog seed file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub slug: Option<String>,
}

impl CategorySeed {
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| slug_from_name(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductSeed {
    pub name: String,
    pub slug: Option<String>,
    /// Slug of a category declared in the same file.
    pub category: String,
    pub color: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    pub main_image: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Size label to stock count.
    #[serde(default)]
    pub sizes: BTreeMap<String, i32>,
}

impl ProductSeed {
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| slug_from_name(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BannerSeed {
    pub title: String,
    pub subtitle: Option<String>,
    pub image: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_button_text")]
    pub button_text: String,
    #[serde(default = "default_button_link")]
    pub button_link: String,
}

fn default_true() -> bool {
    true
}

fn default_button_text() -> String {
    "Shop Now".to_string()
}

fn default_button_link() -> String {
    "/catalog".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
    #[serde(default)]
    pub banners: Vec<BannerSeed>,
}

/// Load and validate a catalog seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let catalog: CatalogFile =
        serde_yaml::from_str(&content).map_err(ConfigError::CatalogFileParse)?;

    validate_catalog(&catalog)?;

    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::CatalogValidation(msg));

    let mut category_slugs = HashSet::new();
    for category in &catalog.categories {
        if category.name.trim().is_empty() {
            return invalid("category names must be non-empty".to_string());
        }
        if !category_slugs.insert(category.slug()) {
            return invalid(format!("duplicate category slug '{}'", category.slug()));
        }
    }

    let mut sizes = HashSet::new();
    for size in &catalog.sizes {
        if size.trim().is_empty() {
            return invalid("size labels must be non-empty".to_string());
        }
        if !sizes.insert(size.as_str()) {
            return invalid(format!("duplicate size '{size}'"));
        }
    }

    let mut product_slugs = HashSet::new();
    for product in &catalog.products {
        if product.name.trim().is_empty() {
            return invalid("product names must be non-empty".to_string());
        }
        let slug = product.slug();
        if !product_slugs.insert(slug.clone()) {
            return invalid(format!("duplicate product slug '{slug}'"));
        }
        if !category_slugs.contains(&product.category) {
            return invalid(format!(
                "product '{slug}' references unknown category '{}'",
                product.category
            ));
        }
        if product.price.is_sign_negative() {
            return invalid(format!("product '{slug}' has a negative price"));
        }
        for (size, stock) in &product.sizes {
            if !sizes.contains(size.as_str()) {
                return invalid(format!("product '{slug}' references unknown size '{size}'"));
            }
            if *stock < 0 {
                return invalid(format!("product '{slug}' size '{size}' has negative stock"));
            }
        }
    }

    Ok(())
}
