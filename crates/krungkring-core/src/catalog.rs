//! Catalog browsing: category filter and display order.

use std::cmp::Reverse;

use crate::models::Product;

/// Products in `category`, or every product when no category is selected.
pub fn filter_by_category<'a>(products: &'a [Product], category: Option<&str>) -> Vec<&'a Product> {
    match category {
        Some(category) => products.iter().filter(|p| p.in_category(category)).collect(),
        None => products.iter().collect(),
    }
}

/// Pinned products first, most recently pinned leading. Everything else
/// keeps its store order.
pub fn sort_for_display(products: &mut [&Product]) {
    // Stable sort keeps store order within each group
    products.sort_by_key(|p| {
        if p.pinned {
            (false, Reverse(p.pinned_at.unwrap_or(i64::MIN)))
        } else {
            (true, Reverse(i64::MIN))
        }
    });
}

/// Filtered and ordered products for the storefront grid.
pub fn browse<'a>(products: &'a [Product], category: Option<&str>) -> Vec<&'a Product> {
    let mut visible = filter_by_category(products, category);
    sort_for_display(&mut visible);
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_product;

    fn product(id: &str, category: &str, pinned_at: Option<i64>) -> Product {
        let mut product = sample_product(id);
        product.category = Some(category.to_string());
        product.pinned = pinned_at.is_some();
        product.pinned_at = pinned_at;
        product
    }

    fn ids(products: &[&Product]) -> Vec<String> {
        products.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn test_filter_by_category() {
        let products = vec![
            product("1", "Chicken", None),
            product("2", "Drinks", None),
            product("3", "Chicken", None),
        ];
        assert_eq!(ids(&filter_by_category(&products, Some("Chicken"))), vec!["1", "3"]);
        assert_eq!(filter_by_category(&products, None).len(), 3);
        assert!(filter_by_category(&products, Some("Noodles")).is_empty());
    }

    #[test]
    fn test_pinned_first_newest_pin_leading() {
        let products = vec![
            product("1", "Chicken", None),
            product("2", "Chicken", Some(100)),
            product("3", "Chicken", None),
            product("4", "Chicken", Some(200)),
        ];
        assert_eq!(ids(&browse(&products, None)), vec!["4", "2", "1", "3"]);
    }
}
