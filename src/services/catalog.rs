//! Read-only product catalog.
//!
//! The storefront sells four fixed products; prices and copy change with a
//! release, not at runtime, so the table lives in the binary.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub short_desc: &'static str,
    /// Price in whole rupees.
    pub price: u32,
    pub original_price: Option<u32>,
    pub rating: f32,
    pub reviews: u32,
    pub badge: &'static str,
    /// Empty for products sold in a single configuration.
    pub variants: &'static [&'static str],
}

impl Product {
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn offers_variant(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| *v == variant)
    }
}

static PRODUCTS: &[Product] = &[
    Product {
        id: "watch",
        name: "LifeBeep Smartwatch",
        short_desc: "Intelligent sound alert notifier for the hearing-impaired",
        price: 899,
        original_price: Some(1499),
        rating: 4.8,
        reviews: 127,
        badge: "In Stock",
        variants: &[],
    },
    Product {
        id: "chip",
        name: "IC741 + ESP32 Chip Module",
        short_desc: "Development board for custom projects",
        price: 599,
        original_price: Some(899),
        rating: 4.6,
        reviews: 89,
        badge: "DIY Kit",
        variants: &[],
    },
    Product {
        id: "strap",
        name: "Silicone Watch Strap",
        short_desc: "Available in multiple vibrant colors",
        price: 99,
        original_price: None,
        rating: 4.7,
        reviews: 156,
        badge: "Accessory",
        variants: &["orange", "yellow", "blue"],
    },
    Product {
        id: "battery",
        name: "Rechargeable Li-ion Battery",
        short_desc: "3.7V 400mAh long-lasting power",
        price: 149,
        original_price: None,
        rating: 4.5,
        reviews: 78,
        badge: "Accessory",
        variants: &[],
    },
];

pub fn all() -> &'static [Product] {
    PRODUCTS
}

pub fn find(id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.id == id)
}
