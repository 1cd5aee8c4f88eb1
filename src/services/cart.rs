//! Durable shopping cart.
//!
//! The cart survives restarts: items are stored as JSON in a single file
//! under the data directory. Prices are resolved against the catalog on the
//! server, never taken from the client.

use crate::services::catalog;
use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io::ErrorKind, path::PathBuf};

/// Removal index past the end of the cart. Downcast by the API layer to
/// answer 404 instead of 500.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoSuchItem(pub usize);

impl fmt::Display for NoSuchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no cart item at index {}", self.0)
    }
}

impl std::error::Error for NoSuchItem {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub price: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItem {
    pub product_id: String,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub total: u32,
}

impl CartView {
    fn from_items(items: Vec<CartItem>) -> Self {
        let total = items.iter().map(|item| item.price).sum();
        Self { items, total }
    }
}

#[derive(Clone)]
pub struct CartService {
    path: PathBuf,
}

impl CartService {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Current cart contents. A missing file is an empty cart.
    pub fn view(&self) -> Result<CartView> {
        Ok(CartView::from_items(self.load()?))
    }

    /// Resolve the product against the catalog and append it.
    pub fn add(&self, request: &AddCartItem) -> Result<CartView> {
        let item = Self::resolve(request)?;

        let mut items = self.load()?;
        items.push(item);
        self.store(&items)?;

        Ok(CartView::from_items(items))
    }

    /// Remove the item at `index`.
    pub fn remove(&self, index: usize) -> Result<CartView> {
        let mut items = self.load()?;

        if index >= items.len() {
            return Err(NoSuchItem(index).into());
        }
        items.remove(index);
        self.store(&items)?;

        Ok(CartView::from_items(items))
    }

    /// Replace the whole cart ("buy now" keeps exactly one item).
    pub fn replace(&self, requests: &[AddCartItem]) -> Result<CartView> {
        let items = requests
            .iter()
            .map(Self::resolve)
            .collect::<Result<Vec<_>>>()?;

        self.store(&items)?;

        Ok(CartView::from_items(items))
    }

    /// Empty the cart. Used after a successfully placed order.
    pub fn clear(&self) -> Result<()> {
        self.store(&[])
    }

    fn resolve(request: &AddCartItem) -> Result<CartItem> {
        let Some(product) = catalog::find(&request.product_id) else {
            bail!("failed to add cart item: unknown product {:?}", request.product_id);
        };

        match &request.variant {
            Some(variant) => ensure!(
                product.offers_variant(variant),
                "failed to add cart item: product {:?} has no variant {variant:?}",
                product.id
            ),
            None => ensure!(
                !product.has_variants(),
                "failed to add cart item: product {:?} requires a variant",
                product.id
            ),
        }

        Ok(CartItem {
            product_id: product.id.to_string(),
            name: product.name.to_string(),
            variant: request.variant.clone(),
            price: product.price,
        })
    }

    fn load(&self) -> Result<Vec<CartItem>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                serde_json::from_str(&contents).context("failed to parse persisted cart")
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).context("failed to read persisted cart"),
        }
    }

    fn store(&self, items: &[CartItem]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("failed to create data directory")?;
        }

        let json = serde_json::to_string_pretty(items).context("failed to serialize cart")?;
        fs::write(&self.path, json).context("failed to write persisted cart")
    }
}
