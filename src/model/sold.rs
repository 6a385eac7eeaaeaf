use std::collections::HashSet;

/// Marketplace SKUs already sold on the destination marketplace.
///
/// Loaded once at startup and consulted before any remote work is done for an
/// item. It is never refreshed while the process runs.
#[derive(Debug, Clone, Default)]
pub struct SoldSkuSet {
    skus: HashSet<String>,
}

impl SoldSkuSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, sku: &str) -> bool {
        !sku.is_empty() && self.skus.contains(sku)
    }

    pub fn len(&self) -> usize {
        self.skus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skus.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for SoldSkuSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let skus = iter
            .into_iter()
            .map(Into::into)
            .map(|sku: String| sku.trim().to_owned())
            .filter(|sku| !sku.is_empty())
            .collect();
        Self { skus }
    }
}
