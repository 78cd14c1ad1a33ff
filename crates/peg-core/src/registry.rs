//! Allowed collateral assets, each paired with its token contract and price adapter.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::oracle::PriceOracleAdapter;
use crate::token::FungibleToken;
use crate::types::AssetId;

/// Deployment input: one collateral asset and the token that holds it.
#[derive(Clone)]
pub struct CollateralListing {
    pub asset: AssetId,
    pub token: Arc<dyn FungibleToken>,
}

impl CollateralListing {
    pub fn new(asset: impl Into<String>, token: Arc<dyn FungibleToken>) -> Self {
        Self {
            asset: AssetId::new(asset),
            token,
        }
    }
}

impl std::fmt::Debug for CollateralListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollateralListing")
            .field("asset", &self.asset)
            .field("symbol", &self.token.symbol())
            .finish()
    }
}

#[derive(Clone)]
pub struct CollateralAsset {
    pub id: AssetId,
    pub token: Arc<dyn FungibleToken>,
    pub oracle: PriceOracleAdapter,
}

impl std::fmt::Debug for CollateralAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollateralAsset")
            .field("id", &self.id)
            .field("symbol", &self.token.symbol())
            .field("oracle", &self.oracle)
            .finish()
    }
}

/// Fixed after construction. Iteration follows listing order.
#[derive(Debug, Default, Clone)]
pub struct CollateralRegistry {
    assets: Vec<CollateralAsset>,
    index: HashMap<AssetId, usize>,
}

impl CollateralRegistry {
    pub fn new(assets: Vec<CollateralAsset>) -> Result<Self, EngineError> {
        let mut index = HashMap::with_capacity(assets.len());
        for (position, asset) in assets.iter().enumerate() {
            if index.insert(asset.id.clone(), position).is_some() {
                return Err(EngineError::DuplicateCollateralAsset(asset.id.clone()));
            }
        }
        Ok(Self { assets, index })
    }

    pub fn get(&self, asset: &AssetId) -> Option<&CollateralAsset> {
        self.index.get(asset).map(|&position| &self.assets[position])
    }

    /// Like [`CollateralRegistry::get`] but reports unknown assets as `NotAllowedToken`.
    pub fn require(&self, asset: &AssetId) -> Result<&CollateralAsset, EngineError> {
        self.get(asset)
            .ok_or_else(|| EngineError::NotAllowedToken(asset.clone()))
    }

    pub fn is_allowed(&self, asset: &AssetId) -> bool {
        self.index.contains_key(asset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollateralAsset> {
        self.assets.iter()
    }

    pub fn ids(&self) -> Vec<AssetId> {
        self.assets.iter().map(|a| a.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
