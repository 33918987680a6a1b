//! Asset load notifications.

use crate::resource::AssetId;

/// Outcome of an asynchronous asset load, delivered per asset to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    Finished {
        asset: AssetId,
        name: String,
    },
    Failed {
        asset: AssetId,
        name: String,
        reason: String,
    },
}

impl LoadEvent {
    pub fn asset_id(&self) -> AssetId {
        match self {
            Self::Finished { asset, .. } | Self::Failed { asset, .. } => *asset,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Finished { name, .. } | Self::Failed { name, .. } => name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
