//! Sound and music assets, their loading, and load notifications.

mod asset;
mod loader;
mod notifier;

pub use asset::{AssetId, AssetKind, AudioAsset, MUSIC_CHUNK_FRAMES};
pub use loader::AssetLoader;
pub use notifier::{LoadNotifier, LoadSubscription};
