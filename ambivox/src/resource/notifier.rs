use super::AssetId;
use crate::events::LoadEvent;
use crossbeam_channel::{Receiver, Sender, TryIter, unbounded};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Fans load results out to per-asset subscribers.
///
/// An asset finishes loading at most once, so subscriptions are one-shot:
/// publishing an event for an asset removes its subscriber list. Subscribe
/// first, then check whether the asset is already loaded, to avoid missing
/// an event published in between.
#[derive(Default)]
pub struct LoadNotifier {
    subscribers: Mutex<HashMap<AssetId, Vec<(u64, Sender<LoadEvent>)>>>,
    next_token: AtomicU64,
}

impl LoadNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>, asset: AssetId) -> LoadSubscription {
        let (sender, receiver) = unbounded();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(asset)
            .or_default()
            .push((token, sender));
        LoadSubscription {
            asset,
            token,
            receiver,
            notifier: Arc::downgrade(self),
        }
    }

    pub fn publish(&self, event: LoadEvent) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&event.asset_id())
            .unwrap_or_default();
        log::trace!(
            "Load event for '{}' to {} subscriber(s)",
            event.name(),
            subscribers.len()
        );
        for (_, sender) in subscribers {
            let _ = sender.send(event.clone());
        }
    }

    pub fn subscriber_count(&self, asset: AssetId) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&asset)
            .map_or(0, Vec::len)
    }

    fn unsubscribe(&self, asset: AssetId, token: u64) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = subscribers.get_mut(&asset) {
            list.retain(|(t, _)| *t != token);
            if list.is_empty() {
                subscribers.remove(&asset);
            }
        }
    }
}

/// Receiving end of a [`LoadNotifier`] subscription. Unsubscribes on drop.
pub struct LoadSubscription {
    asset: AssetId,
    token: u64,
    receiver: Receiver<LoadEvent>,
    notifier: Weak<LoadNotifier>,
}

impl LoadSubscription {
    pub fn asset_id(&self) -> AssetId {
        self.asset
    }

    pub fn try_recv(&self) -> Option<LoadEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn try_iter(&self) -> TryIter<'_, LoadEvent> {
        self.receiver.try_iter()
    }
}

impl Drop for LoadSubscription {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unsubscribe(self.asset, self.token);
        }
    }
}
