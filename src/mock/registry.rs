use std::collections::HashMap;

use crate::gap::Uuid;
use crate::gatt::Notifier;

/// Update callbacks of active subscriptions, keyed by service and
/// characteristic. Unregistering clears the slot without removing it.
#[derive(Debug, Default)]
pub(super) struct NotifyRegistry(HashMap<Uuid, HashMap<Uuid, Option<Notifier>>>);

impl NotifyRegistry {
    /// Sets the callback for a characteristic, replacing any previous one.
    pub fn register(&mut self, svc: Uuid, chr: Uuid, n: Notifier) {
        self.0.entry(svc).or_default().insert(chr, Some(n));
    }

    /// Returns the callback for a characteristic.
    pub fn get(&self, svc: Uuid, chr: Uuid) -> Option<&Notifier> {
        self.0.get(&svc)?.get(&chr)?.as_ref()
    }

    /// Clears the callback for a characteristic. Returns whether a callback
    /// was set.
    pub fn unregister(&mut self, svc: Uuid, chr: Uuid) -> bool {
        (self.0.get_mut(&svc).and_then(|m| m.get_mut(&chr)))
            .map_or(false, |slot| slot.take().is_some())
    }
}
