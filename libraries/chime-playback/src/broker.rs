//! Shared autoplay permission broker
//!
//! One broker serves every player at a composition root. It caches probe
//! results per media type, watches the host's gesture source, and lifts
//! the `requires_user_interaction` flag on every cached result once the
//! first qualifying gesture is observed. One user click unblocks every
//! player sharing the broker.

use crate::probe;
use chime_core::types::{MediaType, PermissionResult};
use chime_core::{PlatformHost, UserGestureSource};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Callback invoked when the stored permission result for a media type
/// changes
pub type StatusListener = Arc<dyn Fn(&PermissionResult) + Send + Sync>;

/// Token returned by [`PermissionBroker::on_status_change`], used to
/// unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct BrokerState {
    cache: HashMap<MediaType, PermissionResult>,
    listeners: HashMap<MediaType, Vec<(ListenerId, StatusListener)>>,
    next_id: u64,
}

/// Cache and broadcast point for autoplay permission state.
///
/// Constructed once per composition root and injected into each player
/// as an `Arc`. Must be created inside a Tokio runtime; the broker
/// spawns its gesture watcher on creation.
pub struct PermissionBroker {
    gestures: Arc<dyn UserGestureSource>,
    interaction_seen: AtomicBool,
    // Serializes probes so concurrent detect calls share one result
    probe_serial: tokio::sync::Mutex<()>,
    state: Mutex<BrokerState>,
}

impl PermissionBroker {
    /// Create a broker watching the given gesture source
    pub fn new(gestures: Arc<dyn UserGestureSource>) -> Arc<Self> {
        let broker = Arc::new(Self {
            gestures: Arc::clone(&gestures),
            interaction_seen: AtomicBool::new(false),
            probe_serial: tokio::sync::Mutex::new(()),
            state: Mutex::new(BrokerState::default()),
        });

        // Listener registered before the seen check so a gesture landing
        // in between is caught by one path or the other
        let listener = gestures.listen();
        let weak = Arc::downgrade(&broker);
        tokio::spawn(async move {
            if listener.wait().await {
                if let Some(broker) = weak.upgrade() {
                    broker.note_interaction();
                }
            }
        });
        if gestures.gesture_seen() {
            broker.note_interaction();
        }
        broker
    }

    /// Resolve the autoplay status for a media type, cache-first.
    ///
    /// Without `force_check` a cached result is returned unchanged and no
    /// element is created. Otherwise a fresh probe runs against `host`
    /// and the result is cached.
    pub async fn detect(
        &self,
        host: &dyn PlatformHost,
        media: MediaType,
        force_check: bool,
    ) -> PermissionResult {
        if !force_check {
            if let Some(cached) = self.cached(media) {
                return cached;
            }
        }
        let _serial = self.probe_serial.lock().await;
        if !force_check {
            // A concurrent caller may have probed while we waited
            if let Some(cached) = self.cached(media) {
                return cached;
            }
        }
        let result = self.probe_and_store(host, media, false).await;
        debug!("Autoplay status for {} resolved: {}", media, result.status);
        result
    }

    /// Force a fresh probe.
    ///
    /// With `muted` the probe skips the unmute upgrade, so the best
    /// reported outcome is `AllowedMuted`; used when the caller intends
    /// to start muted anyway.
    pub async fn request_permission(
        &self,
        host: &dyn PlatformHost,
        media: MediaType,
        muted: bool,
    ) -> PermissionResult {
        let _serial = self.probe_serial.lock().await;
        let result = self.probe_and_store(host, media, muted).await;
        debug!(
            "Autoplay permission re-checked for {} (muted {}): {}",
            media, muted, result.status
        );
        result
    }

    async fn probe_and_store(
        &self,
        host: &dyn PlatformHost,
        media: MediaType,
        muted_only: bool,
    ) -> PermissionResult {
        let mut result = probe::run(host, media, muted_only).await;
        // A gesture already observed anywhere lifts the gate immediately
        if self.interaction_seen() {
            result.mark_interaction_seen();
        }
        self.store(media, result.clone());
        result
    }

    /// Register a status-change listener for one media type.
    ///
    /// The listener fires whenever the stored result for that media type
    /// changes, including its first resolution and gesture upgrades.
    pub fn on_status_change(
        &self,
        media: MediaType,
        listener: impl Fn(&PermissionResult) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = ListenerId(state.next_id);
        state
            .listeners
            .entry(media)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a status-change listener by its token.
    ///
    /// Returns true if the token was registered.
    pub fn off_status_change(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock().unwrap();
        for listeners in state.listeners.values_mut() {
            if let Some(index) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(index);
                return true;
            }
        }
        false
    }

    /// The cached result for a media type, if one has been stored
    #[must_use]
    pub fn cached(&self, media: MediaType) -> Option<PermissionResult> {
        self.state.lock().unwrap().cache.get(&media).cloned()
    }

    /// Whether a qualifying user gesture has been observed
    #[must_use]
    pub fn interaction_seen(&self) -> bool {
        self.interaction_seen.load(Ordering::SeqCst)
    }

    /// Record the first observed gesture: flip the flag, upgrade every
    /// cached result that required interaction, and re-broadcast the
    /// upgraded results.
    fn note_interaction(&self) {
        if self.interaction_seen.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("First user gesture observed; lifting interaction requirements");
        let upgraded: Vec<(MediaType, PermissionResult)> = {
            let mut state = self.state.lock().unwrap();
            state
                .cache
                .iter_mut()
                .filter(|(_, result)| result.requires_user_interaction)
                .map(|(media, result)| {
                    result.mark_interaction_seen();
                    (*media, result.clone())
                })
                .collect()
        };
        for (media, result) in upgraded {
            self.broadcast(media, &result);
        }
    }

    fn store(&self, media: MediaType, result: PermissionResult) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let changed = state.cache.get(&media) != Some(&result);
            state.cache.insert(media, result.clone());
            changed
        };
        if changed {
            self.broadcast(media, &result);
        }
    }

    /// Deliver a result to every listener of its media type, outside the
    /// state lock. A panicking listener is logged and skipped; it never
    /// reaches the broker or other listeners.
    fn broadcast(&self, media: MediaType, result: &PermissionResult) {
        let listeners: Vec<StatusListener> = {
            let state = self.state.lock().unwrap();
            state
                .listeners
                .get(&media)
                .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(result))).is_err() {
                warn!("Autoplay status listener panicked for {}", media);
            }
        }
    }
}

impl std::fmt::Debug for PermissionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionBroker")
            .field("interaction_seen", &self.interaction_seen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chime_core::types::AutoplayStatus;
    use chime_core::{
        GestureNotifier, MediaElement, MediaSource, PlayerError, Result, StreamOutput,
    };
    use std::sync::atomic::AtomicUsize;

    /// Host whose elements always reject unmuted starts
    struct BlockedHost {
        probes: Arc<AtomicUsize>,
        gestures: Arc<GestureNotifier>,
    }

    impl BlockedHost {
        fn new() -> Self {
            Self {
                probes: Arc::new(AtomicUsize::new(0)),
                gestures: Arc::new(GestureNotifier::new()),
            }
        }
    }

    struct BlockedElement;

    #[async_trait]
    impl MediaElement for BlockedElement {
        async fn load(&mut self, _source: MediaSource) -> Result<()> {
            Ok(())
        }
        async fn start(&mut self) -> Result<()> {
            Err(PlayerError::policy_blocked("user gesture required"))
        }
        fn pause(&mut self) {}
        fn stop(&mut self) {}
        fn seek(&mut self, _position_secs: f64) {}
        fn set_volume(&mut self, _volume: f32) {}
        fn volume(&self) -> f32 {
            1.0
        }
        fn set_muted(&mut self, _muted: bool) {}
        fn set_rate(&mut self, _rate: f64) {}
        fn position(&self) -> f64 {
            0.0
        }
        fn duration(&self) -> Option<f64> {
            None
        }
        fn is_ended(&self) -> bool {
            false
        }
    }

    impl PlatformHost for BlockedHost {
        fn create_media_element(&self, _media: MediaType) -> Result<Box<dyn MediaElement>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(BlockedElement))
        }
        fn create_stream_output(&self) -> Result<Box<dyn StreamOutput>> {
            Err(PlayerError::unsupported("no stream output in this test"))
        }
        fn gesture_source(&self) -> Arc<dyn UserGestureSource> {
            Arc::clone(&self.gestures) as Arc<dyn UserGestureSource>
        }
    }

    #[tokio::test]
    async fn detect_caches_one_probe() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        let first = broker.detect(&host, MediaType::Audio, false).await;
        let second = broker.detect(&host, MediaType::Audio, false).await;
        assert_eq!(first.status, AutoplayStatus::Disallowed);
        assert_eq!(first, second);
        // One element for two detect calls
        assert_eq!(host.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_check_probes_again() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        broker.detect(&host, MediaType::Audio, false).await;
        broker.detect(&host, MediaType::Audio, true).await;
        assert_eq!(host.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn media_types_cache_independently() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        broker.detect(&host, MediaType::Audio, false).await;
        broker.detect(&host, MediaType::Video, false).await;
        assert_eq!(host.probes.load(Ordering::SeqCst), 2);
        assert!(broker.cached(MediaType::Audio).is_some());
        assert!(broker.cached(MediaType::Video).is_some());
    }

    #[tokio::test]
    async fn gesture_upgrades_cached_results_and_rebroadcasts() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        let blocked = broker.detect(&host, MediaType::Audio, false).await;
        assert!(blocked.requires_user_interaction);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        broker.on_status_change(MediaType::Audio, move |result| {
            seen_clone.lock().unwrap().push(result.clone());
        });

        host.gestures.notify();
        // Let the watcher task observe the gesture
        tokio::task::yield_now().await;

        assert!(broker.interaction_seen());
        let cached = broker.cached(MediaType::Audio).unwrap();
        assert!(!cached.requires_user_interaction);
        // Status itself stays as probed; only the gate lifted
        assert_eq!(cached.status, AutoplayStatus::Disallowed);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].requires_user_interaction);
    }

    #[tokio::test]
    async fn gesture_before_probe_lifts_gate_in_fresh_results() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        host.gestures.notify();
        tokio::task::yield_now().await;

        let result = broker.detect(&host, MediaType::Audio, false).await;
        assert_eq!(result.status, AutoplayStatus::Disallowed);
        assert!(!result.requires_user_interaction);
    }

    #[tokio::test]
    async fn gesture_seen_before_construction_is_picked_up() {
        let gestures = Arc::new(GestureNotifier::new());
        gestures.notify();

        let broker = PermissionBroker::new(gestures as Arc<dyn UserGestureSource>);
        assert!(broker.interaction_seen());
    }

    #[tokio::test]
    async fn first_resolution_notifies_listeners() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = broker.on_status_change(MediaType::Audio, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        broker.detect(&host, MediaType::Audio, false).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Same result again: no change, no notification
        broker.detect(&host, MediaType::Audio, true).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(broker.off_status_change(id));
        assert!(!broker.off_status_change(id));
    }

    #[tokio::test]
    async fn panicking_listener_is_isolated() {
        let host = BlockedHost::new();
        let broker = PermissionBroker::new(host.gesture_source());

        let count = Arc::new(AtomicUsize::new(0));
        broker.on_status_change(MediaType::Audio, |_| panic!("listener bug"));
        let count_clone = Arc::clone(&count);
        broker.on_status_change(MediaType::Audio, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        broker.detect(&host, MediaType::Audio, false).await;
        // The healthy listener still ran
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_permission_muted_caps_at_allowed_muted() {
        // A host that allows everything still reports AllowedMuted when
        // the caller asks for the muted-only check
        struct OpenElement;

        #[async_trait]
        impl MediaElement for OpenElement {
            async fn load(&mut self, _source: MediaSource) -> Result<()> {
                Ok(())
            }
            async fn start(&mut self) -> Result<()> {
                Ok(())
            }
            fn pause(&mut self) {}
            fn stop(&mut self) {}
            fn seek(&mut self, _position_secs: f64) {}
            fn set_volume(&mut self, _volume: f32) {}
            fn volume(&self) -> f32 {
                1.0
            }
            fn set_muted(&mut self, _muted: bool) {}
            fn set_rate(&mut self, _rate: f64) {}
            fn position(&self) -> f64 {
                0.0
            }
            fn duration(&self) -> Option<f64> {
                None
            }
            fn is_ended(&self) -> bool {
                false
            }
        }

        struct OpenHost {
            gestures: Arc<GestureNotifier>,
        }

        impl PlatformHost for OpenHost {
            fn create_media_element(&self, _media: MediaType) -> Result<Box<dyn MediaElement>> {
                Ok(Box::new(OpenElement))
            }
            fn create_stream_output(&self) -> Result<Box<dyn StreamOutput>> {
                Err(PlayerError::unsupported("no stream output in this test"))
            }
            fn gesture_source(&self) -> Arc<dyn UserGestureSource> {
                Arc::clone(&self.gestures) as Arc<dyn UserGestureSource>
            }
        }

        let host = OpenHost {
            gestures: Arc::new(GestureNotifier::new()),
        };
        let broker = PermissionBroker::new(host.gesture_source());

        let muted = broker.request_permission(&host, MediaType::Audio, true).await;
        assert_eq!(muted.status, AutoplayStatus::AllowedMuted);

        let full = broker.request_permission(&host, MediaType::Audio, false).await;
        assert_eq!(full.status, AutoplayStatus::Allowed);
    }
}
