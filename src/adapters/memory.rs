//! In-memory scene host
//!
//! Behaves like an engine scene manager: a fixed registry of scene names,
//! an ordered list of loaded scenes, and completion reported asynchronously
//! through subscribed event sinks after a configurable latency.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::descriptor::{same_target, LoadMode};
use crate::core::error::HostError;
use crate::core::host::{HostEvent, HostEventSender, SceneHost, SubscriptionId};

#[derive(Debug, Clone)]
pub struct InMemorySceneHost {
    state: Arc<Mutex<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Every scene the host can load
    registry: Vec<String>,
    /// Loaded scenes in load order; additive loads of the same scene stack
    loaded: Vec<String>,
    /// Event sinks by subscription
    subscribers: HashMap<SubscriptionId, HostEventSender>,
    next_subscription: u64,
    /// Fixed delay before a completion event
    latency: Duration,
    /// Upper bound of the random delay added to `latency`
    jitter: Duration,
    rng: StdRng,
    /// Scenes whose dispatches are accepted but never complete
    unresponsive: HashSet<String>,
    /// Scenes whose dispatches are refused
    rejected: HashSet<String>,
}

impl HostState {
    fn canonical(&self, name: &str) -> Option<String> {
        self.registry.iter().find(|known| same_target(known, name)).cloned()
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|scene| same_target(scene, name))
    }

    fn next_delay(&mut self) -> Duration {
        if self.jitter.is_zero() {
            return self.latency;
        }
        let extra = self.rng.gen_range(0..=self.jitter.as_micros() as u64);
        self.latency + Duration::from_micros(extra)
    }

    fn publish(&mut self, event: HostEvent) {
        trace!("Host event: {:?}", event);
        self.subscribers.retain(|_, sink| sink.send(event.clone()).is_ok());
    }

    fn preflight(&self, name: &str) -> Result<String, HostError> {
        let scene = self
            .canonical(name)
            .ok_or_else(|| HostError::UnknownScene(name.to_string()))?;
        if self.rejected.contains(&scene) {
            return Err(HostError::Rejected(format!("dispatches of '{}' are refused", scene)));
        }
        Ok(scene)
    }
}

fn lock(state: &Mutex<HostState>) -> MutexGuard<'_, HostState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemorySceneHost {
    /// Create a host that knows the given scenes
    pub fn new<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Arc::new(Mutex::new(HostState {
                registry: scenes.into_iter().map(Into::into).collect(),
                loaded: Vec::new(),
                subscribers: HashMap::new(),
                next_subscription: 1,
                latency: Duration::ZERO,
                jitter: Duration::ZERO,
                rng: StdRng::seed_from_u64(0),
                unresponsive: HashSet::new(),
                rejected: HashSet::new(),
            })),
        }
    }

    /// Delay every completion event by `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        lock(&self.state).latency = latency;
        self
    }

    /// Add a random delay of up to `jitter`, drawn from a seeded generator
    pub fn with_jitter(self, jitter: Duration, seed: u64) -> Self {
        {
            let mut state = lock(&self.state);
            state.jitter = jitter;
            state.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    /// Accept dispatches for `scene` but never report their completion
    pub fn never_complete(&self, scene: &str) {
        let mut state = lock(&self.state);
        let scene = state.canonical(scene).unwrap_or_else(|| scene.to_string());
        state.unresponsive.insert(scene);
    }

    /// Refuse dispatches for `scene` synchronously
    pub fn refuse(&self, scene: &str) {
        let mut state = lock(&self.state);
        let scene = state.canonical(scene).unwrap_or_else(|| scene.to_string());
        state.rejected.insert(scene);
    }

    /// Push an arbitrary event to every subscriber
    pub fn emit(&self, event: HostEvent) {
        lock(&self.state).publish(event);
    }

    /// Loaded scenes in load order
    pub fn loaded_scenes(&self) -> Vec<String> {
        lock(&self.state).loaded.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    fn complete_later<F>(&self, delay: Duration, apply: F)
    where
        F: FnOnce(&mut HostState) + Send + 'static,
    {
        let state = self.state.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut guard = lock(&state);
            apply(&mut *guard);
        });
    }
}

#[async_trait]
impl SceneHost for InMemorySceneHost {
    fn is_known(&self, name: &str) -> bool {
        lock(&self.state).canonical(name).is_some()
    }

    fn is_loaded(&self, name: &str) -> bool {
        lock(&self.state).is_loaded(name)
    }

    async fn load(&self, name: &str, mode: LoadMode) -> Result<(), HostError> {
        let (scene, delay) = {
            let mut state = lock(&self.state);
            let scene = state.preflight(name)?;
            if state.unresponsive.contains(&scene) {
                debug!("Accepted load of '{}' without completion", scene);
                return Ok(());
            }
            (scene, state.next_delay())
        };

        self.complete_later(delay, move |state| {
            if mode == LoadMode::Exclusive {
                let evicted: Vec<String> = state.loaded.drain(..).collect();
                for old in evicted {
                    state.publish(HostEvent::unloaded(&old));
                }
            }
            state.loaded.push(scene.clone());
            state.publish(HostEvent::loaded(&scene));
        });
        Ok(())
    }

    async fn unload(&self, name: &str) -> Result<(), HostError> {
        let (scene, delay) = {
            let mut state = lock(&self.state);
            let scene = state.preflight(name)?;
            if !state.is_loaded(&scene) {
                return Err(HostError::NotLoaded(scene));
            }
            if state.unresponsive.contains(&scene) {
                debug!("Accepted unload of '{}' without completion", scene);
                return Ok(());
            }
            (scene, state.next_delay())
        };

        self.complete_later(delay, move |state| {
            let position = state
                .loaded
                .iter()
                .position(|loaded| same_target(loaded, &scene));
            if let Some(index) = position {
                state.loaded.remove(index);
            }
            state.publish(HostEvent::unloaded(&scene));
        });
        Ok(())
    }

    fn subscribe(&self, sink: HostEventSender) -> SubscriptionId {
        let mut state = lock(&self.state);
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.insert(id, sink);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.state).subscribers.remove(&id).is_some()
    }
}
