use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::descriptor::{LoadMode, OperationKind};
use crate::core::error::HostError;

/// Out-of-band signal emitted by the host once a scene finished loading or unloading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostEvent {
    /// Bare name of the scene the event is about
    pub scene: String,
    /// Which transition the scene went through
    pub kind: OperationKind,
}

impl HostEvent {
    pub fn loaded(scene: &str) -> Self {
        Self {
            scene: scene.to_string(),
            kind: OperationKind::Load,
        }
    }

    pub fn unloaded(scene: &str) -> Self {
        Self {
            scene: scene.to_string(),
            kind: OperationKind::Unload,
        }
    }
}

/// Channel end a host pushes its events into
pub type HostEventSender = mpsc::UnboundedSender<HostEvent>;

/// Handle returned by [`SceneHost::subscribe`], needed to unsubscribe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Adapter over the external resource host.
///
/// Dispatch methods only report whether the host accepted the request.
/// Completion arrives later as a [`HostEvent`] on every subscribed sender,
/// or never at all if the host loses track of the scene.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SceneHost: Send + Sync {
    /// Whether the host knows a scene with this name
    fn is_known(&self, name: &str) -> bool;

    /// Whether the scene is currently loaded on the host
    fn is_loaded(&self, name: &str) -> bool;

    /// Start loading a scene; completion is signalled by a `Load` event
    async fn load(&self, name: &str, mode: LoadMode) -> Result<(), HostError>;

    /// Start unloading a scene; completion is signalled by an `Unload` event
    async fn unload(&self, name: &str) -> Result<(), HostError>;

    /// Register a sink for load/unload events
    fn subscribe(&self, sink: HostEventSender) -> SubscriptionId;

    /// Drop a sink registered with [`SceneHost::subscribe`]
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
