use log::{info, warn};

use crate::core::descriptor::{normalize_target, OperationDescriptor, OperationKind};

/// Brackets a requested operation with loads/unloads of a transition scene
/// (typically a loading screen).
///
/// Each wrapped operation gets its own bracket, so a batch of requests shows
/// one transition per request rather than one for the whole batch.
#[derive(Debug, Clone, Default)]
pub struct TransitionPolicy {
    /// Registered transition scene
    transition_target: Option<String>,
}

impl TransitionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transition scene. The orchestrator handle enforces the
    /// once-per-session rule before this is reached.
    pub fn register(&mut self, name: &str) {
        let name = normalize_target(name);
        if name.is_empty() {
            warn!("Ignoring empty transition scene name");
            return;
        }
        info!("Registered transition scene '{}'", name);
        self.transition_target = Some(name);
    }

    /// Expand a descriptor into the sequence that should be queued for it
    pub fn wrap(
        &self,
        descriptor: OperationDescriptor,
        wants_transition: bool,
    ) -> Vec<OperationDescriptor> {
        match (&self.transition_target, wants_transition) {
            (Some(target), true) => vec![
                OperationDescriptor::transition(target, OperationKind::Load),
                descriptor,
                OperationDescriptor::transition(target, OperationKind::Unload),
            ],
            _ => vec![descriptor],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::LoadMode;

    // Test that wrapping is a no-op without a registered scene
    #[test]
    fn test_wrap_without_registration() {
        let policy = TransitionPolicy::new();
        let descriptor = OperationDescriptor::load("Level", LoadMode::Additive);

        let wrapped = policy.wrap(descriptor.clone(), true);
        assert_eq!(wrapped, vec![descriptor]);
    }

    // Test that a registered scene brackets the operation
    #[test]
    fn test_wrap_with_registration() {
        let mut policy = TransitionPolicy::new();
        policy.register("Scenes/Loading");

        let descriptor = OperationDescriptor::unload("Level");
        let wrapped = policy.wrap(descriptor.clone(), true);

        assert_eq!(wrapped.len(), 3);
        assert_eq!(
            wrapped[0],
            OperationDescriptor::transition("Loading", OperationKind::Load)
        );
        assert_eq!(wrapped[1], descriptor);
        assert_eq!(
            wrapped[2],
            OperationDescriptor::transition("Loading", OperationKind::Unload)
        );
        assert!(wrapped[0].is_transition() && wrapped[2].is_transition());

        assert_eq!(policy.wrap(descriptor.clone(), false), vec![descriptor]);
    }

    // Test that an empty name leaves wrapping disabled
    #[test]
    fn test_register_ignores_empty_name() {
        let mut policy = TransitionPolicy::new();
        policy.register("  ");

        let descriptor = OperationDescriptor::load("Level", LoadMode::Additive);
        assert_eq!(policy.wrap(descriptor.clone(), true), vec![descriptor]);
    }
}
