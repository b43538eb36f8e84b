use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Kind of work a descriptor asks the host to perform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Bring the target scene into memory
    Load,
    /// Release the target scene
    Unload,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Load => write!(f, "load"),
            OperationKind::Unload => write!(f, "unload"),
        }
    }
}

/// How a loaded scene relates to the scenes already active
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum LoadMode {
    /// Coexist with every scene currently loaded
    #[default]
    Additive,
    /// Replace every scene currently loaded
    Exclusive,
}

impl Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Additive => write!(f, "additive"),
            LoadMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Monotonic per-session identifier handed to every queued descriptor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub u64);

impl Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single requested unit of work.
///
/// Descriptors are immutable once built: the target is normalized on
/// construction and kind/mode never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationDescriptor {
    target: String,
    kind: OperationKind,
    mode: LoadMode,
    is_transition: bool,
}

impl OperationDescriptor {
    /// Describe a caller-requested operation
    pub fn new(target: &str, kind: OperationKind, mode: LoadMode) -> Self {
        Self {
            target: normalize_target(target),
            kind,
            mode,
            is_transition: false,
        }
    }

    /// Describe an operation on the transition scene
    pub fn transition(target: &str, kind: OperationKind) -> Self {
        Self {
            target: normalize_target(target),
            kind,
            mode: LoadMode::Additive,
            is_transition: true,
        }
    }

    pub fn load(target: &str, mode: LoadMode) -> Self {
        Self::new(target, OperationKind::Load, mode)
    }

    pub fn unload(target: &str) -> Self {
        Self::new(target, OperationKind::Unload, LoadMode::Additive)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// True when the descriptor was inserted by the transition policy
    pub fn is_transition(&self) -> bool {
        self.is_transition
    }

    /// Whether a host event about `scene` of `kind` completes this descriptor
    pub fn is_completed_by(&self, scene: &str, kind: OperationKind) -> bool {
        self.kind == kind && same_target(&self.target, scene)
    }
}

impl Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperationKind::Load => write!(f, "load '{}' ({})", self.target, self.mode)?,
            OperationKind::Unload => write!(f, "unload '{}'", self.target)?,
        }
        if self.is_transition {
            write!(f, " [transition]")?;
        }
        Ok(())
    }
}

/// A caller request before validation and transition wrapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationRequest {
    /// The descriptor the caller actually wants executed
    pub descriptor: OperationDescriptor,
    /// Bracket the operation with the registered transition scene
    pub use_transition: bool,
}

impl OperationRequest {
    pub fn new(target: &str, kind: OperationKind, mode: LoadMode, use_transition: bool) -> Self {
        Self {
            descriptor: OperationDescriptor::new(target, kind, mode),
            use_transition,
        }
    }
}

/// Strip any path prefix so only the bare scene name remains.
///
/// Both `/` and `\` count as separators, since scene paths may come from
/// tooling on either platform.
pub fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Case-insensitive scene name equality
pub fn same_target(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that path prefixes are removed from targets
    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("Assets/Scenes/Level1"), "Level1");
        assert_eq!(normalize_target("Assets\\Scenes\\Level1"), "Level1");
        assert_eq!(normalize_target("  Menu "), "Menu");
        assert_eq!(normalize_target(""), "");
        assert_eq!(normalize_target("Scenes/"), "");
    }

    // Test that completion matching needs both name and kind
    #[test]
    fn test_is_completed_by() {
        let descriptor = OperationDescriptor::load("Scenes/Arena", LoadMode::Additive);
        assert!(descriptor.is_completed_by("arena", OperationKind::Load));
        assert!(descriptor.is_completed_by("ARENA", OperationKind::Load));
        assert!(!descriptor.is_completed_by("arena", OperationKind::Unload));
        assert!(!descriptor.is_completed_by("arena2", OperationKind::Load));
    }

    #[test]
    fn test_transition_descriptor() {
        let descriptor = OperationDescriptor::transition("Loading", OperationKind::Unload);
        assert!(descriptor.is_transition());
        assert_eq!(descriptor.mode(), LoadMode::Additive);
        assert_eq!(descriptor.to_string(), "unload 'Loading' [transition]");
    }
}
