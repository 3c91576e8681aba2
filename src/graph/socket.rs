//! Socket descriptors for the node graph.
//!
//! Each node kind declares its sockets via static `SocketDescriptor` arrays.
//! The graph uses these to validate links.

use std::fmt;

/// The kind of data flowing through a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Bake pass selection.
    Pass,
    /// Resolution/sampling settings.
    BakeSetting,
    /// Mesh descriptors (target, source, uv).
    Mesh,
    /// Baked images.
    Image,
    /// Output save settings.
    SaveSetting,
    /// Relay sockets accept any kind.
    Any,
}

impl SocketKind {
    /// Whether a link from `self` (output) into `other` (input) is allowed.
    pub fn accepts(self, other: SocketKind) -> bool {
        self == SocketKind::Any || other == SocketKind::Any || self == other
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketKind::Pass => "Pass",
            SocketKind::BakeSetting => "BakeSetting",
            SocketKind::Mesh => "Mesh",
            SocketKind::Image => "Image",
            SocketKind::SaveSetting => "SaveSetting",
            SocketKind::Any => "Any",
        };
        f.write_str(name)
    }
}

/// Whether a socket is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketDirection {
    Input,
    Output,
}

/// Static descriptor for a node's socket.
#[derive(Debug, Clone)]
pub struct SocketDescriptor {
    pub name: &'static str,
    pub direction: SocketDirection,
    pub kind: SocketKind,
    /// Input accepts more than one incoming link.
    pub multi: bool,
}

impl SocketDescriptor {
    pub const fn input(name: &'static str, kind: SocketKind) -> Self {
        Self {
            name,
            direction: SocketDirection::Input,
            kind,
            multi: false,
        }
    }

    pub const fn multi_input(name: &'static str, kind: SocketKind) -> Self {
        Self {
            name,
            direction: SocketDirection::Input,
            kind,
            multi: true,
        }
    }

    pub const fn output(name: &'static str, kind: SocketKind) -> Self {
        Self {
            name,
            direction: SocketDirection::Output,
            kind,
            multi: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_compatibility() {
        assert!(SocketKind::Pass.accepts(SocketKind::Pass));
        assert!(!SocketKind::Pass.accepts(SocketKind::Mesh));
        assert!(SocketKind::Any.accepts(SocketKind::Image));
        assert!(SocketKind::Mesh.accepts(SocketKind::Any));
    }

    #[test]
    fn test_descriptor_constructors() {
        let d = SocketDescriptor::multi_input("Meshes", SocketKind::Mesh);
        assert!(d.multi);
        assert_eq!(d.direction, SocketDirection::Input);
        assert!(!SocketDescriptor::output("Image", SocketKind::Image).multi);
    }
}
