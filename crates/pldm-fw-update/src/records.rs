//! Device records and component metadata consumed by update sessions.

use std::collections::HashMap;

use pldm_fw_wire::{ComponentIdentity, VersionString, update_option_flags};
use serde::{Deserialize, Serialize};

/// Transport-level address of a firmware device
pub type EndpointId = u8;

/// Everything the agent knows about one target before updating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareDeviceRecord {
    /// Target endpoint
    pub endpoint: EndpointId,
    /// Indices into the component table, in update order
    pub applicable_components: Vec<usize>,
    /// Opaque data the target may pull with GetPackageData
    #[serde(default)]
    pub package_data: Vec<u8>,
    /// Component image set version string
    pub image_set_version: String,
}

/// Metadata of one component image inside the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentImageInfo {
    /// Component classification
    pub classification: u16,
    /// Component identifier
    pub identifier: u16,
    /// Comparison stamp
    pub comparison_stamp: u32,
    /// Package component option bits
    pub options: u16,
    /// Requested activation method
    pub requested_activation_method: u16,
    /// Image size in bytes
    pub size: u32,
    /// Byte offset of the image inside the package
    pub package_offset: u64,
    /// Component version string
    pub version: String,
}

impl ComponentImageInfo {
    /// Wire identity of this component given its classification index
    pub fn identity(&self, classification_index: u8) -> ComponentIdentity {
        ComponentIdentity {
            classification: self.classification,
            identifier: self.identifier,
            classification_index,
            comparison_stamp: self.comparison_stamp,
        }
    }

    /// UpdateComponent option flags derived from the package option bits
    pub fn update_option_flags(&self) -> u32 {
        update_option_flags(self.options)
    }

    /// Version string as carried on the wire
    pub fn version_string(&self) -> VersionString {
        VersionString::new(&self.version)
    }
}

/// The package component table, shared read-only by every session.
///
/// Classification indices are reported by each target and are not part of
/// the package, so they live in a separate lookup keyed by
/// `(classification, identifier)`.
#[derive(Debug, Clone, Default)]
pub struct ComponentTable {
    components: Vec<ComponentImageInfo>,
    classification_indices: HashMap<(u16, u16), u8>,
}

impl ComponentTable {
    /// Create a table from package component metadata
    pub fn new(components: Vec<ComponentImageInfo>) -> Self {
        Self {
            components,
            classification_indices: HashMap::new(),
        }
    }

    /// Register the classification index of a component
    #[must_use]
    pub fn with_classification_index(
        mut self,
        classification: u16,
        identifier: u16,
        index: u8,
    ) -> Self {
        self.set_classification_index(classification, identifier, index);
        self
    }

    /// Register the classification index of a component
    pub fn set_classification_index(&mut self, classification: u16, identifier: u16, index: u8) {
        self.classification_indices
            .insert((classification, identifier), index);
    }

    /// Component at `index`
    pub fn get(&self, index: usize) -> Option<&ComponentImageInfo> {
        self.components.get(index)
    }

    /// Classification index registered for `component`
    pub fn classification_index(&self, component: &ComponentImageInfo) -> Option<u8> {
        self.classification_indices
            .get(&(component.classification, component.identifier))
            .copied()
    }

    /// Number of components in the package
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the package has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
