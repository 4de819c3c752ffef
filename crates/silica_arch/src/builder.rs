//! Serde-loadable architecture descriptions.
//!
//! The flow does not ingest vendor XML; architectures are described as an
//! [`ArchSpec`] (deserialized from JSON or constructed programmatically)
//! and expanded into an [`Architecture`] with
//! [`ArchSpec::expand`].

use crate::error::ArchError;
use crate::ids::{ModelId, PatternId, PbTypeId};
use crate::model::{Model, ModelPort, PortKind};
use crate::pb_graph::{expand, Architecture};
use crate::pb_type::{Mode, PackPattern, PatternSlot, PbClass, PbPort, PbType, PbTypeChild};
use serde::{Deserialize, Serialize};
use silica_common::{Arena, ContentHash, Interner};
use std::collections::HashMap;

/// A port declaration shared by models and pb-types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name.
    pub name: String,
    /// Port kind.
    pub kind: PortKind,
    /// Number of pins.
    pub width: u32,
    /// Optional port class tag.
    #[serde(default)]
    pub class: Option<String>,
}

/// A primitive model declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model name.
    pub name: String,
    /// Ordered ports.
    pub ports: Vec<PortSpec>,
}

/// A child entry of a mode declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildSpec {
    /// Child pb-type name.
    pub pb_type: String,
    /// Replication count.
    pub num_pb: u32,
}

/// A mode declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModeSpec {
    /// Mode name.
    pub name: String,
    /// Children with replication.
    pub children: Vec<ChildSpec>,
}

/// A pb-type declaration.
///
/// Primitives give `model` and no `modes`; containers give `modes` and no
/// `model`. Primitive ports default to the model's ports when omitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PbTypeSpec {
    /// Pb-type name.
    pub name: String,
    /// Hosted model name, for primitives.
    #[serde(default)]
    pub model: Option<String>,
    /// Marks a memory-class container.
    #[serde(default)]
    pub memory_class: bool,
    /// Boundary ports; defaulted from the model for primitives.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Modes, for containers.
    #[serde(default)]
    pub modes: Vec<ModeSpec>,
}

/// A pack-pattern declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Pattern name.
    pub name: String,
    /// Whether the pattern is a carry chain.
    #[serde(default)]
    pub is_chain: bool,
    /// Index of the root slot.
    #[serde(default)]
    pub root: usize,
    /// Container pb-type the slots share (ignored for chains).
    pub scope: String,
    /// Primitive pb-type name per slot.
    pub slots: Vec<String>,
    /// For chains: the primitive port carrying the inter-cluster carry.
    #[serde(default)]
    pub chain_root_port: Option<String>,
    /// For chains: the primitive output port driving the next link.
    #[serde(default)]
    pub chain_out_port: Option<String>,
}

/// A complete architecture description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchSpec {
    /// Architecture name.
    pub name: String,
    /// Primitive models.
    pub models: Vec<ModelSpec>,
    /// Pb-type templates.
    pub pb_types: Vec<PbTypeSpec>,
    /// Names of pb-types that are top-level block types, in packing
    /// preference order.
    pub block_types: Vec<String>,
    /// Pack patterns.
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

impl ArchSpec {
    /// Computes the architecture fingerprint used in provenance headers.
    pub fn fingerprint(&self) -> ContentHash {
        let bytes = serde_json::to_vec(self).expect("ArchSpec is always serializable");
        ContentHash::from_bytes(&bytes)
    }

    /// Expands the description into a fully derived [`Architecture`].
    pub fn expand(&self, interner: &Interner) -> Result<Architecture, ArchError> {
        let mut models: Arena<ModelId, Model> = Arena::new();
        let mut model_by_name: HashMap<&str, ModelId> = HashMap::new();
        for spec in &self.models {
            let id = models.alloc(Model {
                id: ModelId::from_raw(0),
                name: interner.get_or_intern(&spec.name),
                ports: spec
                    .ports
                    .iter()
                    .map(|p| ModelPort {
                        name: interner.get_or_intern(&p.name),
                        kind: p.kind,
                        width: p.width,
                        class: p.class.clone(),
                    })
                    .collect(),
            });
            models[id].id = id;
            model_by_name.insert(&spec.name, id);
        }

        // First pass: allocate ids so children can reference forward.
        let mut pb_types: Arena<PbTypeId, PbType> = Arena::new();
        let mut type_by_name: HashMap<&str, PbTypeId> = HashMap::new();
        for spec in &self.pb_types {
            let id = pb_types.alloc(PbType {
                id: PbTypeId::from_raw(0),
                name: interner.get_or_intern(&spec.name),
                ports: Vec::new(),
                modes: Vec::new(),
                model: None,
                class: PbClass::Default,
            });
            pb_types[id].id = id;
            type_by_name.insert(&spec.name, id);
        }

        // Second pass: resolve contents.
        for spec in &self.pb_types {
            let id = type_by_name[spec.name.as_str()];

            if spec.model.is_some() == !spec.modes.is_empty() {
                return Err(ArchError::MalformedPbType(spec.name.clone()));
            }

            let model = match &spec.model {
                Some(name) => Some(*model_by_name.get(name.as_str()).ok_or_else(|| {
                    ArchError::UnknownModel {
                        pb_type: spec.name.clone(),
                        model: name.clone(),
                    }
                })?),
                None => None,
            };

            let ports = if spec.ports.is_empty() && model.is_some() {
                // Primitive ports default to the model's ports.
                models[model.unwrap()]
                    .ports
                    .iter()
                    .map(|p| PbPort {
                        name: p.name,
                        kind: p.kind,
                        width: p.width,
                        class: p.class.clone(),
                    })
                    .collect()
            } else {
                spec.ports
                    .iter()
                    .map(|p| PbPort {
                        name: interner.get_or_intern(&p.name),
                        kind: p.kind,
                        width: p.width,
                        class: p.class.clone(),
                    })
                    .collect()
            };

            let mut modes = Vec::new();
            for mode in &spec.modes {
                let mut children = Vec::new();
                for child in &mode.children {
                    let child_id = *type_by_name
                        .get(child.pb_type.as_str())
                        .ok_or_else(|| ArchError::UnknownEntity(child.pb_type.clone()))?;
                    children.push(PbTypeChild {
                        pb_type: child_id,
                        num_pb: child.num_pb,
                    });
                }
                modes.push(Mode {
                    name: interner.get_or_intern(&mode.name),
                    children,
                });
            }

            let t = &mut pb_types[id];
            t.ports = ports;
            t.modes = modes;
            t.model = model;
            t.class = if spec.memory_class {
                PbClass::Memory
            } else {
                PbClass::Default
            };
        }

        let mut patterns = Vec::new();
        for (i, spec) in self.patterns.iter().enumerate() {
            let scope = *type_by_name
                .get(spec.scope.as_str())
                .ok_or_else(|| ArchError::UnknownEntity(spec.scope.clone()))?;
            let mut slots = Vec::new();
            for slot in &spec.slots {
                let slot_type = *type_by_name
                    .get(slot.as_str())
                    .ok_or_else(|| ArchError::UnknownEntity(slot.clone()))?;
                slots.push(PatternSlot { pb_type: slot_type });
            }
            patterns.push(PackPattern {
                id: PatternId::from_raw(i as u32),
                name: interner.get_or_intern(&spec.name),
                is_chain: spec.is_chain,
                root: spec.root,
                scope,
                slots,
                chain_root_port: spec
                    .chain_root_port
                    .as_deref()
                    .map(|p| interner.get_or_intern(p)),
                chain_out_port: spec
                    .chain_out_port
                    .as_deref()
                    .map(|p| interner.get_or_intern(p)),
                chain_root_pin: None,
            });
        }

        let mut block_type_decls = Vec::new();
        for name in &self.block_types {
            let id = *type_by_name
                .get(name.as_str())
                .ok_or_else(|| ArchError::UnknownEntity(name.clone()))?;
            block_type_decls.push((interner.get_or_intern(name), id));
        }

        expand(models, pb_types, patterns, block_type_decls, interner)
    }
}
