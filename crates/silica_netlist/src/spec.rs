//! Serde-loadable atom netlist descriptions.
//!
//! The flow ingests technology-mapped netlists as a [`NetlistSpec`]
//! (deserialized from JSON) and builds the in-memory [`AtomNetlist`] with
//! [`NetlistSpec::build`].

use crate::atom::AtomNetlist;
use crate::error::NetlistError;
use serde::{Deserialize, Serialize};
use silica_arch::Architecture;
use silica_common::Interner;
use std::collections::HashMap;

/// One pin connection of an atom.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// The port name.
    pub port: String,
    /// The bit within the port.
    #[serde(default)]
    pub bit: u32,
    /// The net name.
    pub net: String,
}

/// One atom declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtomSpec {
    /// The atom name.
    pub name: String,
    /// The model name.
    pub model: String,
    /// Pin connections; unlisted pins stay open.
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

/// A complete netlist description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetlistSpec {
    /// The top instance name.
    pub top: String,
    /// Atom declarations.
    pub atoms: Vec<AtomSpec>,
    /// Names of clock nets.
    #[serde(default)]
    pub clocks: Vec<String>,
    /// Names of additional global nets.
    #[serde(default)]
    pub globals: Vec<String>,
}

impl NetlistSpec {
    /// Builds the in-memory netlist, resolving models against the
    /// architecture.
    pub fn build(
        &self,
        arch: &Architecture,
        interner: &Interner,
    ) -> Result<AtomNetlist, NetlistError> {
        let mut netlist = AtomNetlist::new();
        let mut nets: HashMap<&str, crate::ids::NetId> = HashMap::new();
        let mut seen = std::collections::HashSet::new();

        for atom_spec in &self.atoms {
            if !seen.insert(atom_spec.name.as_str()) {
                return Err(NetlistError::DuplicateBlock(atom_spec.name.clone()));
            }
            let model_id = interner
                .get(&atom_spec.model)
                .and_then(|n| arch.find_model(n))
                .ok_or_else(|| NetlistError::UnknownPrimitive(atom_spec.model.clone()))?;
            let model = &arch.models[model_id];
            let atom = netlist.add_atom(interner.get_or_intern(&atom_spec.name), model);

            for conn in &atom_spec.connections {
                let net = *nets
                    .entry(conn.net.as_str())
                    .or_insert_with(|| netlist.add_net(interner.get_or_intern(&conn.net)));
                netlist.connect(atom, interner.get_or_intern(&conn.port), conn.bit, net, interner)?;
            }
        }

        for clock in &self.clocks {
            if let Some(&net) = nets.get(clock.as_str()) {
                netlist.set_clock(net, true);
            }
        }
        for global in &self.globals {
            if let Some(&net) = nets.get(global.as_str()) {
                netlist.set_global(net, true);
            }
        }

        netlist.rebuild_indices();
        netlist.validate(interner)?;
        Ok(netlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silica_arch::ArchSpec;

    fn arch_json() -> &'static str {
        r##"{
            "name": "t",
            "models": [
                {"name": "lut4", "ports": [
                    {"name": "in", "kind": "Input", "width": 4},
                    {"name": "out", "kind": "Output", "width": 1}
                ]}
            ],
            "pb_types": [
                {"name": "lut4", "model": "lut4"},
                {"name": "clb", "ports": [
                    {"name": "I", "kind": "Input", "width": 10},
                    {"name": "O", "kind": "Output", "width": 4}
                ], "modes": [
                    {"name": "default", "children": [{"pb_type": "lut4", "num_pb": 4}]}
                ]}
            ],
            "block_types": ["clb"]
        }"##
    }

    #[test]
    fn build_from_spec() {
        let interner = Interner::new();
        let arch: ArchSpec = serde_json::from_str(arch_json()).unwrap();
        let arch = arch.expand(&interner).unwrap();

        let spec: NetlistSpec = serde_json::from_str(
            r##"{
                "top": "t",
                "atoms": [
                    {"name": "a", "model": "lut4",
                     "connections": [{"port": "out", "net": "n"}]},
                    {"name": "b", "model": "lut4",
                     "connections": [{"port": "in", "bit": 0, "net": "n"}]}
                ]
            }"##,
        )
        .unwrap();
        let netlist = spec.build(&arch, &interner).unwrap();
        assert_eq!(netlist.atoms.len(), 2);
        assert_eq!(netlist.nets.len(), 1);
        let a = netlist.find_atom(interner.get_or_intern("a")).unwrap();
        assert_eq!(netlist.num_ext_inputs_atom(a), 0);
    }

    #[test]
    fn unknown_model_rejected() {
        let interner = Interner::new();
        let arch: ArchSpec = serde_json::from_str(arch_json()).unwrap();
        let arch = arch.expand(&interner).unwrap();

        let spec = NetlistSpec {
            top: "t".to_string(),
            atoms: vec![AtomSpec {
                name: "a".to_string(),
                model: "mystery".to_string(),
                connections: vec![],
            }],
            clocks: vec![],
            globals: vec![],
        };
        assert!(matches!(
            spec.build(&arch, &interner),
            Err(NetlistError::UnknownPrimitive(_))
        ));
    }

    #[test]
    fn duplicate_atom_rejected() {
        let interner = Interner::new();
        let arch: ArchSpec = serde_json::from_str(arch_json()).unwrap();
        let arch = arch.expand(&interner).unwrap();

        let spec = NetlistSpec {
            top: "t".to_string(),
            atoms: vec![
                AtomSpec {
                    name: "a".to_string(),
                    model: "lut4".to_string(),
                    connections: vec![],
                },
                AtomSpec {
                    name: "a".to_string(),
                    model: "lut4".to_string(),
                    connections: vec![],
                },
            ],
            clocks: vec![],
            globals: vec![],
        };
        assert!(matches!(
            spec.build(&arch, &interner),
            Err(NetlistError::DuplicateBlock(_))
        ));
    }

    #[test]
    fn clock_marking() {
        let interner = Interner::new();
        let arch: ArchSpec = serde_json::from_str(arch_json()).unwrap();
        let arch = arch.expand(&interner).unwrap();

        let spec: NetlistSpec = serde_json::from_str(
            r##"{
                "top": "t",
                "atoms": [
                    {"name": "a", "model": "lut4",
                     "connections": [{"port": "out", "net": "clk"}]}
                ],
                "clocks": ["clk"]
            }"##,
        )
        .unwrap();
        let netlist = spec.build(&arch, &interner).unwrap();
        let net = silica_netlist_net(&netlist);
        assert!(netlist.nets[net].is_clock);
        assert!(netlist.nets[net].is_global);
    }

    fn silica_netlist_net(netlist: &AtomNetlist) -> crate::ids::NetId {
        netlist.nets.ids().next().unwrap()
    }
}
