//! The static topology: atoms, their grouping into residues and segments,
//! and bonded connectivity.
//!
//! Atoms are integer indices into flat attribute arrays; residues and
//! segments are ranges over them. Bonds are parsed, angles and dihedrals are
//! derived from bonds on first use and cached — they are never stored in the
//! files this crate reads. A topology is immutable once built.

use std::sync::OnceLock;

pub mod psf;

#[derive(Debug)]
pub struct Topology {
    atom_names: Vec<String>,
    atom_types: Vec<String>,
    masses: Vec<f32>,
    charges: Vec<f32>,
    /// Residue index per atom.
    atom_residues: Vec<u32>,

    residue_names: Vec<String>,
    /// Residue ids as labeled in the file (not necessarily contiguous).
    residue_ids: Vec<i32>,
    residue_segments: Vec<u32>,
    /// Atom range `[start, end)` per residue; atoms of one residue are
    /// contiguous.
    residue_atoms: Vec<(u32, u32)>,

    segment_ids: Vec<String>,

    bonds: Vec<[u32; 2]>,
    angles: OnceLock<Box<[[u32; 3]]>>,
    dihedrals: OnceLock<Box<[[u32; 4]]>>,
}

impl Topology {
    pub fn n_atoms(&self) -> usize {
        self.atom_names.len()
    }

    pub fn n_residues(&self) -> usize {
        self.residue_names.len()
    }

    pub fn n_segments(&self) -> usize {
        self.segment_ids.len()
    }

    pub fn atom_names(&self) -> &[String] {
        &self.atom_names
    }

    pub fn atom_types(&self) -> &[String] {
        &self.atom_types
    }

    pub fn masses(&self) -> &[f32] {
        &self.masses
    }

    pub fn charges(&self) -> &[f32] {
        &self.charges
    }

    /// Residue index of an atom.
    pub fn residue_of(&self, atom: usize) -> usize {
        self.atom_residues[atom] as usize
    }

    pub fn residue_names(&self) -> &[String] {
        &self.residue_names
    }

    pub fn residue_ids(&self) -> &[i32] {
        &self.residue_ids
    }

    /// Residue name of an atom.
    pub fn residue_name_of(&self, atom: usize) -> &str {
        &self.residue_names[self.residue_of(atom)]
    }

    /// File-labeled residue id of an atom.
    pub fn residue_id_of(&self, atom: usize) -> i32 {
        self.residue_ids[self.residue_of(atom)]
    }

    /// Atom range of a residue.
    pub fn residue_atoms(&self, residue: usize) -> std::ops::Range<usize> {
        let (start, end) = self.residue_atoms[residue];
        start as usize..end as usize
    }

    pub fn segment_ids(&self) -> &[String] {
        &self.segment_ids
    }

    /// Segment id of an atom.
    pub fn segment_of(&self, atom: usize) -> &str {
        let segment = self.residue_segments[self.atom_residues[atom] as usize];
        &self.segment_ids[segment as usize]
    }

    pub fn bonds(&self) -> &[[u32; 2]] {
        &self.bonds
    }

    /// Angles derived from the bond list: one triple per pair of bonds
    /// sharing a central atom. Computed once, cached.
    pub fn angles(&self) -> &[[u32; 3]] {
        self.angles.get_or_init(|| derive_angles(self))
    }

    /// Proper dihedrals derived from the bond list: one quadruple per
    /// central bond and pair of outer neighbors. Computed once, cached.
    pub fn dihedrals(&self) -> &[[u32; 4]] {
        self.dihedrals.get_or_init(|| derive_dihedrals(self))
    }

    fn adjacency(&self) -> Vec<Vec<u32>> {
        let mut adjacency = vec![Vec::new(); self.n_atoms()];
        for &[a, b] in &self.bonds {
            adjacency[a as usize].push(b);
            adjacency[b as usize].push(a);
        }
        for neighbors in &mut adjacency {
            neighbors.sort_unstable();
        }
        adjacency
    }
}

fn derive_angles(topology: &Topology) -> Box<[[u32; 3]]> {
    let adjacency = topology.adjacency();
    let mut angles = Vec::new();
    for (center, neighbors) in adjacency.iter().enumerate() {
        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                angles.push([a, center as u32, b]);
            }
        }
    }
    angles.into_boxed_slice()
}

fn derive_dihedrals(topology: &Topology) -> Box<[[u32; 4]]> {
    let adjacency = topology.adjacency();
    let mut dihedrals = Vec::new();
    for &[b, c] in &topology.bonds {
        for &a in &adjacency[b as usize] {
            if a == c {
                continue;
            }
            for &d in &adjacency[c as usize] {
                if d == b || d == a {
                    continue;
                }
                dihedrals.push([a, b, c, d]);
            }
        }
    }
    dihedrals.into_boxed_slice()
}

/// Incrementally assembles a [`Topology`], grouping consecutive atoms into
/// residues and segments as their labels change.
#[derive(Default)]
pub struct TopologyBuilder {
    atom_names: Vec<String>,
    atom_types: Vec<String>,
    masses: Vec<f32>,
    charges: Vec<f32>,
    atom_residues: Vec<u32>,
    residue_names: Vec<String>,
    residue_ids: Vec<i32>,
    residue_segments: Vec<u32>,
    residue_atoms: Vec<(u32, u32)>,
    segment_ids: Vec<String>,
    bonds: Vec<[u32; 2]>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_atoms(&self) -> usize {
        self.atom_names.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_atom(
        &mut self,
        name: &str,
        type_name: &str,
        resid: i32,
        resname: &str,
        segid: &str,
        mass: f32,
        charge: f32,
    ) {
        let atom = self.atom_names.len() as u32;

        let same_residue = self.residue_ids.last() == Some(&resid)
            && self.residue_names.last().map(String::as_str) == Some(resname)
            && self
                .residue_segments
                .last()
                .map(|&segment| self.segment_ids[segment as usize].as_str())
                == Some(segid);
        if !same_residue {
            let same_segment = self.segment_ids.last().map(String::as_str) == Some(segid);
            if !same_segment {
                self.segment_ids.push(segid.to_string());
            }
            self.residue_names.push(resname.to_string());
            self.residue_ids.push(resid);
            self.residue_segments
                .push(self.segment_ids.len() as u32 - 1);
            self.residue_atoms.push((atom, atom));
        }

        let residue = self.residue_names.len() as u32 - 1;
        self.residue_atoms.last_mut().unwrap().1 = atom + 1;
        self.atom_residues.push(residue);
        self.atom_names.push(name.to_string());
        self.atom_types.push(type_name.to_string());
        self.masses.push(mass);
        self.charges.push(charge);
    }

    pub fn add_bond(&mut self, a: u32, b: u32) {
        self.bonds.push([a, b]);
    }

    /// Finish the topology. Fails when a bond references a missing atom.
    pub fn build(self) -> std::result::Result<Topology, String> {
        let n_atoms = self.atom_names.len() as u32;
        for &[a, b] in &self.bonds {
            if a >= n_atoms || b >= n_atoms {
                return Err(format!(
                    "bond ({a}, {b}) references an atom beyond the {n_atoms}-atom table"
                ));
            }
            if a == b {
                return Err(format!("atom {a} is bonded to itself"));
            }
        }

        Ok(Topology {
            atom_names: self.atom_names,
            atom_types: self.atom_types,
            masses: self.masses,
            charges: self.charges,
            atom_residues: self.atom_residues,
            residue_names: self.residue_names,
            residue_ids: self.residue_ids,
            residue_segments: self.residue_segments,
            residue_atoms: self.residue_atoms,
            segment_ids: self.segment_ids,
            bonds: self.bonds,
            angles: OnceLock::new(),
            dihedrals: OnceLock::new(),
        })
    }
}
