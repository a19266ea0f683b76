//! Evaluator for selection expressions against a [`Topology`].

use crate::select::ast::*;
use crate::select::error::SelectionError;
use crate::select::keywords;
use crate::select::parser::parse_selection;
use crate::topology::Topology;

/// Context for evaluating selection expressions.
///
/// Plain attribute selections need only the topology; `within` additionally
/// needs the current frame's positions and must be re-evaluated whenever the
/// frame changes.
pub struct SelectionContext<'a> {
    topology: &'a Topology,
    /// Flat `x y z` triplets of the current frame, if available.
    positions: Option<&'a [f32]>,
}

impl<'a> SelectionContext<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self {
            topology,
            positions: None,
        }
    }

    pub fn with_positions(topology: &'a Topology, positions: &'a [f32]) -> Self {
        Self {
            topology,
            positions: Some(positions),
        }
    }

    /// Parse and evaluate, returning sorted atom indices.
    pub fn eval_str(&self, expression: &str) -> Result<Vec<usize>, SelectionError> {
        self.eval(&parse_selection(expression)?)
    }

    /// Evaluate an already-parsed expression, returning sorted atom indices.
    pub fn eval(&self, expr: &Expr) -> Result<Vec<usize>, SelectionError> {
        let mask = self.eval_mask(expr)?;
        Ok(mask_to_indices(&mask))
    }

    fn eval_mask(&self, expr: &Expr) -> Result<Vec<bool>, SelectionError> {
        let n = self.topology.n_atoms();
        match expr {
            Expr::And(lhs, rhs) => {
                let a = self.eval_mask(lhs)?;
                let b = self.eval_mask(rhs)?;
                Ok(a.iter().zip(&b).map(|(&x, &y)| x && y).collect())
            }
            Expr::Or(lhs, rhs) => {
                let a = self.eval_mask(lhs)?;
                let b = self.eval_mask(rhs)?;
                Ok(a.iter().zip(&b).map(|(&x, &y)| x || y).collect())
            }
            Expr::Not(inner) => {
                let a = self.eval_mask(inner)?;
                Ok(a.iter().map(|&x| !x).collect())
            }
            Expr::NameMatch { field, pattern } => {
                let mut mask = vec![false; n];
                for (atom, slot) in mask.iter_mut().enumerate() {
                    let value = match field {
                        StringField::Name => self.topology.atom_names()[atom].trim(),
                        StringField::Resname => self.topology.residue_name_of(atom).trim(),
                        StringField::Segid => self.topology.segment_of(atom).trim(),
                        StringField::Type => self.topology.atom_types()[atom].trim(),
                    };
                    *slot = pattern.matches(value);
                }
                Ok(mask)
            }
            Expr::NumericCmp { field, op, value } => {
                let mut mask = vec![false; n];
                for (atom, slot) in mask.iter_mut().enumerate() {
                    let lhs = match field {
                        NumericField::Mass => self.topology.masses()[atom] as f64,
                        NumericField::Charge => self.topology.charges()[atom] as f64,
                    };
                    *slot = op.compare(lhs, *value);
                }
                Ok(mask)
            }
            Expr::RangeSelect { field, ranges } => {
                let mut mask = vec![false; n];
                for (atom, slot) in mask.iter_mut().enumerate() {
                    let value = match field {
                        RangeField::Resid => self.topology.residue_id_of(atom) as i64,
                        RangeField::Index => atom as i64,
                    };
                    *slot = ranges.iter().any(|range| range.contains(value));
                }
                Ok(mask)
            }
            Expr::Within { distance, inner } => {
                let positions = self.positions.ok_or_else(|| {
                    SelectionError::new("'within' requires the current frame's positions")
                })?;
                if positions.len() != n * 3 {
                    return Err(SelectionError::new(format!(
                        "frame holds {} atoms but the topology binds {n}",
                        positions.len() / 3
                    )));
                }
                let inner_mask = self.eval_mask(inner)?;
                let sources = mask_to_indices(&inner_mask);
                Ok(within_cell_list(positions, &sources, *distance as f32, n))
            }
            Expr::Convenience(kw) => self.eval_convenience(*kw),
        }
    }

    fn eval_convenience(&self, kw: ConvenienceKeyword) -> Result<Vec<bool>, SelectionError> {
        let n = self.topology.n_atoms();
        match kw {
            ConvenienceKeyword::All => Ok(vec![true; n]),
            ConvenienceKeyword::None => Ok(vec![false; n]),
            ConvenienceKeyword::Protein => Ok((0..n)
                .map(|atom| keywords::is_protein_residue(self.topology.residue_name_of(atom)))
                .collect()),
            ConvenienceKeyword::Water => Ok((0..n)
                .map(|atom| keywords::is_water_residue(self.topology.residue_name_of(atom)))
                .collect()),
            ConvenienceKeyword::Backbone => Ok((0..n)
                .map(|atom| {
                    keywords::is_protein_residue(self.topology.residue_name_of(atom))
                        && keywords::is_backbone_atom(&self.topology.atom_names()[atom])
                })
                .collect()),
            ConvenienceKeyword::Sidechain => {
                let protein = self.eval_convenience(ConvenienceKeyword::Protein)?;
                let backbone = self.eval_convenience(ConvenienceKeyword::Backbone)?;
                Ok(protein
                    .iter()
                    .zip(&backbone)
                    .map(|(&p, &b)| p && !b)
                    .collect())
            }
            ConvenienceKeyword::Hydrogen => {
                // Mass is the most reliable marker across force fields.
                Ok(self.topology.masses().iter().map(|&m| m < 1.1).collect())
            }
        }
    }
}

fn mask_to_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(atom, &included)| included.then_some(atom))
        .collect()
}

fn coord(positions: &[f32], atom: usize) -> [f32; 3] {
    [
        positions[atom * 3],
        positions[atom * 3 + 1],
        positions[atom * 3 + 2],
    ]
}

/// Cell-list spatial query: atoms within `cutoff` of any source atom.
fn within_cell_list(positions: &[f32], sources: &[usize], cutoff: f32, n_atoms: usize) -> Vec<bool> {
    if sources.is_empty() || n_atoms == 0 {
        return vec![false; n_atoms];
    }
    let cutoff = cutoff.max(0.0);
    let cutoff_sq = cutoff * cutoff;

    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for atom in 0..n_atoms {
        let c = coord(positions, atom);
        for d in 0..3 {
            min[d] = min[d].min(c[d]);
            max[d] = max[d].max(c[d]);
        }
    }

    let cell_size = cutoff.max(0.01);
    let dims = [
        ((max[0] - min[0]) / cell_size) as usize + 1,
        ((max[1] - min[1]) / cell_size) as usize + 1,
        ((max[2] - min[2]) / cell_size) as usize + 1,
    ];
    let cell_of = |c: [f32; 3]| {
        let cx = ((c[0] - min[0]) / cell_size) as usize;
        let cy = ((c[1] - min[1]) / cell_size) as usize;
        let cz = ((c[2] - min[2]) / cell_size) as usize;
        (cx, cy, cz)
    };

    let mut cells: Vec<Vec<usize>> = vec![Vec::new(); dims[0] * dims[1] * dims[2]];
    for atom in 0..n_atoms {
        let (cx, cy, cz) = cell_of(coord(positions, atom));
        cells[cx * dims[1] * dims[2] + cy * dims[2] + cz].push(atom);
    }

    let mut mask = vec![false; n_atoms];
    for &source in sources {
        let sc = coord(positions, source);
        let (cx, cy, cz) = cell_of(sc);
        for ix in cx.saturating_sub(1)..=(cx + 1).min(dims[0] - 1) {
            for iy in cy.saturating_sub(1)..=(cy + 1).min(dims[1] - 1) {
                for iz in cz.saturating_sub(1)..=(cz + 1).min(dims[2] - 1) {
                    for &other in &cells[ix * dims[1] * dims[2] + iy * dims[2] + iz] {
                        if mask[other] {
                            continue;
                        }
                        let oc = coord(positions, other);
                        let dx = sc[0] - oc[0];
                        let dy = sc[1] - oc[1];
                        let dz = sc[2] - oc[2];
                        if dx * dx + dy * dy + dz * dz <= cutoff_sq {
                            mask[other] = true;
                        }
                    }
                }
            }
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyBuilder;

    /// Six atoms, two residues: ALA (N, CA, C) and WAT (OH2, H1, H2).
    fn mini_topology() -> Topology {
        let mut builder = TopologyBuilder::new();
        builder.add_atom("N", "NH1", 1, "ALA", "PROT", 14.007, 0.1);
        builder.add_atom("CA", "CT1", 1, "ALA", "PROT", 12.011, -0.2);
        builder.add_atom("C", "C", 1, "ALA", "PROT", 12.011, 0.3);
        builder.add_atom("OH2", "OT", 2, "WAT", "SOLV", 15.999, -0.4);
        builder.add_atom("H1", "HT", 2, "WAT", "SOLV", 1.008, 0.5);
        builder.add_atom("H2", "HT", 2, "WAT", "SOLV", 1.008, 0.5);
        builder.build().unwrap()
    }

    fn eval(expr: &str) -> Vec<usize> {
        SelectionContext::new(&mini_topology())
            .eval_str(expr)
            .unwrap()
    }

    #[test]
    fn select_name_and_glob() {
        assert_eq!(eval("name CA"), vec![1]);
        assert_eq!(eval("name H*"), vec![4, 5]);
    }

    #[test]
    fn select_resname_resid_index() {
        assert_eq!(eval("resname ALA"), vec![0, 1, 2]);
        assert_eq!(eval("resid 2"), vec![3, 4, 5]);
        assert_eq!(eval("resid 1-2"), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(eval("index 0"), vec![0]);
        assert_eq!(eval("index 1,3,5"), vec![1, 3, 5]);
    }

    #[test]
    fn select_segid_and_type() {
        assert_eq!(eval("segid PROT"), vec![0, 1, 2]);
        assert_eq!(eval("type HT"), vec![4, 5]);
    }

    #[test]
    fn select_numeric() {
        assert_eq!(eval("mass > 13.0"), vec![0, 3]);
        assert_eq!(eval("charge < -0.1"), vec![1, 3]);
    }

    #[test]
    fn select_boolean_combinations() {
        assert_eq!(eval("resname ALA and name CA"), vec![1]);
        assert_eq!(eval("name N or name C"), vec![0, 2]);
        assert_eq!(eval("not resname WAT"), vec![0, 1, 2]);
        assert_eq!(eval("(protein or water) and not hydrogen"), vec![0, 1, 2, 3]);
    }

    #[test]
    fn select_convenience() {
        assert_eq!(eval("protein"), vec![0, 1, 2]);
        assert_eq!(eval("water"), vec![3, 4, 5]);
        assert_eq!(eval("hydrogen"), vec![4, 5]);
        assert_eq!(eval("backbone"), vec![0, 1, 2]);
        assert_eq!(eval("sidechain"), vec![]);
        assert_eq!(eval("all"), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(eval("none"), vec![]);
    }

    #[test]
    fn within_measures_current_positions() {
        let topology = mini_topology();
        let positions: Vec<f32> = vec![
            0.0, 0.0, 0.0, //
            0.1, 0.0, 0.0, //
            0.2, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.05, 0.0, 0.0, //
            1.1, 0.0, 0.0, //
        ];
        let ctx = SelectionContext::with_positions(&topology, &positions);
        assert_eq!(
            ctx.eval_str("within 0.15 of resname ALA").unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(
            ctx.eval_str("within 0.15 of resname WAT").unwrap(),
            vec![3, 4, 5]
        );
        // A wider cutoff pulls the two nearest water atoms into range of C.
        assert_eq!(
            ctx.eval_str("within 0.87 of resname ALA").unwrap(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn within_without_positions_is_an_error() {
        let topology = mini_topology();
        let ctx = SelectionContext::new(&topology);
        assert!(ctx.eval_str("within 0.5 of water").is_err());
    }

    #[test]
    fn within_rejects_mismatched_frame() {
        let topology = mini_topology();
        let positions = vec![0.0f32; 9];
        let ctx = SelectionContext::with_positions(&topology, &positions);
        assert!(ctx.eval_str("within 0.5 of water").is_err());
    }
}
