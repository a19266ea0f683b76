//! Data tables behind the convenience keywords.

/// Standard amino acid residue names, including common terminal variants
/// and caps.
pub const PROTEIN_RESIDUES: &[&str] = &[
    "ALA", "ARG", "ASN", "ASP", "CYS", "CYX", "GLN", "GLU", "GLY", "HIS", "HSD", "HSE", "HSP",
    "HID", "HIE", "HIP", "ILE", "LEU", "LYS", "MET", "PHE", "PRO", "SER", "THR", "TRP", "TYR",
    "VAL", "ACE", "NME", "NHE",
];

/// Water residue names across the common models.
pub const WATER_RESIDUES: &[&str] = &[
    "WAT", "HOH", "TIP3", "T3P", "SPC", "TIP4", "TP4", "TIP5", "T5P", "SOL",
];

/// Backbone atom names.
pub const BACKBONE_ATOMS: &[&str] = &["N", "CA", "C", "O", "H", "HA"];

pub fn is_protein_residue(name: &str) -> bool {
    let trimmed = name.trim();
    PROTEIN_RESIDUES
        .iter()
        .any(|&r| r.eq_ignore_ascii_case(trimmed))
}

pub fn is_water_residue(name: &str) -> bool {
    let trimmed = name.trim();
    WATER_RESIDUES
        .iter()
        .any(|&r| r.eq_ignore_ascii_case(trimmed))
}

pub fn is_backbone_atom(name: &str) -> bool {
    let trimmed = name.trim();
    BACKBONE_ATOMS
        .iter()
        .any(|&a| a.eq_ignore_ascii_case(trimmed))
}
