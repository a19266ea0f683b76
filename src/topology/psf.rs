//! CHARMM/NAMD/X-PLOR PSF topology files.
//!
//! A PSF file opens with a `PSF` flag line, then a sequence of sections,
//! each introduced by `<count> !<NAME>` and followed by `count` records.
//! This parser consumes `!NATOM` (the atom table: id, segment, residue id,
//! residue name, atom name, type, charge, mass) and `!NBOND` (pairs of
//! 1-based atom ids, four pairs per line). Standard and extended ("EXT")
//! column widths both split cleanly on whitespace. Remaining sections carry
//! data this crate derives from bonds instead, and are skipped.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Result, TrajError};
use crate::formats::registry::is_compressed_path;
use crate::topology::{Topology, TopologyBuilder};

/// Parse a PSF file into a [`Topology`].
pub fn parse(path: &Path) -> Result<Topology> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn std::io::Read> = if is_compressed_path(path) {
        let (reader, _format) = niffler::send::get_reader(Box::new(BufReader::new(file)))?;
        reader
    } else {
        Box::new(file)
    };
    parse_reader(BufReader::new(reader), path)
}

/// Parse PSF text from any buffered reader; `path` is used for error
/// context only.
pub fn parse_reader<R: BufRead>(reader: R, path: &Path) -> Result<Topology> {
    Parser {
        path: path.to_path_buf(),
        lines: reader.lines(),
        line_no: 0,
    }
    .run()
}

struct Parser<R: BufRead> {
    path: PathBuf,
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> Parser<R> {
    fn err(&self, detail: impl Into<String>) -> TrajError {
        TrajError::TopologyParse {
            path: self.path.clone(),
            line: self.line_no,
            detail: detail.into(),
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_no += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    /// Advance to the next `<count> !<NAME>` header, skipping blank lines
    /// and unconsumed section bodies.
    fn next_section(&mut self) -> Result<Option<(usize, String)>> {
        while let Some(line) = self.next_line()? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (Some(count), Some(tag)) = (fields.next(), fields.next()) else {
                continue;
            };
            if !tag.starts_with('!') {
                continue;
            }
            let count: usize = count
                .parse()
                .map_err(|_| self.err(format!("section count {count:?} is not a number")))?;
            let name = tag
                .trim_start_matches('!')
                .trim_end_matches(':')
                .to_string();
            return Ok(Some((count, name)));
        }
        Ok(None)
    }

    fn run(mut self) -> Result<Topology> {
        let header = self
            .next_line()?
            .ok_or_else(|| self.err("empty file"))?;
        if !header.trim_start().starts_with("PSF") {
            return Err(self.err("not a PSF file (missing PSF flag line)"));
        }

        let mut builder = TopologyBuilder::new();
        let mut seen_atoms = false;

        while let Some((count, name)) = self.next_section()? {
            match name.as_str() {
                "NTITLE" => {
                    for _ in 0..count {
                        self.next_line()?;
                    }
                }
                "NATOM" => {
                    self.parse_atoms(count, &mut builder)?;
                    seen_atoms = true;
                }
                "NBOND" => {
                    if !seen_atoms {
                        return Err(self.err("NBOND section appears before NATOM"));
                    }
                    self.parse_bonds(count, &mut builder)?;
                }
                // Angles, dihedrals, impropers, donors, acceptors: derived
                // or unused, so their bodies are skipped by next_section().
                _ => {}
            }
        }

        if !seen_atoms {
            return Err(self.err("file has no NATOM section"));
        }
        builder.build().map_err(|detail| self.err(detail))
    }

    fn parse_atoms(&mut self, count: usize, builder: &mut TopologyBuilder) -> Result<()> {
        for _ in 0..count {
            let line = self
                .next_line()?
                .ok_or_else(|| self.err("file ends inside the NATOM section"))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 8 {
                return Err(self.err(format!(
                    "atom record has {} fields, expected at least 8",
                    fields.len()
                )));
            }
            let [_id, segid, resid, resname, name, type_name, charge, mass] =
                [fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7]];

            let resid: i32 = resid
                .parse()
                .map_err(|_| self.err(format!("residue id {resid:?} is not a number")))?;
            let charge: f32 = charge
                .parse()
                .map_err(|_| self.err(format!("charge {charge:?} is not a number")))?;
            let mass: f32 = mass
                .parse()
                .map_err(|_| self.err(format!("mass {mass:?} is not a number")))?;

            builder.add_atom(name, type_name, resid, resname, segid, mass, charge);
        }
        Ok(())
    }

    fn parse_bonds(&mut self, count: usize, builder: &mut TopologyBuilder) -> Result<()> {
        let n_atoms = builder.n_atoms() as u32;
        let mut pending: Option<u32> = None;
        let mut parsed = 0usize;
        while parsed < count {
            let line = self
                .next_line()?
                .ok_or_else(|| self.err("file ends inside the NBOND section"))?;
            for field in line.split_whitespace() {
                let id: u32 = field
                    .parse()
                    .map_err(|_| self.err(format!("bond index {field:?} is not a number")))?;
                if id == 0 || id > n_atoms {
                    return Err(self.err(format!(
                        "bond index {id} is outside the 1..={n_atoms} atom table"
                    )));
                }
                match pending.take() {
                    None => pending = Some(id - 1),
                    Some(first) => {
                        builder.add_bond(first, id - 1);
                        parsed += 1;
                    }
                }
            }
        }
        if pending.is_some() {
            return Err(self.err("NBOND section holds an odd number of indices"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINI_PSF: &str = "\
PSF

       2 !NTITLE
 REMARKS original generated structure x-plor psf file
 REMARKS topology test

       6 !NATOM
       1 PROT 1    ALA  N    NH1   -0.470000       14.0070           0
       2 PROT 1    ALA  CA   CT1    0.070000       12.0110           0
       3 PROT 1    ALA  C    C      0.510000       12.0110           0
       4 SOLV 2    WAT  OH2  OT    -0.834000       15.9994           0
       5 SOLV 2    WAT  H1   HT     0.417000        1.0080           0
       6 SOLV 2    WAT  H2   HT     0.417000        1.0080           0

       4 !NBOND: bonds
       1       2       2       3       4       5       4       6

       2 !NTHETA: angles
       1       2       3       5       4       6
";

    fn parse_text(text: &str) -> Result<Topology> {
        parse_reader(BufReader::new(text.as_bytes()), Path::new("mini.psf"))
    }

    #[test]
    fn parses_atoms_and_grouping() {
        let top = parse_text(MINI_PSF).unwrap();
        assert_eq!(top.n_atoms(), 6);
        assert_eq!(top.n_residues(), 2);
        assert_eq!(top.n_segments(), 2);
        assert_eq!(top.atom_names()[1], "CA");
        assert_eq!(top.atom_types()[3], "OT");
        assert_eq!(top.residue_name_of(4), "WAT");
        assert_eq!(top.segment_of(0), "PROT");
        assert!((top.charges()[0] + 0.47).abs() < 1e-6);
        assert!((top.masses()[3] - 15.9994).abs() < 1e-4);
    }

    #[test]
    fn bonds_are_zero_based_pairs() {
        let top = parse_text(MINI_PSF).unwrap();
        assert_eq!(top.bonds(), &[[0, 1], [1, 2], [3, 4], [3, 5]]);
    }

    #[test]
    fn angles_derive_from_bonds_not_ntheta() {
        let top = parse_text(MINI_PSF).unwrap();
        // Chain N-CA-C plus the water H-O-H.
        assert_eq!(top.angles(), &[[0, 1, 2], [4, 3, 5]]);
    }

    #[test]
    fn missing_flag_line_is_an_error() {
        let err = parse_text("NOT A PSF\n").unwrap_err();
        assert!(matches!(err, TrajError::TopologyParse { line: 1, .. }));
    }

    #[test]
    fn missing_natom_is_an_error() {
        let err = parse_text("PSF\n\n       0 !NTITLE\n").unwrap_err();
        assert!(matches!(err, TrajError::TopologyParse { .. }));
    }

    #[test]
    fn truncated_atom_table_is_an_error() {
        let text = "\
PSF

       3 !NATOM
       1 PROT 1    ALA  N    NH1   -0.470000       14.0070           0
";
        let err = parse_text(text).unwrap_err();
        assert!(matches!(err, TrajError::TopologyParse { .. }));
    }

    #[test]
    fn bond_index_out_of_table_is_an_error() {
        let text = "\
PSF

       1 !NATOM
       1 PROT 1    ALA  N    NH1   -0.470000       14.0070           0

       1 !NBOND: bonds
       1       9
";
        let err = parse_text(text).unwrap_err();
        assert!(matches!(err, TrajError::TopologyParse { .. }));
    }

    #[test]
    fn ext_format_splits_the_same_way() {
        // EXT widens the columns; whitespace splitting is unaffected.
        let text = "\
PSF EXT

         2 !NATOM
         1 PROT     1        ALA      N        NH1     -0.470000       14.0070           0
         2 PROT     1        ALA      CA       CT1      0.070000       12.0110           0
";
        let top = parse_text(text).unwrap();
        assert_eq!(top.n_atoms(), 2);
        assert_eq!(top.atom_names()[0], "N");
    }
}
