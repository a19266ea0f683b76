//! The full pipeline: a PSF topology bound to trajectory files, selections,
//! and the bind-time validation rules.

mod common;

use std::fmt::Write as _;

use common::{sample_frame, TempFile};
use trajan::formats::xtc::XtcWriter;
use trajan::{ReadConfig, TrajError, Universe};

/// A PSF for `n` water molecules plus a two-atom carbon cap, bonds included.
fn water_psf(n_waters: usize) -> String {
    let n_atoms = n_waters * 3 + 2;
    let mut text = String::from("PSF\n\n       1 !NTITLE\n REMARKS synthetic water box\n\n");
    writeln!(text, "{:8} !NATOM", n_atoms).unwrap();
    let mut atom = 0;
    for molecule in 0..n_waters {
        let resid = molecule + 1;
        for (name, type_name, charge, mass) in [
            ("OH2", "OT", -0.834, 15.9994),
            ("H1", "HT", 0.417, 1.008),
            ("H2", "HT", 0.417, 1.008),
        ] {
            atom += 1;
            writeln!(
                text,
                "{:8} SOLV {:<4} WAT  {:<4} {:<4} {:>10.6} {:>13.4}           0",
                atom, resid, name, type_name, charge, mass
            )
            .unwrap();
        }
    }
    for name in ["C1", "C2"] {
        atom += 1;
        writeln!(
            text,
            "{:8} CAP  {:<4} LIG  {:<4} {:<4} {:>10.6} {:>13.4}           0",
            atom,
            n_waters + 1,
            name,
            "CT",
            0.0,
            12.011
        )
        .unwrap();
    }

    // O-H bonds within each water, plus the cap C1-C2 bond.
    writeln!(text, "\n{:8} !NBOND: bonds", n_waters * 2 + 1).unwrap();
    let mut bonds = Vec::new();
    for molecule in 0..n_waters {
        let oxygen = molecule * 3 + 1;
        bonds.push((oxygen, oxygen + 1));
        bonds.push((oxygen, oxygen + 2));
    }
    bonds.push((n_waters * 3 + 1, n_waters * 3 + 2));
    for pair in bonds.chunks(4) {
        for &(a, b) in pair {
            write!(text, "{:8}{:8}", a, b).unwrap();
        }
        text.push('\n');
    }
    text
}

fn write_system(n_waters: usize, n_frames: usize) -> (TempFile, TempFile) {
    let psf = TempFile::new(&format!("{n_waters}-waters.psf"));
    std::fs::write(psf.path(), water_psf(n_waters)).unwrap();

    let xtc = TempFile::new(&format!("{n_waters}-waters.xtc"));
    let mut writer = XtcWriter::create(xtc.path(), &ReadConfig::default()).unwrap();
    for i in 0..n_frames {
        writer
            .write_frame(&sample_frame(n_waters * 3 + 2, i))
            .unwrap();
    }
    writer.flush().unwrap();
    (psf, xtc)
}

#[test]
fn open_binds_topology_to_trajectory() {
    let (psf, xtc) = write_system(4, 3);
    let mut universe = Universe::open(
        psf.path(),
        &[xtc.path().to_path_buf()],
        ReadConfig::default(),
    )
    .unwrap();

    assert_eq!(universe.n_atoms(), 14);
    assert_eq!(universe.topology().n_residues(), 5);
    assert_eq!(universe.topology().n_segments(), 2);
    assert_eq!(universe.frame_count().unwrap(), 3);

    // Bonds parsed, angles derived: one H-O-H angle per water.
    assert_eq!(universe.topology().bonds().len(), 9);
    assert_eq!(universe.topology().angles().len(), 4);
}

#[test]
fn goto_updates_the_shared_cursor() {
    let (psf, xtc) = write_system(2, 4);
    let mut universe = Universe::open(
        psf.path(),
        &[xtc.path().to_path_buf()],
        ReadConfig::default(),
    )
    .unwrap();

    let frame = universe.goto(2).unwrap();
    assert_eq!(frame.index, 2);
    assert_eq!(frame.step, 100);
    assert_eq!(universe.current_frame().unwrap().index, 2);

    assert!(matches!(
        universe.goto(4),
        Err(TrajError::IndexOutOfRange { index: 4, len: 4 })
    ));
}

#[test]
fn selections_resolve_against_the_psf() {
    let (psf, xtc) = write_system(3, 1);
    let universe = Universe::open(
        psf.path(),
        &[xtc.path().to_path_buf()],
        ReadConfig::default(),
    )
    .unwrap();

    assert_eq!(universe.select("water").unwrap().len(), 9);
    assert_eq!(universe.select("segid CAP").unwrap(), vec![9, 10]);
    assert_eq!(universe.select("name OH2").unwrap(), vec![0, 3, 6]);
    assert_eq!(universe.select("resid 2").unwrap(), vec![3, 4, 5]);
    assert_eq!(universe.select("hydrogen and resid 1").unwrap(), vec![1, 2]);
    assert_eq!(universe.select("resname LIG and name C2").unwrap(), vec![10]);
}

#[test]
fn positional_selection_follows_the_cursor() {
    let (psf, xtc) = write_system(2, 3);
    let mut universe = Universe::open(
        psf.path(),
        &[xtc.path().to_path_buf()],
        ReadConfig::default(),
    )
    .unwrap();

    universe.goto(0).unwrap();
    let near0 = universe.select("within 0.6 of index 0").unwrap();
    universe.goto(2).unwrap();
    let near2 = universe.select("within 0.6 of index 0").unwrap();
    // The cloud deforms between frames, so the neighborhood changes; both
    // always contain the source atom itself.
    assert!(near0.contains(&0));
    assert!(near2.contains(&0));
}

#[test]
fn atom_count_mismatch_fails_at_bind_time() {
    let (psf, _) = write_system(4, 1);
    let xtc = TempFile::new("short.xtc");
    let mut writer = XtcWriter::create(xtc.path(), &ReadConfig::default()).unwrap();
    writer.write_frame(&sample_frame(10, 0)).unwrap();
    writer.flush().unwrap();

    let err = Universe::open(
        psf.path(),
        &[xtc.path().to_path_buf()],
        ReadConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TrajError::TopologyMismatch {
            topology: 14,
            trajectory: 10
        }
    ));
}

#[test]
fn concatenated_universe_spans_files() {
    let (psf, xtc_a) = write_system(2, 2);
    let xtc_b = TempFile::new("more-waters.xtc");
    let mut writer = XtcWriter::create(xtc_b.path(), &ReadConfig::default()).unwrap();
    for i in 0..3 {
        writer.write_frame(&sample_frame(8, i)).unwrap();
    }
    writer.flush().unwrap();

    let mut universe = Universe::open(
        psf.path(),
        &[xtc_a.path().to_path_buf(), xtc_b.path().to_path_buf()],
        ReadConfig::default(),
    )
    .unwrap();
    assert_eq!(universe.frame_count().unwrap(), 5);
    let frame = universe.goto(2).unwrap();
    assert_eq!(frame.index, 2);
    assert_eq!(frame.step, 0, "first frame of the second file");
}
