//! Write-then-read round-trips for every writable format, plus the exact
//! small-trajectory scenario: 3 atoms, 2 frames, position-level assertions.

mod common;

use common::{assert_close, sample_frame, TempFile};
use trajan::formats::dcd::DcdWriter;
use trajan::formats::trr::TrrWriter;
use trajan::formats::xtc::XtcWriter;
use trajan::formats::xyz::XyzWriter;
use trajan::{Frame, ReadConfig, TrajError, TrajectoryStream};

/// Quantization bound for compressed XTC at the default precision.
const XTC_TOLERANCE: f32 = 0.5 / 1000.0 + 1e-6;
/// DCD stores Angstrom f32; converting back and forth costs a few ulps.
const DCD_TOLERANCE: f32 = 1e-4;

fn read_all(path: &std::path::Path) -> Vec<Frame> {
    let mut stream = TrajectoryStream::new(vec![path.to_path_buf()], ReadConfig::default());
    let mut frames = Vec::new();
    let mut frame = Frame::default();
    while stream.advance(&mut frame).unwrap() {
        frames.push(frame.clone());
    }
    frames
}

#[test]
fn xtc_compressed_roundtrip_within_precision() {
    let file = TempFile::new("rt.xtc");
    let mut writer = XtcWriter::create(file.path(), &ReadConfig::default()).unwrap();
    for i in 0..3 {
        writer.write_frame(&sample_frame(100, i)).unwrap();
    }
    writer.flush().unwrap();

    let frames = read_all(file.path());
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        let expected = sample_frame(100, i);
        assert_eq!(frame.step, expected.step);
        assert_eq!(frame.time, expected.time);
        assert_eq!(frame.boxvec, expected.boxvec);
        assert_close(
            &frame.positions,
            &expected.positions,
            XTC_TOLERANCE,
            &format!("xtc frame {i}"),
        );
    }
}

#[test]
fn trr_roundtrip_is_exact_including_velocities_and_forces() {
    let file = TempFile::new("rt.trr");
    let mut writer = TrrWriter::create(file.path()).unwrap();
    for i in 0..3 {
        let mut frame = sample_frame(20, i);
        frame.velocities = Some((0..60).map(|j| j as f32 * -0.01).collect());
        frame.forces = Some((0..60).map(|j| j as f32 * 5.0).collect());
        writer.write_frame(&frame).unwrap();
    }
    writer.flush().unwrap();

    let frames = read_all(file.path());
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        let expected = sample_frame(20, i);
        // Single-precision XDR floats round-trip bit-for-bit.
        assert_eq!(frame.positions, expected.positions, "trr frame {i}");
        assert_eq!(frame.boxvec, expected.boxvec);
        assert_eq!(
            frame.velocities.as_deref().unwrap(),
            &(0..60).map(|j| j as f32 * -0.01).collect::<Vec<_>>()[..],
        );
        assert_eq!(
            frame.forces.as_deref().unwrap(),
            &(0..60).map(|j| j as f32 * 5.0).collect::<Vec<_>>()[..],
        );
    }
}

#[test]
fn dcd_roundtrip_within_unit_conversion() {
    let file = TempFile::new("rt.dcd");
    let mut writer = DcdWriter::create(file.path()).unwrap();
    for i in 0..4 {
        writer.write_frame(&sample_frame(50, i)).unwrap();
    }
    writer.finish().unwrap();

    let frames = read_all(file.path());
    assert_eq!(frames.len(), 4);
    for (i, frame) in frames.iter().enumerate() {
        let expected = sample_frame(50, i);
        assert_close(
            &frame.positions,
            &expected.positions,
            DCD_TOLERANCE,
            &format!("dcd frame {i}"),
        );
        // The cubic box survives the lengths-and-angles encoding.
        assert_close(
            &frame.boxvec.to_cols_array(),
            &expected.boxvec.to_cols_array(),
            1e-3,
            &format!("dcd box {i}"),
        );
    }
}

#[test]
fn xyz_roundtrip_is_exact() {
    let file = TempFile::new("rt.xyz");
    let mut writer = XyzWriter::create(file.path()).unwrap();
    for i in 0..3 {
        writer.write_frame(&sample_frame(7, i)).unwrap();
    }
    writer.flush().unwrap();

    let frames = read_all(file.path());
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        let expected = sample_frame(7, i);
        assert_eq!(frame.positions, expected.positions, "xyz frame {i}");
        assert_eq!(frame.time, expected.time);
        assert_eq!(frame.step, expected.step);
    }
}

/// The canonical small-trajectory scenario: 3 atoms, 2 frames, exact
/// positions, `goto(1)` returns the frame-1 array, `goto(2)` is out of
/// range. Three atoms take the uncompressed XTC path, so equality is exact.
#[test]
fn three_atom_two_frame_scenario() {
    let frame0: Vec<f32> = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let frame1: Vec<f32> = vec![0.1, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    let file = TempFile::new("scenario.xtc");
    let mut writer = XtcWriter::create(file.path(), &ReadConfig::default()).unwrap();
    for (i, positions) in [&frame0, &frame1].into_iter().enumerate() {
        let frame = Frame {
            index: i,
            step: i as u64,
            positions: positions.clone(),
            ..Frame::default()
        };
        writer.write_frame(&frame).unwrap();
    }
    writer.flush().unwrap();

    let mut stream = TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
    let mut frame = Frame::default();

    stream.seek(1).unwrap();
    assert!(stream.advance(&mut frame).unwrap());
    assert_eq!(frame.index, 1);
    assert_eq!(frame.positions, frame1, "goto(1) must return exactly frame 1");

    stream.seek(0).unwrap();
    assert!(stream.advance(&mut frame).unwrap());
    assert_eq!(frame.positions, frame0);

    assert!(matches!(
        stream.seek(2),
        Err(TrajError::IndexOutOfRange { index: 2, len: 2 })
    ));
}
