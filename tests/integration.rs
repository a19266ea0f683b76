//! End-to-end behavior of streams and readers over real files: sequential
//! iteration, random access, concatenation, format resolution, and the
//! forward-only compressed path.

mod common;

use std::io::Write;

use common::{sample_frame, TempFile};
use trajan::formats::xtc::XtcWriter;
use trajan::formats::xyz::XyzWriter;
use trajan::{
    Format, FormatReader, Frame, ReadConfig, Registry, StreamState, TrajError, TrajectoryStream,
};

fn write_xtc(path: &std::path::Path, n_atoms: usize, n_frames: usize) {
    let mut writer = XtcWriter::create(path, &ReadConfig::default()).unwrap();
    for i in 0..n_frames {
        writer.write_frame(&sample_frame(n_atoms, i)).unwrap();
    }
    writer.flush().unwrap();
}

mod sequential {
    use super::*;

    /// Advancing from frame 0 yields exactly `frame_count` monotonically
    /// indexed frames, then end-of-stream.
    fn advances_to_exhaustion(path: &std::path::Path, expected: usize) {
        let mut stream = TrajectoryStream::new(vec![path.to_path_buf()], ReadConfig::default());
        assert_eq!(stream.frame_count().unwrap(), expected);

        let mut frame = Frame::default();
        let mut seen = 0;
        while stream.advance(&mut frame).unwrap() {
            assert_eq!(frame.index, seen, "indices must be monotonic");
            seen += 1;
        }
        assert_eq!(seen, expected);
        assert!(stream.exhausted());
        assert!(!stream.advance(&mut frame).unwrap(), "stays exhausted");
    }

    #[test]
    fn xtc() {
        let file = TempFile::new("seq.xtc");
        write_xtc(file.path(), 32, 5);
        advances_to_exhaustion(file.path(), 5);
    }

    #[test]
    fn xyz() {
        let file = TempFile::new("seq.xyz");
        let mut writer = XyzWriter::create(file.path()).unwrap();
        for i in 0..4 {
            writer.write_frame(&sample_frame(6, i)).unwrap();
        }
        writer.flush().unwrap();
        advances_to_exhaustion(file.path(), 4);
    }

    #[test]
    fn rewind_after_exhaustion_restarts() {
        let file = TempFile::new("rewind.xtc");
        write_xtc(file.path(), 16, 3);

        let mut stream =
            TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
        let mut frame = Frame::default();
        while stream.advance(&mut frame).unwrap() {}
        assert!(stream.exhausted());

        stream.rewind().unwrap();
        let mut seen = 0;
        while stream.advance(&mut frame).unwrap() {
            seen += 1;
        }
        assert_eq!(seen, 3, "second pass reads the same number of frames");
    }
}

mod random_access {
    use super::*;

    /// `seek(i)` then read gives frame `i`, for every `i`, regardless of
    /// prior cursor position.
    #[test]
    fn seek_is_order_independent() {
        let file = TempFile::new("seek.xtc");
        write_xtc(file.path(), 24, 6);

        let mut stream =
            TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
        let mut frame = Frame::default();
        for &target in &[3usize, 0, 5, 2, 2, 4, 1] {
            stream.seek(target).unwrap();
            assert!(stream.advance(&mut frame).unwrap());
            assert_eq!(frame.index, target);
            assert_eq!(frame.step, target as u64 * 50);
        }
    }

    #[test]
    fn seek_past_end_is_out_of_range() {
        let file = TempFile::new("seek-end.xtc");
        write_xtc(file.path(), 24, 4);

        let mut stream =
            TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
        assert!(matches!(
            stream.seek(4),
            Err(TrajError::IndexOutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn mmap_reading_matches_buffered() {
        let file = TempFile::new("mmap.xtc");
        write_xtc(file.path(), 32, 3);

        let mut buffered =
            TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
        let mut mapped = TrajectoryStream::new(
            vec![file.path().to_path_buf()],
            ReadConfig::default().with_mmap(true),
        );

        let mut a = Frame::default();
        let mut b = Frame::default();
        while buffered.advance(&mut a).unwrap() {
            assert!(mapped.advance(&mut b).unwrap());
            assert_eq!(a.positions, b.positions);
            assert_eq!(a.step, b.step);
        }
        assert!(!mapped.advance(&mut b).unwrap());
    }
}

mod concatenation {
    use super::*;

    /// Two files of N1 and N2 frames behave as one trajectory of N1+N2;
    /// `seek(N1)` lands on local index 0 of the second file.
    #[test]
    fn counts_sum_and_boundaries_map() {
        let a = TempFile::new("cat-a.xtc");
        let b = TempFile::new("cat-b.xtc");
        write_xtc(a.path(), 24, 3);
        write_xtc(b.path(), 24, 4);

        let mut stream = TrajectoryStream::new(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            ReadConfig::default(),
        );
        assert_eq!(stream.frame_count().unwrap(), 7);

        let mut frame = Frame::default();
        stream.seek(3).unwrap();
        assert!(stream.advance(&mut frame).unwrap());
        assert_eq!(frame.index, 3);
        // Local frame 0 of the second file carries that file's first step.
        assert_eq!(frame.step, 0);

        // Crossing the boundary sequentially works too.
        stream.seek(2).unwrap();
        assert!(stream.advance(&mut frame).unwrap());
        assert_eq!(frame.step, 2 * 50);
        assert!(stream.advance(&mut frame).unwrap());
        assert_eq!(frame.index, 3);
        assert_eq!(frame.step, 0);
    }

    #[test]
    fn mixed_formats_concatenate() {
        let a = TempFile::new("mixed-a.xtc");
        let b = TempFile::new("mixed-b.xyz");
        write_xtc(a.path(), 12, 2);
        let mut writer = XyzWriter::create(b.path()).unwrap();
        for i in 0..3 {
            writer.write_frame(&sample_frame(12, i)).unwrap();
        }
        writer.flush().unwrap();

        let mut stream = TrajectoryStream::new(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            ReadConfig::default(),
        );
        assert_eq!(stream.frame_count().unwrap(), 5);
        let mut frame = Frame::default();
        let mut seen = 0;
        while stream.advance(&mut frame).unwrap() {
            assert_eq!(frame.index, seen);
            seen += 1;
        }
        assert_eq!(seen, 5);
    }
}

mod resolution {
    use super::*;

    #[test]
    fn magic_bytes_beat_a_missing_extension() {
        // An XTC payload under an unrelated name still resolves.
        let file = TempFile::new("mystery.dat");
        write_xtc(file.path(), 16, 2);

        let reader = Registry::with_defaults()
            .open(file.path(), &ReadConfig::default())
            .unwrap();
        assert_eq!(reader.n_atoms(), 16);
    }

    #[test]
    fn unknown_content_is_unsupported() {
        let file = TempFile::new("noise.bin");
        let mut out = std::fs::File::create(file.path()).unwrap();
        out.write_all(&[0xfe, 0xed, 0xfa, 0xce, 1, 2, 3, 4]).unwrap();
        drop(out);

        let err = Registry::with_defaults()
            .open(file.path(), &ReadConfig::default())
            .unwrap_err();
        assert!(matches!(err, TrajError::UnsupportedFormat { .. }));
    }

    #[test]
    fn explicit_override_bypasses_sniffing() {
        // Force the XYZ reader onto an XTC payload: the override is obeyed
        // and the reader reports its own header error.
        let file = TempFile::new("override.xtc");
        write_xtc(file.path(), 16, 1);

        let config = ReadConfig::default().with_format(Format::Xyz);
        let err = Registry::with_defaults()
            .open(file.path(), &config)
            .unwrap_err();
        assert!(matches!(err, TrajError::CorruptHeader { .. }));
    }

    #[test]
    fn user_registered_formats_take_part_in_dispatch() {
        let file = TempFile::new("custom.mine");
        write_xtc(file.path(), 8, 1);

        let mut registry = Registry::empty();
        registry.register(
            "mine",
            |probe| probe.extension_is("mine"),
            |path, config| trajan::formats::open_as(path, Format::Xtc, config),
        );
        let reader = registry.open(file.path(), &ReadConfig::default()).unwrap();
        assert_eq!(reader.n_atoms(), 8);
    }
}

mod compressed {
    use super::*;

    fn write_gzipped_xyz(path: &std::path::Path, n_atoms: usize, n_frames: usize) {
        let mut text = Vec::new();
        let mut writer = XyzWriter::new(&mut text);
        for i in 0..n_frames {
            writer.write_frame(&sample_frame(n_atoms, i)).unwrap();
        }
        drop(writer);

        let out = std::fs::File::create(path).unwrap();
        let mut encoder =
            niffler::get_writer(Box::new(out), niffler::Format::Gzip, niffler::Level::One)
                .unwrap();
        encoder.write_all(&text).unwrap();
    }

    #[test]
    fn sequential_reads_stream_through_niffler() {
        let file = TempFile::new("run.xyz.gz");
        write_gzipped_xyz(file.path(), 5, 3);

        let mut reader = Registry::with_defaults()
            .open(file.path(), &ReadConfig::default())
            .unwrap();
        assert_eq!(reader.n_atoms(), 5);
        assert!(!reader.supports_random_access());

        let mut frame = Frame::default();
        let mut seen = 0;
        while reader.read_frame(&mut frame).unwrap() {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[test]
    fn seeks_on_compressed_input_are_unsupported() {
        let file = TempFile::new("noseek.xyz.gz");
        write_gzipped_xyz(file.path(), 5, 3);

        let mut reader = Registry::with_defaults()
            .open(file.path(), &ReadConfig::default())
            .unwrap();
        assert!(matches!(
            reader.seek_frame(1),
            Err(TrajError::SeekUnsupported { .. })
        ));
        assert!(matches!(
            reader.n_frames(),
            Err(TrajError::SeekUnsupported { .. })
        ));
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn stream_opens_lazily_and_closes_terminally() {
        let file = TempFile::new("life.xtc");
        write_xtc(file.path(), 8, 2);

        let mut stream =
            TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
        assert_eq!(stream.state(), StreamState::Unopened);

        let mut frame = Frame::default();
        assert!(stream.advance(&mut frame).unwrap());
        assert_eq!(stream.state(), StreamState::Open);

        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
        assert!(stream.advance(&mut frame).is_err());
        assert!(stream.seek(0).is_err());
        stream.close(); // idempotent
    }

    #[test]
    fn decode_error_leaves_the_stream_open_for_seeks() {
        let file = TempFile::new("truncated.xtc");
        write_xtc(file.path(), 32, 2);
        // Chop into the second frame's payload.
        let bytes = std::fs::read(file.path()).unwrap();
        std::fs::write(file.path(), &bytes[..bytes.len() - 8]).unwrap();

        let mut stream =
            TrajectoryStream::new(vec![file.path().to_path_buf()], ReadConfig::default());
        let mut frame = Frame::default();
        assert!(stream.advance(&mut frame).unwrap());
        let err = stream.advance(&mut frame).unwrap_err();
        assert!(matches!(err, TrajError::Decode { .. }), "got {err:?}");

        // The stream is still usable: seek back and re-read frame 0.
        stream.seek(0).unwrap();
        assert!(stream.advance(&mut frame).unwrap());
        assert_eq!(frame.index, 0);
    }
}
