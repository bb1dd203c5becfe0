//! Loading and storing pipeline inputs.
//!
//! Feature correspondences travel in a compact binary format: a big-endian
//! `i32` feature count followed by `count` records of `i64` feature id and
//! two `f64` pixel coordinates. A whitespace-separated text format (one
//! `id x y` triple per line) is accepted as a fallback for hand-edited
//! files. Calibration matrices are plain text, one matrix row per line.

use nalgebra::{DMatrix, Matrix3, Point2};
use sfm_core::{Feature, SceneView};
use sfm_pinhole::{Camera, CameraError, Distortion};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A text token could not be parsed as a number.
    #[error("line {line}: cannot parse {value:?} as a number")]
    Parse { line: usize, value: String },
    /// A text matrix had rows of differing lengths.
    #[error("matrix row {row} has {got} entries, expected {expected}")]
    RowLengthMismatch {
        row: usize,
        got: usize,
        expected: usize,
    },
    /// A loaded matrix did not have the dimensions its use requires.
    #[error("matrix is {rows}x{cols}, expected {expected}")]
    BadShape {
        rows: usize,
        cols: usize,
        expected: &'static str,
    },
    #[error(transparent)]
    Camera(#[from] CameraError),
}

fn read_exact_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N], IoError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a view from the binary correspondence format.
pub fn read_view<R: Read>(reader: &mut R) -> Result<SceneView, IoError> {
    let count = i32::from_be_bytes(read_exact_array(reader)?);
    let mut view = SceneView::new();
    for _ in 0..count {
        let id = i64::from_be_bytes(read_exact_array(reader)?);
        let x = f64::from_be_bytes(read_exact_array(reader)?);
        let y = f64::from_be_bytes(read_exact_array(reader)?);
        view.set_location(Feature::new(id as u64), Point2::new(x, y));
    }
    Ok(view)
}

/// Writes a view in the binary correspondence format.
pub fn write_view<W: Write>(writer: &mut W, view: &SceneView) -> Result<(), IoError> {
    writer.write_all(&(view.len() as i32).to_be_bytes())?;
    for feature in view.features() {
        let location = view
            .location(feature)
            .expect("iterated features are present in the view");
        writer.write_all(&(feature.id() as i64).to_be_bytes())?;
        writer.write_all(&location.x.to_be_bytes())?;
        writer.write_all(&location.y.to_be_bytes())?;
    }
    Ok(())
}

/// Reads a view from the text fallback format, one `id x y` triple per
/// line. Blank lines are skipped.
pub fn read_view_text<R: BufRead>(reader: R) -> Result<SceneView, IoError> {
    let mut view = SceneView::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let id = match tokens.next() {
            Some(token) => parse_token::<i64>(index + 1, token)?,
            None => continue,
        };
        let x = parse_required::<f64>(index + 1, tokens.next())?;
        let y = parse_required::<f64>(index + 1, tokens.next())?;
        view.set_location(Feature::new(id as u64), Point2::new(x, y));
    }
    Ok(view)
}

fn parse_token<T: std::str::FromStr>(line: usize, token: &str) -> Result<T, IoError> {
    token.parse().map_err(|_| IoError::Parse {
        line,
        value: token.to_owned(),
    })
}

fn parse_required<T: std::str::FromStr>(line: usize, token: Option<&str>) -> Result<T, IoError> {
    match token {
        Some(token) => parse_token(line, token),
        None => Err(IoError::Parse {
            line,
            value: String::new(),
        }),
    }
}

/// Loads a view from a binary correspondence file.
pub fn load_view<P: AsRef<Path>>(path: P) -> Result<SceneView, IoError> {
    read_view(&mut BufReader::new(File::open(path)?))
}

/// Stores a view to a binary correspondence file.
pub fn save_view<P: AsRef<Path>>(path: P, view: &SceneView) -> Result<(), IoError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_view(&mut writer, view)?;
    writer.flush()?;
    Ok(())
}

/// Loads a view from a text correspondence file.
pub fn load_view_text<P: AsRef<Path>>(path: P) -> Result<SceneView, IoError> {
    read_view_text(BufReader::new(File::open(path)?))
}

/// Reads a whitespace-separated text matrix, one row per line. Blank lines
/// are skipped; all rows must have the same length.
pub fn read_matrix<R: BufRead>(reader: R) -> Result<DMatrix<f64>, IoError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let row = line
            .split_whitespace()
            .map(|token| parse_token::<f64>(index + 1, token))
            .collect::<Result<Vec<f64>, IoError>>()?;
        if row.is_empty() {
            continue;
        }
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(IoError::RowLengthMismatch {
                    row: rows.len(),
                    got: row.len(),
                    expected: first.len(),
                });
            }
        }
        rows.push(row);
    }
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    Ok(DMatrix::from_fn(rows.len(), ncols, |r, c| rows[r][c]))
}

/// Loads a camera from a 3x3 intrinsics matrix file and an optional
/// distortion file holding the four coefficients `k1 k2 p1 p2`.
pub fn load_camera<P: AsRef<Path>>(
    intrinsics_path: P,
    distortion_path: Option<P>,
) -> Result<Camera, IoError> {
    let intrinsics = read_matrix(BufReader::new(File::open(intrinsics_path)?))?;
    if intrinsics.shape() != (3, 3) {
        return Err(IoError::BadShape {
            rows: intrinsics.nrows(),
            cols: intrinsics.ncols(),
            expected: "3x3",
        });
    }
    let intrinsics = Matrix3::from_fn(|r, c| intrinsics[(r, c)]);

    let distortion = match distortion_path {
        Some(path) => {
            let coefficients = read_matrix(BufReader::new(File::open(path)?))?;
            if coefficients.len() != 4 {
                return Err(IoError::BadShape {
                    rows: coefficients.nrows(),
                    cols: coefficients.ncols(),
                    expected: "4 entries",
                });
            }
            Distortion::new(
                coefficients[0],
                coefficients[1],
                coefficients[2],
                coefficients[3],
            )
        }
        None => Distortion::default(),
    };

    Ok(Camera::new(intrinsics, distortion)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_view() -> SceneView {
        let mut view = SceneView::new();
        view.set_location(Feature::new(3), Point2::new(120.5, -7.25));
        view.set_location(Feature::new(1), Point2::new(0.0, 64.0));
        view.set_location(Feature::new(9), Point2::new(-33.0, 1e-3));
        view
    }

    #[test]
    fn binary_round_trip() {
        let view = sample_view();
        let mut buf = Vec::new();
        write_view(&mut buf, &view).unwrap();
        // 4-byte count plus 24 bytes per record.
        assert_eq!(buf.len(), 4 + 24 * view.len());

        let loaded = read_view(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loaded.len(), view.len());
        for feature in view.features() {
            assert_eq!(loaded.location(feature), view.location(feature));
        }
    }

    #[test]
    fn binary_rejects_truncated_input() {
        let mut buf = Vec::new();
        write_view(&mut buf, &sample_view()).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            read_view(&mut Cursor::new(buf)),
            Err(IoError::Io(_))
        ));
    }

    #[test]
    fn text_view_parses_triples_and_skips_blank_lines() {
        let text = "1 0.0 64.0\n\n3 120.5 -7.25\n";
        let view = read_view_text(Cursor::new(text)).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(
            view.location(Feature::new(3)),
            Some(Point2::new(120.5, -7.25))
        );
    }

    #[test]
    fn text_view_reports_the_offending_token() {
        let err = read_view_text(Cursor::new("1 0.0 64.0\n2 oops 1.0\n")).unwrap_err();
        match err {
            IoError::Parse { line, value } => {
                assert_eq!(line, 2);
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn matrix_reads_rows_and_checks_lengths() {
        let m = read_matrix(Cursor::new("1 2 3\n4 5 6\n")).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 2)], 6.0);

        assert!(matches!(
            read_matrix(Cursor::new("1 2 3\n4 5\n")),
            Err(IoError::RowLengthMismatch {
                row: 1,
                got: 2,
                expected: 3
            })
        ));
    }
}
