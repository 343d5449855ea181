//! Wavefront OBJ format support.
//!
//! Reads `v` and `f` statements; texture coordinates, normals, groups and
//! materials are skipped. Face corners may be written as `v`, `v/vt`,
//! `v/vt/vn` or `v//vn`, with positive (1-based) or negative (relative)
//! indices. Faces keep their vertex count.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_polygons, to_face_vertex, HalfEdgeMesh, MeshIndex};

/// Load a mesh from an OBJ file.
///
/// # Example
///
/// ```no_run
/// use unsubd::io::obj;
/// use unsubd::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = obj::load("model.obj").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<HalfEdgeMesh<I>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    read(BufReader::new(file), path)
}

/// Parse OBJ data from a reader. `path` is only used in error messages.
pub fn read<R: BufRead, I: MeshIndex>(reader: R, path: &Path) -> Result<HalfEdgeMesh<I>> {
    let load_error = |line: usize, message: String| MeshError::LoadError {
        path: path.to_path_buf(),
        message: format!("line {}: {}", line, message),
    };

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut faces: Vec<Vec<usize>> = Vec::new();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_idx + 1;
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                let mut coords = [0.0f64; 3];
                for c in &mut coords {
                    let token = tokens.next().ok_or_else(|| {
                        load_error(line_no, "vertex needs 3 coordinates".to_string())
                    })?;
                    *c = token.parse().map_err(|_| {
                        load_error(line_no, format!("invalid coordinate '{}'", token))
                    })?;
                }
                vertices.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                let face = tokens
                    .map(|token| resolve_index(token, vertices.len()))
                    .collect::<std::result::Result<Vec<usize>, String>>()
                    .map_err(|message| load_error(line_no, message))?;
                faces.push(face);
            }
            _ => {}
        }
    }

    if faces.is_empty() {
        return Err(MeshError::LoadError {
            path: path.to_path_buf(),
            message: "OBJ file contains no faces".to_string(),
        });
    }

    build_from_polygons(&vertices, &faces)
}

/// Turn one face corner token into a 0-based vertex index.
fn resolve_index(token: &str, num_vertices: usize) -> std::result::Result<usize, String> {
    let vertex_part = token.split('/').next().unwrap_or(token);
    let raw: i64 = vertex_part
        .parse()
        .map_err(|_| format!("invalid face index '{}'", token))?;

    let index = match raw {
        0 => return Err("face index 0 is not valid in OBJ".to_string()),
        r if r > 0 => r - 1,
        r => num_vertices as i64 + r,
    };

    if index < 0 {
        return Err(format!("relative face index {} points before the first vertex", raw));
    }
    Ok(index as usize)
}

/// Save a mesh to an OBJ file.
///
/// # Example
///
/// ```no_run
/// use unsubd::io::obj;
/// use unsubd::mesh::HalfEdgeMesh;
///
/// let mesh: HalfEdgeMesh = HalfEdgeMesh::new();
/// obj::save(&mesh, "output.obj").unwrap();
/// ```
pub fn save<P: AsRef<Path>, I: MeshIndex>(mesh: &HalfEdgeMesh<I>, path: P) -> Result<()> {
    save_named(mesh, None, path)
}

/// Save a mesh to an OBJ file, optionally under an `o <name>` statement.
pub fn save_named<P: AsRef<Path>, I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    name: Option<&str>,
    path: P,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write(mesh, name, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write OBJ data to any writer.
pub fn write<W: Write, I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    name: Option<&str>,
    writer: &mut W,
) -> Result<()> {
    let (vertices, faces) = to_face_vertex(mesh);

    writeln!(writer, "# Generated by unsubd")?;
    if let Some(name) = name {
        writeln!(writer, "o {}", name)?;
    }

    for v in &vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }

    for face in &faces {
        write!(writer, "f")?;
        for &vi in face {
            write!(writer, " {}", vi + 1)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<HalfEdgeMesh> {
        read(Cursor::new(text), Path::new("test.obj"))
    }

    #[test]
    fn test_read_quads_and_triangles() {
        let mesh = parse(
            "# comment\n\
             o Thing\n\
             v 0 0 0\n\
             v 1 0 0\n\
             v 1 1 0\n\
             v 0 1 0\n\
             v 2 0.5 0\n\
             vt 0 0\n\
             vn 0 0 1\n\
             s off\n\
             f 1/1/1 2/1/1 3/1/1 4/1/1\n\
             f 2//1 5//1 3//1\n",
        )
        .unwrap();

        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.num_faces(), 2);
        let (_, faces) = to_face_vertex(&mesh);
        assert_eq!(faces, vec![vec![0, 1, 2, 3], vec![1, 4, 2]]);
    }

    #[test]
    fn test_read_negative_indices() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf -4 -3 -2 -1\n").unwrap();
        let (_, faces) = to_face_vertex(&mesh);
        assert_eq!(faces, vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_read_errors() {
        assert!(matches!(parse("v 0 0 0\n"), Err(MeshError::LoadError { .. })));
        assert!(matches!(parse("v 0 zero 0\nf 1 1 1\n"), Err(MeshError::LoadError { .. })));
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n"),
            Err(MeshError::LoadError { .. })
        ));
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n"),
            Err(MeshError::InvalidVertexIndex { vertex: 8, .. })
        ));
    }

    #[test]
    fn test_write_named_polygons() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();

        let mut out = Vec::new();
        write(&mesh, Some("Cage"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("o Cage\n"));
        assert!(text.contains("f 1 2 3 4\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 4);

        let reread = parse(&text).unwrap();
        assert_eq!(reread.positions(), mesh.positions());
    }
}
