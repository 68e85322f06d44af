use super::{BoundaryFaceData, CellData, Point, Triangulation};
use crate::error::TriaError;

#[cfg(feature = "json_export")]
use super::cell::FaceState;
#[cfg(feature = "json_export")]
use json::object;
use json::JsonValue;

use log::debug;
use smallvec::SmallVec;
use std::fs::read_to_string;
#[cfg(feature = "json_export")]
use std::{fs::File, io::BufWriter};

impl<const D: usize> Triangulation<D> {
    /// Construct a Triangulation from a JSON mesh file with the following format
    ///
    /// The two-cell mesh:
    /// ```text
    ///     3               4               5
    /// 1.0 *---------------*---------------*
    ///     |               |               |
    ///     |   subdom. 0   |   subdom. 1   |
    ///     |               |               |
    /// 0.0 *---------------*---------------*
    ///  y  0               1               2
    ///  x 0.0             1.0             2.0
    /// ```
    ///
    /// mesh.json
    /// ```JSON
    /// {
    ///     "Vertices": [
    ///         [0.0, 0.0], [1.0, 0.0], [2.0, 0.0],
    ///         [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]
    ///     ],
    ///     "Cells": [
    ///         { "vertices": [0, 1, 3, 4], "subdomain": 0 },
    ///         { "vertices": [1, 2, 4, 5], "subdomain": 1 }
    ///     ],
    ///     "BoundaryFaces": [
    ///         { "vertices": [2, 5], "boundary_id": 1 }
    ///     ]
    /// }
    /// ```
    ///
    /// Cell vertices are listed in tensor-product order (see [Cell](super::cell::Cell)).
    /// "subdomain" and "BoundaryFaces" are optional.
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, TriaError> {
        let contents = read_to_string(path.as_ref())?;
        debug!("Reading mesh file: {}", path.as_ref());
        Self::from_json_str(&contents)
    }

    /// Construct a Triangulation from the contents of a JSON mesh file (see [Triangulation::from_file])
    pub fn from_json_str(contents: &str) -> Result<Self, TriaError> {
        let mesh_json = json::parse(contents)
            .map_err(|err| TriaError::MeshFile(format!("not valid JSON ({})", err)))?;

        let vertices = parse_vertices::<D>(&mesh_json)?;
        let cells = parse_cells(&mesh_json)?;
        let boundary_faces = parse_boundary_faces(&mesh_json)?;

        let mut tria = Self::new();
        tria.create_triangulation(vertices, cells, &boundary_faces)?;
        Ok(tria)
    }

    /// Write the full cell hierarchy to a JSON file
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        self.to_json().write_pretty(&mut w, 4)?;

        Ok(())
    }

    /// JSON description of the vertices, levels and active boundary faces
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        let vertices: Vec<JsonValue> = self
            .vertices()
            .map(|(id, point)| {
                object! {
                    "id": id,
                    "coords": JsonValue::from(point.coords.iter().copied().collect::<Vec<f64>>()),
                }
            })
            .collect();

        let levels: Vec<JsonValue> = (0..self.n_levels())
            .map(|level| {
                JsonValue::from(
                    self.cells_on_level(level)
                        .map(|cell| {
                            let faces: Vec<JsonValue> = (0..cell.n_faces())
                                .map(|face| match cell.face_state(face) {
                                    FaceState::Neighbor(n) => object! { "neighbor": n.to_string() },
                                    FaceState::Boundary(id) => object! { "boundary_id": id },
                                })
                                .collect();

                            object! {
                                "index": cell.index().index,
                                "id": cell.id().to_string(),
                                "vertices": JsonValue::from(cell.vertex_indices().to_vec()),
                                "parent": cell.parent().map(|p| p.index().to_string()),
                                "children": JsonValue::from(
                                    cell.children().map(|c| c.index().index).collect::<Vec<_>>()
                                ),
                                "active_index": cell.active_cell_index(),
                                "subdomain": cell.subdomain_id(),
                                "faces": JsonValue::from(faces),
                            }
                        })
                        .collect::<Vec<_>>(),
                )
            })
            .collect();

        let boundary_faces: Vec<JsonValue> = self
            .active_boundary_faces()
            .map(|face| {
                object! {
                    "vertices": JsonValue::from(face.vertex_indices().to_vec()),
                    "boundary_id": face.boundary_id(),
                }
            })
            .collect();

        object! {
            "Dimension": D,
            "Vertices": JsonValue::from(vertices),
            "Levels": JsonValue::from(levels),
            "BoundaryFaces": JsonValue::from(boundary_faces),
        }
    }
}

// ----------------------------------------------------------------------------------------------------
// Mesh file parsing
// ----------------------------------------------------------------------------------------------------

fn as_index(value: &JsonValue, what: &str) -> Result<usize, TriaError> {
    value
        .as_usize()
        .ok_or_else(|| TriaError::MeshFile(format!("{} must be non-negative integers", what)))
}

fn as_index_list(value: &JsonValue, what: &str) -> Result<SmallVec<[usize; 8]>, TriaError> {
    if !value.is_array() {
        return Err(TriaError::MeshFile(format!("{} must be an Array", what)));
    }
    value.members().map(|v| as_index(v, what)).collect()
}

fn parse_vertices<const D: usize>(mesh_json: &JsonValue) -> Result<Vec<Point<D>>, TriaError> {
    if !mesh_json["Vertices"].is_array() {
        return Err(TriaError::MeshFile(String::from("Vertices must be an Array")));
    }

    mesh_json["Vertices"]
        .members()
        .enumerate()
        .map(|(vertex_id, json_vertex)| {
            if !json_vertex.is_array() || json_vertex.len() != D {
                return Err(TriaError::MeshFile(format!(
                    "vertex {} must be an Array of {} coordinates",
                    vertex_id, D
                )));
            }

            let mut coords = [0.0; D];
            for (coord, value) in coords.iter_mut().zip(json_vertex.members()) {
                *coord = value.as_f64().ok_or_else(|| {
                    TriaError::MeshFile(format!(
                        "vertex {} must be composed of numerical values",
                        vertex_id
                    ))
                })?;
            }
            Ok(Point::from(coords))
        })
        .collect()
}

fn parse_cells(mesh_json: &JsonValue) -> Result<Vec<CellData>, TriaError> {
    if !mesh_json["Cells"].is_array() {
        return Err(TriaError::MeshFile(String::from("Cells must be an Array")));
    }

    mesh_json["Cells"]
        .members()
        .map(|json_cell| {
            let vertices = as_index_list(&json_cell["vertices"], "cell vertices")?;
            let subdomain_id = if json_cell["subdomain"].is_null() {
                0
            } else {
                json_cell["subdomain"].as_u32().ok_or_else(|| {
                    TriaError::MeshFile(String::from("cell subdomains must be non-negative integers"))
                })?
            };

            Ok(CellData {
                vertices,
                subdomain_id,
            })
        })
        .collect()
}

fn parse_boundary_faces(mesh_json: &JsonValue) -> Result<Vec<BoundaryFaceData>, TriaError> {
    if mesh_json["BoundaryFaces"].is_null() {
        return Ok(Vec::new());
    }
    if !mesh_json["BoundaryFaces"].is_array() {
        return Err(TriaError::MeshFile(String::from(
            "BoundaryFaces must be an Array",
        )));
    }

    mesh_json["BoundaryFaces"]
        .members()
        .map(|json_face| {
            let vertices = as_index_list(&json_face["vertices"], "boundary face vertices")?;
            let boundary_id = json_face["boundary_id"].as_u32().ok_or_else(|| {
                TriaError::MeshFile(String::from(
                    "boundary faces need a non-negative integer boundary_id",
                ))
            })?;

            Ok(BoundaryFaceData {
                vertices: vertices.into_iter().collect(),
                boundary_id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triangulation::CellIndex;

    #[test]
    fn read_mesh_file() {
        let tria = Triangulation::<2>::from_file("./test_input/two_cells.json").unwrap();

        assert_eq!(tria.n_active_cells(), 2);
        assert_eq!(tria.n_vertices(), 6);

        let right = tria.cell(CellIndex::new(0, 1)).unwrap();
        assert_eq!(right.subdomain_id(), 1);
        assert_eq!(right.boundary_id(1), Some(1));
        assert_eq!(right.neighbor(0), Some(CellIndex::new(0, 0)));
    }

    #[test]
    fn malformed_mesh_files() {
        assert!(matches!(
            Triangulation::<2>::from_json_str("{ \"Vertices\": [[0.0, 0.0]"),
            Err(TriaError::MeshFile(_))
        ));
        assert!(matches!(
            Triangulation::<2>::from_json_str(
                r#"{ "Vertices": [[0.0, 0.0, 1.0]], "Cells": [] }"#
            ),
            Err(TriaError::MeshFile(_))
        ));
        assert!(matches!(
            Triangulation::<1>::from_json_str(
                r#"{ "Vertices": [[0.0], [1.0]], "Cells": [{ "vertices": [0, -1] }] }"#
            ),
            Err(TriaError::MeshFile(_))
        ));
        assert!(matches!(
            Triangulation::<2>::from_file("./test_input/does_not_exist.json"),
            Err(TriaError::Io(_))
        ));
    }

    #[test]
    fn cell_data_errors_are_forwarded() {
        assert!(matches!(
            Triangulation::<1>::from_json_str(
                r#"{ "Vertices": [[0.0], [1.0]], "Cells": [{ "vertices": [0, 2] }] }"#
            ),
            Err(TriaError::InvalidCellData(_))
        ));
    }

    #[test]
    #[cfg(feature = "json_export")]
    fn export_hierarchy() {
        let mut tria = Triangulation::<2>::from_file("./test_input/two_cells.json").unwrap();
        tria.set_refine_flag(CellIndex::new(0, 0)).unwrap();
        tria.execute_refinement().unwrap();

        let exported = tria.to_json();
        assert_eq!(exported["Dimension"], 2);
        assert_eq!(exported["Levels"].len(), 2);
        assert_eq!(exported["Levels"][1].len(), 4);
        assert_eq!(exported["Vertices"].len(), 11);
        assert_eq!(exported["Levels"][0][1]["subdomain"], 1);
        assert_eq!(exported["Levels"][1][2]["id"], "0_1:2");
        assert!(exported["Levels"][0][0]["active_index"].is_null());

        std::fs::create_dir_all("./test_output").unwrap();
        tria.export_to_json("./test_output/two_cells_refined.json")
            .unwrap();
    }
}
