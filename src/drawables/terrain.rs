//! Heightmap terrain built as a regular mesh.
//!
//! The terrain is one grid mesh displaced by a grayscale heightmap. Index
//! data is emitted tile by tile in quadtree order, so every quadtree node
//! (leaf tiles and their ancestors) addresses one contiguous index range and
//! can draw through the shared sub-unit machinery.

use cgmath::{InnerSpace, Vector3};

use crate::{
    data_structures::{
        buffer::{AttributeKind, IndexData, VertexData},
        texture::TextureData,
    },
    drawables::mesh::{Mesh, MeshPayload, SubMesh},
    error::SceneError,
};

/// Quads per side of one leaf tile.
const TILE_QUADS: usize = 4;

/// One node of the terrain quadtree addressing a contiguous index range.
pub struct TerrainNode {
    pub index_offset: usize,
    pub index_count: usize,
    pub center: Vector3<f32>,
    pub half_extent: f32,
    pub children: Vec<TerrainNode>,
}

impl TerrainNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

pub struct TerrainData {
    pub root: TerrainNode,
    pub tiles_per_side: usize,
    pub height_scale: f32,
}

impl TerrainData {
    /// Pick the index ranges to draw for a camera position: descend while a
    /// node is closer than `lod_factor` times its extent, otherwise draw the
    /// node whole.
    pub fn select_lod(&self, camera: Vector3<f32>, lod_factor: f32) -> Vec<&TerrainNode> {
        let mut out = Vec::new();
        Self::select_into(&self.root, camera, lod_factor, &mut out);
        out
    }

    fn select_into<'a>(
        node: &'a TerrainNode,
        camera: Vector3<f32>,
        lod_factor: f32,
        out: &mut Vec<&'a TerrainNode>,
    ) {
        let distance = (camera - node.center).magnitude();
        if node.is_leaf() || distance > lod_factor * node.half_extent {
            out.push(node);
        } else {
            for child in &node.children {
                Self::select_into(child, camera, lod_factor, out);
            }
        }
    }
}

impl Mesh {
    /// Build a terrain mesh from a heightmap. `tiles_per_side` must be a
    /// power of two; the grid spans `world_size` units centered at the
    /// origin and heights scale the red channel of the heightmap.
    pub fn terrain_from_heightmap(
        heightmap: &TextureData,
        world_size: f32,
        height_scale: f32,
        tiles_per_side: usize,
    ) -> Result<Mesh, SceneError> {
        if tiles_per_side == 0 || !tiles_per_side.is_power_of_two() {
            return Err(SceneError::parse(
                &heightmap.name,
                "terrain tile count must be a power of two",
            ));
        }

        let segments = tiles_per_side * TILE_QUADS;
        let verts_per_side = segments + 1;

        let mut vertices = VertexData::new();
        vertices.add_attribute(AttributeKind::Position, 3);
        vertices.add_attribute(AttributeKind::TexCoord, 2);
        vertices.add_attribute(AttributeKind::Normal, 3);

        for z in 0..verts_per_side {
            for x in 0..verts_per_side {
                let u = x as f32 / segments as f32;
                let v = z as f32 / segments as f32;
                let height = sample_height(heightmap, u, v) * height_scale;
                vertices.push_vertex(&[
                    (u - 0.5) * world_size,
                    height,
                    (v - 0.5) * world_size,
                    u,
                    v,
                    0.0,
                    1.0,
                    0.0,
                ]);
            }
        }

        let mut indices = IndexData::new();
        let mut builder = TileBuilder {
            indices: &mut indices,
            verts_per_side,
            world_size,
            tiles_per_side,
        };
        let root = builder.build(0, 0, tiles_per_side);
        let total = indices.count();

        let mut mesh = Mesh::with_geometry(vertices, indices, vec![SubMesh::new(None, 0, total)]);
        mesh.set_payload(MeshPayload::Terrain(TerrainData {
            root,
            tiles_per_side,
            height_scale,
        }));
        Ok(mesh)
    }
}

struct TileBuilder<'a> {
    indices: &'a mut IndexData,
    verts_per_side: usize,
    world_size: f32,
    tiles_per_side: usize,
}

impl TileBuilder<'_> {
    /// Emit indices for the square of `size` tiles at tile coordinates
    /// `(tx, tz)`. Children are emitted depth-first, which keeps every
    /// node's range contiguous.
    fn build(&mut self, tx: usize, tz: usize, size: usize) -> TerrainNode {
        let offset = self.indices.count();
        let children = if size == 1 {
            self.emit_tile(tx, tz);
            Vec::new()
        } else {
            let half = size / 2;
            vec![
                self.build(tx, tz, half),
                self.build(tx + half, tz, half),
                self.build(tx, tz + half, half),
                self.build(tx + half, tz + half, half),
            ]
        };
        let count = self.indices.count() - offset;

        let tile_world = self.world_size / self.tiles_per_side as f32;
        let extent = size as f32 * tile_world;
        let center = Vector3::new(
            (tx as f32 + size as f32 / 2.0) * tile_world - self.world_size / 2.0,
            0.0,
            (tz as f32 + size as f32 / 2.0) * tile_world - self.world_size / 2.0,
        );

        TerrainNode {
            index_offset: offset,
            index_count: count,
            center,
            half_extent: extent / 2.0,
            children,
        }
    }

    fn emit_tile(&mut self, tx: usize, tz: usize) {
        let x0 = tx * TILE_QUADS;
        let z0 = tz * TILE_QUADS;
        for z in z0..z0 + TILE_QUADS {
            for x in x0..x0 + TILE_QUADS {
                let a = (z * self.verts_per_side + x) as u32;
                let b = a + 1;
                let c = a + self.verts_per_side as u32;
                let d = c + 1;
                self.indices.extend([a, c, b, b, c, d]);
            }
        }
    }
}

fn sample_height(heightmap: &TextureData, u: f32, v: f32) -> f32 {
    if heightmap.width == 0 || heightmap.height == 0 {
        return 0.0;
    }
    let x = (u * (heightmap.width - 1) as f32).round() as usize;
    let y = (v * (heightmap.height - 1) as f32).round() as usize;
    let pixel = (y * heightmap.width as usize + x) * 4;
    heightmap
        .pixels
        .get(pixel)
        .map_or(0.0, |&r| r as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_map(side: u32) -> TextureData {
        TextureData {
            name: "flat".to_string(),
            width: side,
            height: side,
            pixels: vec![128; (side * side * 4) as usize],
        }
    }

    #[test]
    fn quadtree_ranges_are_contiguous() {
        let mesh =
            Mesh::terrain_from_heightmap(&flat_map(8), 100.0, 10.0, 4).unwrap();
        let MeshPayload::Terrain(terrain) = mesh.payload() else {
            panic!("expected terrain payload");
        };

        fn check(node: &TerrainNode) {
            if node.is_leaf() {
                assert_eq!(node.index_count, TILE_QUADS * TILE_QUADS * 6);
                return;
            }
            let mut cursor = node.index_offset;
            for child in &node.children {
                assert_eq!(child.index_offset, cursor);
                cursor += child.index_count;
                check(child);
            }
            assert_eq!(cursor, node.index_offset + node.index_count);
        }
        check(&terrain.root);

        assert_eq!(terrain.root.index_offset, 0);
        assert_eq!(terrain.root.index_count, mesh.indices().count());
    }

    #[test]
    fn displacement_follows_heightmap() {
        let mesh = Mesh::terrain_from_heightmap(&flat_map(8), 10.0, 4.0, 1).unwrap();
        let y = mesh
            .vertices()
            .vector3(0, AttributeKind::Position)
            .unwrap()
            .y;
        assert!((y - 4.0 * 128.0 / 255.0).abs() < 1e-4);
    }

    #[test]
    fn lod_selection_covers_whole_index_range() {
        let mesh = Mesh::terrain_from_heightmap(&flat_map(8), 100.0, 1.0, 4).unwrap();
        let MeshPayload::Terrain(terrain) = mesh.payload() else {
            panic!("expected terrain payload");
        };

        let picked = terrain.select_lod(Vector3::new(0.0, 5.0, 0.0), 2.0);
        let total: usize = picked.iter().map(|n| n.index_count).sum();
        assert_eq!(total, terrain.root.index_count);
    }
}
