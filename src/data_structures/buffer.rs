//! Typed vertex-attribute storage.
//!
//! Geometry lives in one interleaved float buffer per mesh plus one shared
//! index buffer. Attributes (position, texcoords, normals, bone ids, morph
//! deltas, ...) are declared up front, which fixes the per-vertex stride;
//! vertices are then appended one interleaved record at a time.

use cgmath::{Matrix4, Vector2, Vector3};

/// Which vertex attribute a slice of the interleaved record belongs to.
///
/// Morph targets share an attribute-slot budget: up to 8 position deltas, or
/// 4 position + 4 normal deltas when normal morphing is present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Position,
    TexCoord,
    Normal,
    BoneIds,
    BoneWeights,
    MorphTarget(u8),
    MorphNormal(u8),
}

/// Placement of one attribute inside the interleaved record, in f32 units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attribute {
    pub elements: usize,
    pub offset: usize,
}

/// Interleaved vertex storage with a declared attribute layout.
#[derive(Debug, Default)]
pub struct VertexData {
    attributes: Vec<(AttributeKind, Attribute)>,
    item_size: usize,
    data: Vec<f32>,
}

impl VertexData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an attribute occupying the next `elements` floats of every
    /// vertex record. Must happen before any vertex is pushed.
    pub fn add_attribute(&mut self, kind: AttributeKind, elements: usize) {
        debug_assert!(self.data.is_empty(), "layout is fixed once vertices exist");
        self.attributes.push((
            kind,
            Attribute {
                elements,
                offset: self.item_size,
            },
        ));
        self.item_size += elements;
    }

    pub fn attribute(&self, kind: AttributeKind) -> Option<Attribute> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, a)| *a)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (AttributeKind, Attribute)> + '_ {
        self.attributes.iter().copied()
    }

    pub fn has_attribute(&self, kind: AttributeKind) -> bool {
        self.attribute(kind).is_some()
    }

    /// Append one vertex record. `values` must match the declared stride.
    pub fn push_vertex(&mut self, values: &[f32]) {
        debug_assert_eq!(values.len(), self.item_size);
        self.data.extend_from_slice(values);
    }

    pub fn set_vector3(&mut self, index: usize, kind: AttributeKind, v: Vector3<f32>) {
        if let Some(att) = self.attribute(kind) {
            let base = index * self.item_size + att.offset;
            self.data[base] = v.x;
            self.data[base + 1] = v.y;
            self.data[base + 2] = v.z;
        }
    }

    pub fn vector3(&self, index: usize, kind: AttributeKind) -> Option<Vector3<f32>> {
        let att = self.attribute(kind)?;
        let base = index.checked_mul(self.item_size)?.checked_add(att.offset)?;
        if att.elements < 3 || base + 2 >= self.data.len() {
            return None;
        }
        Some(Vector3::new(
            self.data[base],
            self.data[base + 1],
            self.data[base + 2],
        ))
    }

    pub fn vector2(&self, index: usize, kind: AttributeKind) -> Option<Vector2<f32>> {
        let att = self.attribute(kind)?;
        let base = index * self.item_size + att.offset;
        if att.elements < 2 || base + 1 >= self.data.len() {
            return None;
        }
        Some(Vector2::new(self.data[base], self.data[base + 1]))
    }

    /// Position of the vertex at `index` transformed into world space.
    pub fn world_position(&self, index: usize, model: &Matrix4<f32>) -> Option<Vector3<f32>> {
        let local = self.vector3(index, AttributeKind::Position)?;
        Some((model * local.extend(1.0)).truncate())
    }

    /// Number of complete vertex records stored.
    pub fn count(&self) -> usize {
        if self.item_size == 0 {
            0
        } else {
            self.data.len() / self.item_size
        }
    }

    /// Per-vertex stride in f32 units.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn stride_bytes(&self) -> usize {
        self.item_size * std::mem::size_of::<f32>()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop vertex records but keep the declared layout.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Index storage shared by all sub-units of one mesh.
#[derive(Debug, Default)]
pub struct IndexData {
    data: Vec<u32>,
}

impl IndexData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: u32) {
        self.data.push(index);
    }

    pub fn extend(&mut self, indices: impl IntoIterator<Item = u32>) {
        self.data.extend(indices);
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        self.data.get(i).copied()
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_layout_offsets() {
        let mut data = VertexData::new();
        data.add_attribute(AttributeKind::Position, 3);
        data.add_attribute(AttributeKind::TexCoord, 2);
        data.add_attribute(AttributeKind::Normal, 3);

        assert_eq!(data.item_size(), 8);
        assert_eq!(data.attribute(AttributeKind::TexCoord).unwrap().offset, 3);

        data.push_vertex(&[1.0, 2.0, 3.0, 0.5, 0.5, 0.0, 1.0, 0.0]);
        assert_eq!(data.count(), 1);
        assert_eq!(
            data.vector3(0, AttributeKind::Position),
            Some(Vector3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(
            data.vector2(0, AttributeKind::TexCoord),
            Some(Vector2::new(0.5, 0.5))
        );
    }

    #[test]
    fn clear_keeps_layout() {
        let mut data = VertexData::new();
        data.add_attribute(AttributeKind::Position, 3);
        data.push_vertex(&[0.0, 0.0, 0.0]);
        data.clear();
        assert_eq!(data.count(), 0);
        assert_eq!(data.item_size(), 3);
    }
}
