//! Skeleton bones.
//!
//! Bones form a tree mirroring the source skeleton. Each bone carries its
//! authored bind pose, the inverse-bind (offset) matrix and an index into the
//! flat per-model bone-matrix array; that index follows the joint order of
//! the source skin, not the tree position.

use cgmath::{Matrix4, One, Quaternion, SquareMatrix, Vector3};

/// One joint of a skeleton.
#[derive(Clone, Debug)]
pub struct Bone {
    name: String,
    /// Slot in the flat bone-matrix array; `None` for helper nodes that are
    /// part of the hierarchy but not part of the skin.
    index: Option<usize>,

    bind_position: Vector3<f32>,
    bind_rotation: Quaternion<f32>,
    bind_scale: Vector3<f32>,
    offset_matrix: Matrix4<f32>,

    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,

    children: Vec<Bone>,
}

impl Bone {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: None,
            bind_position: Vector3::new(0.0, 0.0, 0.0),
            bind_rotation: Quaternion::one(),
            bind_scale: Vector3::new(1.0, 1.0, 1.0),
            offset_matrix: Matrix4::identity(),
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn set_index(&mut self, index: Option<usize>) {
        self.index = index;
    }

    pub fn set_bind_pose(
        &mut self,
        position: Vector3<f32>,
        rotation: Quaternion<f32>,
        scale: Vector3<f32>,
    ) {
        self.bind_position = position;
        self.bind_rotation = rotation;
        self.bind_scale = scale;
    }

    pub fn set_offset_matrix(&mut self, offset: Matrix4<f32>) {
        self.offset_matrix = offset;
    }

    pub fn offset_matrix(&self) -> Matrix4<f32> {
        self.offset_matrix
    }

    /// Reset the runtime local transform to the authored bind pose. Runs once
    /// at import, before any runtime pose is applied.
    pub fn move_to_bind(&mut self) {
        self.position = self.bind_position;
        self.rotation = self.bind_rotation;
        self.scale = self.bind_scale;
    }

    pub fn add_child(&mut self, child: Bone) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[Bone] {
        &self.children
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Bone> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_name(name))
    }

    pub fn find_by_index(&self, index: usize) -> Option<&Bone> {
        if self.index == Some(index) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_index(index))
    }

    /// Depth of the tree rooted here (a lone bone has depth 1).
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Bone::depth)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_to_bind_resets_local_transform() {
        let mut bone = Bone::new("arm");
        bone.set_bind_pose(
            Vector3::new(1.0, 2.0, 3.0),
            Quaternion::one(),
            Vector3::new(1.0, 1.0, 1.0),
        );
        bone.position = Vector3::new(9.0, 9.0, 9.0);
        bone.move_to_bind();
        assert_eq!(bone.position, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn tree_lookup_by_name_and_index() {
        let mut root = Bone::new("root");
        let mut spine = Bone::new("spine");
        let mut head = Bone::new("head");
        head.set_index(Some(2));
        spine.set_index(Some(1));
        root.set_index(Some(0));
        spine.add_child(head);
        root.add_child(spine);

        assert_eq!(root.depth(), 3);
        assert_eq!(root.find_by_name("head").and_then(Bone::index), Some(2));
        assert_eq!(root.find_by_index(1).map(Bone::name), Some("spine"));
        assert!(root.find_by_name("tail").is_none());
    }
}
