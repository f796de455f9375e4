//! Decoded object model.
//!
//! Everything here is plain data produced by the packfile decoders. Cross-object
//! references (a rigid body's shape, a list shape's children, the container's
//! skeletons) are absolute file addresses into the [`HavokFile`](crate::HavokFile)
//! object store rather than owning pointers, so shared children decode once and
//! shape DAGs are representable.

use glam::{Mat4, Quat, Vec3, Vec4};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone; negative means root.
    pub parent: i16,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub translation_locked: bool,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    pub name: String,
    pub bones: Vec<Bone>,
}

/// One bone's channels within one animation block.
///
/// Zero entries means the channel is absent (fall back to the bind pose), one
/// entry is a static per-block value, more than one is per-frame samples.
#[derive(Clone, Debug, Default)]
pub struct Track {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub duration: f32,
    pub block_duration: f32,
    pub frame_duration: f32,
    /// Outer index is the block (a fixed-size run of consecutive frames),
    /// inner index is the transform track, 1:1 with skeleton bones.
    pub blocks: Vec<Vec<Track>>,
    pub bone_to_track: HashMap<String, usize>,
}

#[derive(Clone, Debug)]
pub struct AnimationBinding {
    /// Only present in 2010-era files.
    pub skeleton_name: Option<String>,
    /// Object-store address of the bound animation.
    pub animation: u32,
    pub track_to_bone: Vec<i16>,
    pub blend_hint: u32,
}

/// Root-level index of the animation data in a file. All fields are
/// object-store addresses.
#[derive(Clone, Debug, Default)]
pub struct AnimationContainer {
    pub skeletons: Vec<u32>,
    pub animations: Vec<u32>,
    pub bindings: Vec<u32>,
    pub attachments: Vec<u32>,
    pub skins: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct RigidBody {
    /// Object-store address of the collision shape.
    pub shape: u32,
    pub position: Vec4,
    pub rotation: Quat,
}

#[derive(Clone, Debug)]
pub struct Shape {
    pub user_data: u64,
    pub radius: f32,
    pub kind: ShapeKind,
}

#[derive(Clone, Debug)]
pub enum ShapeKind {
    Box {
        half_extents: Vec4,
    },
    Cylinder {
        cylinder_radius: f32,
        vertex_a: Vec4,
        vertex_b: Vec4,
    },
    Capsule {
        vertex_a: Vec4,
        vertex_b: Vec4,
    },
    ConvexTranslate {
        child: u32,
        translation: Vec4,
    },
    ConvexTransform {
        child: u32,
        transform: Mat4,
    },
    List {
        children: Vec<u32>,
    },
    ConvexVertices {
        vertices: Vec<Vec4>,
        plane_equations: Vec<Vec4>,
    },
    SimpleMesh {
        vertices: Vec<Vec4>,
        triangles: Vec<[u32; 3]>,
    },
    MoppBvTree {
        child: u32,
    },
}

/// A decoded root object, keyed by absolute file address in the object store.
#[derive(Clone, Debug)]
pub enum HavokObject {
    Skeleton(Skeleton),
    Animation(Animation),
    Binding(AnimationBinding),
    Container(AnimationContainer),
    RigidBody(RigidBody),
    Shape(Shape),
}

impl HavokObject {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Skeleton(_) => "skeleton",
            Self::Animation(_) => "animation",
            Self::Binding(_) => "animation binding",
            Self::Container(_) => "animation container",
            Self::RigidBody(_) => "rigid body",
            Self::Shape(_) => "shape",
        }
    }
}
