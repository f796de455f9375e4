//! Collision shape and rigid body decoding.
//!
//! Shapes form a small closed set. Every variant starts with the same prefix:
//! an 8-byte reference-object header, a 64-bit user data word, and the convex
//! radius; this prefix is structural and identical across variants.
//!
//! Wrapper shapes (convex translate/transform, mopp) and list shapes hold
//! their children as object-store addresses. Each child decodes exactly once,
//! at its own virtual fixup, so shapes shared between parents form a DAG
//! rather than duplicated subtrees.

use glam::Mat4;
use tracing::debug;

use crate::error::Error;
use crate::model::{RigidBody, Shape, ShapeKind};
use crate::packfile::{Decoder, PackfileVersion, NULL_ADDRESS};

/// Padding between the child pointer slots of a list shape.
const LIST_CHILD_STRIDE_PAD: usize = 12;

/// The closed set of shape classes the decoder understands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ShapeClass {
    Box,
    Cylinder,
    Capsule,
    ConvexTranslate,
    ConvexTransform,
    List,
    ConvexVertices,
    SimpleMesh,
    MoppBvTree,
}

impl ShapeClass {
    pub(crate) fn from_class_name(name: &str) -> Option<Self> {
        match name {
            "hkpBoxShape" => Some(Self::Box),
            "hkpCylinderShape" => Some(Self::Cylinder),
            "hkpCapsuleShape" => Some(Self::Capsule),
            "hkpConvexTranslateShape" => Some(Self::ConvexTranslate),
            "hkpConvexTransformShape" => Some(Self::ConvexTransform),
            "hkpListShape" => Some(Self::List),
            "hkpConvexVerticesShape" => Some(Self::ConvexVertices),
            "hkpSimpleMeshShape" => Some(Self::SimpleMesh),
            "hkpMoppBvTreeShape" => Some(Self::MoppBvTree),
            _ => None,
        }
    }
}

impl<'a> Decoder<'a> {
    pub(crate) fn read_shape(&mut self, class: ShapeClass) -> Result<Shape, Error> {
        self.input.skip(8)?;
        let user_data = self.input.read_u64()?;
        let radius = self.input.read_f32()?;

        let kind = match class {
            ShapeClass::Box => {
                self.input.skip(12)?;
                ShapeKind::Box {
                    half_extents: self.input.read_vec4()?,
                }
            }
            ShapeClass::Cylinder => {
                let cylinder_radius = self.input.read_f32()?;
                self.input.skip(8)?;
                ShapeKind::Cylinder {
                    cylinder_radius,
                    vertex_a: self.input.read_vec4()?,
                    vertex_b: self.input.read_vec4()?,
                }
            }
            ShapeClass::Capsule => {
                self.input.skip(12)?;
                ShapeKind::Capsule {
                    vertex_a: self.input.read_vec4()?,
                    vertex_b: self.input.read_vec4()?,
                }
            }
            ShapeClass::ConvexTranslate => {
                let child = self.require_fixup("convex translate child shape")?;
                self.input.skip(8)?;
                ShapeKind::ConvexTranslate {
                    child,
                    translation: self.input.read_vec4()?,
                }
            }
            ShapeClass::ConvexTransform => {
                let child = self.require_fixup("convex transform child shape")?;
                self.input.skip(8)?;
                let cols = [
                    self.input.read_vec4()?,
                    self.input.read_vec4()?,
                    self.input.read_vec4()?,
                    self.input.read_vec4()?,
                ];
                ShapeKind::ConvexTransform {
                    child,
                    transform: Mat4::from_cols(cols[0], cols[1], cols[2], cols[3]),
                }
            }
            ShapeClass::List => {
                let children = self.read_list_children()?;
                ShapeKind::List { children }
            }
            ShapeClass::ConvexVertices => {
                let vertices = self.read_hk_array()?;
                let plane_equations = self.read_hk_array()?;
                ShapeKind::ConvexVertices {
                    vertices: self.read_vec4_array(vertices)?,
                    plane_equations: self.read_vec4_array(plane_equations)?,
                }
            }
            ShapeClass::SimpleMesh => {
                let vertices = self.read_hk_array()?;
                let triangles = self.read_hk_array()?;
                ShapeKind::SimpleMesh {
                    vertices: self.read_vec4_array(vertices)?,
                    triangles: self.read_triangle_array(triangles)?,
                }
            }
            ShapeClass::MoppBvTree => ShapeKind::MoppBvTree {
                child: self.require_fixup("mopp child shape")?,
            },
        };

        Ok(Shape {
            user_data,
            radius,
            kind,
        })
    }

    fn read_list_children(&mut self) -> Result<Vec<u32>, Error> {
        let header = self.read_hk_array()?;
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;
        let addresses = self.read_fixup_array(header.count as usize, LIST_CHILD_STRIDE_PAD)?;
        for (index, &address) in addresses.iter().enumerate() {
            if address == NULL_ADDRESS {
                return Err(Error::CountMismatch {
                    context: "list shape children",
                    expected: header.count as usize,
                    found: index,
                });
            }
        }
        Ok(addresses)
    }

    fn read_vec4_array(
        &mut self,
        header: crate::packfile::HkArray,
    ) -> Result<Vec<glam::Vec4>, Error> {
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;
        let mut values = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            values.push(self.input.read_vec4()?);
        }
        Ok(values)
    }

    fn read_triangle_array(
        &mut self,
        header: crate::packfile::HkArray,
    ) -> Result<Vec<[u32; 3]>, Error> {
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;
        let mut triangles = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            triangles.push([
                self.input.read_u32()?,
                self.input.read_u32()?,
                self.input.read_u32()?,
            ]);
        }
        Ok(triangles)
    }

    pub(crate) fn read_rigid_body(&mut self) -> Result<RigidBody, Error> {
        self.input.skip(8)?;
        let shape = self.require_fixup("rigid body shape")?;
        // Pad to the motion state; the intervening collidable/material fields
        // are not modeled.
        let pad = match self.version {
            PackfileVersion::Havok550r1 => 0x30,
            PackfileVersion::Havok2010r1 => 0x40,
        };
        self.input.skip(pad)?;
        let position = self.input.read_vec4()?;
        let rotation = self.input.read_quat(self.version.quaternion_w_first())?;
        Ok(RigidBody {
            shape,
            position,
            rotation,
        })
    }

    /// A physics system only indexes rigid bodies that decode at their own
    /// virtual fixups, so it is parsed and logged but never stored.
    pub(crate) fn read_physics_system(&mut self) -> Result<(), Error> {
        self.input.skip(8)?;
        let bodies = self.read_array_header()?;
        let addresses = self.read_address_array(bodies)?;
        debug!(
            count = addresses.len(),
            "discarding physics system rigid body index"
        );
        Ok(())
    }
}
