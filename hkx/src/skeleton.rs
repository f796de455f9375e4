//! `hkaSkeleton` decoding for both header personalities.
//!
//! 2010 files pack seven hkArray headers up front and store bones as one
//! contiguous record array. 5.5 files spell out (offset, count) pairs and add
//! one more layer of indirection: the bone array holds pointers to individual
//! bone records. The transform quaternion field order also differs (5.5 is
//! w,x,y,z; 2010 is x,y,z,w).

use glam::{Quat, Vec3};

use crate::error::Error;
use crate::model::{Bone, Skeleton};
use crate::packfile::{Decoder, HkArray};

struct BoneTransform {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
}

impl<'a> Decoder<'a> {
    pub(crate) fn read_skeleton(&mut self) -> Result<Skeleton, Error> {
        let name = self.require_string("skeleton name")?;

        let (parents, bones, transforms) = if self.version.uses_hk_arrays() {
            let parents = self.read_hk_array()?;
            let bones = self.read_hk_array()?;
            let transforms = self.read_hk_array()?;
            let _reference_floats = self.read_hk_array()?;
            let _float_slots = self.read_hk_array()?;
            let _local_frames = self.read_hk_array()?;
            let _partitions = self.read_hk_array()?;
            (parents, bones, transforms)
        } else {
            let parents = self.read_offset_count()?;
            let bones = self.read_offset_count()?;
            let transforms = self.read_offset_count()?;
            (parents, bones, transforms)
        };

        let count = bones.count as usize;
        if parents.count != bones.count {
            return Err(Error::CountMismatch {
                context: "skeleton parent indices",
                expected: count,
                found: parents.count as usize,
            });
        }
        if transforms.count != bones.count {
            return Err(Error::CountMismatch {
                context: "skeleton bone transforms",
                expected: count,
                found: transforms.count as usize,
            });
        }

        let parent_indices = self.read_parent_indices(parents)?;
        let names = self.read_bone_records(bones)?;
        let transforms = self.read_bone_transforms(transforms)?;

        let mut out = Vec::with_capacity(count);
        for (index, ((parent, (bone_name, locked)), transform)) in parent_indices
            .into_iter()
            .zip(names)
            .zip(transforms)
            .enumerate()
        {
            if parent >= 0 {
                let parent_index = parent as usize;
                if parent_index >= count {
                    return Err(Error::BoneParentOutOfRange {
                        bone: index,
                        parent,
                        count,
                    });
                }
                if parent_index == index {
                    return Err(Error::BoneSelfParent { bone: index });
                }
            }
            out.push(Bone {
                name: bone_name,
                parent,
                position: transform.position,
                rotation: transform.rotation,
                scale: transform.scale,
                translation_locked: locked,
            });
        }

        Ok(Skeleton { name, bones: out })
    }

    fn read_parent_indices(&mut self, header: HkArray) -> Result<Vec<i16>, Error> {
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;
        let mut parents = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            parents.push(self.input.read_i16()?);
        }
        Ok(parents)
    }

    /// Yields (name, translation locked) per bone.
    fn read_bone_records(&mut self, header: HkArray) -> Result<Vec<(String, bool)>, Error> {
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;

        if self.version.uses_hk_arrays() {
            // Contiguous records: name pointer + lock flag.
            let mut records = Vec::with_capacity(header.count as usize);
            for _ in 0..header.count {
                let name = self.require_string("bone name")?;
                let locked = self.input.read_u32()? != 0;
                records.push((name, locked));
            }
            Ok(records)
        } else {
            // 5.5: an array of pointers to standalone bone records.
            let addresses = self.read_fixup_array(header.count as usize, 0)?;
            let mut records = Vec::with_capacity(addresses.len());
            for (index, address) in addresses.into_iter().enumerate() {
                if address == crate::packfile::NULL_ADDRESS {
                    return Err(Error::CountMismatch {
                        context: "skeleton bone pointers",
                        expected: header.count as usize,
                        found: index,
                    });
                }
                self.input.seek(address as usize)?;
                let name = self.require_string("bone name")?;
                let locked = self.input.read_u32()? != 0;
                records.push((name, locked));
            }
            Ok(records)
        }
    }

    fn read_bone_transforms(&mut self, header: HkArray) -> Result<Vec<BoneTransform>, Error> {
        if header.is_empty() {
            return Ok(Vec::new());
        }
        self.input.seek(header.offset as usize)?;
        let w_first = self.version.quaternion_w_first();
        let mut transforms = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let position = self.input.read_vec4()?.truncate();
            let rotation = self.input.read_quat(w_first)?;
            let scale = self.input.read_vec4()?.truncate();
            transforms.push(BoneTransform {
                position,
                rotation,
                scale,
            });
        }
        Ok(transforms)
    }
}
