//! Spline-compressed animation decoding, plus the animation binding and
//! container records that index it.
//!
//! The animation payload is a private byte blob: per-block track data is
//! addressed by offsets into that blob, never by file offsets. Each block
//! opens with one 4-byte mask per transform track; the mask nibbles say, per
//! axis, whether a channel is a quantized spline (high nibble) or a literal
//! static value (low nibble). Stream alignment inside a block is always
//! relative to the block's own start offset.

use glam::{Quat, Vec3};
use std::collections::HashMap;
use tracing::debug;

use crate::bitstream::{read_packed_quaternion, BitOrder, BitReader, WordOrder, WordSize};
use crate::error::Error;
use crate::model::{Animation, AnimationBinding, AnimationContainer, Track};
use crate::nurbs::Nurbs;
use crate::packfile::{Decoder, Input};

/// The only rotation quantization the files in the wild use. The other
/// encodings have incompatible bit layouts, so anything else is fatal rather
/// than silently mis-decoded.
const ROTATION_THREE_COMP_40: u8 = 1;

const SCALAR_8_BIT: u8 = 0;
const SCALAR_16_BIT: u8 = 1;

/// Per-track channel masks, 4 bytes at the head of each block.
#[derive(Copy, Clone, Debug)]
struct TransformMask {
    quantization: u8,
    position: u8,
    rotation: u8,
    scale: u8,
}

impl TransformMask {
    /// Low two bits select the scalar (position/scale) quantization width.
    fn scalar_16_bit(&self) -> Result<bool, Error> {
        match self.quantization & 0x03 {
            SCALAR_8_BIT => Ok(false),
            SCALAR_16_BIT => Ok(true),
            value => Err(Error::UnsupportedScalarQuantization { value }),
        }
    }

    fn rotation_quantization(&self) -> u8 {
        (self.quantization >> 2) & 0x0F
    }
}

fn spline_axes(mask: u8) -> u8 {
    (mask >> 4) & 0x7
}

fn static_axes(mask: u8) -> u8 {
    mask & 0x7
}

/// Pads the cursor to `alignment` bytes relative to the block's start, not
/// the blob or the file. Using any other base silently desyncs every
/// subsequent track in the block.
fn align_to(input: &mut Input<'_>, begin: usize, alignment: usize) -> Result<(), Error> {
    let rem = (input.position() - begin) % alignment;
    if rem != 0 {
        input.skip(alignment - rem)?;
    }
    Ok(())
}

/// Reads a spline header: item count, degree, and the byte knot vector.
fn read_spline_header(input: &mut Input<'_>) -> Result<(usize, usize, Vec<u8>), Error> {
    let num_items = input.read_u16()? as usize;
    let degree = input.read_u8()? as usize;
    let knots = input.read_bytes(num_items + degree + 2)?.to_vec();
    Ok((num_items, degree, knots))
}

/// Decodes one track's position channel for one block.
fn read_position_channel(
    input: &mut Input<'_>,
    begin: usize,
    mask: &TransformMask,
    frames: usize,
) -> Result<Vec<Vec3>, Error> {
    let spline = spline_axes(mask.position);
    let statics = static_axes(mask.position);

    if spline != 0 {
        let (num_items, degree, knots) = read_spline_header(input)?;
        align_to(input, begin, 4)?;

        // Spline axes carry a dequantization range; static axes carry one
        // literal that holds for the whole block; absent axes stay zero.
        let mut min = [0.0f32; 3];
        let mut max = [0.0f32; 3];
        let mut constant = [0.0f32; 3];
        for axis in 0..3 {
            if spline & (1 << axis) != 0 {
                min[axis] = input.read_f32()?;
                max[axis] = input.read_f32()?;
            } else if statics & (1 << axis) != 0 {
                constant[axis] = input.read_f32()?;
            }
        }

        let sixteen_bit = mask.scalar_16_bit()?;
        let mut points = Vec::with_capacity(num_items + 1);
        for _ in 0..=num_items {
            let mut point = [0.0f32; 3];
            for axis in 0..3 {
                if spline & (1 << axis) != 0 {
                    let normalized = if sixteen_bit {
                        f32::from(input.read_u16()?) / 65535.0
                    } else {
                        f32::from(input.read_u8()?) / 255.0
                    };
                    point[axis] = min[axis] + (max[axis] - min[axis]) * normalized;
                } else {
                    point[axis] = constant[axis];
                }
            }
            points.push(Vec3::from_array(point));
        }
        align_to(input, begin, 4)?;

        let curve = Nurbs::new(points, knots, degree)?;
        Ok((0..frames).map(|f| curve.interpolate(f as u32)).collect())
    } else if statics != 0 {
        let mut point = [0.0f32; 3];
        for axis in 0..3 {
            if statics & (1 << axis) != 0 {
                point[axis] = input.read_f32()?;
            }
        }
        Ok(vec![Vec3::from_array(point)])
    } else {
        Ok(Vec::new())
    }
}

/// Decodes one track's rotation channel for one block. Only 40-bit packed
/// quaternions are implemented, as splines or as a single static value.
fn read_rotation_channel(
    input: &mut Input<'_>,
    mask: &TransformMask,
    frames: usize,
) -> Result<Vec<Quat>, Error> {
    let spline = spline_axes(mask.rotation);
    let statics = static_axes(mask.rotation);
    if spline == 0 && statics == 0 {
        return Ok(Vec::new());
    }

    let quantization = mask.rotation_quantization();
    if quantization != ROTATION_THREE_COMP_40 {
        return Err(Error::UnsupportedRotationQuantization {
            value: quantization,
        });
    }

    if spline != 0 {
        let (num_items, degree, knots) = read_spline_header(input)?;
        let raw = input.read_bytes(5 * (num_items + 1))?;
        let mut bits = BitReader::new(
            raw,
            WordSize::Bits8,
            WordOrder::LittleEndian,
            BitOrder::LsbFirst,
        );
        let mut points = Vec::with_capacity(num_items + 1);
        for _ in 0..=num_items {
            points.push(read_packed_quaternion(&mut bits)?);
        }
        let curve = Nurbs::new(points, knots, degree)?;
        Ok((0..frames).map(|f| curve.interpolate(f as u32)).collect())
    } else {
        let raw = input.read_bytes(5)?;
        let mut bits = BitReader::new(
            raw,
            WordSize::Bits8,
            WordOrder::LittleEndian,
            BitOrder::LsbFirst,
        );
        Ok(vec![read_packed_quaternion(&mut bits)?])
    }
}

/// Scale is parsed to keep the stream position honest but never kept: no
/// known asset animates it. Spline scale has an unknown layout and is fatal.
fn skip_scale_channel(input: &mut Input<'_>, mask: &TransformMask) -> Result<(), Error> {
    if spline_axes(mask.scale) != 0 {
        return Err(Error::SplineScaleUnsupported);
    }
    let statics = static_axes(mask.scale);
    for axis in 0..3 {
        if statics & (1 << axis) != 0 {
            let value = input.read_f32()?;
            if value != 1.0 {
                debug!(axis, value, "discarding non-identity static scale");
            }
        }
    }
    Ok(())
}

impl<'a> Decoder<'a> {
    pub(crate) fn read_spline_animation(&mut self) -> Result<Animation, Error> {
        self.input.skip(8)?;
        let _animation_type = self.input.read_u32()?;
        let duration = self.input.read_f32()?;
        let num_transform_tracks = self.input.read_u32()? as usize;
        let _num_float_tracks = self.input.read_u32()?;
        let _extracted_motion = self.read_fixup()?;
        let annotations = self.read_hk_array()?;

        let num_frames = self.input.read_u32()? as usize;
        let num_blocks = self.input.read_u32()? as usize;
        let max_frames_per_block = self.input.read_u32()? as usize;
        let _mask_and_quantization_size = self.input.read_u32()?;
        let block_duration = self.input.read_f32()?;
        let _block_inverse_duration = self.input.read_f32()?;
        let frame_duration = self.input.read_f32()?;

        let block_offsets = self.read_hk_array()?;
        let _float_block_offsets = self.read_hk_array()?;
        let _transform_offsets = self.read_hk_array()?;
        let _float_offsets = self.read_hk_array()?;
        let data = self.read_hk_array()?;

        if block_offsets.count as usize != num_blocks {
            return Err(Error::CountMismatch {
                context: "animation block offsets",
                expected: num_blocks,
                found: block_offsets.count as usize,
            });
        }
        if max_frames_per_block == 0 {
            return Err(Error::CountMismatch {
                context: "animation frames per block",
                expected: 1,
                found: 0,
            });
        }

        // All per-block decoding runs against this private blob, not the
        // outer file stream.
        let blob = if data.is_empty() {
            Vec::new()
        } else {
            self.input.seek(data.offset as usize)?;
            self.input.read_bytes(data.count as usize)?.to_vec()
        };

        let mut offsets = Vec::with_capacity(num_blocks);
        if !block_offsets.is_empty() {
            self.input.seek(block_offsets.offset as usize)?;
            for _ in 0..num_blocks {
                offsets.push(self.input.read_u32()? as usize);
            }
        }

        let mut track_data = Input::new(&blob);
        let mut blocks = Vec::with_capacity(offsets.len());
        let mut remaining = num_frames;
        for begin in offsets {
            track_data.seek(begin)?;

            let mut masks = Vec::with_capacity(num_transform_tracks);
            for _ in 0..num_transform_tracks {
                masks.push(TransformMask {
                    quantization: track_data.read_u8()?,
                    position: track_data.read_u8()?,
                    rotation: track_data.read_u8()?,
                    scale: track_data.read_u8()?,
                });
            }

            // The last block is allowed to be short; that is the normal
            // termination condition, not an edge case.
            let frames = remaining.min(max_frames_per_block);
            remaining -= frames;

            let mut tracks = Vec::with_capacity(num_transform_tracks);
            for mask in &masks {
                let positions = read_position_channel(&mut track_data, begin, mask, frames)?;
                let rotations = read_rotation_channel(&mut track_data, mask, frames)?;
                align_to(&mut track_data, begin, 4)?;
                skip_scale_channel(&mut track_data, mask)?;
                tracks.push(Track {
                    positions,
                    rotations,
                });
            }
            blocks.push(tracks);
        }

        if remaining != 0 {
            return Err(Error::CountMismatch {
                context: "animation frames",
                expected: num_frames,
                found: num_frames - remaining,
            });
        }

        let bone_to_track = self.read_annotation_tracks(annotations)?;

        Ok(Animation {
            duration,
            block_duration,
            frame_duration,
            blocks,
            bone_to_track,
        })
    }

    /// Annotation tracks carry the bone name for each transform track. The
    /// trailing metadata words are read for position only.
    fn read_annotation_tracks(
        &mut self,
        header: crate::packfile::HkArray,
    ) -> Result<HashMap<String, usize>, Error> {
        let mut bone_to_track = HashMap::new();
        if header.is_empty() {
            return Ok(bone_to_track);
        }
        self.input.seek(header.offset as usize)?;
        for track_index in 0..header.count as usize {
            let name = self.require_string("annotation track name")?;
            let _annotation_count = self.input.read_u32()?;
            let _annotation_capacity = self.input.read_u32()?;
            let _reference_time = self.input.read_f32()?;
            bone_to_track.insert(name, track_index);
        }
        Ok(bone_to_track)
    }

    pub(crate) fn read_animation_binding(&mut self) -> Result<AnimationBinding, Error> {
        self.input.skip(8)?;
        let (skeleton_name, animation, track_indices) = if self.version.uses_hk_arrays() {
            let skeleton_name = self.read_string()?;
            let animation = self.require_fixup("bound animation")?;
            let track_indices = self.read_hk_array()?;
            let _float_slot_indices = self.read_hk_array()?;
            (skeleton_name, animation, track_indices)
        } else {
            let animation = self.require_fixup("bound animation")?;
            let track_indices = self.read_offset_count()?;
            (None, animation, track_indices)
        };
        let blend_hint = self.input.read_u32()?;

        let mut track_to_bone = Vec::with_capacity(track_indices.count as usize);
        if !track_indices.is_empty() {
            self.input.seek(track_indices.offset as usize)?;
            for _ in 0..track_indices.count {
                track_to_bone.push(self.input.read_i16()?);
            }
        }

        Ok(AnimationBinding {
            skeleton_name,
            animation,
            track_to_bone,
            blend_hint,
        })
    }

    pub(crate) fn read_animation_container(&mut self) -> Result<AnimationContainer, Error> {
        self.input.skip(8)?;
        let skeletons = self.read_array_header()?;
        let animations = self.read_array_header()?;
        let bindings = self.read_array_header()?;
        let attachments = self.read_array_header()?;
        let skins = self.read_array_header()?;

        Ok(AnimationContainer {
            skeletons: self.read_address_array(skeletons)?,
            animations: self.read_address_array(animations)?,
            bindings: self.read_address_array(bindings)?,
            attachments: self.read_address_array(attachments)?,
            skins: self.read_address_array(skins)?,
        })
    }
}
