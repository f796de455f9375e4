use glam::Vec3;

use crate::bitstream_tests::pack_quaternion_bits;
use crate::error::Error;
use crate::packfile::HavokFile;
use crate::packfile_tests::{PackfileBuilder, VERSION_2010};

fn assert_close(a: f32, b: f32, eps: f32, ctx: &str) {
    assert!((a - b).abs() <= eps, "{ctx}: expected {b}, got {a}");
}

/// One block for a single track whose only channel is an 8-bit quantized
/// spline on position x: degree 1, two control points at 0 and 255, knot
/// range [0, 4]. Sampled positions ramp 0.0 to 1.0 in steps of 0.25.
fn push_spline_x_block(b: &mut PackfileBuilder) {
    let begin = b.offset();
    b.push_bytes(&[0x00, 0x10, 0x00, 0x00]);
    b.push_u16(1); // control points - 1
    b.push_u8(1); // degree
    b.push_bytes(&[0, 0, 4, 4]); // knots
    b.push_u8(0); // align to 4 within the block
    b.push_f32(0.0); // x min
    b.push_f32(1.0); // x max
    b.push_u8(0);
    b.push_u8(255);
    b.push_u16(0); // align
    assert_eq!(b.offset() - begin, 24);
}

/// Object header for `hkaSplineCompressedAnimation` in the 2010 layout.
/// Backing arrays must already be in the payload; returns the object offset.
#[allow(clippy::too_many_arguments)]
fn push_animation_object(
    b: &mut PackfileBuilder,
    annotations: Option<(u32, u32)>,
    num_tracks: u32,
    num_frames: u32,
    num_blocks: u32,
    max_frames_per_block: u32,
    block_offsets_at: u32,
    blob: (u32, u32),
) -> u32 {
    let at = b.offset();
    b.push_zeros(8);
    b.push_u32(3); // SPLINE animation type
    b.push_f32(num_frames as f32 / 30.0);
    b.push_u32(num_tracks);
    b.push_u32(0); // float tracks
    b.push_null_slot(); // extracted motion
    match annotations {
        Some((offset, count)) => b.push_hk_array(Some(offset), count),
        None => b.push_hk_array(None, 0),
    }
    b.push_u32(num_frames);
    b.push_u32(num_blocks);
    b.push_u32(max_frames_per_block);
    b.push_u32(8); // mask and quantization size
    b.push_f32(max_frames_per_block as f32 / 30.0);
    b.push_f32(30.0 / max_frames_per_block as f32);
    b.push_f32(1.0 / 30.0);
    b.push_hk_array(Some(block_offsets_at), num_blocks);
    b.push_hk_array(None, 0); // float block offsets
    b.push_hk_array(None, 0); // transform offsets
    b.push_hk_array(None, 0); // float offsets
    b.push_hk_array(Some(blob.0), blob.1);
    assert_eq!(b.offset() - at, 128);
    at
}

#[test]
fn splits_frames_across_blocks_with_short_tail() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    let name = b.push_cstr("root");
    b.push_zeros(3); // realign

    let annotations = b.offset();
    b.push_local_slot(name);
    b.push_u32(0);
    b.push_u32(0);
    b.push_f32(0.0);

    let block_offsets = b.offset();
    for offset in [0u32, 24, 48] {
        b.push_u32(offset);
    }

    let blob = b.offset();
    for _ in 0..3 {
        push_spline_x_block(&mut b);
    }
    let blob_len = b.offset() - blob;

    // 10 frames at 4 per block decode as 4 + 4 + 2.
    let object = push_animation_object(
        &mut b,
        Some((annotations, 1)),
        1,
        10,
        3,
        4,
        block_offsets,
        (blob, blob_len),
    );
    b.add_virtual(object, "hkaSplineCompressedAnimation");
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;
    let animation = file.animation(base + object).unwrap();

    assert_close(animation.frame_duration, 1.0 / 30.0, 1e-6, "frame duration");
    assert_close(animation.block_duration, 4.0 / 30.0, 1e-6, "block duration");
    assert_eq!(animation.blocks.len(), 3);
    assert_eq!(animation.blocks[0].len(), 1);
    assert_eq!(animation.blocks[0][0].positions.len(), 4);
    assert_eq!(animation.blocks[1][0].positions.len(), 4);
    assert_eq!(animation.blocks[2][0].positions.len(), 2);

    // Every full block ramps x from 0 in 0.25 steps; y and z stay zero.
    for (f, position) in animation.blocks[0][0].positions.iter().enumerate() {
        assert_close(position.x, f as f32 * 0.25, 1e-3, "spline x sample");
        assert_close(position.y, 0.0, 1e-6, "absent y axis");
        assert_close(position.z, 0.0, 1e-6, "absent z axis");
    }
    assert_close(
        animation.blocks[2][0].positions[1].x,
        0.25,
        1e-3,
        "tail block second frame",
    );

    // No rotation channel: the track holds no samples at all.
    assert!(animation.blocks[0][0].rotations.is_empty());
    assert_eq!(animation.bone_to_track.get("root"), Some(&0));
}

#[test]
fn static_channels_yield_single_samples() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    let block_offsets = b.offset();
    b.push_u32(0);

    let blob = b.offset();
    // Quantization byte 0x04: 8-bit scalars, rotation quantization 1.
    b.push_bytes(&[0x04, 0x07, 0x01, 0x01]);
    b.push_f32(1.0);
    b.push_f32(2.0);
    b.push_f32(3.0);
    b.push_bytes(&pack_quaternion_bits(0x801, 0x801, 0x801, 3, false));
    b.push_bytes(&[0, 0, 0]); // align
    b.push_f32(1.0); // static scale x, discarded
    let blob_len = b.offset() - blob;
    assert_eq!(blob_len, 28);

    let object = push_animation_object(
        &mut b,
        None,
        1,
        1,
        1,
        4,
        block_offsets,
        (blob, blob_len),
    );
    b.add_virtual(object, "hkaSplineCompressedAnimation");
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;
    let animation = file.animation(base + object).unwrap();

    let track = &animation.blocks[0][0];
    assert_eq!(track.positions, vec![Vec3::new(1.0, 2.0, 3.0)]);
    assert_eq!(track.rotations.len(), 1);
    let q = track.rotations[0];
    assert_close(q.w, 1.0, 1e-5, "static identity rotation w");
    assert_close(q.x, 0.0, 1e-5, "static identity rotation x");
    assert!(animation.bone_to_track.is_empty());
}

#[test]
fn spline_scale_channel_is_fatal() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    let block_offsets = b.offset();
    b.push_u32(0);

    let blob = b.offset();
    b.push_bytes(&[0x00, 0x00, 0x00, 0x10]); // spline scale on x
    let blob_len = b.offset() - blob;

    let object =
        push_animation_object(&mut b, None, 1, 1, 1, 4, block_offsets, (blob, blob_len));
    b.add_virtual(object, "hkaSplineCompressedAnimation");
    let err = HavokFile::from_bytes(&b.build()).unwrap_err();
    assert!(matches!(err, Error::SplineScaleUnsupported));
}

#[test]
fn unknown_rotation_quantization_is_fatal() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    let block_offsets = b.offset();
    b.push_u32(0);

    let blob = b.offset();
    // Rotation channel present, but quantization bits say 0 (not 40-bit).
    b.push_bytes(&[0x00, 0x00, 0x01, 0x00]);
    b.push_bytes(&[0; 5]);
    b.push_bytes(&[0; 3]);
    let blob_len = b.offset() - blob;

    let object =
        push_animation_object(&mut b, None, 1, 1, 1, 4, block_offsets, (blob, blob_len));
    b.add_virtual(object, "hkaSplineCompressedAnimation");
    let err = HavokFile::from_bytes(&b.build()).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedRotationQuantization { value: 0 }
    ));
}

#[test]
fn blocks_must_cover_the_frame_count() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    let block_offsets = b.offset();
    b.push_u32(0);

    let blob = b.offset();
    push_spline_x_block(&mut b);
    let blob_len = b.offset() - blob;

    // 10 frames claimed but one 4-frame block supplied.
    let object =
        push_animation_object(&mut b, None, 1, 10, 1, 4, block_offsets, (blob, blob_len));
    b.add_virtual(object, "hkaSplineCompressedAnimation");
    let err = HavokFile::from_bytes(&b.build()).unwrap_err();
    assert!(matches!(
        err,
        Error::CountMismatch {
            context: "animation frames",
            expected: 10,
            found: 4,
        }
    ));
}

#[test]
fn container_binding_and_animation_link_up() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    let animation_name = b.push_cstr("root");
    let skeleton_name = b.push_cstr("biped");
    b.push_zeros(1); // realign

    let annotations = b.offset();
    b.push_local_slot(animation_name);
    b.push_u32(0);
    b.push_u32(0);
    b.push_f32(0.0);

    let block_offsets = b.offset();
    for offset in [0u32, 24, 48] {
        b.push_u32(offset);
    }

    let blob = b.offset();
    for _ in 0..3 {
        push_spline_x_block(&mut b);
    }
    let blob_len = b.offset() - blob;

    let animation = push_animation_object(
        &mut b,
        Some((annotations, 1)),
        1,
        10,
        3,
        4,
        block_offsets,
        (blob, blob_len),
    );

    let track_indices = b.offset();
    b.push_i16(0);
    b.push_zeros(2);

    // hkaAnimationBinding: skeleton name, animation pointer, track map.
    let binding = b.offset();
    b.push_zeros(8);
    b.push_local_slot(skeleton_name);
    b.push_local_slot(animation);
    b.push_hk_array(Some(track_indices), 1);
    b.push_hk_array(None, 0); // float slot indices
    b.push_u32(0); // blend hint

    let animation_pointers = b.offset();
    b.push_local_slot(animation);
    let binding_pointers = b.offset();
    b.push_local_slot(binding);

    let container = b.offset();
    b.push_zeros(8);
    b.push_hk_array(None, 0); // skeletons
    b.push_hk_array(Some(animation_pointers), 1);
    b.push_hk_array(Some(binding_pointers), 1);
    b.push_hk_array(None, 0); // attachments
    b.push_hk_array(None, 0); // skins

    b.add_virtual(animation, "hkaSplineCompressedAnimation");
    b.add_virtual(binding, "hkaAnimationBinding");
    b.add_virtual(container, "hkaAnimationContainer");
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;

    let found = file.animation_container().unwrap();
    assert!(found.skeletons.is_empty());
    assert_eq!(found.animations, vec![base + animation]);
    assert_eq!(found.bindings, vec![base + binding]);

    let found_binding = file.binding(found.bindings[0]).unwrap();
    assert_eq!(found_binding.skeleton_name.as_deref(), Some("biped"));
    assert_eq!(found_binding.animation, found.animations[0]);
    assert_eq!(found_binding.track_to_bone, vec![0]);
    assert_eq!(found_binding.blend_hint, 0);

    let found_animation = file.animation(found_binding.animation).unwrap();
    assert_eq!(found_animation.blocks.len(), 3);
}
