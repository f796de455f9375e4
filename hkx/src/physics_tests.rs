use glam::Vec4;

use crate::error::Error;
use crate::model::ShapeKind;
use crate::packfile::HavokFile;
use crate::packfile_tests::{PackfileBuilder, VERSION_2010, VERSION_550};

/// Shared shape prefix: reference-object header, user data, convex radius.
fn push_shape_prefix(b: &mut PackfileBuilder, user_data: u64, radius: f32) -> u32 {
    let at = b.offset();
    b.push_zeros(8);
    b.push_u64(user_data);
    b.push_f32(radius);
    at
}

fn push_box_shape(b: &mut PackfileBuilder, half_extents: [f32; 4]) -> u32 {
    let at = push_shape_prefix(b, 7, 0.05);
    b.push_zeros(12);
    for v in half_extents {
        b.push_f32(v);
    }
    b.add_virtual(at, "hkpBoxShape");
    at
}

#[test]
fn decodes_box_shape() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);
    let shape = push_box_shape(&mut b, [1.0, 2.0, 3.0, 0.0]);
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;
    let decoded = file.shape(base + shape).unwrap();
    assert_eq!(decoded.user_data, 7);
    assert!((decoded.radius - 0.05).abs() < 1e-6);
    match decoded.kind {
        ShapeKind::Box { half_extents } => {
            assert_eq!(half_extents, Vec4::new(1.0, 2.0, 3.0, 0.0));
        }
        ref other => panic!("expected box, got {other:?}"),
    }
}

#[test]
fn list_shape_children_may_share_one_target() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);
    let child = push_box_shape(&mut b, [1.0, 1.0, 1.0, 0.0]);

    // Two child records pointing at the same box: a DAG, not a copy.
    let children = b.offset();
    for _ in 0..2 {
        b.push_local_slot(child);
        b.push_zeros(12);
    }

    let list = push_shape_prefix(&mut b, 0, 0.0);
    b.push_hk_array(Some(children), 2);
    b.add_virtual(list, "hkpListShape");
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;
    let decoded = file.shape(base + list).unwrap();
    match &decoded.kind {
        ShapeKind::List { children } => {
            assert_eq!(children, &vec![base + child, base + child]);
            // The shared child is decodable through either slot.
            assert!(file.shape(children[0]).is_ok());
        }
        other => panic!("expected list, got {other:?}"),
    }
}

#[test]
fn convex_translate_wraps_a_child() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);
    let child = push_box_shape(&mut b, [1.0, 1.0, 1.0, 0.0]);

    let wrapper = push_shape_prefix(&mut b, 0, 0.05);
    b.push_local_slot(child);
    b.push_zeros(8);
    for v in [4.0f32, 5.0, 6.0, 0.0] {
        b.push_f32(v);
    }
    b.add_virtual(wrapper, "hkpConvexTranslateShape");
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;
    let decoded = file.shape(base + wrapper).unwrap();
    match decoded.kind {
        ShapeKind::ConvexTranslate { child: c, translation } => {
            assert_eq!(c, base + child);
            assert_eq!(translation, Vec4::new(4.0, 5.0, 6.0, 0.0));
        }
        ref other => panic!("expected convex translate, got {other:?}"),
    }
}

#[test]
fn rigid_body_pads_to_the_motion_state_per_version() {
    for (version, pad) in [(VERSION_2010, 0x40usize), (VERSION_550, 0x30)] {
        let mut b = PackfileBuilder::new(version);
        b.push_zeros(16);
        let shape = push_box_shape(&mut b, [1.0, 1.0, 1.0, 0.0]);

        let body = b.offset();
        b.push_zeros(8);
        b.push_local_slot(shape);
        b.push_zeros(pad);
        for v in [10.0f32, 20.0, 30.0, 1.0] {
            b.push_f32(v);
        }
        // Identity rotation in this personality's component order.
        if version == VERSION_550 {
            for v in [1.0f32, 0.0, 0.0, 0.0] {
                b.push_f32(v);
            }
        } else {
            for v in [0.0f32, 0.0, 0.0, 1.0] {
                b.push_f32(v);
            }
        }
        b.add_virtual(body, "hkpRigidBody");
        let bytes = b.build();

        let file = HavokFile::from_bytes(&bytes).unwrap();
        let base = file.sections()[1].absolute_data_start;
        let decoded = file.rigid_body(base + body).unwrap();
        assert_eq!(decoded.shape, base + shape);
        assert_eq!(decoded.position, Vec4::new(10.0, 20.0, 30.0, 1.0));
        assert!((decoded.rotation.w - 1.0).abs() < 1e-6, "{version}");
        assert!(file.shape(decoded.shape).is_ok());
    }
}

#[test]
fn null_list_child_is_fatal() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);

    // One child record with no fixup behind its pointer slot.
    let children = b.offset();
    b.push_null_slot();
    b.push_zeros(12);

    let list = push_shape_prefix(&mut b, 0, 0.0);
    b.push_hk_array(Some(children), 1);
    b.add_virtual(list, "hkpListShape");
    let err = HavokFile::from_bytes(&b.build()).unwrap_err();
    assert!(matches!(
        err,
        Error::CountMismatch {
            context: "list shape children",
            expected: 1,
            found: 0,
        }
    ));
}

#[test]
fn shape_accessor_rejects_other_kinds() {
    let mut b = PackfileBuilder::new(VERSION_2010);
    b.push_zeros(16);
    let shape = push_box_shape(&mut b, [1.0, 1.0, 1.0, 0.0]);
    let bytes = b.build();

    let file = HavokFile::from_bytes(&bytes).unwrap();
    let base = file.sections()[1].absolute_data_start;
    assert!(matches!(
        file.rigid_body(base + shape).unwrap_err(),
        Error::ObjectKindMismatch {
            expected: "rigid body",
            found: "shape",
            ..
        }
    ));
}
