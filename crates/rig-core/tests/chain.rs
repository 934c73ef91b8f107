//! Skeleton construction from URDF joint trees

use std::f32::consts::FRAC_PI_2;

use approx::assert_relative_eq;
use glam::Vec3;
use rig_core::scene::MAX_NAME_LEN;
use rig_core::{Document, ImportOptions, ROOT_BONE, RobotBuilder, RobotModel, Session};

fn build(xml: &str, scale_unit: f32) -> Document {
    let model = RobotModel::parse(xml).unwrap();
    let options = ImportOptions {
        scale_unit,
        ..Default::default()
    };
    let mut doc = Document::new(model.name.clone(), scale_unit);
    let mut session = Session::new();
    RobotBuilder::new(&model, &options, &mut session)
        .build(&mut doc)
        .unwrap();
    doc
}

fn assert_vec_eq(actual: Vec3, expected: Vec3) {
    assert_relative_eq!(actual.x, expected.x, epsilon = 1e-5);
    assert_relative_eq!(actual.y, expected.y, epsilon = 1e-5);
    assert_relative_eq!(actual.z, expected.z, epsilon = 1e-5);
}

const TREE: &str = r#"<robot name="tree">
  <link name="base"/>
  <link name="a"/>
  <link name="b"/>
  <link name="c"/>
  <link name="d"/>
  <joint name="base_a" type="fixed"><parent link="base"/><child link="a"/></joint>
  <joint name="base_b" type="revolute"><parent link="base"/><child link="b"/>
    <axis xyz="1 0 0"/><limit lower="-1" upper="1" effort="1" velocity="1"/></joint>
  <joint name="a_c" type="prismatic"><parent link="a"/><child link="c"/>
    <axis xyz="0 1 0"/><limit lower="0" upper="1" effort="1" velocity="1"/></joint>
  <joint name="b_d" type="continuous"><parent link="b"/><child link="d"/></joint>
</robot>"#;

#[test]
fn one_bone_per_joint_plus_root() {
    let doc = build(TREE, 1.0);
    assert_eq!(doc.armature.len(), 5);

    let parent = |name: &str| doc.armature.bone(name).unwrap().parent.clone();
    assert_eq!(parent(ROOT_BONE), None);
    assert_eq!(parent("base_a.fixed.bone").as_deref(), Some(ROOT_BONE));
    assert_eq!(parent("base_b.revolute.bone").as_deref(), Some(ROOT_BONE));
    assert_eq!(parent("a_c.prismatic.bone").as_deref(), Some("base_a.fixed.bone"));
    assert_eq!(parent("b_d.continuous.bone").as_deref(), Some("base_b.revolute.bone"));
}

#[test]
fn parents_come_before_children() {
    let doc = build(TREE, 1.0);
    let armature = &doc.armature;
    for bone in armature.bones() {
        if let Some(parent) = &bone.parent {
            assert!(armature.position(parent) < armature.position(&bone.name));
        }
    }
}

#[test]
fn three_link_chain_pose() {
    let xml = r#"<robot name="chain">
      <link name="base"/>
      <link name="l1"/>
      <link name="l2"><origin xyz="0 0 0.5"/></link>
      <link name="l3"><visual><geometry><box size="0.1 0.1 0.1"/></geometry></visual></link>
      <joint name="j1" type="fixed"><parent link="base"/><child link="l1"/>
        <origin xyz="1 0 0" rpy="0 0 1.5707963"/></joint>
      <joint name="j2" type="fixed"><parent link="l1"/><child link="l2"/>
        <origin xyz="1 0 0"/></joint>
      <joint name="j3" type="revolute"><parent link="l2"/><child link="l3"/>
        <origin xyz="0 1 0"/><axis xyz="1 0 0"/>
        <limit lower="-1" upper="1" effort="1" velocity="1"/></joint>
    </robot>"#;
    let doc = build(xml, 1.0);
    let bone = |name: &str| doc.armature.bone(name).unwrap().clone();

    // j1 turns the chain a quarter around z
    let j1 = bone("j1.fixed.bone");
    assert_vec_eq(j1.head, Vec3::new(1.0, 0.0, 0.0));
    assert_vec_eq(j1.tail, Vec3::new(1.0, 0.0, 0.1));

    // x offsets now run along world y
    let j2 = bone("j2.fixed.bone");
    assert_vec_eq(j2.head, Vec3::new(1.0, 1.0, 0.0));

    // l2's own origin lifts everything below it by 0.5
    let j3 = bone("j3.revolute.bone");
    assert_vec_eq(j3.head, Vec3::new(0.0, 1.0, 0.5));
    assert_vec_eq(j3.tail - j3.head, Vec3::new(0.0, 0.1, 0.0));

    let l3 = doc.object("l3").unwrap();
    assert_vec_eq(l3.transform.location, Vec3::new(0.0, 1.0, 0.5));
    assert_relative_eq!(
        l3.transform.rotation.angle_between(glam::Quat::from_rotation_z(FRAC_PI_2)),
        0.0,
        epsilon = 1e-4
    );
}

#[test]
fn base_and_wheel() {
    let xml = r#"<robot name="cart">
      <link name="base"/>
      <link name="wheel"/>
      <joint name="axle" type="continuous">
        <parent link="base"/><child link="wheel"/>
        <origin xyz="0.5 0 0"/><axis xyz="0 0 1"/>
      </joint>
    </robot>"#;
    let doc = build(xml, 1.0);

    let root = doc.armature.bone(ROOT_BONE).unwrap();
    assert_vec_eq(root.head, Vec3::ZERO);

    let wheel = doc.armature.bone("axle.continuous.bone").unwrap();
    assert_vec_eq(wheel.head, Vec3::new(0.5, 0.0, 0.0));
    assert_relative_eq!(wheel.direction().dot(Vec3::Z), 1.0, epsilon = 1e-6);
}

#[test]
fn unit_scale_applies_to_bones() {
    let xml = r#"<robot name="cart">
      <link name="base"/>
      <link name="wheel"/>
      <joint name="axle" type="continuous">
        <parent link="base"/><child link="wheel"/>
        <origin xyz="0.5 0 0"/><axis xyz="0 0 2"/>
      </joint>
    </robot>"#;
    let doc = build(xml, 0.01);

    let wheel = doc.armature.bone("axle.continuous.bone").unwrap();
    assert_vec_eq(wheel.head, Vec3::new(50.0, 0.0, 0.0));
    assert_relative_eq!(wheel.length(), 10.0, epsilon = 1e-4);
}

#[test]
fn bones_follow_breadth_first_order() {
    let xml = r#"<robot name="dup">
      <link name="base"/><link name="a"/><link name="b"/>
      <joint name="j" type="fixed"><parent link="base"/><child link="a"/></joint>
      <joint name="k" type="fixed"><parent link="a"/><child link="b"/></joint>
    </robot>"#;
    let doc = build(xml, 1.0);
    let names: Vec<&str> = doc.armature.bones().iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec![ROOT_BONE, "j.fixed.bone", "k.fixed.bone"]);
}

#[test]
fn long_names_stay_within_limit() {
    let link = "l".repeat(70);
    let joint_a = format!("{}_a", "j".repeat(70));
    let joint_b = format!("{}_b", "j".repeat(70));
    let xml = format!(
        r#"<robot name="long">
          <link name="base"/>
          <link name="{link}_1"><visual><geometry><box size="1 1 1"/></geometry></visual></link>
          <link name="{link}_2"><visual><geometry><box size="1 1 1"/></geometry></visual></link>
          <joint name="{joint_a}" type="fixed"><parent link="base"/><child link="{link}_1"/></joint>
          <joint name="{joint_b}" type="fixed"><parent link="base"/><child link="{link}_2"/></joint>
        </robot>"#
    );
    let doc = build(&xml, 1.0);

    let bones: Vec<&str> = doc.armature.bones().iter().map(|b| b.name.as_str()).collect();
    assert_eq!(bones.len(), 3);
    assert!(bones.iter().all(|n| n.len() <= MAX_NAME_LEN));
    // both bone names truncate to the same prefix, so the second is suffixed
    assert!(bones[2].ends_with(".001"));

    let objects: Vec<&str> = doc.objects().iter().map(|o| o.name.as_str()).collect();
    assert_eq!(objects.len(), 2);
    assert!(objects.iter().all(|n| n.len() <= MAX_NAME_LEN));
    assert_ne!(objects[0], objects[1]);
}
