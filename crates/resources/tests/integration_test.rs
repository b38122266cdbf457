//! Integration tests for the scene import contract.

use lantern_resources::{
    AlphaMode, MaterialData, ModelData, ProceduralImporter, ResourceError, SceneGraph,
    SceneImporter,
};

#[test]
fn test_procedural_scene_round_trips_through_importer() {
    let scene = ProceduralImporter
        .import()
        .expect("procedural import should not fail");

    scene.validate().expect("procedural scene should validate");

    let model = &scene.models[0];
    assert_eq!(model.root_nodes, vec![0]);
    assert_eq!(model.materials.len(), 1);
    assert_eq!(model.materials[0].textures.base_color, Some(0));
    assert!(!model.has_blended_materials());

    let bytes: &[u8] = bytemuck::cast_slice(&model.vertices);
    assert_eq!(bytes.len(), model.vertices.len() * 40);
}

#[test]
fn test_blend_material_is_reported() {
    let mut scene = lantern_resources::procedural::textured_cube();
    scene.models[0].materials.push(MaterialData {
        name: "glass".into(),
        alpha_mode: AlphaMode::Blend,
        ..Default::default()
    });

    assert!(scene.validate().is_ok());
    assert!(scene.models[0].has_blended_materials());
}

#[test]
fn test_first_invalid_model_fails_the_scene() {
    let mut broken = lantern_resources::procedural::textured_cube().models.remove(0);
    broken.name = "broken".into();
    broken.indices.push(1000);
    broken.meshes[0].primitives[0].index_count += 1;

    let scene = SceneGraph {
        name: "mixed".into(),
        models: vec![ModelData::default(), broken],
    };

    match scene.validate() {
        Err(ResourceError::IndexOutOfRange { model, index, .. }) => {
            assert_eq!(model, "broken");
            assert_eq!(index, 1000);
        }
        other => panic!("unexpected validation result: {:?}", other),
    }
}
