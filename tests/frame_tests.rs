//! Frame execution tests.
//!
//! These tests drive whole frames on the headless device and inspect the
//! recorded command stream:
//! - Uniform merging and builtin values
//! - Render target reallocation on resize
//! - Load operations and the executor state trace
//! - Isolation of per-object draw failures

mod common;

use glam::{Mat4, Vec2, Vec3};
use rstest::rstest;
use serde_json::json;

use common::*;
use shadertool::backend::{Command, DepthLoadOp, HeadlessDevice, LoadOp, UniformValue};
use shadertool::render_graph::{ExecutorState, FrameExecutor, FrameResources, RenderTargetManager};
use shadertool::scene::{CameraInput, CameraKind, SceneDescription, SceneFormat};
use shadertool::{ErrorCategory, FrameInput, LoadedScene, SceneError};

fn single_pass_scene(uniforms: serde_json::Value) -> serde_json::Value {
    let mut main = pass("main", &[], &[]);
    main["uniforms"] = uniforms;
    scene(&[], vec![main])
}

#[rstest]
#[case::shader_default(json!({}), Vec3::new(0.5, 10.0, 0.5))]
#[case::pass_override(json!({"light_pos": [1.0, 2.0, 3.0]}), Vec3::new(1.0, 2.0, 3.0))]
fn test_uniform_value_source(#[case] uniforms: serde_json::Value, #[case] expected: Vec3) {
    let mut engine = engine();
    load(&mut engine, &single_pass_scene(uniforms)).unwrap();
    render(&mut engine, DEFAULT_VIEWPORT);

    let commands = engine.device().commands();
    assert_eq!(
        uniform_uploads(pass_commands(commands, "main"), "light_pos"),
        vec![UniformValue::Vec3(expected)]
    );
}

#[test]
fn test_builtin_uniforms_follow_frame_input() {
    let mut engine = engine();
    load(&mut engine, &single_pass_scene(json!({}))).unwrap();

    let input = FrameInput {
        viewport: (640, 480),
        time: 2.5,
        delta_time: 0.016,
        pointer: Vec2::new(10.0, 20.0),
    };
    engine.render_frame(&input, &CameraInput::new()).unwrap();

    let commands = pass_commands(engine.device().commands(), "main");
    assert_eq!(uniform_uploads(commands, "time"), vec![UniformValue::Float(2.5)]);
    assert_eq!(
        uniform_uploads(commands, "window_size"),
        vec![UniformValue::Vec2(Vec2::new(640.0, 480.0))]
    );

    let camera = engine.camera().unwrap();
    assert_eq!(
        uniform_uploads(commands, "view"),
        vec![UniformValue::Mat4(camera.view_matrix())]
    );
    assert_eq!(
        uniform_uploads(commands, "projection"),
        vec![UniformValue::Mat4(camera.projection_matrix(640.0 / 480.0))]
    );
}

#[test]
fn test_builtin_override_is_pinned() {
    let mut engine = engine();
    load(&mut engine, &single_pass_scene(json!({"time": 5.0}))).unwrap();

    let input = FrameInput {
        time: 1.0,
        ..FrameInput::new(DEFAULT_VIEWPORT)
    };
    engine.render_frame(&input, &CameraInput::new()).unwrap();

    let commands = pass_commands(engine.device().commands(), "main");
    assert_eq!(uniform_uploads(commands, "time"), vec![UniformValue::Float(5.0)]);
}

#[test]
fn test_model_matrix_per_object() {
    let mut main = pass("main", &[], &[]);
    main["objects"] = json!(["left", "right"]);
    let scene = json!({
        "objects": [
            {"name": "left", "kind": "screen_quad", "position": [-1.0, 0.0, 0.0]},
            {"name": "right", "kind": "screen_quad", "position": [1.0, 0.0, 0.0]}
        ],
        "passes": [main]
    });

    let mut engine = engine();
    load(&mut engine, &scene).unwrap();
    let report = render(&mut engine, DEFAULT_VIEWPORT);
    assert_eq!(report.draw_calls, 2);

    let commands = pass_commands(engine.device().commands(), "main");
    assert_eq!(
        uniform_uploads(commands, "model"),
        vec![
            UniformValue::Mat4(Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0))),
            UniformValue::Mat4(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))),
        ]
    );
    // Per-frame values are uploaded once per pass
    assert_eq!(uniform_uploads(commands, "view").len(), 1);
}

#[test]
fn test_override_type_mismatch() {
    let mut engine = engine();
    let err = load(&mut engine, &single_pass_scene(json!({"light_pos": 1.0}))).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Config);
    match err {
        SceneError::InvalidConfig { path, .. } => {
            assert_eq!(path, "passes[0].uniforms.light_pos");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_undeclared_override_is_dropped() {
    let mut engine = engine();
    load(&mut engine, &single_pass_scene(json!({"exposure": 2.0}))).unwrap();
    render(&mut engine, DEFAULT_VIEWPORT);

    assert!(uniform_uploads(engine.device().commands(), "exposure").is_empty());
}

#[test]
fn test_texture_bindings_use_alias() {
    let mut post = pass("post", &[], &[]);
    post["textures"] = json!([{"name": "col", "as": "scene"}, "bloom"]);
    let passes = vec![
        pass("scene", &[], &["col"]),
        pass("bloom", &[], &["bloom"]),
        post,
    ];

    let mut engine = engine();
    load(&mut engine, &scene(&["col", "bloom"], passes)).unwrap();
    render(&mut engine, DEFAULT_VIEWPORT);

    let bindings: Vec<(u32, String)> = pass_commands(engine.device().commands(), "post")
        .iter()
        .filter_map(|command| match command {
            Command::BindTexture { slot, name, .. } => Some((*slot, name.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        bindings,
        vec![
            (0, "texture_scene".to_string()),
            (1, "texture_bloom".to_string())
        ]
    );
}

#[test]
fn test_resize_reallocates_viewport_targets() {
    let scene_json = json!({
        "objects": [{"name": "quad", "kind": "screen_quad"}],
        "textures": [
            {"name": "col", "kind": {"empty": {"size": "viewport"}}},
            {"name": "lut", "kind": {"empty": {"size": {"width": 32, "height": 32}}}}
        ],
        "passes": [
            pass("scene", &[], &["col"]),
            pass("lut", &[], &["lut"]),
            pass("post", &["col", "lut"], &[])
        ]
    });

    let mut engine = engine();
    load(&mut engine, &scene_json).unwrap();
    render(&mut engine, (800, 600));

    let (col, lut) = {
        let scene = engine.scene().unwrap();
        let textures = &scene.registry.textures;
        (
            textures.resolve("col", "test").unwrap(),
            textures.resolve("lut", "test").unwrap(),
        )
    };
    let targets = &engine.scene().unwrap().targets;
    let old_col = *targets.target(col).unwrap();
    let old_lut = *targets.target(lut).unwrap();
    assert_eq!((old_col.width, old_col.height), (800, 600));

    engine.device_mut().take_commands();
    let report = render(&mut engine, (1920, 1080));
    assert_eq!(report.viewport, (1920, 1080));
    assert_eq!(engine.viewport(), (1920, 1080));

    let targets = &engine.scene().unwrap().targets;
    let new_col = *targets.target(col).unwrap();
    assert_eq!((new_col.width, new_col.height), (1920, 1080));
    assert_eq!(targets.target(lut), Some(&old_lut));

    let device = engine.device();
    assert!(!device.is_texture_alive(old_col.texture));
    assert!(device.is_texture_alive(new_col.texture));
    let desc = device.texture_descriptor(new_col.texture).unwrap();
    assert_eq!((desc.width, desc.height), (1920, 1080));

    // The reader samples the new texture
    let bound: Vec<_> = pass_commands(device.commands(), "post")
        .iter()
        .filter_map(|command| match command {
            Command::BindTexture { view, .. } => Some(*view),
            _ => None,
        })
        .collect();
    assert_eq!(bound, vec![new_col.view, old_lut.view]);
}

#[test]
fn test_same_size_frames_keep_targets() {
    let mut engine = engine();
    load(
        &mut engine,
        &scene(&["col"], vec![pass("scene", &[], &["col"]), pass("post", &["col"], &[])]),
    )
    .unwrap();

    render(&mut engine, DEFAULT_VIEWPORT);
    let textures = engine.device().live_texture_count();
    let col = engine.scene().unwrap().registry.textures.resolve("col", "test").unwrap();
    let before = *engine.scene().unwrap().targets.target(col).unwrap();

    render(&mut engine, DEFAULT_VIEWPORT);
    assert_eq!(engine.device().live_texture_count(), textures);
    assert_eq!(engine.scene().unwrap().targets.target(col), Some(&before));
}

#[test]
fn test_draw_failure_is_isolated_to_its_pass() {
    let mut first = pass("first", &[], &[]);
    first["objects"] = json!(["a", "b"]);
    let mut second = pass("second", &[], &[]);
    second["objects"] = json!(["b"]);
    let scene = json!({
        "objects": [
            {"name": "a", "kind": "screen_quad"},
            {"name": "b", "kind": "screen_quad"}
        ],
        "passes": [first, second]
    });

    let mut engine = engine();
    load(&mut engine, &scene).unwrap();
    engine.device_mut().fail_draws_for("a");

    let report = render(&mut engine, DEFAULT_VIEWPORT);
    assert!(!report.is_clean());
    assert_eq!(report.executed_passes, vec![0, 1]);
    assert_eq!(report.draw_calls, 1);
    assert_eq!(report.draw_errors.len(), 1);

    let error = &report.draw_errors[0];
    assert_eq!(error.pass, 0);
    assert_eq!(error.pass_name, "first");
    assert_eq!(error.object, "a");

    let commands = engine.device().commands();
    assert_eq!(draw_count(pass_commands(commands, "first")), 0);
    assert_eq!(draw_count(pass_commands(commands, "second")), 1);
    assert!(matches!(commands.last(), Some(Command::EndFrame)));

    // The failure does not stop the next frame
    engine.device_mut().take_commands();
    let report = render(&mut engine, DEFAULT_VIEWPORT);
    assert_eq!(report.executed_passes, vec![0, 1]);
}

#[test]
fn test_device_error_closes_frame_and_next_frame_renders() {
    let mut engine = engine();
    load(
        &mut engine,
        &scene(&["col"], vec![pass("scene", &[], &["col"]), pass("post", &["col"], &[])]),
    )
    .unwrap();
    render(&mut engine, DEFAULT_VIEWPORT);
    engine.device_mut().take_commands();

    engine.device_mut().fail_next_texture_bind();
    let err = engine
        .render_frame(&FrameInput::new(DEFAULT_VIEWPORT), &CameraInput::new())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Device);

    // The half-done frame is closed on the device
    let commands = engine.device_mut().take_commands();
    assert!(!engine.device().in_frame());
    assert!(matches!(
        &commands[commands.len() - 2..],
        [Command::EndRenderPass, Command::EndFrame]
    ));
    assert_eq!(engine.executor_state(), ExecutorState::FramePresent);

    let report = render(&mut engine, DEFAULT_VIEWPORT);
    assert!(report.is_clean());
    assert_eq!(report.executed_passes, vec![0, 1]);
    assert_eq!(report.trace.first(), Some(&ExecutorState::FrameStart));
    assert_eq!(report.trace.last(), Some(&ExecutorState::FramePresent));
}

#[test]
fn test_load_operations() {
    let mut main = pass("main", &["col"], &[]);
    let mut custom = pass("custom", &[], &[]);
    custom["settings"] = json!({"clear": {"color": [1.0, 0.0, 0.0, 1.0], "depth": 0.5}});
    let mut keep = pass("keep", &[], &["col2"]);
    keep["settings"] = json!({"clear": false});
    let passes = vec![
        pass("offscreen", &[], &["col"]),
        main,
        pass("overlay", &[], &[]),
        custom,
        keep,
    ];

    let mut engine = engine();
    load(&mut engine, &scene(&["col", "col2"], passes)).unwrap();
    render(&mut engine, DEFAULT_VIEWPORT);

    let load_ops = |label: &str| match pass_commands(engine.device().commands(), label)[0] {
        Command::BeginRenderPass {
            color_load,
            depth_load,
            ..
        } => (color_load, depth_load),
        ref other => panic!("unexpected command {other:?}"),
    };
    assert_eq!(
        load_ops("offscreen"),
        (LoadOp::Clear([0.0; 4]), DepthLoadOp::Clear(1.0))
    );
    assert_eq!(
        load_ops("main"),
        (LoadOp::Clear([0.1, 0.2, 0.3, 1.0]), DepthLoadOp::Clear(1.0))
    );
    assert_eq!(load_ops("overlay"), (LoadOp::Load, DepthLoadOp::Load));
    assert_eq!(
        load_ops("custom"),
        (LoadOp::Clear([1.0, 0.0, 0.0, 1.0]), DepthLoadOp::Clear(0.5))
    );
    assert_eq!(load_ops("keep"), (LoadOp::Load, DepthLoadOp::Load));
}

#[test]
fn test_frame_trace_and_submission_order() {
    let mut engine = engine();
    load(
        &mut engine,
        &scene(&["col"], vec![pass("post", &["col"], &[]), pass("scene", &[], &["col"])]),
    )
    .unwrap();
    let report = render(&mut engine, DEFAULT_VIEWPORT);

    use ExecutorState::*;
    assert_eq!(
        report.trace,
        vec![
            FrameStart,
            Idle,
            BindingTarget,
            BindingResources,
            Drawing,
            Idle,
            BindingTarget,
            BindingResources,
            Drawing,
            Idle,
            FramePresent,
        ]
    );
    assert_eq!(report.executed_passes, vec![1, 0]);

    let commands = engine.device().commands();
    assert_eq!(pass_labels(commands), vec!["scene", "post"]);
    assert!(matches!(commands.first(), Some(Command::BeginFrame { width: 800, height: 600 })));
}

#[test]
fn test_missing_resources_stop_frame_before_submission() {
    let description = SceneDescription::parse(
        &scene(&["col"], vec![pass("scene", &[], &["col"]), pass("post", &["col"], &[])])
            .to_string(),
        SceneFormat::Json,
        "test",
    )
    .unwrap();
    let mut device = HeadlessDevice::new();
    let mut scene = LoadedScene::build(&mut device, &loader(), description, (64, 64)).unwrap();
    let empty = RenderTargetManager::new((64, 64));

    let resources = FrameResources {
        passes: &scene.passes,
        order: &scene.graph.pass_order,
        registry: &scene.registry,
        shaders: &scene.shaders,
        meshes: &scene.meshes,
        targets: &empty,
        camera: &scene.registry.camera,
        clear_color: [0.0; 4],
    };
    let err = FrameExecutor::new()
        .execute(&mut device, &resources, &FrameInput::new((64, 64)))
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ResourceNotReady);
    match err {
        SceneError::ResourceNotReady { resource, pass } => {
            assert_eq!(resource, "col");
            assert_eq!(pass, Some(0));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(device.commands().is_empty());

    scene.release(&mut device);
    assert_eq!(device.live_texture_count(), 0);
}

#[rstest]
#[case::clamped_up(Vec2::new(0.0, 1000.0), 89.0)]
#[case::clamped_down(Vec2::new(0.0, -1000.0), -89.0)]
#[case::within_limit(Vec2::new(0.0, 40.0), 10.0)]
fn test_drag_pitch(#[case] delta: Vec2, #[case] expected: f32) {
    let mut engine = engine();
    load(&mut engine, &single_pass_scene(json!({}))).unwrap();
    engine
        .render_frame(&FrameInput::new(DEFAULT_VIEWPORT), &CameraInput::drag(delta))
        .unwrap();

    match engine.camera().unwrap().kind {
        CameraKind::Orbital(orbit) => assert_eq!(orbit.pitch, expected),
        other => panic!("unexpected camera {other:?}"),
    }
}

#[rstest]
#[case::orbital(json!({"orbital": {"distance": 5.0, "pitch": 120.0}}))]
#[case::free(json!({"free": {"pitch": -150.0}}))]
fn test_scene_pitch_clamped_on_load(#[case] kind: serde_json::Value) {
    let mut scene = single_pass_scene(json!({}));
    scene["camera"] = json!({ "kind": kind });

    let mut engine = engine();
    load(&mut engine, &scene).unwrap();

    let pitch = match engine.camera().unwrap().kind {
        CameraKind::Orbital(orbit) => orbit.pitch,
        CameraKind::Free(free) => free.pitch,
        other => panic!("unexpected camera {other:?}"),
    };
    assert_eq!(pitch.abs(), 89.0);
}

#[test]
fn test_scene_sensitivity_overrides_config() {
    let mut scene = single_pass_scene(json!({}));
    scene["camera"] = json!({"kind": {"orbital": {"distance": 5.0}}, "sensitivity": 1.0});

    let mut engine = engine();
    load(&mut engine, &scene).unwrap();
    engine
        .render_frame(
            &FrameInput::new(DEFAULT_VIEWPORT),
            &CameraInput::drag(Vec2::new(10.0, 0.0)),
        )
        .unwrap();

    match engine.camera().unwrap().kind {
        CameraKind::Orbital(orbit) => assert_eq!(orbit.yaw, 350.0),
        other => panic!("unexpected camera {other:?}"),
    }
}
