mod common;

use common::{TestResult, runtime, scripted_session};
use pgfkit::driver::{render_markup, render_online_with, render_to_file};
use pgfkit::online::{OnlineError, ScriptedChannel};
use pgfkit::render::{PathNode, Scene, Style, TextNode};
use pgfkit::types::{BoundingBox, Color, EngineProfile, Point, RenderOptions, Size};
use pgfkit::{PipelineError, SceneDescription};

fn sample_scene() -> Scene {
    Scene::new(Size::new(100.0, 50.0))
        .with_node(
            PathNode::rectangle(&BoundingBox::new(5.0, 5.0, 95.0, 45.0))
                .with_style(Style::stroked(Color::rgb(0, 0, 255))),
        )
        .with_node(TextNode::new("static").at(Point::new(10.0, 20.0)))
}

#[test]
fn test_fragment_is_bare_picture() -> TestResult {
    let options = RenderOptions::new(EngineProfile::latex(), Size::zero());
    let markup = render_markup(&options, &sample_scene())?;
    assert!(markup.starts_with(r"\begin{pgfpicture}"));
    assert!(!markup.contains(r"\documentclass"));
    assert!(markup.contains(r"\pgfpoint{100bp}{50bp}"));
    Ok(())
}

#[test]
fn test_standalone_wraps_with_profile_boilerplate() -> TestResult {
    let options = RenderOptions::new(EngineProfile::context(), Size::zero()).with_standalone(true);
    let doc = render_markup(&options, &sample_scene())?;
    let lines: Vec<&str> = doc.lines().collect();
    assert_eq!(lines[0], r"\usemodule[pgf]");
    assert!(doc.contains(r"\definepapersize[pgfkit][width=100bp,height=50bp]"));
    let start = lines.iter().position(|l| *l == r"\starttext").ok_or("no \\starttext")?;
    let picture = lines.iter().position(|l| *l == r"\startpgfpicture").ok_or("no picture")?;
    assert!(start < picture);
    assert_eq!(lines.last(), Some(&r"\stoptext"));
    Ok(())
}

#[test]
fn test_page_size_round_trip() -> TestResult {
    let profile = EngineProfile::latex().with_page_size_template("paperwidth=${w}bp,paperheight=${h}bp");
    let options = RenderOptions::new(profile, Size::new(100.0, 50.0)).with_standalone(true);
    let doc = render_markup(&options, &sample_scene())?;
    assert!(doc.lines().any(|l| l == "paperwidth=100bp,paperheight=50bp"));
    Ok(())
}

#[test]
fn test_compact_output_is_one_line() -> TestResult {
    let options = RenderOptions::new(EngineProfile::plain_tex(), Size::zero()).with_readable(false);
    let markup = render_markup(&options, &sample_scene())?;
    assert_eq!(markup.lines().count(), 1);
    assert!(markup.starts_with(r"\pgfpicture"));
    Ok(())
}

#[test]
fn test_render_to_file_writes_markup() -> TestResult {
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("scene.tex");
    let options = RenderOptions::new(EngineProfile::plain_tex(), Size::zero());
    runtime().block_on(render_to_file(&options, &common::quick_config(), &sample_scene(), &target))?;
    let written = std::fs::read_to_string(&target)?;
    assert!(written.contains(r"\pgftext[left,base,at={\pgfpoint{10bp}{20bp}}]{static}"));
    Ok(())
}

#[test]
fn test_static_description_renders() -> TestResult {
    let desc = SceneDescription::from_json(
        r##"{ "width": 40, "height": 20, "items": [
            { "type": "path", "points": [[0,0],[40,20]], "stroke": "#00ff00" },
            { "type": "text", "content": "hi", "at": [2, 2] }
        ] }"##,
    )?;
    assert!(!desc.needs_measurement());
    let options = RenderOptions::new(EngineProfile::latex(), Size::zero());
    let markup = render_markup(&options, &desc.static_scene()?)?;
    assert!(markup.contains(r"\definecolor{pgfkit00FF00}{rgb}{0,1,0}"));
    assert!(markup.contains(r"\pgfpoint{40bp}{20bp}"));
    Ok(())
}

fn labelled_description() -> SceneDescription {
    SceneDescription::from_json(
        r#"{ "padding": 2, "items": [
            { "type": "label", "content": "Alpha", "at": [0, 0], "frame": { "padding": 1 } },
            { "type": "row", "at": [0, -20], "gap": 2, "labels": [{ "content": "x" }, { "content": "y" }] }
        ] }"#,
    )
    .expect("valid description")
}

#[test]
fn test_online_markup_uses_measured_sizes() -> TestResult {
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("labels.tex");
    let channel = ScriptedChannel::new()
        .reply_measurement(30.0, 7.0, 2.0)
        .reply_measurement(5.0, 5.0, 0.0)
        .reply_measurement(6.0, 5.0, 0.0);
    let log = channel.log();
    let desc = labelled_description();

    let outcome = runtime().block_on(async {
        let session = scripted_session(channel).await;
        let options = RenderOptions::new(EngineProfile::plain_tex(), Size::zero());
        render_online_with(session, &options, move |m| desc.build(m), &target).await
    })?;

    assert_eq!(outcome.measurements, 3);
    assert_eq!(log.measured_contents(), vec!["Alpha", "x", "y"]);
    assert_eq!(log.shutdowns(), 1);
    let markup = std::fs::read_to_string(&target)?;
    // Content spans x in [-1, 31] (framed label) and y in [-20, 8]; fitted with 2bp padding.
    assert!(markup.contains(r"\pgfpathrectangle{\pgfpointorigin}{\pgfpoint{36bp}{32bp}}"));
    assert!(markup.contains("{Alpha}"));
    Ok(())
}

#[test]
fn test_online_pdf_reuses_session() -> TestResult {
    let dir = tempfile::tempdir()?;
    let workdir = tempfile::tempdir()?;
    std::fs::write(workdir.path().join("pgfkit.pdf"), b"%PDF-1.5 scripted")?;
    let target = dir.path().join("out").join("labels.pdf");
    let channel = ScriptedChannel::new()
        .reply_measurement(30.0, 7.0, 2.0)
        .reply_measurement(5.0, 5.0, 0.0)
        .reply_measurement(6.0, 5.0, 0.0)
        .with_working_dir(workdir.path());
    let log = channel.log();
    let desc = labelled_description();

    runtime().block_on(async {
        let session = scripted_session(channel).await;
        let options = RenderOptions::new(EngineProfile::plain_tex(), Size::zero());
        render_online_with(session, &options, move |m| desc.build(m), &target).await
    })?;

    assert_eq!(std::fs::read(&target)?, b"%PDF-1.5 scripted");
    let lines = log.lines();
    // Page size and picture follow the measurements; the document ends once.
    let last_measure = lines.iter().rposition(|l| l.contains("!PGF-PARSE:")).ok_or("no measurement")?;
    let page = lines.iter().position(|l| l.starts_with(r"\pdfpagewidth=")).ok_or("no page size")?;
    assert!(last_measure < page);
    assert_eq!(lines.iter().filter(|l| *l == r"\bye").count(), 1);
    assert_eq!(lines.last().map(String::as_str), Some(r"\bye"));
    Ok(())
}

#[test]
fn test_missing_pdf_surfaces_engine_log() -> TestResult {
    let dir = tempfile::tempdir()?;
    let workdir = tempfile::tempdir()?;
    let channel = ScriptedChannel::new()
        .with_working_dir(workdir.path())
        .on_shutdown(["! Emergency stop.", "No pages of output."]);
    let target = dir.path().join("empty.pdf");

    let result = runtime().block_on(async {
        let session = scripted_session(channel).await;
        let options = RenderOptions::new(EngineProfile::plain_tex(), Size::new(10.0, 10.0));
        render_online_with(session, &options, |_| Ok(Scene::new(Size::new(10.0, 10.0))), &target).await
    });

    let err = match result {
        Err(err) => err,
        Ok(_) => return Err("render unexpectedly succeeded".into()),
    };
    assert!(matches!(err, PipelineError::Online(OnlineError::EngineReportedError { .. })));
    assert!(err.log().is_some_and(|l| l.contains("No pages of output.")));
    assert!(!target.exists());
    Ok(())
}

#[test]
fn test_builder_failure_skips_output() -> TestResult {
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("never.tex");
    let channel = ScriptedChannel::new().reply(["!PGF-PARSE:garbage"]);
    let log = channel.log();
    let desc = labelled_description();

    let result = runtime().block_on(async {
        let session = scripted_session(channel).await;
        let options = RenderOptions::new(EngineProfile::plain_tex(), Size::zero());
        render_online_with(session, &options, move |m| desc.build(m), &target).await
    });

    assert!(matches!(result, Err(PipelineError::Online(OnlineError::ParseAmbiguous { .. }))));
    assert_eq!(log.shutdowns(), 1);
    assert!(!target.exists());
    Ok(())
}
