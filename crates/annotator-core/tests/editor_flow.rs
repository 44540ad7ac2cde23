//! End-to-end editing sessions: load, render, annotate, export

mod common;

use annotator_core::{
    Annotation, AnnotationError, AnnotationPatch, CaptureFormat, EditorConfig, EditorSession, PaperRasterizer,
    Point, SignatureContent, SignatureImage,
};
use common::{init_tracing, number, page_operations, shown_text, sized_pdf};
use lopdf::{Document, Object};
use pretty_assertions::assert_eq;

fn session_at_scale(scale: f64) -> EditorSession<PaperRasterizer> {
    let mut config = EditorConfig::default();
    config.view.initial_scale = scale;
    EditorSession::new(PaperRasterizer, config)
}

fn page_snapshot(doc: &Document, page: u32) -> (String, Vec<u8>) {
    let id = doc.get_pages()[&page];
    let dict = doc.get_object(id).and_then(Object::as_dict).unwrap();
    (format!("{:?}", dict), doc.get_page_content(id).unwrap())
}

#[tokio::test]
async fn export_without_annotations_preserves_document() {
    init_tracing();
    let source = sized_pdf(3, 612, 792);
    let mut editor = session_at_scale(1.5);
    editor.load(source.clone()).unwrap();
    editor.render_current().await.unwrap();

    let exported = editor.export().unwrap();
    let original = Document::load_mem(&source).unwrap();
    let output = Document::load_mem(&exported.bytes).unwrap();
    assert_eq!(output.get_pages().len(), 3);
    for page in 1..=3 {
        assert_eq!(page_snapshot(&output, page), page_snapshot(&original, page));
    }
}

#[tokio::test]
async fn sign_here_lands_on_page_one() {
    init_tracing();
    let mut editor = session_at_scale(1.0);
    editor.load(sized_pdf(2, 600, 800)).unwrap();
    editor.render_current().await.unwrap();
    assert_eq!(editor.display_dimensions().map(|s| (s.width, s.height)), Some((600.0, 800.0)));

    let id = editor.add_text().unwrap();
    editor.update(
        id,
        &AnnotationPatch {
            text: Some("Sign here".to_string()),
            x: Some(100.0),
            y: Some(700.0),
            font_size: Some(16.0),
            editing: Some(false),
            ..AnnotationPatch::default()
        },
    );

    let source = sized_pdf(2, 600, 800);
    let exported = editor.export().unwrap().clone();
    assert!(exported.skipped.is_empty());

    let ops = page_operations(&exported.bytes, 1);
    let tj = ops
        .iter()
        .position(|op| {
            op.operator == "Tj" && matches!(op.operands.first(), Some(Object::String(s, _)) if s == b"Sign here")
        })
        .expect("Sign here is drawn");
    let td = ops[..tj]
        .iter()
        .rev()
        .find(|op| op.operator == "Td")
        .expect("text position");
    let (x, y) = (number(&td.operands[0]), number(&td.operands[1]));
    assert!((x - 100.0).abs() < 0.01, "x = {}", x);
    // 800 - 700 - 16 * 0.8
    assert!((y - 87.2).abs() < 0.01, "y = {}", y);

    let original = Document::load_mem(&source).unwrap();
    let output = Document::load_mem(&exported.bytes).unwrap();
    assert_eq!(page_snapshot(&output, 2), page_snapshot(&original, 2));
}

#[tokio::test]
async fn only_annotated_pages_are_touched() {
    init_tracing();
    let source = sized_pdf(4, 612, 792);
    let mut editor = session_at_scale(1.0);
    editor.load(source.clone()).unwrap();

    for page in [1, 1, 2, 3] {
        editor.go_to_page(page);
        editor.render_current().await.unwrap();
        editor.add_text().unwrap();
    }

    let exported = editor.export().unwrap().clone();
    let original = Document::load_mem(&source).unwrap();
    let output = Document::load_mem(&exported.bytes).unwrap();

    for page in 1..=3 {
        assert_ne!(page_snapshot(&output, page), page_snapshot(&original, page), "page {}", page);
    }
    assert_eq!(page_snapshot(&output, 4), page_snapshot(&original, 4));

    let labels = |page| {
        shown_text(&exported.bytes, page)
            .into_iter()
            .filter(|s| s == "Double-click to edit")
            .count()
    };
    assert_eq!((labels(1), labels(2), labels(3), labels(4)), (2, 1, 1, 0));
}

#[tokio::test]
async fn malformed_signature_image_is_skipped() {
    init_tracing();
    let mut editor = session_at_scale(1.0);
    editor.load(sized_pdf(1, 612, 792)).unwrap();
    editor.render_current().await.unwrap();

    let first = editor.add_text().unwrap();
    editor.update(first, &AnnotationPatch::text("first"));
    let broken = editor.add_signature().unwrap();
    editor.sign(
        broken,
        SignatureContent::Image(SignatureImage::from_png(b"\x89PNG garbage".to_vec())),
    );
    let third = editor.add_text().unwrap();
    editor.update(third, &AnnotationPatch::text("third"));

    let exported = editor.export().unwrap().clone();
    assert_eq!(exported.skipped.len(), 1);
    assert_eq!(exported.skipped[0].id, broken);
    assert!(matches!(exported.skipped[0].reason, AnnotationError::InvalidImage(_)));

    let shown = shown_text(&exported.bytes, 1);
    assert!(shown.contains(&"first".to_string()));
    assert!(shown.contains(&"third".to_string()));
    // Annotations survive a partial export
    assert_eq!(editor.annotations().len(), 3);
    assert_eq!(editor.errors().export, None);
}

#[tokio::test]
async fn cleared_pad_saves_empty_signature() {
    init_tracing();
    let mut editor = session_at_scale(1.0);
    editor.load(sized_pdf(1, 612, 792)).unwrap();
    editor.render_current().await.unwrap();
    let id = editor.add_signature().unwrap();

    let mut pad = editor.signature_pad();
    pad.pointer_down(Point::new(10.0, 10.0));
    pad.pointer_move(Point::new(120.0, 80.0));
    pad.pointer_up();
    pad.clear();

    let strokes = pad.save(CaptureFormat::Strokes).unwrap();
    assert_eq!(strokes, SignatureContent::Strokes(Vec::new()));

    let image = pad.save(CaptureFormat::Image).unwrap();
    let SignatureContent::Image(png) = &image else {
        panic!("Expected image content");
    };
    let decoded = image::load_from_memory(&png.png).unwrap().to_rgba8();
    assert!(decoded.pixels().all(|p| p[3] == 0));

    editor.sign(id, strokes);
    let exported = editor.export().unwrap();
    let ops = page_operations(&exported.bytes, 1);
    assert!(!ops.iter().any(|op| op.operator == "S"));
}

#[tokio::test]
async fn undo_walks_back_to_empty_and_stops() {
    init_tracing();
    let mut editor = session_at_scale(1.0);
    editor.load(sized_pdf(1, 612, 792)).unwrap();
    editor.render_current().await.unwrap();

    let a = editor.add_text().unwrap();
    let before_edit = editor.annotations().to_vec();
    editor.update(a, &AnnotationPatch::text("edited"));
    assert!(editor.undo());
    assert_eq!(editor.annotations(), before_edit.as_slice());

    assert!(editor.undo());
    assert!(editor.annotations().is_empty());
    assert!(!editor.undo());
    assert!(editor.annotations().is_empty());
}

#[tokio::test]
async fn zoom_without_rerender_keeps_export_mapping() {
    init_tracing();
    let mut editor = session_at_scale(1.0);
    editor.load(sized_pdf(1, 600, 800)).unwrap();
    editor.render_current().await.unwrap();
    let id = editor.add_text().unwrap();
    editor.update(id, &AnnotationPatch::moved_to(300.0, 400.0));

    let at_unit = shown_position(&editor.export().unwrap().bytes);

    // Zoom is changed but the page is not rendered again
    editor.zoom_in();
    let after_zoom = shown_position(&editor.export().unwrap().bytes);
    assert_eq!(at_unit, after_zoom);

    // Once rendered at the new scale, the stored pixel anchor maps elsewhere
    editor.render_current().await.unwrap();
    let rerendered = shown_position(&editor.export().unwrap().bytes);
    assert!(rerendered.0 < at_unit.0);
}

fn shown_position(bytes: &[u8]) -> (f64, f64) {
    let ops = page_operations(bytes, 1);
    let td = ops
        .iter()
        .rev()
        .find(|op| op.operator == "Td")
        .expect("overlay text position");
    (number(&td.operands[0]), number(&td.operands[1]))
}

#[tokio::test]
async fn annotations_serialize_with_type_tags() {
    let mut editor = session_at_scale(1.0);
    editor.load(sized_pdf(1, 612, 792)).unwrap();
    editor.render_current().await.unwrap();
    editor.add_text().unwrap();
    editor.add_signature().unwrap();

    let json = editor.model().to_json().unwrap();
    let restored: Vec<Annotation> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.as_slice(), editor.annotations());
    assert!(json.contains(r#""type":"Text""#));
    assert!(json.contains(r#""type":"Signature""#));
}
