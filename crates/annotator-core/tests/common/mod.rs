use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// `num_pages` pages of `width` x `height` points, each labelled "Page N"
pub fn sized_pdf(num_pages: u32, width: i64, height: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let page_ids: Vec<ObjectId> = (1..=num_pages)
        .map(|n| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 72.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", n))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            })
        })
        .collect();

    // MediaBox and Resources live on the Pages node and are inherited
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => num_pages as i64,
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => resources_id,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn page_operations(bytes: &[u8], page: u32) -> Vec<Operation> {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = doc.get_pages()[&page];
    Content::decode(&doc.get_page_content(page_id).unwrap())
        .unwrap()
        .operations
}

pub fn number(obj: &Object) -> f64 {
    match obj {
        Object::Real(v) => *v as f64,
        Object::Integer(v) => *v as f64,
        other => panic!("Expected number, got {:?}", other),
    }
}

/// Strings shown with `Tj` on a page, in drawing order
pub fn shown_text(bytes: &[u8], page: u32) -> Vec<String> {
    page_operations(bytes, page)
        .into_iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(s, _)) => Some(String::from_utf8_lossy(s).into_owned()),
            _ => None,
        })
        .collect()
}
