//! Page geometry read from the page tree

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

use crate::coords::Size;

/// US Letter in points, used when no MediaBox is found
pub const DEFAULT_PAGE_SIZE: Size = Size {
    width: 612.0,
    height: 792.0,
};

/// Pages nest rarely more than a few levels; this bounds cyclic Parent links.
const MAX_INHERITANCE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PageGeometry {
    /// 1-indexed
    pub page: u32,
    /// MediaBox size in points, unrotated
    pub size: Size,
    /// 0, 90, 180 or 270
    pub rotation: i32,
}

impl PageGeometry {
    pub fn from_document(doc: &Document, page: u32) -> Result<Self, String> {
        let pages = doc.get_pages();
        let page_id = pages
            .get(&page)
            .ok_or_else(|| format!("Page {} not found", page))?;
        Self::from_page_id(doc, page, *page_id)
    }

    pub(crate) fn from_page_id(doc: &Document, page: u32, page_id: ObjectId) -> Result<Self, String> {
        let page_dict = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|_| format!("Page {} is not a dictionary", page))?;

        let size = match inherited(doc, page_dict, b"MediaBox") {
            Some(obj) => {
                let array = resolve(doc, obj)
                    .as_array()
                    .map_err(|_| format!("Page {} MediaBox is not an array", page))?;
                let [x1, y1, x2, y2] = parse_box_array(doc, array)?;
                Size::new((x2 - x1).abs(), (y2 - y1).abs())
            }
            None => DEFAULT_PAGE_SIZE,
        };

        let rotation = inherited(doc, page_dict, b"Rotate")
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .map(|angle| normalize_rotation(angle as i32))
            .unwrap_or(0);

        Ok(Self {
            page,
            size,
            rotation,
        })
    }

    /// Geometry of every page in order
    pub fn all_from_document(doc: &Document) -> Result<Vec<Self>, String> {
        doc.get_pages()
            .into_iter()
            .map(|(page, id)| Self::from_page_id(doc, page, id))
            .collect()
    }
}

/// Look up a page attribute, walking up `Parent` links for inheritable keys.
pub(crate) fn inherited<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

/// Follow one level of indirection
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn parse_box_array(doc: &Document, array: &[Object]) -> Result<[f64; 4], String> {
    if array.len() != 4 {
        return Err("MediaBox must have 4 elements".to_string());
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match resolve(doc, obj) {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return Err(format!("MediaBox element {} is not a number", i)),
        };
    }

    Ok(result)
}

fn normalize_rotation(angle: i32) -> i32 {
    // Off-grid angles snap down to the nearest quarter turn
    let normalized = angle.rem_euclid(360);
    normalized - normalized % 90
}
