//! The live annotation collection and its undo history

use std::collections::BTreeMap;

use tracing::debug;

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use crate::history::History;

#[derive(Debug, Clone, Default)]
pub struct AnnotationModel {
    annotations: Vec<Annotation>,
    history: History<Vec<Annotation>>,
    gesture_open: bool,
}

impl AnnotationModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an annotation under a freshly generated id and return that id.
    pub fn add(&mut self, mut annotation: Annotation) -> AnnotationId {
        let id = AnnotationId::new();
        annotation.set_id(id);
        debug!(%id, page = annotation.page(), "Adding annotation");
        self.annotations.push(annotation);
        self.record();
        id
    }

    /// Merge `patch` into the annotation with `id`. Unknown ids are a no-op
    /// and return false.
    pub fn update(&mut self, id: AnnotationId, patch: &AnnotationPatch) -> bool {
        let Some(annotation) = self.annotations.iter_mut().find(|a| a.id() == id) else {
            return false;
        };
        annotation.apply(patch);
        self.record();
        true
    }

    pub fn delete(&mut self, id: AnnotationId) -> bool {
        if let Some(pos) = self.annotations.iter().position(|a| a.id() == id) {
            self.annotations.remove(pos);
            self.record();
            true
        } else {
            false
        }
    }

    /// Empty the collection and reset history to one empty snapshot.
    /// Not undoable.
    pub fn clear_all(&mut self) {
        debug!(count = self.annotations.len(), "Clearing all annotations");
        self.annotations.clear();
        self.history.reset(Vec::new());
        self.gesture_open = false;
    }

    /// Restore the previous snapshot. Returns false at the first snapshot.
    pub fn undo(&mut self) -> bool {
        // An open gesture is committed first so undo steps back over it as a whole
        self.end_gesture();
        match self.history.undo() {
            Some(snapshot) => {
                self.annotations = snapshot.clone();
                true
            }
            None => false,
        }
    }

    /// Suspend snapshotting until `end_gesture`, so a whole drag is one undo step.
    pub fn begin_gesture(&mut self) {
        self.gesture_open = true;
    }

    /// Close the gesture and record at most one snapshot for it.
    /// Returns true if a snapshot was recorded.
    pub fn end_gesture(&mut self) -> bool {
        if !self.gesture_open {
            return false;
        }
        self.gesture_open = false;
        self.history.push(&self.annotations)
    }

    pub fn in_gesture(&self) -> bool {
        self.gesture_open
    }

    fn record(&mut self) {
        if !self.gesture_open {
            self.history.push(&self.annotations);
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id() == id)
    }

    pub fn on_page(&self, page: u32) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.page() == page)
    }

    /// Annotations keyed by page, each page's list in insertion order
    pub fn grouped_by_page(&self) -> BTreeMap<u32, Vec<&Annotation>> {
        group_by_page(&self.annotations)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_index(&self) -> usize {
        self.history.index()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.annotations)
    }

    /// Replace the collection from JSON. History restarts from the loaded state.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let annotations: Vec<Annotation> = serde_json::from_str(json)?;
        Ok(Self {
            history: History::new(annotations.clone()),
            annotations,
            gesture_open: false,
        })
    }
}

pub(crate) fn group_by_page(annotations: &[Annotation]) -> BTreeMap<u32, Vec<&Annotation>> {
    let mut by_page: BTreeMap<u32, Vec<&Annotation>> = BTreeMap::new();
    for annotation in annotations {
        by_page.entry(annotation.page()).or_default().push(annotation);
    }
    by_page
}
