//! Document state as the sync engine sees it.

use quire_common::DocumentId;
use quire_editor_core::normalize;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The editable parts of a document.
///
/// Used both for the live tracked state and for the "last saved" reference
/// that dirtiness is measured against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditableState {
    pub title: SmolStr,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<SmolStr>,
}

impl EditableState {
    pub fn new(title: impl Into<SmolStr>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Copy of this state with the content normalized, as it would be saved.
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.clone(),
            content: normalize(&self.content).into_owned(),
            tags: self.tags.clone(),
        }
    }

    /// True if saving `self` would change `saved`.
    pub fn differs_from(&self, saved: &EditableState) -> bool {
        self.title != saved.title
            || self.tags != saved.tags
            || normalize(&self.content) != normalize(&saved.content)
    }
}

/// Payload of a save or create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub title: SmolStr,
    pub content: String,
    pub tags: Vec<SmolStr>,
}

impl From<EditableState> for DocumentUpdate {
    fn from(state: EditableState) -> Self {
        Self {
            title: state.title,
            content: state.content,
            tags: state.tags,
        }
    }
}

impl From<DocumentUpdate> for EditableState {
    fn from(update: DocumentUpdate) -> Self {
        Self {
            title: update.title,
            content: update.content,
            tags: update.tags,
        }
    }
}

/// A document as returned by persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: DocumentId,
    pub title: SmolStr,
    pub content: String,
    pub tags: Vec<SmolStr>,
    /// Last modification, milliseconds since the unix epoch.
    pub updated_at: i64,
}

impl RemoteDocument {
    pub fn state(&self) -> EditableState {
        EditableState {
            title: self.title.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Values that take precedence over the tracked state for one flush.
///
/// `markdown` and `content` both carry the body text. When both are set,
/// `markdown` wins: it is what rich-text surfaces export, while `content`
/// may lag behind their internal model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlushOverride {
    pub markdown: Option<String>,
    pub content: Option<String>,
    pub title: Option<SmolStr>,
    pub tags: Option<Vec<SmolStr>>,
}

impl FlushOverride {
    pub fn markdown(markdown: impl Into<String>) -> Self {
        Self {
            markdown: Some(markdown.into()),
            ..Default::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<SmolStr>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn tags(mut self, tags: Vec<SmolStr>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Apply the override on top of `state`.
    pub fn apply(self, mut state: EditableState) -> EditableState {
        if let Some(body) = self.markdown.or(self.content) {
            state.content = body;
        }
        if let Some(title) = self.title {
            state.title = title;
        }
        if let Some(tags) = self.tags {
            state.tags = tags;
        }
        state
    }
}
