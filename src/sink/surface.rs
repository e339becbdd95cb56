//! Rendering surfaces
//!
//! A [`Surface`] is the host's text view or panel. [`MemorySurface`] keeps
//! the text in memory and backs the terminal host and the tests.

use thiserror::Error;

/// Errors raised by surface edits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("Surface is read-only")]
    ReadOnly,

    #[error("Invalid insert position {pos} (length {len})")]
    InvalidPosition { pos: usize, len: usize },
}

/// A renderable text surface owned by the host editor
pub trait Surface: Send {
    fn set_title(&mut self, title: &str);

    /// Apply a resolved syntax definition, or clear it
    fn set_syntax(&mut self, syntax: Option<&str>);

    /// Scratch surfaces never prompt to save
    fn set_scratch(&mut self, scratch: bool);

    fn set_read_only(&mut self, read_only: bool);

    fn is_read_only(&self) -> bool;

    /// Length of the content in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `text` at byte offset `pos`; fails while read-only
    fn insert(&mut self, pos: usize, text: &str) -> Result<(), SurfaceError>;

    /// Erase all content; fails while read-only
    fn clear(&mut self) -> Result<(), SurfaceError>;

    /// The full content
    fn text(&self) -> String;
}

/// Creates surfaces for output destinations
pub trait SurfaceFactory: Send + Sync {
    /// A new blank document
    fn new_document(&self) -> Box<dyn Surface>;

    /// A labeled output panel
    fn panel(&self, name: &str) -> Box<dyn Surface>;

    /// Bring a panel into view
    fn show_panel(&self, _name: &str) {}

    /// Resolve a syntax hint (e.g. "Diff") to a syntax definition
    fn find_syntax(&self, hint: &str) -> Option<String>;
}

/// In-memory surface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySurface {
    pub title: Option<String>,
    pub syntax: Option<String>,
    pub scratch: bool,
    pub read_only: bool,
    content: String,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Self::default()
        }
    }
}

impl Surface for MemorySurface {
    fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    fn set_syntax(&mut self, syntax: Option<&str>) {
        self.syntax = syntax.map(str::to_string);
    }

    fn set_scratch(&mut self, scratch: bool) {
        self.scratch = scratch;
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn len(&self) -> usize {
        self.content.len()
    }

    fn insert(&mut self, pos: usize, text: &str) -> Result<(), SurfaceError> {
        if self.read_only {
            return Err(SurfaceError::ReadOnly);
        }
        if pos > self.content.len() || !self.content.is_char_boundary(pos) {
            return Err(SurfaceError::InvalidPosition {
                pos,
                len: self.content.len(),
            });
        }
        self.content.insert_str(pos, text);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SurfaceError> {
        if self.read_only {
            return Err(SurfaceError::ReadOnly);
        }
        self.content.clear();
        Ok(())
    }

    fn text(&self) -> String {
        self.content.clone()
    }
}

/// Factory for [`MemorySurface`]s
///
/// Syntax hints resolve against `syntaxes` (paths such as
/// `Packages/Diff/Diff.tmLanguage`); with no known syntaxes every hint is
/// accepted unchanged.
#[derive(Debug, Clone, Default)]
pub struct MemorySurfaceFactory {
    syntaxes: Vec<String>,
}

impl MemorySurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_syntaxes<I, S>(syntaxes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            syntaxes: syntaxes.into_iter().map(Into::into).collect(),
        }
    }
}

impl SurfaceFactory for MemorySurfaceFactory {
    fn new_document(&self) -> Box<dyn Surface> {
        Box::new(MemorySurface::new())
    }

    fn panel(&self, _name: &str) -> Box<dyn Surface> {
        Box::new(MemorySurface::new())
    }

    fn find_syntax(&self, hint: &str) -> Option<String> {
        if self.syntaxes.is_empty() {
            return Some(hint.to_string());
        }

        let file_name = format!("{}.tmLanguage", hint);
        self.syntaxes
            .iter()
            .find(|s| {
                s.rsplit(['/', '\\'])
                    .next()
                    .is_some_and(|name| name == file_name)
            })
            .cloned()
    }
}
