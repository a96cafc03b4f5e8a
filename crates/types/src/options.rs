use crate::geometry::Size;
use crate::profile::EngineProfile;
use std::path::Path;

/// What the document driver should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// PGF markup, written as text.
    #[default]
    Markup,
    /// A PDF produced by running the engine over a standalone document.
    Pdf,
}

impl OutputFormat {
    /// `.pdf` targets produce PDFs; everything else is written as markup.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => OutputFormat::Pdf,
            _ => OutputFormat::Markup,
        }
    }
}

/// Per-render configuration. Read-only for the duration of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub profile: EngineProfile,
    pub size: Size,
    /// Pretty-print the markup (one command per line, indented).
    pub readable: bool,
    /// Wrap the markup in the profile's preamble and document boilerplate.
    pub standalone: bool,
}

impl RenderOptions {
    pub fn new(profile: EngineProfile, size: Size) -> Self {
        Self { profile, size, readable: true, standalone: false }
    }

    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    pub fn with_standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }
}
