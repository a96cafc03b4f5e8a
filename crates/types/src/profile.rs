//! Engine profiles: everything needed to start a typesetting engine and wrap
//! markup into a complete document for one dialect.

use crate::dialect::Dialect;
use crate::error::ProfileError;
use crate::geometry::Size;
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the rounded page width in [`EngineProfile::page_size`].
pub const WIDTH_PLACEHOLDER: &str = "${w}";
/// Placeholder replaced by the rounded page height in [`EngineProfile::page_size`].
pub const HEIGHT_PLACEHOLDER: &str = "${h}";

const DEFAULT_JOBNAME: &str = "pgfkit";

/// Immutable engine configuration.
///
/// Profiles are compared and hashed by value so they can key caches and
/// session pools. Use the `with_*` methods to derive a modified copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineProfile {
    pub dialect: Dialect,
    pub command: String,
    pub arguments: Vec<String>,
    /// Job name handed to the engine; the PDF artifact is `<jobname>.pdf`.
    pub jobname: String,
    pub preamble: String,
    /// Page geometry commands with `${w}` and `${h}` placeholders in big points.
    pub page_size_template: String,
    pub begin_document: String,
    pub end_document: String,
}

impl EngineProfile {
    pub fn latex() -> Self {
        Self {
            dialect: Dialect::LaTeX,
            command: "pdflatex".to_string(),
            arguments: vec!["-interaction=scrollmode".to_string()],
            jobname: DEFAULT_JOBNAME.to_string(),
            preamble: [
                r"\documentclass{article}",
                r"\usepackage{pgfcore}",
                r"\pagestyle{empty}",
                r"\setlength{\parindent}{0pt}",
            ]
            .join("\n"),
            page_size_template: [
                r"\pdfpagewidth=${w}bp",
                r"\pdfpageheight=${h}bp",
                r"\hoffset=-1in \voffset=-1in",
                r"\oddsidemargin=0pt \evensidemargin=0pt \topmargin=0pt",
                r"\headheight=0pt \headsep=0pt \topskip=0pt",
                r"\textwidth=${w}bp \textheight=${h}bp",
                // Online sessions emit this after \begin{document}, where the
                // text block dimensions are already frozen into these two.
                r"\hsize=${w}bp \vsize=${h}bp",
            ]
            .join("\n"),
            begin_document: r"\begin{document}".to_string(),
            end_document: r"\end{document}".to_string(),
        }
    }

    pub fn context() -> Self {
        Self {
            dialect: Dialect::ConTeXt,
            command: "context".to_string(),
            arguments: vec!["--pipe".to_string(), "--once".to_string()],
            jobname: DEFAULT_JOBNAME.to_string(),
            preamble: [r"\usemodule[pgf]", r"\setuppagenumbering[location=]"].join("\n"),
            page_size_template: [
                r"\definepapersize[pgfkit][width=${w}bp,height=${h}bp]",
                r"\setuppapersize[pgfkit][pgfkit]",
                r"\setuplayout[topspace=0bp,backspace=0bp,header=0bp,footer=0bp,width=${w}bp,height=${h}bp]",
            ]
            .join("\n"),
            begin_document: r"\starttext".to_string(),
            end_document: r"\stoptext".to_string(),
        }
    }

    pub fn plain_tex() -> Self {
        Self {
            dialect: Dialect::PlainTeX,
            command: "pdftex".to_string(),
            arguments: vec!["-interaction=scrollmode".to_string()],
            jobname: DEFAULT_JOBNAME.to_string(),
            preamble: [r"\pdfoutput=1", r"\input pgfcore", r"\nopagenumbers", r"\parindent=0pt"].join("\n"),
            page_size_template: [
                r"\pdfpagewidth=${w}bp \pdfpageheight=${h}bp",
                r"\hoffset=-1in \voffset=-1in \topskip=0pt",
                r"\hsize=${w}bp \vsize=${h}bp \advance\vsize by 2pt",
            ]
            .join("\n"),
            begin_document: String::new(),
            end_document: r"\bye".to_string(),
        }
    }

    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::LaTeX => Self::latex(),
            Dialect::ConTeXt => Self::context(),
            Dialect::PlainTeX => Self::plain_tex(),
        }
    }

    /// Interpolates the page-size template with `size` rounded to whole big points.
    pub fn page_size(&self, size: Size) -> String {
        let (w, h) = size.rounded();
        self.page_size_template
            .replace(WIDTH_PLACEHOLDER, &w.to_string())
            .replace(HEIGHT_PLACEHOLDER, &h.to_string())
    }

    /// The engine's job-name argument in the syntax its command line expects.
    pub fn jobname_argument(&self) -> String {
        match self.dialect {
            Dialect::ConTeXt => format!("--jobname={}", self.jobname),
            Dialect::LaTeX | Dialect::PlainTeX => format!("-jobname={}", self.jobname),
        }
    }

    /// Full argument list: configured arguments followed by the job name.
    pub fn invocation_arguments(&self) -> Vec<String> {
        let mut args = self.arguments.clone();
        args.push(self.jobname_argument());
        args
    }

    /// File name of the PDF the engine leaves in its working directory.
    pub fn artifact_name(&self) -> String {
        format!("{}.pdf", self.jobname)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.command.trim().is_empty() {
            return Err(ProfileError::Invalid("command must not be empty".to_string()));
        }
        if self.jobname.is_empty() || self.jobname.contains(['/', '\\', ' ']) {
            return Err(ProfileError::Invalid(format!(
                "jobname '{}' must be a plain file stem",
                self.jobname
            )));
        }
        Ok(())
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_jobname(mut self, jobname: impl Into<String>) -> Self {
        self.jobname = jobname.into();
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn with_page_size_template(mut self, template: impl Into<String>) -> Self {
        self.page_size_template = template.into();
        self
    }
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self::latex()
    }
}

/// A partial profile, as read from a user-supplied override file. Fields left
/// out fall back to the built-in profile of the chosen dialect.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileOverride {
    pub dialect: Option<Dialect>,
    pub command: Option<String>,
    pub arguments: Option<Vec<String>>,
    pub jobname: Option<String>,
    pub preamble: Option<String>,
    pub page_size_template: Option<String>,
    pub begin_document: Option<String>,
    pub end_document: Option<String>,
}

impl ProfileOverride {
    /// Applies the override on top of the built-in profile for its dialect,
    /// or for `fallback` when the override does not name one.
    pub fn apply(self, fallback: Dialect) -> Result<EngineProfile, ProfileError> {
        let base = EngineProfile::for_dialect(self.dialect.unwrap_or(fallback));
        let profile = EngineProfile {
            dialect: base.dialect,
            command: self.command.unwrap_or(base.command),
            arguments: self.arguments.unwrap_or(base.arguments),
            jobname: self.jobname.unwrap_or(base.jobname),
            preamble: self.preamble.unwrap_or(base.preamble),
            page_size_template: self.page_size_template.unwrap_or(base.page_size_template),
            begin_document: self.begin_document.unwrap_or(base.begin_document),
            end_document: self.end_document.unwrap_or(base.end_document),
        };
        profile.validate()?;
        Ok(profile)
    }
}
