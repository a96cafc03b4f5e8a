//! The input side of the measurement protocol: what gets written to the
//! engine for each query.

use pgfkit_types::{Dialect, MeasurementRequest};

/// Marker that starts every measurement report line.
pub const MEASURE_TAG: &str = "!PGF-PARSE:";

/// Dimension of scratch box 0 converted from TeX points to big points. The
/// engine still prints a `pt` suffix; the numeric value is in bp.
fn bp_dimension(register: &str) -> String {
    format!(r"\the\dimexpr\{register}0*7200/7227\relax")
}

/// Lines that typeset `request` into box 0 and make the engine report its
/// width, height and depth on a single tagged line.
pub fn measurement_fragment(dialect: Dialect, request: &MeasurementRequest) -> Vec<String> {
    // One protocol unit per line: embedded newlines would only become spaces anyway.
    let content = request.content.replace(['\r', '\n'], " ");
    let setbox = match dialect {
        Dialect::LaTeX | Dialect::PlainTeX => format!(r"\setbox0=\hbox{{{content}}}"),
        Dialect::ConTeXt => format!(r"\setbox0\hbox{{{content}}}"),
    };
    let report = format!(
        r"\immediate\write16{{{tag}{w},{h},{d}}}",
        tag = MEASURE_TAG,
        w = bp_dimension("wd"),
        h = bp_dimension("ht"),
        d = bp_dimension("dp"),
    );
    vec![setbox, report]
}

/// True if `line` is the report trigger written by [`measurement_fragment`].
pub fn is_report_trigger(line: &str) -> bool {
    line.contains(r"\write16{") && line.contains(MEASURE_TAG)
}

/// Splits multi-line boilerplate into the individual lines written to the engine.
pub fn boilerplate_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|l| !l.trim().is_empty())
}
