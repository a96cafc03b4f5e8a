use super::event::LogEvent;
use pgfkit_types::{BoundingBox, Dialect, MeasurementResult};
use std::collections::VecDeque;

/// Lines collected for one error before it is reported without a context line.
const MAX_ERROR_LINES: usize = 8;

const TEX_WARNING_PREFIXES: &[&str] = &[
    "LaTeX Warning:",
    "LaTeX Font Warning:",
    "Overfull \\hbox",
    "Underfull \\hbox",
    "Overfull \\vbox",
    "Underfull \\vbox",
    "Missing character:",
    "pdfTeX warning",
];

#[derive(Debug, Default)]
enum State {
    #[default]
    Scanning,
    /// Inside a TeX error diagnostic, waiting for its context line.
    InError { lines: Vec<String> },
}

/// Line-by-line classifier for engine output.
///
/// Most lines classify on their own. TeX errors span several lines (the `!`
/// message, optional help, then an `l.<n>` or `<*>` context line), so the
/// classifier collects them and emits a single [`LogEvent::FatalError`].
#[derive(Debug)]
pub struct LineClassifier {
    dialect: Dialect,
    tag: String,
    state: State,
}

impl LineClassifier {
    pub fn new(dialect: Dialect, tag: &str) -> Self {
        Self { dialect, tag: tag.to_string(), state: State::Scanning }
    }

    pub fn in_error(&self) -> bool {
        matches!(self.state, State::InError { .. })
    }

    pub fn push_line(&mut self, line: &str, out: &mut VecDeque<LogEvent>) {
        let line = strip_prompt(line);
        if self.in_error() {
            // A new report can start before the old error showed its context.
            let interrupts = self.is_error_start(line) || line.contains(self.tag.as_str());
            if let State::InError { lines } = &mut self.state {
                if is_context_line(line) {
                    lines.push(line.to_string());
                    self.emit_error(out);
                    return;
                }
                if !interrupts {
                    lines.push(line.to_string());
                    let full = lines.len() >= MAX_ERROR_LINES;
                    if full {
                        self.emit_error(out);
                    }
                    return;
                }
            }
            self.emit_error(out);
        }

        if let Some(pos) = line.find(self.tag.as_str()) {
            let values = &line[pos + self.tag.len()..];
            out.push_back(match parse_measurement_values(values) {
                Some(result) => LogEvent::MeasurementReported(result),
                None => LogEvent::MalformedMeasurement(line.to_string()),
            });
        } else if self.is_error_start(line) {
            if self.dialect == Dialect::ConTeXt {
                // ConTeXt prints its errors on a single status line.
                out.push_back(LogEvent::FatalError(line.to_string()));
            } else {
                self.state = State::InError { lines: vec![line.to_string()] };
            }
        } else if self.is_warning(line) {
            out.push_back(LogEvent::Warning(line.to_string()));
        } else if let Some(page) = self.shipped_page(line) {
            out.push_back(LogEvent::PageShipped { page });
        } else {
            out.push_back(LogEvent::Unrecognized(line.to_string()));
        }
    }

    /// Emits an error still waiting for its context line.
    pub fn flush(&mut self, out: &mut VecDeque<LogEvent>) {
        if self.in_error() {
            self.emit_error(out);
        }
    }

    fn emit_error(&mut self, out: &mut VecDeque<LogEvent>) {
        if let State::InError { lines } = std::mem::take(&mut self.state) {
            out.push_back(LogEvent::FatalError(lines.join("\n")));
        }
    }

    fn is_error_start(&self, line: &str) -> bool {
        match self.dialect {
            Dialect::LaTeX | Dialect::PlainTeX => line.starts_with('!'),
            Dialect::ConTeXt => {
                line.starts_with('!')
                    || (line.contains('>') && (line.contains("tex error") || line.contains("fatal error")))
            }
        }
    }

    fn is_warning(&self, line: &str) -> bool {
        let tex = TEX_WARNING_PREFIXES.iter().any(|p| line.starts_with(p))
            || (line.starts_with("Package ") && line.contains(" Warning:"));
        match self.dialect {
            Dialect::LaTeX | Dialect::PlainTeX => tex,
            Dialect::ConTeXt => tex || line.contains("> warning"),
        }
    }

    /// `Some(page)` if the line reports a shipped page.
    fn shipped_page(&self, line: &str) -> Option<Option<u32>> {
        match self.dialect {
            Dialect::LaTeX | Dialect::PlainTeX => tex_shipout(line),
            Dialect::ConTeXt => {
                let pos = line.find("flushing realpage")?;
                let digits: String = line[pos + "flushing realpage".len()..]
                    .trim_start()
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                Some(digits.parse().ok())
            }
        }
    }
}

/// Drops the `*` prompts TeX prints before reading each terminal line.
///
/// Piped input is not echoed, so whatever the engine prints next (an error,
/// a warning, a shipout) continues the prompt's line, e.g. `*! Undefined
/// control sequence.`. A leading `**` is the first-line prompt.
fn strip_prompt(line: &str) -> &str {
    line.trim_start_matches('*')
}

/// TeX error context lines: `l.12 \foo` for file input, `<*>` for terminal input.
fn is_context_line(line: &str) -> bool {
    if line.starts_with("<*>") {
        return true;
    }
    line.strip_prefix("l.")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// pdfTeX reports shipouts as `[<page>` optionally followed by font map
/// references, e.g. `[1{/usr/share/.../pdftex.map}]`, at the start of a line
/// or after a space or closing bracket.
fn tex_shipout(line: &str) -> Option<Option<u32>> {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'[' {
            continue;
        }
        let boundary = i == 0 || matches!(bytes[i - 1], b' ' | b')' | b']');
        if !boundary {
            continue;
        }
        let digits: String = line[i + 1..].chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            continue;
        }
        let after = line[i + 1 + digits.len()..].chars().next();
        if matches!(after, None | Some(']') | Some('{') | Some('<') | Some(' ')) {
            return Some(digits.parse().ok());
        }
    }
    None
}

/// Parses the comma-separated values following a measurement tag.
///
/// Each value is a decimal number with an optional `pt`/`bp` suffix, e.g.
/// `17.07227pt`. At least width, height and depth are required; a line with
/// seven or more values also carries a bounding box.
pub fn parse_measurement_values(values: &str) -> Option<MeasurementResult> {
    let numbers = values
        .trim()
        .split(',')
        .map(parse_dimension)
        .collect::<Option<Vec<f64>>>()?;
    if numbers.len() < 3 {
        return None;
    }
    let bbox = (numbers.len() >= 7)
        .then(|| BoundingBox::new(numbers[3], numbers[4], numbers[5], numbers[6]));
    Some(MeasurementResult { width: numbers[0], height: numbers[1], depth: numbers[2], bbox })
}

fn parse_dimension(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let number = raw
        .strip_suffix("pt")
        .or_else(|| raw.strip_suffix("bp"))
        .unwrap_or(raw)
        .trim_end();
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}
