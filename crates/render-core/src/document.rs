use pgfkit_types::{EngineProfile, Size};

/// Wraps `body` in the profile's boilerplate: preamble, page size for `size`,
/// begin-document, body, end-document. Empty parts are left out.
pub fn standalone_document(profile: &EngineProfile, size: Size, body: &str) -> String {
    let page_size = profile.page_size(size);
    join_parts(&[
        profile.preamble.as_str(),
        page_size.as_str(),
        profile.begin_document.as_str(),
        body,
        profile.end_document.as_str(),
    ])
}

/// What still has to be written to an engine that already consumed the
/// preamble and begin-document: the page size for `size` and `body`.
pub fn document_tail(profile: &EngineProfile, size: Size, body: &str) -> String {
    let page_size = profile.page_size(size);
    join_parts(&[page_size.as_str(), body])
}

fn join_parts(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts.iter().map(|p| p.trim_end_matches('\n')).filter(|p| !p.is_empty()) {
        out.push_str(part);
        out.push('\n');
    }
    out
}
