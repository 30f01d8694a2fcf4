//! RFC 8288 `Link` header handling for pagination.

/// Extract the `rel="next"` target from a `Link` header value.
///
/// Entries are comma-separated; the first one whose parameters contain
/// `rel="next"` (or the unquoted `rel=next`) wins. Returns the text between
/// `<` and `>`.
pub fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params.split(';').any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.trim();
        let start = target.find('<')? + 1;
        let end = target.rfind('>')?;
        (start <= end).then(|| &target[start..end]).filter(|t| !t.is_empty())
    })
}
