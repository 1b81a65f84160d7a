//! JSON pointer helpers: escaping node names into paths, parsing lookup
//! pointers, and converting instance pointers into dotted data paths.

/// One step of a lookup pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `#` or a leading `/`: restart from the tree root.
    Root,
    /// `..`: move to the parent node.
    Parent,
    /// `.`: stay on the current node.
    Current,
    /// A child by name (already unescaped).
    Child(String),
}

/// Escape a node name for use as a pointer segment (`~` → `~0`, `/` → `~1`).
pub fn escape_segment(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

/// Reverse [`escape_segment`].
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Join a parent path and a child name into the child's absolute path.
pub fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, escape_segment(name))
}

/// Parse a lookup pointer into segments.
///
/// `#/a/b` and `/a/b` are absolute; `../a`, `./a` and bare `a/b` are
/// resolved relative to the node the lookup starts from.
pub fn parse_pointer(pointer: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = pointer;

    if let Some(stripped) = rest.strip_prefix('#') {
        segments.push(Segment::Root);
        rest = stripped;
    } else if rest.starts_with('/') {
        segments.push(Segment::Root);
    }

    for part in rest.split('/') {
        match part {
            "" => {}
            ".." => segments.push(Segment::Parent),
            "." => segments.push(Segment::Current),
            other => segments.push(Segment::Child(unescape_segment(other))),
        }
    }
    segments
}

/// Rewrite a `/`-separated instance pointer as a dotted data path.
///
/// Numeric segments become array indices: `/a/1/b` → `.a[1].b`.
pub fn to_data_path(instance_path: &str) -> String {
    let mut out = String::new();
    for part in instance_path.split('/').filter(|p| !p.is_empty()) {
        push_data_segment(&mut out, &unescape_segment(part));
    }
    out
}

/// Append one (unescaped) segment to a dotted data path.
pub fn push_data_segment(out: &mut String, segment: &str) {
    if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
        out.push('[');
        out.push_str(segment);
        out.push(']');
    } else {
        out.push('.');
        out.push_str(segment);
    }
}
