//! Lexical operations on virtual `/`-separated paths.

/// Lexically cleans a path: collapses repeated separators and resolves
/// `.` and `..` segments without touching any filesystem.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match out.last() {
                Some(&"..") => out.push(".."),
                Some(_) => {
                    out.pop();
                }
                None => {
                    if !rooted {
                        out.push("..");
                    }
                }
            },
            seg => out.push(seg),
        }
    }
    if rooted {
        let mut cleaned = String::from("/");
        cleaned.push_str(&out.join("/"));
        cleaned
    } else if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

/// Joins `child` onto `parent`. An absolute `child` replaces `parent`
/// entirely; the result is always cleaned.
pub fn join(parent: &str, child: &str) -> String {
    if child.starts_with('/') {
        return clean(child);
    }
    if parent.is_empty() {
        return clean(child);
    }
    clean(&format!("{parent}/{child}"))
}

/// Final path element, mirroring `basename`.
pub fn base(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Parent directory of `path`, cleaned.
pub fn dir(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => clean(&trimmed[..idx]),
        None => ".".to_string(),
    }
}

/// Extension of the final element including the leading dot, or `""`.
pub fn ext(path: &str) -> &str {
    let name = base(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx..],
        _ => "",
    }
}

pub fn is_abs(path: &str) -> bool {
    path.starts_with('/')
}

/// Path segments of an absolute path, without the leading empty segment.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|seg| !seg.is_empty()).collect()
}
