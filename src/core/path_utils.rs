//! Path normalization and prefix extraction shared by the router and the
//! service registry that builds it.

/// Lowercase, collapse repeated `/`, and strip a trailing `/` unless the
/// result would otherwise be empty. Empty input normalizes to `/`.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let lowered = path.to_lowercase();
    let mut collapsed = String::with_capacity(lowered.len());
    let mut prev_was_slash = false;
    for ch in lowered.chars() {
        if ch == '/' {
            if prev_was_slash {
                continue;
            }
            prev_was_slash = true;
        } else {
            prev_was_slash = false;
        }
        collapsed.push(ch);
    }

    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }

    if collapsed.is_empty() {
        "/".to_string()
    } else {
        collapsed
    }
}

/// Split a raw request path into the first-, second-, and third-segment
/// prefixes, plus a flag indicating whether a fourth segment begins.
///
/// Guarantees a leading `/` on the path it scans (prepending one if
/// missing). A `?` ends the scan.
pub fn extract_prefixes(path: &str) -> (String, String, String, bool) {
    let owned;
    let path: &str = if path.is_empty() || !path.starts_with('/') {
        owned = format!("/{path}");
        &owned
    } else {
        path
    };

    let bytes = path.as_bytes();
    let mut seg_ends = [0usize; 3];
    let mut seg_count = 0usize;
    let mut is_more_than_three = false;
    let mut n = bytes.len();

    let mut i = 0usize;
    while i < n {
        if bytes[i] == b'?' {
            n = i;
            break;
        }
        if i > 0 && bytes[i] == b'/' && seg_count < 3 {
            seg_ends[seg_count] = i;
            seg_count += 1;
        } else if seg_count == 3 && bytes[i] != b'/' {
            is_more_than_three = true;
            break;
        }
        i += 1;
    }

    if seg_count < 3 && n > 0 && bytes[n - 1] != b'/' {
        seg_ends[seg_count] = n;
        seg_count += 1;
    }

    let depth1 = if seg_count >= 1 {
        path[..seg_ends[0]].to_string()
    } else {
        String::new()
    };
    let depth2 = if seg_count >= 2 {
        path[..seg_ends[1]].to_string()
    } else {
        String::new()
    };
    let depth3 = if seg_count >= 3 {
        path[..seg_ends[2]].to_string()
    } else {
        String::new()
    };

    (depth3, depth2, depth1, is_more_than_three)
}
