// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Numerus authors

//! Extract the outermost balanced JSON object from raw agent stdout
//! (`spec.md` §6: "JSON is extracted from the stdout stream by locating
//! the outermost balanced `{…}` object; any prose before or after is
//! discarded").

/// Find the first top-level balanced `{...}` substring in `stdout`,
/// ignoring braces inside JSON string literals (tracking escape state so
/// `\"` and `\\` don't desynchronize the scanner).
///
/// Returns `None` if no balanced object is found (e.g. the child only
/// emitted prose, or the object was truncated).
pub fn extract_json_object(stdout: &str) -> Option<&str> {
    let bytes = stdout.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(&stdout[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}
