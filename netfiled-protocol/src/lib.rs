// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Wire-level constants and formatting shared between the server and
//! the bundled test client: the set of commands, the sandbox limits,
//! and the line formats for errors and file-transfer control replies.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum canonical path length accepted by the sandbox (spec.md §3).
pub const MAX_PATH_LEN: usize = 128;

/// Size of one non-blocking read into a line socket's receive buffer.
pub const LINE_READ_CHUNK: usize = 256;

/// Block size used streaming file contents for `get`.
pub const TRANSFER_BLOCK_SIZE: usize = 4096;

/// The 15 command names that make up the wire protocol (spec.md §6).
pub const COMMAND_NAMES: &[&str] = &[
    "login", "pass", "logout", "whoami", "w", "ls", "cd", "mkdir", "rm", "grep", "get", "put",
    "date", "ping", "exit",
];

/// Format an error reply line: `Error: <message>\n` (no trailing
/// newline, callers append one via `write_line`).
pub fn format_error(message: &str) -> String {
    format!("Error: {message}")
}

/// Format the control line a server sends after opening a `get`
/// transfer socket.
pub fn format_get_reply(port: u16, size: u64) -> String {
    format!("get port: {port} size: {size}")
}

/// Format the control line a server sends after opening a `put`
/// transfer socket.
pub fn format_put_reply(port: u16, path: &str) -> String {
    format!("put port: {port} path: {path}")
}

/// RFC 1123 hostname grammar: `(label.)*label`, `label =
/// [A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?`.
pub fn is_valid_hostname(raw: &str) -> bool {
    if raw.is_empty() || raw.len() > 253 {
        return false;
    }
    raw.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let is_alnum = |b: u8| b.is_ascii_alphanumeric();
    if !is_alnum(bytes[0]) || !is_alnum(*bytes.last().unwrap()) {
        return false;
    }
    bytes.iter().all(|&b| is_alnum(b) || b == b'-')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_simple_and_multilabel_hostnames() {
        assert!(is_valid_hostname("localhost"));
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("a1-b2.example.co"));
    }

    #[test]
    fn rejects_labels_starting_or_ending_with_hyphen() {
        assert!(!is_valid_hostname("-example.com"));
        assert!(!is_valid_hostname("example-.com"));
    }

    #[test]
    fn rejects_empty_labels_and_empty_string() {
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("example..com"));
        assert!(!is_valid_hostname(".example.com"));
    }

    #[test]
    fn formats_control_lines() {
        assert_eq!(format_get_reply(9001, 42), "get port: 9001 size: 42");
        assert_eq!(format_put_reply(9001, "a/b.txt"), "put port: 9001 path: a/b.txt");
    }
}
