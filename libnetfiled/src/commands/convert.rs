// Copyright 2023 Google LLC
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

//! Argument typing and conversion (spec.md §4.3): turns raw tokens
//! from the argument parser into typed values, sandbox-checking any
//! `Path` argument against the session's current directory.

use crate::argparser::RawArg;
use crate::commands::registry::ArgKind;
use crate::error::{CmdResult, ErrorKind};
use crate::path::{Path, MAX_CANONICAL_LEN};
use netfiled_protocol::is_valid_hostname;

#[derive(Debug, Clone)]
pub enum ConvertedArg {
    Path(Path),
    Int(i64),
    String(String),
    Hostname(String),
    Pattern(String),
}

impl ConvertedArg {
    pub fn as_path(&self) -> &Path {
        match self {
            ConvertedArg::Path(p) => p,
            other => panic!("argument {other:?} is not a Path, command spec is wrong"),
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            ConvertedArg::Int(i) => *i,
            other => panic!("argument {other:?} is not an Int, command spec is wrong"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConvertedArg::String(s) | ConvertedArg::Hostname(s) | ConvertedArg::Pattern(s) => s,
            other => panic!("argument {other:?} is not a string-like type, command spec is wrong"),
        }
    }
}

pub fn convert_args(
    spec: &[ArgKind],
    raw: &[RawArg],
    cwd: &Path,
    current_user: &str,
) -> CmdResult<Vec<ConvertedArg>> {
    if spec.len() != raw.len() {
        return Err(ErrorKind::BadArgument("number of arguments doesn't match".to_string()));
    }

    spec.iter().zip(raw.iter()).map(|(kind, arg)| convert_one(*kind, arg, cwd, current_user)).collect()
}

fn convert_one(kind: ArgKind, arg: &RawArg, cwd: &Path, current_user: &str) -> CmdResult<ConvertedArg> {
    match kind {
        ArgKind::Path => {
            if arg.value.contains('\0') {
                return Err(ErrorKind::BadArgument("path contains a NUL byte".to_string()));
            }
            let parsed = Path::parse(&arg.value, current_user);
            let composed = cwd.compose(&parsed);
            if composed.attempt_parent_traversal() {
                return Err(ErrorKind::AccessDenied);
            }
            if composed.length() > MAX_CANONICAL_LEN {
                return Err(ErrorKind::PathTooLong);
            }
            Ok(ConvertedArg::Path(composed))
        }
        ArgKind::Int => arg
            .value
            .parse::<i64>()
            .map(ConvertedArg::Int)
            .map_err(|_| ErrorKind::BadArgument(format!("not an integer: {}", arg.value))),
        ArgKind::Hostname => {
            if is_valid_hostname(&arg.value) {
                Ok(ConvertedArg::Hostname(arg.value.clone()))
            } else {
                Err(ErrorKind::BadArgument(format!("not a valid hostname: {}", arg.value)))
            }
        }
        ArgKind::String => Ok(ConvertedArg::String(arg.value.clone())),
        ArgKind::Pattern => Ok(ConvertedArg::Pattern(arg.value.clone())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::argparser::RawArg;

    fn raw(s: &str) -> RawArg {
        RawArg { value: s.to_string(), quoted: false }
    }

    #[test]
    fn arity_mismatch_is_bad_argument() {
        let err = convert_args(&[ArgKind::Path], &[], &Path::empty_relative(), "alice").unwrap_err();
        assert!(matches!(err, ErrorKind::BadArgument(_)));
    }

    #[test]
    fn path_escaping_sandbox_is_access_denied() {
        let err =
            convert_args(&[ArgKind::Path], &[raw("../../etc")], &Path::empty_relative(), "alice").unwrap_err();
        assert_eq!(err, ErrorKind::AccessDenied);
    }

    #[test]
    fn path_too_long_is_rejected() {
        let long = "a".repeat(200);
        let err = convert_args(&[ArgKind::Path], &[raw(&long)], &Path::empty_relative(), "alice").unwrap_err();
        assert_eq!(err, ErrorKind::PathTooLong);
    }

    #[test]
    fn path_with_nul_is_bad_argument() {
        let err =
            convert_args(&[ArgKind::Path], &[raw("a\0b")], &Path::empty_relative(), "alice").unwrap_err();
        assert!(matches!(err, ErrorKind::BadArgument(_)));
    }

    #[test]
    fn int_parses_decimal() {
        let converted = convert_args(&[ArgKind::Int], &[raw("42")], &Path::empty_relative(), "alice").unwrap();
        assert_eq!(converted[0].as_int(), 42);
    }

    #[test]
    fn hostname_rejects_bad_shape() {
        let err =
            convert_args(&[ArgKind::Hostname], &[raw("-bad.com")], &Path::empty_relative(), "alice").unwrap_err();
        assert!(matches!(err, ErrorKind::BadArgument(_)));
    }
}
