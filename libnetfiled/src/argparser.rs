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

//! Command-line tokenizer: splits a raw packet into a command name plus
//! quoted/unquoted arguments. Grounded on spec.md §4.2; no escapes
//! inside single quotes, backslash-escapes only the closing double
//! quote inside double quotes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArg {
    pub value: String,
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedLine {
    pub name: Option<String>,
    pub args: Vec<RawArg>,
}

/// Tokenize `line` into a command name and raw arguments. Whitespace
/// (ASCII `isspace`) separates tokens outside of quotes. Empty tokens
/// are discarded, and the first non-empty token becomes the command
/// name.
pub fn parse_line(line: &str) -> ParsedLine {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut tokens: Vec<RawArg> = Vec::new();

    while i < chars.len() {
        while i < chars.len() && chars[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let (value, quoted, next) = match chars[i] {
            '\'' => take_single_quoted(&chars, i),
            '"' => take_double_quoted(&chars, i),
            _ => take_bare(&chars, i),
        };
        i = next;
        if !value.is_empty() || quoted {
            tokens.push(RawArg { value, quoted });
        }
    }

    let mut iter = tokens.into_iter();
    let name = iter.next().map(|t| t.value);
    ParsedLine { name, args: iter.collect() }
}

fn take_single_quoted(chars: &[char], start: usize) -> (String, bool, usize) {
    let mut i = start + 1;
    let mut out = String::new();
    while i < chars.len() && chars[i] != '\'' {
        out.push(chars[i]);
        i += 1;
    }
    // skip the closing quote, if present
    if i < chars.len() {
        i += 1;
    }
    (out, true, i)
}

fn take_double_quoted(chars: &[char], start: usize) -> (String, bool, usize) {
    let mut i = start + 1;
    let mut out = String::new();
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == '"' {
            out.push('"');
            i += 2;
            continue;
        }
        if chars[i] == '"' {
            i += 1;
            break;
        }
        out.push(chars[i]);
        i += 1;
    }
    (out, true, i)
}

fn take_bare(chars: &[char], start: usize) -> (String, bool, usize) {
    let mut i = start;
    let mut out = String::new();
    while i < chars.len() && !chars[i].is_ascii_whitespace() {
        out.push(chars[i]);
        i += 1;
    }
    (out, false, i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let p = parse_line("cd  proj   dir");
        assert_eq!(p.name.as_deref(), Some("cd"));
        assert_eq!(p.args.iter().map(|a| a.value.as_str()).collect::<Vec<_>>(), vec!["proj", "dir"]);
    }

    #[test]
    fn single_quotes_take_literal_text() {
        let p = parse_line("put 'a b.txt' 10");
        assert_eq!(p.args[0].value, "a b.txt");
        assert!(p.args[0].quoted);
    }

    #[test]
    fn double_quotes_escape_only_closing_quote() {
        let p = parse_line(r#"put "say \"hi\".txt" 10"#);
        assert_eq!(p.args[0].value, r#"say "hi".txt"#);
    }

    #[test]
    fn empty_tokens_are_discarded() {
        let p = parse_line("  login    alice  ");
        assert_eq!(p.name.as_deref(), Some("login"));
        assert_eq!(p.args.len(), 1);
    }

    #[test]
    fn missing_command_name_is_none() {
        let p = parse_line("   ");
        assert_eq!(p.name, None);
        assert!(p.args.is_empty());
    }

    #[test]
    fn reparsing_reserialized_tokens_is_stable() {
        // P5: deterministic parse, and re-serializing tokens (with
        // single quotes around anything containing whitespace) then
        // re-parsing yields the same tokens.
        let p = parse_line("grep 'hello world'");
        let reserialized = format!("{} '{}'", p.name.as_ref().unwrap(), p.args[0].value);
        let reparsed = parse_line(&reserialized);
        assert_eq!(p.args[0].value, reparsed.args[0].value);
    }
}
