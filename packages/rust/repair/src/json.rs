//! Single-pass JSON scanner that normalizes near-valid model output and
//! records enough state to close it off when the output was cut short.
//!
//! The scanner copies input into `out` while fixing the failure modes that can
//! be repaired in-stream (raw control characters in strings, trailing commas,
//! prose after the root value). At end of input it knows the open container
//! stack, the last offset where the text could be closed validly, and for every
//! open array the offset after its last complete element.

use std::sync::LazyLock;

use regex::Regex;

use crate::RepairFix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn closer(self) -> char {
        match self {
            Self::Object => '}',
            Self::Array => ']',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    CommaOrClose,
}

#[derive(Debug, Clone)]
struct Frame {
    kind: Container,
    expect: Expect,
    /// Offset of the opening bracket in `out`.
    open_at: usize,
    /// Offset just past the last complete element (arrays only).
    last_elem_end: Option<usize>,
}

/// Where the scanner was when input ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// The root value closed; everything after it was discarded.
    Complete,
    /// Inside a string literal.
    InString { is_key: bool },
    /// Inside a bare literal (number, true, false, null) starting at `start`.
    InScalar { start: usize },
    /// Between tokens.
    Between,
}

/// Scanner output: the normalized text plus what is needed to close it.
#[derive(Debug, Clone)]
pub(crate) struct Scan {
    out: String,
    fixes: Vec<RepairFix>,
    stack: Vec<Frame>,
    tail: Tail,
    /// Offset where `out[..safe_cut]` + closers of `stack` is valid JSON.
    safe_cut: Option<usize>,
    /// Offset of a pending `\` escape (or `\u` sequence) inside a string.
    escape_at: Option<usize>,
}

/// A repaired candidate text and the fixes that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    pub text: String,
    pub fixes: Vec<RepairFix>,
}

impl Scan {
    /// Whether the output stopped before the root value closed.
    pub(crate) fn truncated(&self) -> bool {
        self.tail != Tail::Complete
    }

    /// Candidate repairs, most conservative first.
    ///
    /// For complete input there is exactly one candidate: the normalized text.
    /// For truncated input the first candidate drops the incomplete element of
    /// the outermost open array; the second closes everything in place.
    pub(crate) fn candidates(&self) -> Vec<Repair> {
        if self.tail == Tail::Complete {
            return vec![Repair {
                text: self.out.clone(),
                fixes: self.fixes.clone(),
            }];
        }

        let mut candidates = Vec::new();
        if let Some(repair) = self.drop_incomplete_tail() {
            candidates.push(repair);
        }
        if let Some(repair) = self.close_in_place() {
            if !candidates.iter().any(|c| c.text == repair.text) {
                candidates.push(repair);
            }
        }
        candidates
    }

    fn drop_incomplete_tail(&self) -> Option<Repair> {
        let outer = self
            .stack
            .iter()
            .position(|f| f.kind == Container::Array)?;
        let frame = &self.stack[outer];
        let cut = frame.last_elem_end.unwrap_or(frame.open_at + 1);

        let mut fixes = self.fixes.clone();
        let dropped = self.out[cut..].trim_matches(|c: char| c.is_whitespace() || c == ',');
        if !dropped.is_empty() {
            push_fix(&mut fixes, RepairFix::IncompleteTail);
        }
        push_fix(&mut fixes, RepairFix::UnclosedContainer);

        let mut text = self.out[..cut].to_string();
        close(&mut text, &self.stack[..=outer]);
        Some(Repair { text, fixes })
    }

    fn close_in_place(&self) -> Option<Repair> {
        let mut fixes = self.fixes.clone();
        let mut text = match self.tail {
            Tail::InString { is_key: false } => {
                let mut text = self.out.clone();
                if let Some(at) = self.escape_at {
                    text.truncate(at);
                }
                text.push('"');
                push_fix(&mut fixes, RepairFix::UnterminatedString);
                text
            }
            Tail::InScalar { start } if is_complete_literal(&self.out[start..]) => {
                self.out.clone()
            }
            _ => {
                let cut = self.safe_cut?;
                if !self.out[cut..].trim().is_empty() {
                    push_fix(&mut fixes, RepairFix::DanglingToken);
                }
                self.out[..cut].to_string()
            }
        };
        if !self.stack.is_empty() {
            push_fix(&mut fixes, RepairFix::UnclosedContainer);
        }
        close(&mut text, &self.stack);
        Some(Repair { text, fixes })
    }
}

fn close(text: &mut String, stack: &[Frame]) {
    for frame in stack.iter().rev() {
        text.push(frame.kind.closer());
    }
}

fn push_fix(fixes: &mut Vec<RepairFix>, fix: RepairFix) {
    if !fixes.contains(&fix) {
        fixes.push(fix);
    }
}

fn is_complete_literal(token: &str) -> bool {
    if matches!(token, "true" | "false" | "null") {
        return true;
    }
    token.starts_with(|c: char| c == '-' || c.is_ascii_digit())
        && !token.ends_with(['.', 'e', 'E', '+', '-'])
        && token.parse::<f64>().is_ok()
}

fn is_scalar_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')
}

/// Strip a Markdown code fence around the payload, if any.
fn strip_code_fence(raw: &str) -> Option<&str> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)(?:```|\z)").expect("valid regex")
    });

    if !raw.contains("```") {
        return None;
    }
    FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Scan `raw`. Returns `None` when no JSON structure can be found or the
/// structure is broken in a way repair cannot address (mismatched brackets,
/// unquoted keys, stray characters).
pub(crate) fn scan(raw: &str) -> Option<Scan> {
    let mut fixes = Vec::new();

    let mut body = raw;
    if let Some(inner) = strip_code_fence(raw) {
        body = inner;
        fixes.push(RepairFix::CodeFence);
    }

    let start = body.find(['{', '['])?;
    if !body[..start].trim().is_empty() {
        push_fix(&mut fixes, RepairFix::SurroundingProse);
    }
    let body = &body[start..];

    let mut scan = Scan {
        out: String::with_capacity(body.len() + 8),
        fixes,
        stack: Vec::new(),
        tail: Tail::Between,
        safe_cut: None,
        escape_at: None,
    };

    let mut in_string = false;
    let mut string_is_key = false;
    let mut escaped = false;
    let mut unicode_left: u8 = 0;
    let mut scalar_start: Option<usize> = None;
    let mut pending_comma: Option<usize> = None;

    for c in body.chars() {
        if in_string {
            if unicode_left > 0 {
                scan.out.push(c);
                unicode_left -= 1;
                if unicode_left == 0 {
                    scan.escape_at = None;
                }
                continue;
            }
            if escaped {
                escaped = false;
                scan.out.push(c);
                if c == 'u' {
                    unicode_left = 4;
                } else {
                    scan.escape_at = None;
                }
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    scan.escape_at = Some(scan.out.len());
                    scan.out.push(c);
                }
                '"' => {
                    in_string = false;
                    scan.out.push(c);
                    if string_is_key {
                        set_expect(&mut scan.stack, Expect::Colon);
                    } else {
                        complete_value(&mut scan);
                    }
                }
                '\n' => escape_control(&mut scan, "\\n"),
                '\r' => escape_control(&mut scan, "\\r"),
                '\t' => escape_control(&mut scan, "\\t"),
                c if (c as u32) < 0x20 => {
                    let escaped_ctl = format!("\\u{:04x}", c as u32);
                    escape_control(&mut scan, &escaped_ctl);
                }
                c => scan.out.push(c),
            }
            continue;
        }

        if let Some(start) = scalar_start {
            if is_scalar_char(c) {
                scan.out.push(c);
                continue;
            }
            if !is_complete_literal(&scan.out[start..]) {
                return None;
            }
            scalar_start = None;
            complete_value(&mut scan);
        }

        if c.is_whitespace() {
            scan.out.push(c);
            continue;
        }

        if scan.stack.is_empty() && scan.safe_cut.is_some() {
            // Root value already closed; the rest is commentary.
            push_fix(&mut scan.fixes, RepairFix::SurroundingProse);
            scan.tail = Tail::Complete;
            return Some(scan);
        }

        if c != '}' && c != ']' {
            pending_comma = None;
        }

        let expect = scan.stack.last().map(|f| f.expect).unwrap_or(Expect::Value);
        match c {
            '{' | '[' if expect == Expect::Value => {
                let kind = if c == '{' {
                    Container::Object
                } else {
                    Container::Array
                };
                let open_at = scan.out.len();
                scan.out.push(c);
                scan.stack.push(Frame {
                    kind,
                    expect: if kind == Container::Object {
                        Expect::Key
                    } else {
                        Expect::Value
                    },
                    open_at,
                    last_elem_end: None,
                });
                scan.safe_cut = Some(scan.out.len());
            }
            '}' | ']' => {
                let top = scan.stack.last()?;
                let kind = if c == '}' {
                    Container::Object
                } else {
                    Container::Array
                };
                if top.kind != kind {
                    return None;
                }
                let closable = match top.expect {
                    Expect::CommaOrClose => true,
                    Expect::Key => kind == Container::Object,
                    Expect::Value => kind == Container::Array,
                    Expect::Colon => false,
                };
                if !closable {
                    return None;
                }
                if let Some(at) = pending_comma.take() {
                    scan.out.remove(at);
                    push_fix(&mut scan.fixes, RepairFix::TrailingComma);
                }
                scan.out.push(c);
                scan.stack.pop();
                complete_value(&mut scan);
            }
            '"' if matches!(expect, Expect::Key | Expect::Value) => {
                in_string = true;
                string_is_key = expect == Expect::Key && !scan.stack.is_empty();
                scan.out.push(c);
            }
            ':' if expect == Expect::Colon => {
                scan.out.push(c);
                set_expect(&mut scan.stack, Expect::Value);
            }
            ',' if expect == Expect::CommaOrClose => {
                pending_comma = Some(scan.out.len());
                scan.out.push(c);
                let frame = scan.stack.last_mut()?;
                frame.expect = match frame.kind {
                    Container::Object => Expect::Key,
                    Container::Array => Expect::Value,
                };
            }
            c if expect == Expect::Value && (c == '-' || c.is_ascii_alphanumeric()) => {
                scalar_start = Some(scan.out.len());
                scan.out.push(c);
            }
            _ => return None,
        }
    }

    scan.tail = if in_string {
        Tail::InString {
            is_key: string_is_key,
        }
    } else if let Some(start) = scalar_start {
        if scan.stack.is_empty() {
            // A bare top-level literal is not a structure we repair.
            return None;
        }
        Tail::InScalar { start }
    } else if scan.stack.is_empty() {
        Tail::Complete
    } else {
        Tail::Between
    };

    Some(scan)
}

fn set_expect(stack: &mut [Frame], expect: Expect) {
    if let Some(frame) = stack.last_mut() {
        frame.expect = expect;
    }
}

/// Mark the current value finished in its parent container.
fn complete_value(scan: &mut Scan) {
    let end = scan.out.len();
    if let Some(frame) = scan.stack.last_mut() {
        frame.expect = Expect::CommaOrClose;
        if frame.kind == Container::Array {
            frame.last_elem_end = Some(end);
        }
    }
    scan.safe_cut = Some(end);
}

fn escape_control(scan: &mut Scan, replacement: &str) {
    scan.out.push_str(replacement);
    push_fix(&mut scan.fixes, RepairFix::ControlCharacter);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(raw: &str) -> Vec<String> {
        scan(raw)
            .expect("scannable")
            .candidates()
            .into_iter()
            .map(|r| r.text)
            .collect()
    }

    #[test]
    fn complete_input_is_passed_through() {
        let scan = scan(r#"{"a": [1, 2]}"#).unwrap();
        assert!(!scan.truncated());
        assert_eq!(scan.candidates()[0].text, r#"{"a": [1, 2]}"#);
    }

    #[test]
    fn trailing_commas_are_removed() {
        let candidates = scan(r#"{"a": [1, 2,], "b": 3,}"#).unwrap().candidates();
        assert_eq!(candidates[0].text, r#"{"a": [1, 2], "b": 3}"#);
        assert!(candidates[0].fixes.contains(&RepairFix::TrailingComma));
    }

    #[test]
    fn raw_newlines_in_strings_are_escaped() {
        let candidates = scan("{\"passage\": \"line one\nline two\"}").unwrap().candidates();
        assert_eq!(candidates[0].text, r#"{"passage": "line one\nline two"}"#);
        assert!(candidates[0].fixes.contains(&RepairFix::ControlCharacter));
    }

    #[test]
    fn unterminated_value_string_is_closed() {
        let all = texts(r#"{"title": "Coffee", "passage": "It was a cold morn"#);
        assert_eq!(all, vec![r#"{"title": "Coffee", "passage": "It was a cold morn"}"#]);
    }

    #[test]
    fn truncated_array_drops_partial_element() {
        let all = texts(r#"[{"q": "one"}, {"q": "two"}, {"q": "thr"#);
        assert_eq!(all[0], r#"[{"q": "one"}, {"q": "two"}]"#);
        assert_eq!(all[1], r#"[{"q": "one"}, {"q": "two"}, {"q": "thr"}]"#);
    }

    #[test]
    fn dangling_key_is_cut_back() {
        let all = texts(r#"{"focus": "past simple", "expla"#);
        assert_eq!(all, vec![r#"{"focus": "past simple"}"#]);
    }

    #[test]
    fn dangling_colon_and_partial_literal_are_cut_back() {
        assert_eq!(texts(r#"{"a": 1, "b":"#), vec![r#"{"a": 1}"#]);
        assert_eq!(texts(r#"{"a": 1, "ok": tr"#), vec![r#"{"a": 1}"#]);
        assert_eq!(texts(r#"{"a": 1, "n": 42"#), vec![r#"{"a": 1, "n": 42}"#]);
    }

    #[test]
    fn partial_escape_is_dropped() {
        let all = texts(r#"{"a": "caf\u00"#);
        assert_eq!(all, vec![r#"{"a": "caf"}"#]);
        let all = texts(r#"{"a": "say \"#);
        assert_eq!(all, vec![r#"{"a": "say "}"#]);
    }

    #[test]
    fn prose_and_fences_are_stripped() {
        let raw = "Sure! Here is the JSON:\n```json\n{\"a\": 1}\n```\nHope that helps.";
        let candidates = scan(raw).unwrap().candidates();
        assert_eq!(candidates[0].text.trim(), r#"{"a": 1}"#);
        assert!(candidates[0].fixes.contains(&RepairFix::CodeFence));

        let candidates = scan(r#"{"a": 1} and some notes"#).unwrap().candidates();
        assert_eq!(candidates[0].text.trim(), r#"{"a": 1}"#);
        assert!(candidates[0].fixes.contains(&RepairFix::SurroundingProse));
    }

    #[test]
    fn broken_structure_is_rejected() {
        assert!(scan("no json here").is_none());
        assert!(scan(r#"{"a": [1, 2}"#).is_none());
        assert!(scan(r#"{a: 1}"#).is_none());
        assert!(scan(r#"[1,,2]"#).is_none());
    }
}
