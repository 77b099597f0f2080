//! Tokenizer for the placeholder reference grammar.
//!
//! Two bracket styles are recognized: `<...>` for block/variable/loop/
//! parallel references, and `{{...}}` for environment variables. Spans are
//! matched to the first closing delimiter; unmatched or malformed spans are
//! simply not recognized as references and pass through as literal text.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Variable {
        name: String,
    },
    Block {
        reference: String,
        path: String,
    },
    LoopCurrentItem {
        path: String,
    },
    LoopIndex,
    LoopItems,
    ParallelCurrentItem {
        path: String,
    },
    ParallelIndex,
    ParallelItems,
    Env {
        name: String,
    },
}

/// A reference span located in source text, along with its byte range so
/// callers can splice a replacement back in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub raw: String,
    pub reference: Reference,
}

fn strip_leading_dot(s: &str) -> &str {
    s.strip_prefix('.').unwrap_or(s)
}

fn classify_angle_inner(inner: &str) -> Option<Reference> {
    let (head, rest) = match inner.find(['.', '[']) {
        Some(idx) => (&inner[..idx], &inner[idx..]),
        None => (inner, ""),
    };
    let head_lower = head.to_ascii_lowercase();
    match head_lower.as_str() {
        "variable" => Some(Reference::Variable {
            name: strip_leading_dot(rest).to_string(),
        }),
        "loop" => classify_loop_or_parallel_inner(strip_leading_dot(rest), true),
        "parallel" => classify_loop_or_parallel_inner(strip_leading_dot(rest), false),
        _ => Some(Reference::Block {
            reference: head.to_string(),
            path: strip_leading_dot(rest).to_string(),
        }),
    }
}

fn classify_loop_or_parallel_inner(rest: &str, is_loop: bool) -> Option<Reference> {
    if rest == "index" {
        return Some(if is_loop {
            Reference::LoopIndex
        } else {
            Reference::ParallelIndex
        });
    }
    if rest == "items" {
        return Some(if is_loop {
            Reference::LoopItems
        } else {
            Reference::ParallelItems
        });
    }
    if let Some(tail) = rest.strip_prefix("currentItem") {
        let path = strip_leading_dot(tail).to_string();
        return Some(if is_loop {
            Reference::LoopCurrentItem { path }
        } else {
            Reference::ParallelCurrentItem { path }
        });
    }
    None
}

/// Scans `input` for every recognized reference, left to right, non-overlapping.
pub fn scan(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(rel_end) = input[i + 2..].find("}}") {
                let end = i + 2 + rel_end + 2;
                let inner = &input[i + 2..i + 2 + rel_end];
                tokens.push(Token {
                    start: i,
                    end,
                    raw: input[i..end].to_string(),
                    reference: Reference::Env {
                        name: inner.trim().to_string(),
                    },
                });
                i = end;
                continue;
            }
        } else if bytes[i] == b'<'
            && let Some(rel_end) = input[i + 1..].find('>')
        {
            let end = i + 1 + rel_end + 1;
            let inner = &input[i + 1..i + 1 + rel_end];
            if let Some(reference) = classify_angle_inner(inner) {
                tokens.push(Token {
                    start: i,
                    end,
                    raw: input[i..end].to_string(),
                    reference,
                });
                i = end;
                continue;
            }
        }
        i += 1;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_variable_reference() {
        let tokens = scan("<variable.greeting>");
        assert_eq!(tokens.len(), 1);
        assert_eq!(
            tokens[0].reference,
            Reference::Variable {
                name: "greeting".into()
            }
        );
    }

    #[test]
    fn classifies_block_reference_with_path() {
        let tokens = scan("<Function1.result.value>");
        assert_eq!(
            tokens[0].reference,
            Reference::Block {
                reference: "Function1".into(),
                path: "result.value".into()
            }
        );
    }

    #[test]
    fn classifies_block_reference_without_path() {
        let tokens = scan("<Function1>");
        assert_eq!(
            tokens[0].reference,
            Reference::Block {
                reference: "Function1".into(),
                path: "".into()
            }
        );
    }

    #[test]
    fn classifies_loop_references() {
        assert_eq!(
            scan("<loop.currentItem>")[0].reference,
            Reference::LoopCurrentItem { path: "".into() }
        );
        assert_eq!(
            scan("<loop.currentItem.name>")[0].reference,
            Reference::LoopCurrentItem {
                path: "name".into()
            }
        );
        assert_eq!(
            scan("<loop.currentItem[0]>")[0].reference,
            Reference::LoopCurrentItem { path: "[0]".into() }
        );
        assert_eq!(scan("<loop.index>")[0].reference, Reference::LoopIndex);
        assert_eq!(scan("<loop.items>")[0].reference, Reference::LoopItems);
    }

    #[test]
    fn classifies_parallel_references() {
        assert_eq!(
            scan("<parallel.currentItem>")[0].reference,
            Reference::ParallelCurrentItem { path: "".into() }
        );
        assert_eq!(
            scan("<parallel.index>")[0].reference,
            Reference::ParallelIndex
        );
        assert_eq!(
            scan("<parallel.items>")[0].reference,
            Reference::ParallelItems
        );
    }

    #[test]
    fn classifies_env_reference() {
        let tokens = scan("{{API_KEY}}");
        assert_eq!(
            tokens[0].reference,
            Reference::Env {
                name: "API_KEY".into()
            }
        );
    }

    #[test]
    fn unterminated_span_is_left_as_literal() {
        let tokens = scan("prefix <unterminated and {{unterminated too");
        assert!(tokens.is_empty());
    }

    #[test]
    fn multiple_references_scan_left_to_right() {
        let tokens = scan("<A.result> and {{ENV}} and <loop.index>");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].reference, Reference::Env { name: "ENV".into() });
    }
}
