//! LZW codec over UTF-16 code units.
//!
//! The conversation set is stored as one compressed blob to stay within
//! storage quota even for long histories. Codes are 16 bits, written
//! big-endian (two bytes per code) and base64-encoded for storage as a
//! string. Code 0 escapes a raw UTF-16 code unit, so the dictionary never
//! needs pre-seeding with a full alphabet; both sides register escaped units
//! in lockstep, which keeps arbitrary Unicode round-trip safe.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

const CODE_ESCAPE: u16 = 0;
const FIRST_CODE: usize = 1;
const MAX_CODES: usize = 1 << 16;

fn push_code(out: &mut Vec<u8>, code: u16) {
    out.extend_from_slice(&code.to_be_bytes());
}

/// Compress a string into a base64-encoded LZW byte stream.
pub fn compress(input: &str) -> String {
    let mut dict: HashMap<Vec<u16>, u16> = HashMap::new();
    let mut next_code = FIRST_CODE;
    let mut out: Vec<u8> = Vec::new();
    let mut w: Vec<u16> = Vec::new();

    for c in input.encode_utf16() {
        if !dict.contains_key(&[c][..]) {
            // First sight of this code unit: flush the current phrase, then
            // register the unit through the escape code.
            if !w.is_empty() {
                push_code(&mut out, dict[&w[..]]);
                w.clear();
            }
            push_code(&mut out, CODE_ESCAPE);
            push_code(&mut out, c);
            if next_code < MAX_CODES {
                dict.insert(vec![c], next_code as u16);
                next_code += 1;
            }
            continue;
        }

        w.push(c);
        if dict.contains_key(&w[..]) {
            continue;
        }

        // `w` minus the unit just pushed is the longest known phrase.
        let grown = w.clone();
        w.pop();
        push_code(&mut out, dict[&w[..]]);
        if next_code < MAX_CODES {
            dict.insert(grown, next_code as u16);
            next_code += 1;
        }
        w.clear();
        w.push(c);
    }

    if !w.is_empty() {
        push_code(&mut out, dict[&w[..]]);
    }

    BASE64.encode(out)
}

/// Exact inverse of [`compress`]. Fails on anything that is not a valid
/// stream, which lets callers fall back to the legacy uncompressed format.
pub fn decompress(encoded: &str) -> Result<String, String> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    if bytes.len() % 2 != 0 {
        return Err("truncated code stream".to_string());
    }

    let codes: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let mut dict: Vec<Vec<u16>> = Vec::new();
    let mut units: Vec<u16> = Vec::new();
    let mut prev: Option<Vec<u16>> = None;

    let mut i = 0usize;
    while i < codes.len() {
        let code = codes[i];
        i += 1;

        if code == CODE_ESCAPE {
            let Some(&raw) = codes.get(i) else {
                return Err("escape without payload".to_string());
            };
            i += 1;
            units.push(raw);
            if dict.len() + FIRST_CODE < MAX_CODES {
                dict.push(vec![raw]);
            }
            prev = None;
            continue;
        }

        let index = code as usize - FIRST_CODE;
        let entry = if index < dict.len() {
            dict[index].clone()
        } else if index == dict.len() {
            // KwKwK: the code being defined by the pending insertion.
            let Some(p) = prev.as_ref() else {
                return Err(format!("dangling code {code}"));
            };
            let mut e = p.clone();
            e.push(p[0]);
            e
        } else {
            return Err(format!("code {code} out of range"));
        };

        units.extend_from_slice(&entry);
        if let Some(p) = prev.take() {
            if dict.len() + FIRST_CODE < MAX_CODES {
                let mut grown = p;
                grown.push(entry[0]);
                dict.push(grown);
            }
        }
        prev = Some(entry);
    }

    String::from_utf16(&units).map_err(|e| format!("invalid UTF-16: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) {
        assert_eq!(decompress(&compress(s)).unwrap(), s, "input: {s:?}");
    }

    #[test]
    fn roundtrip_empty() {
        roundtrip("");
    }

    #[test]
    fn roundtrip_ascii() {
        roundtrip("abababababab");
        roundtrip("aaa");
        roundtrip("aaaa");
        roundtrip("the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn roundtrip_unicode() {
        roundtrip("Olá, você aí! Ação & coração.");
        roundtrip("中文字符串，混合 emoji 🚀🚀🚀 e português: não.");
        roundtrip("\u{0}\u{1}\u{ffff}");
    }

    #[test]
    fn roundtrip_large() {
        let big: String = "Resuma este texto: Lorem ipsum dolor sit amet. "
            .repeat(4_000);
        roundtrip(&big);
    }

    #[test]
    fn roundtrip_json_conversation_shape() {
        let json = r#"[{"id":"conv_1","title":"Olá…","turns":[{"userText":"oi","assistantText":"Olá! Como posso ajudar?"}]}]"#;
        roundtrip(json);
    }

    #[test]
    fn compression_shrinks_repetitive_input() {
        let s = "mensagem repetida ".repeat(500);
        assert!(compress(&s).len() < s.len());
    }

    #[test]
    fn decompress_rejects_garbage() {
        assert!(decompress("not base64 at all!!").is_err());
        // Plain JSON must not decode as a valid stream (fallback contract).
        assert!(decompress(r#"[{"id":"x"}]"#).is_err());
    }
}
