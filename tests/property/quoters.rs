//! Round-trip laws for the quoted emitters: decoding writer output with a
//! standard parser recovers the original bytes.

use grepq::output::{VecSink, Writer, WriterOptions};
use proptest::prelude::*;

fn emit(f: impl FnOnce(&mut Writer<'_>)) -> Vec<u8> {
    let sink = VecSink::new();
    let mut w = Writer::new(&sink, None, WriterOptions::default());
    f(&mut w);
    w.flush();
    sink.take()
}

/// Minimal CSV field decoder: strips the quotes, undoubles `""`.
fn csv_decode(field: &[u8]) -> Vec<u8> {
    assert_eq!(field.first(), Some(&b'"'));
    assert_eq!(field.last(), Some(&b'"'));
    let inner = &field[1..field.len() - 1];
    let mut out = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        if inner[i] == b'"' {
            assert_eq!(inner.get(i + 1), Some(&b'"'), "lone quote in CSV field");
            out.push(b'"');
            i += 2;
        } else {
            out.push(inner[i]);
            i += 1;
        }
    }
    out
}

/// C string literal decoder covering the escapes the writer produces:
/// named escapes, `\\`, `\"`, and three-digit octal.
fn c_decode(lit: &[u8]) -> Vec<u8> {
    assert_eq!(lit.first(), Some(&b'"'));
    assert_eq!(lit.last(), Some(&b'"'));
    let inner = &lit[1..lit.len() - 1];
    let mut out = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        if inner[i] != b'\\' {
            out.push(inner[i]);
            i += 1;
            continue;
        }
        i += 1;
        match inner[i] {
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b't' => out.push(b'\t'),
            b'n' => out.push(b'\n'),
            b'v' => out.push(0x0b),
            b'f' => out.push(0x0c),
            b'r' => out.push(b'\r'),
            d @ b'0'..=b'7' => {
                let mut v = (d - b'0') as u32;
                for _ in 0..2 {
                    i += 1;
                    v = v * 8 + (inner[i] - b'0') as u32;
                }
                out.push(v as u8);
            }
            other => panic!("unexpected escape \\{}", other as char),
        }
        i += 1;
    }
    out
}

/// URI percent decoder.
fn uri_decode(enc: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < enc.len() {
        if enc[i] == b'%' {
            let hi = char::from(enc[i + 1]).to_digit(16).unwrap();
            let lo = char::from(enc[i + 2]).to_digit(16).unwrap();
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(enc[i]);
            i += 1;
        }
    }
    out
}

proptest! {
    #[test]
    fn csv_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = emit(|w| w.csv(&data));
        prop_assert_eq!(csv_decode(&encoded), data);
    }

    #[test]
    fn c_string_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = emit(|w| w.cpp(&data));
        prop_assert_eq!(c_decode(&encoded), data);
    }

    #[test]
    fn json_round_trips(text in "\\PC{0,64}") {
        let encoded = emit(|w| w.json(text.as_bytes()));
        let parsed: String = serde_json::from_slice(&encoded).unwrap();
        prop_assert_eq!(parsed, text);
    }

    #[test]
    fn json_escapes_every_control_byte(b in 0u8..0x20) {
        let encoded = emit(|w| w.json(&[b]));
        // Controls are escaped, never emitted raw.
        prop_assert!(!encoded[1..encoded.len() - 1].contains(&b));
        let parsed: String = serde_json::from_slice(&encoded).unwrap();
        prop_assert_eq!(parsed.as_bytes(), &[b]);
    }

    #[test]
    fn uri_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = emit(|w| w.uri(&data));
        prop_assert_eq!(uri_decode(&encoded), data);
        // Pass-through set is exactly printable ASCII minus '%' and ';'.
        for &b in &encoded {
            prop_assert!((0x20..=0x7e).contains(&b));
        }
    }

    #[test]
    fn quote_round_trips(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = emit(|w| w.quote(&data));
        // Undo the two escapes.
        let inner = &encoded[1..encoded.len() - 1];
        let mut decoded = Vec::new();
        let mut i = 0;
        while i < inner.len() {
            if inner[i] == b'\\' {
                i += 1;
            }
            decoded.push(inner[i]);
            i += 1;
        }
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn xml_output_has_no_raw_markup(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = emit(|w| w.xml(&data));
        for (i, &b) in encoded.iter().enumerate() {
            prop_assert!(b != b'<' && b != b'>');
            if b == b'&' {
                // Every ampersand starts an entity.
                let rest = &encoded[i..];
                prop_assert!(
                    rest.starts_with(b"&amp;")
                        || rest.starts_with(b"&lt;")
                        || rest.starts_with(b"&gt;")
                        || rest.starts_with(b"&quot;")
                        || rest.starts_with(b"&apos;")
                        || rest.starts_with(b"&#x")
                );
            }
        }
    }
}
