use crate::{compile, parse_literal, Count, JumpKind, ModKind, OpKind, SettingMode};
use bitloom_base::{ErrorKind, Value};
use bitloom_bits::Encoding;
use test_log::test;

fn kinds(pattern: &str) -> Vec<OpKind> {
    compile(pattern).unwrap().into_iter().map(|op| op.kind).collect()
}

#[test]
fn test_value_tokens() {
    assert_eq!(
        kinds("u16 s8 f32 f64 x12 X4 b3 B16 C8"),
        vec![
            OpKind::Value { bits: 16, enc: Encoding::UInt },
            OpKind::Value { bits: 8, enc: Encoding::SInt },
            OpKind::Value { bits: 32, enc: Encoding::F32 },
            OpKind::Value { bits: 64, enc: Encoding::F64 },
            OpKind::Value { bits: 12, enc: Encoding::HexLower },
            OpKind::Value { bits: 4, enc: Encoding::HexUpper },
            OpKind::Value { bits: 3, enc: Encoding::Bin },
            OpKind::Value { bits: 16, enc: Encoding::Bytes },
            OpKind::Value { bits: 8, enc: Encoding::Char },
        ]
    );
}

#[test]
fn test_take_all_and_skip() {
    assert_eq!(
        kinds("B$ C$ n12 z4 o4"),
        vec![
            OpKind::TakeAll { enc: Encoding::Bytes },
            OpKind::TakeAll { enc: Encoding::Char },
            OpKind::Next { bits: 12 },
            OpKind::Zeros { bits: 4 },
            OpKind::Ones { bits: 4 },
        ]
    );
}

#[test]
fn test_mod_tokens() {
    assert_eq!(
        kinds("r8 i8 e16 r$ i$ r3.5 i3.$ p4.8 p4.$"),
        vec![
            OpKind::Mod { bits: Some(8), kind: ModKind::Reverse },
            OpKind::Mod { bits: Some(8), kind: ModKind::Invert },
            OpKind::Mod { bits: Some(16), kind: ModKind::EndianSwap },
            OpKind::Mod { bits: None, kind: ModKind::Reverse },
            OpKind::Mod { bits: None, kind: ModKind::Invert },
            OpKind::ModOff { offset: 3, bits: Some(5), kind: ModKind::Reverse },
            OpKind::ModOff { offset: 3, bits: None, kind: ModKind::Invert },
            OpKind::ModOff { offset: 4, bits: Some(8), kind: ModKind::Pull },
            OpKind::ModOff { offset: 4, bits: None, kind: ModKind::Pull },
        ]
    );
}

#[test]
fn test_settings() {
    assert_eq!(
        kinds("Ry In Et"),
        vec![
            OpKind::SetAll { kind: ModKind::Reverse, mode: SettingMode::On },
            OpKind::SetAll { kind: ModKind::Invert, mode: SettingMode::Off },
            OpKind::SetAll { kind: ModKind::EndianSwap, mode: SettingMode::Toggle },
        ]
    );
}

#[test]
fn test_labels_and_assertions() {
    assert_eq!(
        kinds("u8 #\"len\" =#\"len\" =5; !#\"magic\"=0x42;"),
        vec![
            OpKind::Value { bits: 8, enc: Encoding::UInt },
            OpKind::SetLabel("len".into()),
            OpKind::MatchLabel("len".into()),
            OpKind::Assert(Value::UInt(5)),
            OpKind::DefLabel("magic".into(), Value::UInt(0x42)),
        ]
    );
}

#[test]
fn test_repetition() {
    let ops = compile("{u8 {b1}2}3 u4").unwrap();
    assert_eq!(ops.len(), 2);
    match &ops[0].kind {
        OpKind::Repeat { count, body } => {
            assert_eq!(*count, Count::Times(3));
            assert_eq!(body.len(), 2);
            match &body[1].kind {
                OpKind::Repeat { count, body } => {
                    assert_eq!(*count, Count::Times(2));
                    assert_eq!(body.len(), 1);
                }
                other => panic!("expected nested repeat, got {:?}", other),
            }
        }
        other => panic!("expected repeat, got {:?}", other),
    }
    match &compile("{u8}$").unwrap()[0].kind {
        OpKind::Repeat { count: Count::Unbounded, .. } => {}
        other => panic!("expected unbounded repeat, got {:?}", other),
    }
}

#[test]
fn test_markers_and_jumps() {
    assert_eq!(
        kinds("m^\"06054b50\" m$\"AA\" js8 jf16 jb16 je32 j$0"),
        vec![
            OpKind::MarkerStart(vec![0x06, 0x05, 0x4b, 0x50]),
            OpKind::MarkerEnd(vec![0xaa]),
            OpKind::Jump { bits: 8, kind: JumpKind::Start },
            OpKind::Jump { bits: 16, kind: JumpKind::Forward },
            OpKind::Jump { bits: 16, kind: JumpKind::Backward },
            OpKind::Jump { bits: 32, kind: JumpKind::End },
            OpKind::JumpEnd(0),
        ]
    );
}

#[test]
fn test_comments() {
    assert_eq!(
        kinds("u8 ## the length field\nu16"),
        vec![
            OpKind::Value { bits: 8, enc: Encoding::UInt },
            OpKind::Value { bits: 16, enc: Encoding::UInt },
        ]
    );
}

#[test]
fn test_rejects() {
    for bad in [
        "q8",          // unknown token
        "u",           // missing width
        "u8 =5",       // unterminated assertion
        "{u8",         // unterminated repetition
        "}3",          // unmatched close
        "m^\"0\"",     // odd hex digit count
        "m^\"zz\"",    // not hex
        "p8",          // pull needs an offset
        "f16",         // bad float width
        "u129",        // over the integer width limit
        "B129",        // fractional-byte width over the limit
        "=q;",         // not a literal
        "!#\"x\"=y;",  // not a literal
        "Rz",          // bad setting mode
    ] {
        let err = compile(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPattern, "pattern {:?}", bad);
    }
    assert_eq!(compile("e7").unwrap_err().kind(), ErrorKind::EndianWidth);
}

#[test]
fn test_literals() {
    assert_eq!(parse_literal("5").unwrap(), Value::UInt(5));
    assert_eq!(parse_literal("-5").unwrap(), Value::SInt(-5));
    assert_eq!(parse_literal("0xdead").unwrap(), Value::UInt(0xdead));
    assert_eq!(parse_literal("1.5").unwrap(), Value::f64(1.5));
    assert_eq!(parse_literal("2e3").unwrap(), Value::f64(2000.0));
    assert_eq!(
        parse_literal("b\"PK\\x05\\x06\"").unwrap(),
        Value::Bytes(vec![b'P', b'K', 5, 6])
    );
    assert_eq!(parse_literal("\"hi\\n\"").unwrap(), Value::Bytes(b"hi\n".to_vec()));
    assert!(parse_literal("cd_offset").is_err());
    assert!(parse_literal("1+2").is_err());
}
