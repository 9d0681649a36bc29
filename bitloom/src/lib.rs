//! One declarative blueprint describes how a sequence of bits is laid out;
//! the same blueprint both extracts a structured data tree from a byte
//! stream and constructs a byte stream from such a tree. See the member
//! crates for the layers: `bitloom-bits` (bit buffer and codec),
//! `bitloom-pattern` (the token grammar), `bitloom-maker` (the engines),
//! `bitloom-formats` (auxiliary codecs and blueprints).
//!
//! ```
//! use bitloom::{extract_data_tree, construct_byte_stream, pat};
//!
//! let data = vec![0x00, 0x05, 0x12, 0x34, b'A', b'B'];
//! let tree = extract_data_tree(pat("u16 x16 B16"), data.clone()).unwrap();
//! assert_eq!(construct_byte_stream(pat("u16 x16 B16"), &tree).unwrap(), data);
//! ```

pub use bitloom_base::{
    deflatten, err, fail, flatten, stream_index, tree_index, Error, ErrorKind, HexCase, Node,
    Result, Value,
};
pub use bitloom_bits::{
    bytes_to_uint, decode_uint, encode_uint, uint_to_bytes, BitBuf, Encoding, Whence,
};
pub use bitloom_maker::{
    construct, construct_byte_stream, extract, extract_data_stream, extract_data_tree, pat,
    Constructor, Extractor, LabelBinding, Maker,
};
pub use bitloom_pattern::{compile, parse_literal};

pub use bitloom_formats as formats;
