mod error;
mod tree;
mod value;

pub use error::{err, fail, Error, ErrorKind, Result};
pub use tree::{deflatten, flatten, stream_index, tree_index, Node};
pub use value::{HexCase, Value};
