//! The directional engines. One blueprint -- a pattern string or a plain
//! function driving a [`Maker`] -- describes a binary format; running it
//! through an [`Extractor`] turns bytes into a data tree, running the same
//! blueprint through a [`Constructor`] turns the tree back into bytes. The
//! two directions are mutually inverse by construction: every in-place bit
//! modification is logged as it is applied (extraction) or scheduled
//! (construction), and construction's finalize replays the log in reverse.

mod construct;
mod extract;
mod state;

pub use construct::Constructor;
pub use extract::Extractor;
pub use state::LabelBinding;

use bitloom_base::{Node, Result, Value};

/// The surface a blueprint programs against, identical in both directions.
pub trait Maker {
    /// Execute one pattern. Returns the record of values handled in this
    /// call, with `[...]` nesting inside the call reflected as sublists.
    fn run(&mut self, pattern: &str) -> Result<Vec<Node>>;

    /// The most recent datum bound to a label.
    fn label(&self, name: &str) -> Result<Node>;

    /// Cursor position in the working buffer, in bits.
    fn tell_buffer(&self) -> u64;

    /// Cursor position translated to format-spec coordinates.
    fn tell_stream(&self) -> u64;

    /// Index path of the next value in the data tree.
    fn index_tree(&self) -> Vec<usize>;

    /// Index of the next value in the flat data stream.
    fn index_stream(&self) -> usize;

    /// Whether the input side (buffer or value stream) is exhausted.
    fn at_eof(&self) -> bool;

    /// Materialize the current buffer.
    fn bytes(&self) -> Vec<u8>;
}

/// Adapt a pattern string into a blueprint function.
pub fn pat<M: Maker>(pattern: &str) -> impl FnOnce(&mut M) -> Result<Vec<Node>> + '_ {
    move |maker| maker.run(pattern)
}

/// Run a blueprint against a byte stream, returning the finalized maker and
/// the blueprint's result.
pub fn extract<R>(
    blueprint: impl FnOnce(&mut Extractor) -> Result<R>,
    data: impl Into<Vec<u8>>,
) -> Result<(Extractor, R)> {
    let mut maker = Extractor::new(data);
    let out = blueprint(&mut maker)?;
    maker.finalize()?;
    Ok((maker, out))
}

/// Extraction straight to the nested data tree.
pub fn extract_data_tree<R>(
    blueprint: impl FnOnce(&mut Extractor) -> Result<R>,
    data: impl Into<Vec<u8>>,
) -> Result<Vec<Node>> {
    let (maker, _) = extract(blueprint, data)?;
    Ok(maker.into_data_tree())
}

/// Extraction straight to the flat value stream.
pub fn extract_data_stream<R>(
    blueprint: impl FnOnce(&mut Extractor) -> Result<R>,
    data: impl Into<Vec<u8>>,
) -> Result<Vec<Value>> {
    let (maker, _) = extract(blueprint, data)?;
    Ok(maker.data_stream().to_vec())
}

/// Run a blueprint against a data tree (a flat stream is a tree whose nodes
/// are all leaves), returning the finalized maker and the blueprint's
/// result.
pub fn construct<R>(
    blueprint: impl FnOnce(&mut Constructor) -> Result<R>,
    tree: &[Node],
) -> Result<(Constructor, R)> {
    let mut maker = Constructor::new(tree);
    let out = blueprint(&mut maker)?;
    maker.finalize()?;
    Ok((maker, out))
}

/// Construction straight to the finished byte stream.
pub fn construct_byte_stream<R>(
    blueprint: impl FnOnce(&mut Constructor) -> Result<R>,
    tree: &[Node],
) -> Result<Vec<u8>> {
    let (maker, _) = construct(blueprint, tree)?;
    Ok(maker.into_bytes())
}
