mod bitbuf;
mod codec;
mod convert;

pub use bitbuf::{BitBuf, Whence};
pub use codec::{decode_uint, encode_uint, Encoding};
pub use convert::{
    bytes_to_uint, invert_bytes, invert_uint, min_bits, reverse_bytes, reverse_uint,
    uint_to_bytes,
};

#[cfg(test)]
mod test;
