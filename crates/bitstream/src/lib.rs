//! Bit-precision codec for the RakNet-derived game wire format
//!
//! The protocol packs values at bit granularity: booleans are single bits,
//! integers and string lengths use a continuation-bit varint, floats travel
//! in a reduced exponent-first layout. `BitReader` and `BitWriter` are exact
//! inverses: for every representable value, decoding what the writer
//! produced yields the original value.

pub mod error;
pub mod reader;
pub mod values;
pub mod writer;

pub use error::{CodecError, CodecResult};
pub use reader::BitReader;
pub use values::*;
pub use writer::BitWriter;
