//! Per-conversation decode state
//!
//! The protocol is stateful: join-data batches introduce string and object
//! references that later frames refer to by table index. The context owns
//! those tables for exactly one conversation and is threaded `&mut` through
//! every decode call.

use rakscope_bitstream::{BitReader, CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// Reference to a replicated object instance.
///
/// A scope string (peer identity) plus a per-scope instance id. The null
/// reference has an empty scope and id 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub scope: String,
    pub id: u32,
}

impl ObjectRef {
    pub fn is_null(&self) -> bool {
        self.scope.is_empty() && self.id == 0
    }
}

/// Mutable decode-time state for one conversation
#[derive(Debug, Default)]
pub struct CommunicationContext {
    string_table: Vec<String>,
    referent_scopes: Vec<String>,
}

impl CommunicationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strings cached so far for this conversation
    pub fn string_table(&self) -> &[String] {
        &self.string_table
    }

    /// Referent scopes introduced so far
    pub fn referent_scopes(&self) -> &[String] {
        &self.referent_scopes
    }

    /// Read a string with the join-aware reference mechanism.
    ///
    /// Outside join data this is a plain length-prefixed string. Inside join
    /// data a leading cached-bit selects between a table index and a literal
    /// that is inserted into the table as a side effect. Layout is
    /// provisional pending verification against a capture corpus.
    pub fn read_cached_string(
        &mut self,
        reader: &mut BitReader<'_>,
        is_join_data: bool,
    ) -> CodecResult<String> {
        if !is_join_data {
            return reader.read_string();
        }
        let cached = reader.read_bool()?;
        if cached {
            let index = reader.read_uvarint()? as usize;
            self.string_table.get(index).cloned().ok_or_else(|| {
                CodecError::invalid(format!(
                    "string table index {index} out of range ({} entries)",
                    self.string_table.len()
                ))
            })
        } else {
            let value = reader.read_string()?;
            self.string_table.push(value.clone());
            Ok(value)
        }
    }

    /// Read an object reference.
    ///
    /// A null bit first; non-null references carry the scope (join data may
    /// introduce a new scope, otherwise a table index) and a u32 instance id.
    pub fn read_object(
        &mut self,
        reader: &mut BitReader<'_>,
        is_join_data: bool,
    ) -> CodecResult<ObjectRef> {
        if !reader.read_bool()? {
            return Ok(ObjectRef::default());
        }
        let scope = if is_join_data && reader.read_bool()? {
            let scope = reader.read_string()?;
            self.referent_scopes.push(scope.clone());
            scope
        } else {
            let index = reader.read_uvarint()? as usize;
            self.referent_scopes.get(index).cloned().ok_or_else(|| {
                CodecError::invalid(format!(
                    "referent scope index {index} out of range ({} entries)",
                    self.referent_scopes.len()
                ))
            })?
        };
        let id = reader.read_u32()?;
        Ok(ObjectRef { scope, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rakscope_bitstream::BitWriter;

    #[test]
    fn test_plain_string_outside_join() {
        let mut writer = BitWriter::new();
        writer.write_string("hello").unwrap();
        let bytes = writer.finish();
        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(ctx.read_cached_string(&mut reader, false).unwrap(), "hello");
        assert!(ctx.string_table().is_empty());
    }

    #[test]
    fn test_join_literal_then_cached() {
        let mut writer = BitWriter::new();
        // literal introduces the entry
        writer.write_bool(false).unwrap();
        writer.write_string("Workspace").unwrap();
        // cached reference to index 0
        writer.write_bool(true).unwrap();
        writer.write_uvarint(0).unwrap();
        let bytes = writer.finish();

        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(
            ctx.read_cached_string(&mut reader, true).unwrap(),
            "Workspace"
        );
        assert_eq!(
            ctx.read_cached_string(&mut reader, true).unwrap(),
            "Workspace"
        );
        assert_eq!(ctx.string_table().len(), 1);
    }

    #[test]
    fn test_cached_index_out_of_range() {
        let mut writer = BitWriter::new();
        writer.write_bool(true).unwrap();
        writer.write_uvarint(3).unwrap();
        let bytes = writer.finish();

        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            ctx.read_cached_string(&mut reader, true),
            Err(CodecError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_object_null_then_new_scope() {
        let mut writer = BitWriter::new();
        writer.write_bool(false).unwrap(); // null
        writer.write_bool(true).unwrap(); // non-null
        writer.write_bool(true).unwrap(); // new scope
        writer.write_string("peer-1").unwrap();
        writer.write_u32(42).unwrap();
        let bytes = writer.finish();

        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&bytes);
        assert!(ctx.read_object(&mut reader, true).unwrap().is_null());
        let obj = ctx.read_object(&mut reader, true).unwrap();
        assert_eq!(obj.scope, "peer-1");
        assert_eq!(obj.id, 42);
        assert_eq!(ctx.referent_scopes(), ["peer-1"]);
    }
}
