//! Schema metadata: per-entity field layout and fixed byte widths
//! (spec.md §4.1).
//!
//! Field layout is computed by `#[derive(Entity)]` at compile time, so
//! `EntitySchema` values are plain `'static` data rather than something
//! built and memoized at runtime — the derive is the "cache once per
//! process" step the spec describes, done once by the compiler instead of
//! once per process startup.

/// A type that can be stored in a table: fixed-width field layout, a
/// primary key, and a byte-exact codec (spec.md §4.2).
pub trait Entity: Sized + Send + Sync + 'static {
    fn schema() -> &'static EntitySchema;

    fn id(&self) -> i32;

    /// Mutating `Id` after construction is unsupported by callers, but the
    /// Table Handle needs this to assign Ids on insert (spec.md §4.7).
    fn set_id(&mut self, id: i32);

    /// Encodes `self` into `buf`, which must be at least
    /// `schema().record_width` bytes. Always writes the tombstone byte as
    /// `0x00`; tombstoning itself is a separate one-byte overwrite done by
    /// the Storage File Manager (spec.md §4.2).
    fn encode(&self, buf: &mut [u8]);

    /// Decodes a record from `buf`. Refuses to run on short buffers.
    fn decode(buf: &[u8]) -> Result<Self, crate::error::CodecError>;
}

/// Per-entity-type layout: declared fields plus the full record width
/// (`1 tombstone + 4 Id + sum(field widths)`, spec.md §3).
#[derive(Debug)]
pub struct EntitySchema {
    pub fields: &'static [FieldDescriptor],
    pub record_width: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    /// Total on-disk width, including the 1-byte null flag when nullable.
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int32,
    Bool,
    Decimal,
    Timestamp,
    Enum32,
    String { max_len: usize },
}

/// Implemented by user enums stored with `#[recordstore(enum32)]`: the
/// underlying integer representation, little-endian on disk (spec.md
/// §4.1's "enumeration" row).
pub trait Enum32: Copy {
    fn to_i32(self) -> i32;
    fn from_i32(value: i32) -> Self;
}
