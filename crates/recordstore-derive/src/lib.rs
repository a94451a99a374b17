//! Derive macros for `recordstore`.
//!
//! `#[derive(Entity)]` walks a struct's named fields the way
//! `prost-derive` walks message fields: it classifies each field's Rust
//! type into a fixed-width on-disk representation and emits `encode`/
//! `decode` methods plus a `'static` field-descriptor table, computed once
//! at compile time rather than through runtime reflection.
//!
//! `#[derive(Context)]` walks a struct whose fields are all `Table<E>` and
//! emits the file-open/table-load/commit plumbing described for the
//! context façade.

extern crate proc_macro;

mod context;
mod entity;
mod fields;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

#[proc_macro_derive(Entity, attributes(recordstore))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_derive(Context, attributes(recordstore))]
pub fn derive_context(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    context::expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
