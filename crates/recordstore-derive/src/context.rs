use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

/// Every field must be `Table<E>` for some `E: Entity`. The field name is
/// the table name, matching "name equals the declared property/field"
/// (spec.md §3).
struct TableField {
    ident: syn::Ident,
    entity_ty: Type,
    table_name: String,
}

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Context can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Context can only be derived for structs",
            ))
        }
    };

    let mut tables = Vec::new();
    for field in fields.iter() {
        let field_ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "Context fields must be named"))?;
        let entity_ty = entity_type_arg(&field.ty).ok_or_else(|| {
            syn::Error::new_spanned(field, "Context fields must have type Table<E>")
        })?;
        let table_name = field_ident.to_string();
        if table_name.as_bytes().len() > 64 {
            return Err(syn::Error::new_spanned(
                field,
                "table name exceeds 64 UTF-8 bytes",
            ));
        }
        tables.push(TableField {
            ident: field_ident,
            entity_ty,
            table_name,
        });
    }

    if tables.is_empty() {
        return Err(syn::Error::new_spanned(
            &input,
            "Context must declare at least one Table<E> field",
        ));
    }

    let schema_entries = tables.iter().map(|t| {
        let name = &t.table_name;
        let ty = &t.entity_ty;
        quote! { (#name, <#ty as ::recordstore::schema::Entity>::schema()) }
    });

    let field_inits = tables.iter().map(|t| {
        let field_ident = &t.ident;
        let name = &t.table_name;
        let ty = &t.entity_ty;
        quote! {
            #field_ident: ::recordstore::table::Table::<#ty>::new(#name, ::std::sync::Arc::clone(&cache))?
        }
    });

    let collect_batches = tables.iter().map(|t| {
        let field_ident = &t.ident;
        let name = &t.table_name;
        quote! {
            if let Some(batch) = self.#field_ident.collect_commit_batch() {
                batches.push((#name, batch));
            }
        }
    });

    let clear_trackers = tables.iter().map(|t| {
        let field_ident = &t.ident;
        quote! { self.#field_ident.clear_tracked(); }
    });

    let first_field = &tables[0].ident;

    Ok(quote! {
        impl #ident {
            pub fn open<P: AsRef<::std::path::Path>>(
                path: P,
            ) -> ::core::result::Result<Self, ::recordstore::error::EngineError> {
                let schema: &[(&str, &'static ::recordstore::schema::EntitySchema)] = &[
                    #( #schema_entries ),*
                ];
                let cache = ::recordstore::shared_cache::acquire(path.as_ref(), schema)?;
                ::core::result::Result::Ok(Self {
                    #( #field_inits ),*
                })
            }

            /// Explicit, idempotent release of the shared cache backing this
            /// context. Context disposal alone does not release it
            /// (spec.md §4.5).
            pub fn release(
                path: impl AsRef<::std::path::Path>,
            ) -> ::core::result::Result<(), ::recordstore::error::EngineError> {
                ::recordstore::shared_cache::release(path.as_ref())
            }

            /// Blocking commit: runs the async commit path to completion on
            /// the calling thread.
            pub fn commit(&self) -> ::core::result::Result<(), ::recordstore::error::EngineError> {
                ::futures::executor::block_on(
                    self.commit_async(::tokio_util::sync::CancellationToken::new()),
                )
            }

            /// Holds the cache's single commit permit across collecting
            /// every table's pending batch, submitting it, and clearing
            /// the trackers, so concurrent commits on this Context never
            /// observe (and double-write) the same pending change.
            pub async fn commit_async(
                &self,
                cancel: ::tokio_util::sync::CancellationToken,
            ) -> ::core::result::Result<(), ::recordstore::error::EngineError> {
                let cache = ::std::sync::Arc::clone(self.#first_field.cache());
                let _permit = cache
                    .commit_semaphore()
                    .acquire()
                    .await
                    .map_err(|_| ::recordstore::error::EngineError::Disposed)?;
                if cancel.is_cancelled() {
                    return ::core::result::Result::Err(::recordstore::error::EngineError::Cancelled);
                }
                let mut batches: ::std::vec::Vec<(&'static str, ::recordstore::storage_file::ChangeSet)> =
                    ::std::vec::Vec::new();
                #( #collect_batches )*
                ::recordstore::context::commit_changes(&cache, batches, cancel).await?;
                #( #clear_trackers )*
                ::core::result::Result::Ok(())
            }
        }
    })
}

fn entity_type_arg(ty: &Type) -> Option<Type> {
    if let Type::Path(p) = ty {
        let seg = p.path.segments.last()?;
        if seg.ident != "Table" {
            return None;
        }
        if let PathArguments::AngleBracketed(args) = &seg.arguments {
            if let Some(GenericArgument::Type(inner)) = args.args.first() {
                return Some(inner.clone());
            }
        }
    }
    None
}
