use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields};

use crate::fields::{classify, Kind};

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity can only be derived for structs",
            ))
        }
    };

    let id_field = fields
        .iter()
        .find(|f| f.ident.as_ref().is_some_and(|i| i == "id"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input,
                "Entity structs must declare an `id: i32` field",
            )
        })?;
    if !is_i32(&id_field.ty) {
        return Err(syn::Error::new_spanned(
            id_field,
            "the `id` field must be of type i32",
        ));
    }

    let mut specs = Vec::new();
    for field in fields.iter() {
        if field.ident.as_ref().is_some_and(|i| i == "id") {
            continue;
        }
        if let Some(spec) = classify(field)? {
            specs.push(spec);
        }
    }

    // 1 tombstone byte + 4 Id bytes precede the declared fields.
    let mut offset: usize = 5;
    let mut descriptors = Vec::new();
    let mut encode_stmts = Vec::new();
    let mut decode_stmts = Vec::new();
    let mut field_idents = Vec::new();

    for spec in &specs {
        let off = offset;
        let width = spec.width();
        offset += width;

        let name_lit = spec.ident.to_string();
        let ident = &spec.ident;
        field_idents.push(ident.clone());

        let kind_ctor = match spec.kind {
            Kind::Int32 => quote! { ::recordstore::schema::FieldKind::Int32 },
            Kind::Bool => quote! { ::recordstore::schema::FieldKind::Bool },
            Kind::Decimal => quote! { ::recordstore::schema::FieldKind::Decimal },
            Kind::Timestamp => quote! { ::recordstore::schema::FieldKind::Timestamp },
            Kind::Enum32 => quote! { ::recordstore::schema::FieldKind::Enum32 },
            Kind::Str => {
                let max_len = spec.max_len.unwrap();
                quote! { ::recordstore::schema::FieldKind::String { max_len: #max_len } }
            }
        };
        let nullable = spec.nullable;
        descriptors.push(quote! {
            ::recordstore::schema::FieldDescriptor {
                name: #name_lit,
                kind: #kind_ctor,
                nullable: #nullable,
                width: #width,
            }
        });

        let value_width = spec.value_width();
        let value_end = off + value_width;
        let (write_fn, read_fn) = codec_fns(spec.kind);
        let field_ty = &spec.field.ty;

        if spec.nullable {
            let val_off = off + 1;
            let val_end = val_off + value_width;
            encode_stmts.push(quote! {
                match &self.#ident {
                    ::core::option::Option::Some(value) => {
                        buf[#off] = 0;
                        ::recordstore::codec::#write_fn(&mut buf[#val_off..#val_end], value);
                    }
                    ::core::option::Option::None => {
                        buf[#off] = 1;
                        for b in &mut buf[#val_off..#val_end] {
                            *b = 0;
                        }
                    }
                }
            });
            decode_stmts.push(quote! {
                let #ident: #field_ty = if buf[#off] == 1 {
                    ::core::option::Option::None
                } else {
                    ::core::option::Option::Some(::recordstore::codec::#read_fn(&buf[#val_off..#val_end]))
                };
            });
        } else {
            encode_stmts.push(quote! {
                ::recordstore::codec::#write_fn(&mut buf[#off..#value_end], &self.#ident);
            });
            decode_stmts.push(quote! {
                let #ident: #field_ty = ::recordstore::codec::#read_fn(&buf[#off..#value_end]);
            });
        }
    }

    let record_width = offset;
    let n_fields = descriptors.len();
    let schema_static = format_ident!("__{}_RECORDSTORE_SCHEMA", ident.to_string().to_uppercase());
    let fields_static = format_ident!("__{}_RECORDSTORE_FIELDS", ident.to_string().to_uppercase());

    Ok(quote! {
        #[allow(non_upper_case_globals)]
        static #fields_static: [::recordstore::schema::FieldDescriptor; #n_fields] = [
            #( #descriptors ),*
        ];

        #[allow(non_upper_case_globals)]
        static #schema_static: ::recordstore::schema::EntitySchema = ::recordstore::schema::EntitySchema {
            fields: &#fields_static,
            record_width: #record_width,
        };

        impl ::recordstore::schema::Entity for #ident {
            fn schema() -> &'static ::recordstore::schema::EntitySchema {
                &#schema_static
            }

            fn id(&self) -> i32 {
                self.id
            }

            fn set_id(&mut self, id: i32) {
                self.id = id;
            }

            fn encode(&self, buf: &mut [u8]) {
                debug_assert!(buf.len() >= #record_width);
                buf[0] = 0;
                ::recordstore::codec::write_i32_le(&mut buf[1..5], &self.id);
                #( #encode_stmts )*
            }

            fn decode(buf: &[u8]) -> ::core::result::Result<Self, ::recordstore::error::CodecError> {
                if buf.len() < #record_width {
                    return ::core::result::Result::Err(::recordstore::error::CodecError::BufferTooShort {
                        expected: #record_width,
                        actual: buf.len(),
                    });
                }
                let id = ::recordstore::codec::read_i32_le(&buf[1..5]);
                #( #decode_stmts )*
                ::core::result::Result::Ok(#ident {
                    id,
                    #( #field_idents ),*
                })
            }
        }
    })
}

fn is_i32(ty: &syn::Type) -> bool {
    matches!(ty, syn::Type::Path(p) if p.path.is_ident("i32"))
}

fn codec_fns(kind: Kind) -> (syn::Ident, syn::Ident) {
    match kind {
        Kind::Int32 => (format_ident!("write_i32_le"), format_ident!("read_i32_le")),
        Kind::Bool => (format_ident!("write_bool"), format_ident!("read_bool")),
        Kind::Decimal => (format_ident!("write_decimal"), format_ident!("read_decimal")),
        Kind::Timestamp => (
            format_ident!("write_timestamp"),
            format_ident!("read_timestamp"),
        ),
        Kind::Enum32 => (
            format_ident!("write_enum32"),
            format_ident!("read_enum32"),
        ),
        Kind::Str => (
            format_ident!("write_string_field"),
            format_ident!("read_string_field"),
        ),
    }
}
