//! Field classification shared by the `Entity` derive.

use syn::{Field, GenericArgument, PathArguments, Type};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Int32,
    Bool,
    Decimal,
    Timestamp,
    Enum32,
    Str,
}

pub struct FieldSpec<'a> {
    pub field: &'a Field,
    pub ident: syn::Ident,
    pub kind: Kind,
    pub nullable: bool,
    pub max_len: Option<usize>,
}

impl<'a> FieldSpec<'a> {
    /// Width of the value itself, excluding the 1-byte null flag.
    pub fn value_width(&self) -> usize {
        match self.kind {
            Kind::Int32 => 4,
            Kind::Bool => 1,
            Kind::Decimal => 16,
            Kind::Timestamp => 8,
            Kind::Enum32 => 4,
            Kind::Str => self.max_len.expect("checked by classify"),
        }
    }

    /// Total on-disk width, including the null flag byte when nullable.
    pub fn width(&self) -> usize {
        self.value_width() + if self.nullable { 1 } else { 0 }
    }
}

struct Attrs {
    skip: bool,
    enum32: bool,
    max_len: Option<usize>,
}

fn parse_attrs(field: &Field) -> syn::Result<Attrs> {
    let mut skip = false;
    let mut enum32 = false;
    let mut max_len = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("recordstore") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else if meta.path.is_ident("enum32") {
                enum32 = true;
                Ok(())
            } else if meta.path.is_ident("max_len") {
                let value = meta.value()?;
                let lit: syn::LitInt = value.parse()?;
                max_len = Some(lit.base10_parse::<usize>()?);
                Ok(())
            } else {
                Err(meta.error("unrecognized recordstore field attribute"))
            }
        })?;
    }
    Ok(Attrs {
        skip,
        enum32,
        max_len,
    })
}

/// Returns `Ok(None)` for fields marked `#[recordstore(skip)]`.
pub fn classify(field: &Field) -> syn::Result<Option<FieldSpec<'_>>> {
    let attrs = parse_attrs(field)?;
    if attrs.skip {
        return Ok(None);
    }
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Entity fields must be named"))?;

    let (inner_ty, nullable) = unwrap_option(&field.ty);
    let kind = classify_type(inner_ty, attrs.enum32, field)?;

    if matches!(kind, Kind::Str) && attrs.max_len.is_none() {
        return Err(syn::Error::new_spanned(
            field,
            "string fields require #[recordstore(max_len = N)]",
        ));
    }

    Ok(Some(FieldSpec {
        field,
        ident,
        kind,
        nullable,
        max_len: attrs.max_len,
    }))
}

fn unwrap_option(ty: &Type) -> (&Type, bool) {
    if let Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            if seg.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &seg.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return (inner, true);
                    }
                }
            }
        }
    }
    (ty, false)
}

fn classify_type(ty: &Type, enum32: bool, field: &Field) -> syn::Result<Kind> {
    let path = match ty {
        Type::Path(p) => &p.path,
        _ => {
            return Err(syn::Error::new_spanned(
                field,
                "unsupported field type: expected a type path",
            ))
        }
    };
    let name = path
        .segments
        .last()
        .map(|s| s.ident.to_string())
        .unwrap_or_default();

    if enum32 {
        return Ok(Kind::Enum32);
    }

    match name.as_str() {
        "i32" => Ok(Kind::Int32),
        "bool" => Ok(Kind::Bool),
        "Decimal" => Ok(Kind::Decimal),
        "DateTime" => Ok(Kind::Timestamp),
        "String" => Ok(Kind::Str),
        _ => Err(syn::Error::new_spanned(
            field,
            format!(
                "unsupported field type `{name}`; supported: i32, bool, Decimal, \
                 DateTime<Utc>, String, or an enum tagged #[recordstore(enum32)]"
            ),
        )),
    }
}
